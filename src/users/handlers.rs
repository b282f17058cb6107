use axum::{
    extract::{FromRef, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::storage::ext_from_mime;
use crate::todos::repo::Todo;
use crate::users::dto::{
    ChangePasswordRequest, ChannelProfile, LoginRequest, LoginResponse, PublicUser,
    RefreshRequest, UpdateAccountRequest,
};
use crate::users::password::{hash_password, verify_password};
use crate::users::repo::{NewUser, User};
use crate::users::session::{cookie_value, CurrentUser};
use crate::users::tokens::{self, JwtKeys, TokenPair};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn auth_cookie(name: &str, value: &str) -> HeaderValue {
    format!("{name}={value}; HttpOnly; Secure; SameSite=Strict; Path=/")
        .parse()
        .unwrap()
}

fn expired_cookie(name: &str) -> HeaderValue {
    format!("{name}=; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age=0")
        .parse()
        .unwrap()
}

fn set_auth_cookies(pair: &TokenPair) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, auth_cookie("accessToken", &pair.access_token));
    headers.append(header::SET_COOKIE, auth_cookie("refreshToken", &pair.refresh_token));
    headers
}

fn clear_auth_cookies() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, expired_cookie("accessToken"));
    headers.append(header::SET_COOKIE, expired_cookie("refreshToken"));
    headers
}

struct UploadedFile {
    body: Bytes,
    content_type: String,
}

impl UploadedFile {
    fn object_key(&self, prefix: &str) -> String {
        let ext = ext_from_mime(&self.content_type).unwrap_or("bin");
        format!("{}/{}.{}", prefix, Uuid::new_v4(), ext)
    }
}

#[derive(Default)]
struct RegisterForm {
    username: Option<String>,
    email: Option<String>,
    full_name: Option<String>,
    password: Option<String>,
    avatar: Option<UploadedFile>,
    cover_image: Option<UploadedFile>,
}

async fn read_register_form(mut mp: Multipart) -> Result<RegisterForm, ApiError> {
    let mut form = RegisterForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("malformed multipart body".into()))?
    {
        let name = field.name().map(|s| s.to_string());
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        match name.as_deref() {
            Some("username") => form.username = Some(read_text(field).await?),
            Some("email") => form.email = Some(read_text(field).await?),
            Some("fullName") => form.full_name = Some(read_text(field).await?),
            Some("password") => form.password = Some(read_text(field).await?),
            Some("avatar") => {
                let body = read_bytes(field).await?;
                form.avatar = Some(UploadedFile { body, content_type });
            }
            Some("coverImage") => {
                let body = read_bytes(field).await?;
                form.cover_image = Some(UploadedFile { body, content_type });
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| ApiError::BadRequest("malformed multipart body".into()))
}

async fn read_bytes(field: axum::extract::multipart::Field<'_>) -> Result<Bytes, ApiError> {
    field
        .bytes()
        .await
        .map_err(|_| ApiError::BadRequest("malformed multipart body".into()))
}

/// POST /users/register (multipart: username, email, fullName, password,
/// avatar file required, coverImage file optional).
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let form = read_register_form(mp).await?;

    let username = form.username.unwrap_or_default().trim().to_lowercase();
    let email = form.email.unwrap_or_default().trim().to_string();
    let full_name = form.full_name.unwrap_or_default().trim().to_string();
    let password = form.password.unwrap_or_default();

    if username.is_empty() || email.is_empty() || full_name.is_empty() || password.trim().is_empty()
    {
        return Err(ApiError::BadRequest("all fields are required".into()));
    }
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("invalid email".into()));
    }

    if User::find_by_username_or_email(&state.db, Some(&username), Some(&email))
        .await?
        .is_some()
    {
        warn!(%username, "username or email already exists");
        return Err(ApiError::Conflict("username or email already exists".into()));
    }

    let avatar = form
        .avatar
        .ok_or_else(|| ApiError::BadRequest("avatar file is required".into()))?;

    // Upload before insert: a failed upload must not leave a user row behind.
    let avatar_url = state
        .media
        .upload(
            &avatar.object_key("avatars"),
            avatar.body.clone(),
            &avatar.content_type,
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "avatar upload failed");
            ApiError::BadRequest("avatar upload failed".into())
        })?;

    let cover_image_url = match form.cover_image {
        Some(cover) => match state
            .media
            .upload(&cover.object_key("covers"), cover.body.clone(), &cover.content_type)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "cover image upload failed, continuing without it");
                None
            }
        },
        None => None,
    };

    let password_hash = hash_password(&password)?;
    let user = User::create(
        &state.db,
        NewUser {
            username: &username,
            email: &email,
            full_name: &full_name,
            password_hash: &password_hash,
            avatar_url: &avatar_url,
            cover_image_url: cover_image_url.as_deref(),
        },
    )
    .await?;

    info!(user_id = %user.id, %username, "user registered");
    Ok(Json(ApiResponse::ok(
        PublicUser::from(user),
        "User registered successfully",
    )))
}

/// POST /users/login (body: username|email + password). Sets the token pair
/// as HttpOnly cookies and returns it in the body as well.
#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<ApiResponse<LoginResponse>>), ApiError> {
    let username = payload
        .username
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let email = payload
        .email
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    if username.is_none() && email.is_none() {
        return Err(ApiError::BadRequest("username or email is required".into()));
    }

    let user = User::find_by_username_or_email(&state.db, username, email)
        .await?
        .ok_or_else(|| ApiError::BadRequest("username or email not found".into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let pair = tokens::issue_pair(&state.db, &keys, user.id).await?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    let headers = set_auth_cookies(&pair);
    let body = LoginResponse::new(PublicUser::from(user), pair);
    Ok((
        headers,
        Json(ApiResponse::ok(body, "User logged in successfully")),
    ))
}

/// POST /users/logout. Clears the refresh-token slot unconditionally;
/// calling it again on an already-cleared slot is a no-op, not an error.
#[instrument(skip(state, current))]
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<(HeaderMap, Json<ApiResponse<serde_json::Value>>), ApiError> {
    User::set_refresh_token(&state.db, current.0.id, None).await?;
    info!(user_id = %current.0.id, "user logged out");
    Ok((
        clear_auth_cookies(),
        Json(ApiResponse::ok(
            serde_json::json!({}),
            "User logged out successfully",
        )),
    ))
}

/// POST /users/regenerate-access-token. Refresh token from the cookie or
/// the JSON body; cookie wins. Rotation invalidates the presented token.
#[instrument(skip(state, headers, payload))]
pub async fn regenerate_access_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Result<(HeaderMap, Json<ApiResponse<TokenPair>>), ApiError> {
    let presented = cookie_value(&headers, "refreshToken")
        .or_else(|| payload.and_then(|Json(p)| p.refresh_token))
        .ok_or_else(|| ApiError::Unauthorized("refresh token is required".into()))?;

    let keys = JwtKeys::from_ref(&state);
    let (user, pair) = tokens::rotate(&state.db, &keys, &presented).await?;

    info!(user_id = %user.id, "access token regenerated");
    Ok((
        set_auth_cookies(&pair),
        Json(ApiResponse::ok(pair, "Access token regenerated successfully")),
    ))
}

/// POST|PATCH /users/change-password. Old password is re-verified against
/// the stored hash before the new one is accepted.
#[instrument(skip(state, current, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if payload.new_password.trim().is_empty() {
        return Err(ApiError::BadRequest("new password is required".into()));
    }

    let user = User::find_by_id(&state.db, current.0.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("invalid access token".into()))?;

    if !verify_password(&payload.old_password, &user.password_hash)? {
        return Err(ApiError::BadRequest("old password is incorrect".into()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    User::update_password(&state.db, user.id, &password_hash).await?;

    info!(user_id = %user.id, "password changed");
    Ok(Json(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    )))
}

/// POST|PATCH /users/update — full name and/or email.
#[instrument(skip(state, current, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let full_name = payload.full_name.as_deref().map(str::trim);
    let email = payload.email.as_deref().map(str::trim);

    if full_name.is_none() && email.is_none() {
        return Err(ApiError::BadRequest("fullName or email is required".into()));
    }
    if matches!(full_name, Some("")) || matches!(email, Some("")) {
        return Err(ApiError::BadRequest("fields must not be blank".into()));
    }
    if let Some(email) = email {
        if !is_valid_email(email) {
            return Err(ApiError::BadRequest("invalid email".into()));
        }
        if let Some(other) = User::find_by_username_or_email(&state.db, None, Some(email)).await? {
            if other.id != current.0.id {
                return Err(ApiError::Conflict("email already in use".into()));
            }
        }
    }

    let full_name = full_name.unwrap_or(&current.0.full_name);
    let email = email.unwrap_or(&current.0.email);
    let user = User::update_account(&state.db, current.0.id, full_name, email).await?;

    Ok(Json(ApiResponse::ok(
        PublicUser::from(user),
        "Account details updated successfully",
    )))
}

async fn read_single_file(mut mp: Multipart, field_name: &str) -> Result<UploadedFile, ApiError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("malformed multipart body".into()))?
    {
        if field.name() == Some(field_name) {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let body = read_bytes(field).await?;
            return Ok(UploadedFile { body, content_type });
        }
    }
    Err(ApiError::BadRequest(format!("{field_name} file is required")))
}

async fn upload_media(
    state: &AppState,
    file: UploadedFile,
    prefix: &str,
) -> Result<String, ApiError> {
    state
        .media
        .upload(&file.object_key(prefix), file.body.clone(), &file.content_type)
        .await
        .map_err(|e| {
            warn!(error = %e, "media upload failed");
            ApiError::BadRequest("file upload failed".into())
        })
}

/// Best-effort removal of a superseded media object. Must only run once the
/// replacement URL is persisted: a failed delete leaves a stray object, never
/// a stored URL pointing at nothing.
async fn delete_media_best_effort(state: &AppState, old_url: Option<&str>) {
    if let Some(old) = old_url.filter(|u| !u.is_empty()) {
        if let Err(e) = state.media.delete(old).await {
            warn!(error = %e, url = %old, "failed to delete old media object");
        }
    }
}

/// POST|PATCH /users/update-avatar (multipart: avatar file).
#[instrument(skip(state, current, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    current: CurrentUser,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let file = read_single_file(mp, "avatar").await?;
    let url = upload_media(&state, file, "avatars").await?;
    let user = User::set_avatar(&state.db, current.0.id, &url).await?;
    delete_media_best_effort(&state, Some(current.0.avatar.as_str())).await;
    Ok(Json(ApiResponse::ok(
        PublicUser::from(user),
        "Avatar updated successfully",
    )))
}

/// POST|PATCH /users/update-cover-image (multipart: coverImage file).
#[instrument(skip(state, current, mp))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    current: CurrentUser,
    mp: Multipart,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let file = read_single_file(mp, "coverImage").await?;
    let url = upload_media(&state, file, "covers").await?;
    let user = User::set_cover_image(&state.db, current.0.id, &url).await?;
    delete_media_best_effort(&state, current.0.cover_image.as_deref()).await;
    Ok(Json(ApiResponse::ok(
        PublicUser::from(user),
        "Cover image updated successfully",
    )))
}

/// GET /users/details — the session identity itself.
#[instrument(skip(current))]
pub async fn current_user_details(
    current: CurrentUser,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    Ok(Json(ApiResponse::ok(
        current.0,
        "Current user fetched successfully",
    )))
}

/// GET /users/channel/:username — public profile of any user plus their
/// todo count.
#[instrument(skip(state, _current))]
pub async fn channel_profile(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ChannelProfile>>, ApiError> {
    let user = User::find_by_username(&state.db, username.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("channel not found".into()))?;

    let todo_count = Todo::count_for_user(&state.db, user.id).await?;
    Ok(Json(ApiResponse::ok(
        ChannelProfile {
            user: PublicUser::from(user),
            todo_count,
        },
        "Channel profile fetched successfully",
    )))
}

/// GET /users/watch-history — compatibility endpoint; nothing is recorded,
/// so the history is always empty.
#[instrument(skip(_current))]
pub async fn watch_history(
    _current: CurrentUser,
) -> Result<Json<ApiResponse<Vec<serde_json::Value>>>, ApiError> {
    Ok(Json(ApiResponse::ok(
        Vec::new(),
        "Watch history fetched successfully",
    )))
}

/// DELETE /users/:id — self-deletion only. Existence is checked before
/// ownership, so an unknown id is 404 even for a non-owner. Owned todos
/// cascade in the database; media objects are removed best-effort.
#[instrument(skip(state, current))]
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<(HeaderMap, Json<ApiResponse<serde_json::Value>>), ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    if user.id != current.0.id {
        return Err(ApiError::Forbidden(
            "you don't have permission to delete this user".into(),
        ));
    }

    for url in [Some(user.avatar_url.as_str()), user.cover_image_url.as_deref()]
        .into_iter()
        .flatten()
    {
        if let Err(e) = state.media.delete(url).await {
            warn!(error = %e, %url, "failed to delete media object");
        }
    }

    User::delete(&state.db, user.id).await?;
    info!(user_id = %user.id, "user deleted");
    Ok((
        clear_auth_cookies(),
        Json(ApiResponse::ok(
            serde_json::json!({}),
            "User deleted successfully",
        )),
    ))
}
