use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod session;
pub mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route(
            "/regenerate-access-token",
            post(handlers::regenerate_access_token),
        )
        .route(
            "/change-password",
            post(handlers::change_password).patch(handlers::change_password),
        )
        .route(
            "/update",
            post(handlers::update_account).patch(handlers::update_account),
        )
        .route(
            "/update-avatar",
            post(handlers::update_avatar).patch(handlers::update_avatar),
        )
        .route(
            "/update-cover-image",
            post(handlers::update_cover_image).patch(handlers::update_cover_image),
        )
        .route("/channel/:username", get(handlers::channel_profile))
        .route("/watch-history", get(handlers::watch_history))
        .route("/details", get(handlers::current_user_details))
        .route("/:id", delete(handlers::delete_user))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
}
