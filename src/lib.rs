pub mod app;
pub mod config;
pub mod error;
pub mod response;
pub mod state;
pub mod storage;
pub mod todos;
pub mod users;
