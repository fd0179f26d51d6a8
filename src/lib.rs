pub mod app;
pub mod auth;
pub mod backend;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod local;
pub mod models;
pub mod optimistic;
pub mod session;
pub mod state;
pub mod tracker;
pub mod ui;

pub use app::router;
pub use config::AppConfig;
pub use local::LocalStore;
pub use state::AppState;
