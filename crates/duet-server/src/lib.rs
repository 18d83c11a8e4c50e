pub mod app;
pub mod config;

pub use app::{build_app, build_state};
pub use config::Config;
