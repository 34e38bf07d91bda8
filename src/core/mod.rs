pub mod config;
pub mod error;
pub mod logging;
pub mod web_server;

pub use error::{AppError, AppResult};
pub use logging::{init_logger, log_startup_configuration};
