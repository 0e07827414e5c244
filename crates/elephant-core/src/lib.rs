pub mod config;
pub mod error;
pub mod logging;

pub use config::ElephantConfig;
pub use error::{ElephantError, Result};
