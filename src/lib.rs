//! OLS cPanel Library
//!
//! Core functionality for the OpenLiteSpeed cPanel administrative toolkit:
//! YAML configuration management, domain and certificate models, and the
//! WHM/system command services.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::{ConfigDocument, ConfigError, ConfigStore};
pub use utils::{AppError, AppResult};
