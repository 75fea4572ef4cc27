//! Configuration loading and the retrieval service facade.

pub mod config;
pub mod error;
pub mod service;

pub use config::Config;
pub use error::{Result, ServiceError};
pub use service::Retrieval;
