pub mod config;
pub mod error;

pub use config::AnonboxConfig;
pub use error::{CoreError, CoreResult};
