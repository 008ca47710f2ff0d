use std::fmt::{self, Display, Formatter};

/// Application error types for tubechat
#[derive(Debug)]
pub enum AppError {
    /// Settings could not be loaded or persisted
    SettingsFailed(String),

    /// The answering service could not be started
    ServerStartFailed(String),

    /// Attempted to start a component that is already running
    AlreadyRunning(&'static str),

    /// Attempted to stop a component that is not running
    NotRunning(&'static str),

    /// A required credential or configuration value is missing
    MissingConfig(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            AppError::SettingsFailed(msg) => {
                write!(f, "Settings operation failed: {}", msg)
            }
            AppError::ServerStartFailed(msg) => {
                write!(f, "Failed to start answering service: {}", msg)
            }
            AppError::AlreadyRunning(component) => {
                write!(f, "{} is already running", component)
            }
            AppError::NotRunning(component) => {
                write!(f, "{} is not running", component)
            }
            AppError::MissingConfig(name) => {
                write!(f, "Missing required configuration: {}", name)
            }
        }
    }
}

impl std::error::Error for AppError {}
