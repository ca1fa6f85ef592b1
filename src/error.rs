use serde::Serialize;
use std::fmt;

/// Numeric error codes reported through [`ErrorInfo`]. Values are stable so
/// host bindings can switch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    Unknown = 1,
    InvalidArgument = 2,
    NotInitialized = 3,
    AlreadyInitialized = 4,
    HookInstallFailed = 200,
    ThreadCreateFailed = 202,
    TrackerStartFailed = 300,
    TrackerStopFailed = 301,
    CallbackInvokeFailed = 401,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::Unknown => "Unknown error occurred",
            ErrorCode::InvalidArgument => "Invalid argument provided",
            ErrorCode::NotInitialized => "Monitor not initialized",
            ErrorCode::AlreadyInitialized => "Monitor already initialized",
            ErrorCode::HookInstallFailed => "Failed to install pointer hook",
            ErrorCode::ThreadCreateFailed => "Failed to create background thread",
            ErrorCode::TrackerStartFailed => "Failed to start drag monitor",
            ErrorCode::TrackerStopFailed => "Failed to stop drag monitor",
            ErrorCode::CallbackInvokeFailed => "Failed to invoke dispatch sink",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.as_u16())
    }
}

/// Last error as exposed on the query surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(ErrorCode::Success, "No error")
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success
    }
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self::success()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("another drag monitor is already active in this process")]
    AlreadyActive,

    #[error("failed to install pointer hook: {0:#}")]
    HookInstall(#[source] anyhow::Error),

    #[error("failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MonitorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MonitorError::AlreadyActive => ErrorCode::AlreadyInitialized,
            MonitorError::HookInstall(_) => ErrorCode::HookInstallFailed,
            MonitorError::ThreadSpawn { .. } => ErrorCode::ThreadCreateFailed,
            MonitorError::InvalidConfig(_) => ErrorCode::InvalidArgument,
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_errors_map_to_stable_codes() {
        let err = MonitorError::HookInstall(anyhow::anyhow!("access denied"));
        assert_eq!(err.code().as_u16(), 200);
        let info = err.to_info();
        assert_eq!(info.code, ErrorCode::HookInstallFailed);
        assert!(info.message.contains("access denied"));

        assert_eq!(MonitorError::AlreadyActive.code().as_u16(), 4);
    }

    #[test]
    fn default_info_is_success() {
        assert!(ErrorInfo::default().is_success());
    }
}
