//! Application launcher seam.

use async_trait::async_trait;
use interop_core::{InteropError, Result};

/// Result of asking the platform to start an application instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchHandle {
    /// Whether the launch request was accepted.
    pub success: bool,
    /// Error message if launch failed.
    pub error: Option<String>,
    /// Platform process identifier, when there is one.
    pub pid: Option<u32>,
}

impl LaunchHandle {
    pub fn started(pid: Option<u32>) -> Self {
        Self {
            success: true,
            error: None,
            pid,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            pid: None,
        }
    }

    /// Turn an unsuccessful handle into a launch failure for `application_id`.
    pub fn into_result(self, application_id: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(InteropError::LaunchFailed {
                app: application_id.to_string(),
                message: self
                    .error
                    .unwrap_or_else(|| "launcher reported failure".to_string()),
            })
        }
    }
}

/// Starts application instances.
///
/// A successful launch only means the instance was started; the instance
/// becomes usable once it connects back and is accepted.
#[async_trait]
pub trait ApplicationLauncher: Send + Sync {
    async fn launch(&self, application_id: &str) -> Result<LaunchHandle>;
}

/// Normalize any launcher error into `LaunchFailed` for `application_id`.
pub(crate) fn launch_failure(application_id: &str, error: InteropError) -> InteropError {
    match error {
        InteropError::LaunchFailed { .. } => error,
        other => InteropError::LaunchFailed {
            app: application_id.to_string(),
            message: other.to_string(),
        },
    }
}
