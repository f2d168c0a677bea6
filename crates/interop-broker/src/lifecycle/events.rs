//! Lifecycle notifications.

use super::descriptor::ApplicationConnectionDescriptor;
use interop_core::InteropError;

/// A change in some application's connection state.
///
/// Published on a broadcast channel; subscribers that fall behind miss events
/// rather than slowing the manager down.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A new spawn generation started and the launcher is being invoked.
    Spawning { application_id: String },
    /// A connection was accepted.
    Connected(ApplicationConnectionDescriptor),
    /// An established connection went away.
    Disconnected(ApplicationConnectionDescriptor),
    /// A spawn generation settled with an error.
    SpawnFailed {
        application_id: String,
        error: InteropError,
    },
}

impl LifecycleEvent {
    pub fn application_id(&self) -> &str {
        match self {
            LifecycleEvent::Spawning { application_id }
            | LifecycleEvent::SpawnFailed { application_id, .. } => application_id,
            LifecycleEvent::Connected(descriptor) | LifecycleEvent::Disconnected(descriptor) => {
                &descriptor.application_id
            }
        }
    }
}
