//! Interop Broker - application connection lifecycle.
//!
//! Hosts the lifecycle manager that spawns applications on demand, coalesces
//! concurrent requests for the same application, and keeps at most one live
//! connection per application id. Invocation marshalling comes from
//! `interop-core` and is re-exported here for convenience.
//!
//! # Modules
//!
//! - `lifecycle` - connection registry, launcher and transport seams, manager

pub mod lifecycle;

// Re-export commonly used types
pub use lifecycle::{
    AppLifecycleManager, ApplicationConnection, ApplicationConnectionDescriptor,
    ApplicationLauncher, CellStatus, ConnectionId, ConnectionStatus, LaunchHandle,
    LifecycleEvent, LifecycleManager, MemoryTransport, RemoteCloser, TransportConnection,
};

// Re-export interop-core types that are commonly needed with the broker
pub use interop_core::invocation;
pub use interop_core::{
    InteropError, InvocationError, LifecycleConfig, ReplacementPolicy, Result, UnsolicitedPolicy,
};
