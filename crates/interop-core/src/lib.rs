//! Interop Core - shared foundation of the interop broker.
//!
//! This crate holds what every broker component needs regardless of how
//! applications are connected:
//!
//! - [`error`] - lifecycle and invocation error taxonomy
//! - [`config`] - broker defaults and the injectable lifecycle configuration
//! - [`invocation`] - streaming invocation channels and the marshalling
//!   adapters that let handlers work with payload text over binary frames
//!
//! Connection lifecycle management lives in the `interop-broker` crate.

pub mod config;
pub mod error;
pub mod invocation;

// Re-export commonly used types
pub use config::{BrokerConfig, LifecycleConfig, ReplacementPolicy, UnsolicitedPolicy};
pub use error::{InteropError, InvocationError, MarshalError, Result};
pub use invocation::{Frame, InvocationClient, InvocationObserver, Marshaller};
