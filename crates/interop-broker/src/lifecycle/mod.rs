//! Application connection lifecycle.
//!
//! The broker reaches each application through exactly one live connection.
//! [`LifecycleManager`] tracks a cell per application id (absent, pending or
//! established), starts applications through an [`ApplicationLauncher`] and
//! admits their inbound connections through [`AppLifecycleManager::accept_connection`].

mod connection;
mod descriptor;
mod events;
mod launcher;
mod manager;
mod registry;
mod transport;

pub use connection::ApplicationConnection;
pub use descriptor::{
    validate_application_id, ApplicationConnectionDescriptor, ConnectionId, ConnectionStatus,
};
pub use events::LifecycleEvent;
pub use launcher::{ApplicationLauncher, LaunchHandle};
pub use manager::{AppLifecycleManager, LifecycleManager};
pub use registry::CellStatus;
pub use transport::{MemoryTransport, RemoteCloser, TransportConnection};
