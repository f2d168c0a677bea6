//! Established application connections.

use super::descriptor::{ApplicationConnectionDescriptor, ConnectionId};
use super::transport::TransportConnection;
use interop_core::Result;

/// An accepted connection: its descriptor plus the transport it arrived on.
pub struct ApplicationConnection {
    descriptor: ApplicationConnectionDescriptor,
    transport: Box<dyn TransportConnection>,
}

impl ApplicationConnection {
    pub(crate) fn new(
        descriptor: ApplicationConnectionDescriptor,
        transport: Box<dyn TransportConnection>,
    ) -> Self {
        Self {
            descriptor,
            transport,
        }
    }

    pub fn descriptor(&self) -> &ApplicationConnectionDescriptor {
        &self.descriptor
    }

    pub fn application_id(&self) -> &str {
        &self.descriptor.application_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.descriptor.connection_id
    }

    pub fn transport(&self) -> &dyn TransportConnection {
        self.transport.as_ref()
    }

    /// Close the underlying transport.
    ///
    /// The lifecycle manager notices the close and reopens the application's
    /// cell for a fresh spawn.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

impl std::fmt::Debug for ApplicationConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationConnection")
            .field("descriptor", &self.descriptor)
            .field("transport", &self.transport.id())
            .finish()
    }
}
