//! Transport connection seam.
//!
//! The broker never reads or writes transport bytes; it only needs to close a
//! connection and to learn when it has closed.

use async_trait::async_trait;
use futures::future::BoxFuture;
use interop_core::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// An accepted transport-level connection.
#[async_trait]
pub trait TransportConnection: Send + Sync + 'static {
    /// Transport-level identifier, for logging.
    fn id(&self) -> &str;

    /// Close the connection. Closing an already closed connection succeeds.
    async fn close(&self) -> Result<()>;

    /// Resolves once the connection has closed, whichever side closed it.
    fn closed(&self) -> BoxFuture<'static, ()>;
}

/// In-process transport connection.
///
/// Carries only open/closed state. Suitable for applications hosted inside the
/// broker process and for exercising the lifecycle manager.
#[derive(Debug)]
pub struct MemoryTransport {
    id: String,
    closed_tx: Arc<watch::Sender<bool>>,
}

/// Lets the far side of a [`MemoryTransport`] close it.
#[derive(Debug, Clone)]
pub struct RemoteCloser {
    closed_tx: Arc<watch::Sender<bool>>,
}

impl RemoteCloser {
    pub fn close(&self) {
        self.closed_tx.send_replace(true);
    }
}

impl MemoryTransport {
    pub fn new(id: impl Into<String>) -> (Self, RemoteCloser) {
        let (closed_tx, _) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);
        (
            Self {
                id: id.into(),
                closed_tx: closed_tx.clone(),
            },
            RemoteCloser { closed_tx },
        )
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }
}

#[async_trait]
impl TransportConnection for MemoryTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<()> {
        if !self.closed_tx.send_replace(true) {
            debug!("Memory transport {} closed", self.id);
        }
        Ok(())
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut rx = self.closed_tx.subscribe();
        Box::pin(async move {
            // A dropped sender means both ends are gone, which is closed too.
            let _ = rx.wait_for(|closed| *closed).await;
        })
    }
}
