//! Application lifecycle manager.
//!
//! Coalesces concurrent connection requests per application into a single
//! launch, matches inbound handshakes to pending spawns, and reopens an
//! application for spawning once its connection goes away.

use super::connection::ApplicationConnection;
use super::descriptor::{validate_application_id, ApplicationConnectionDescriptor};
use super::events::LifecycleEvent;
use super::launcher::{launch_failure, ApplicationLauncher};
use super::registry::{Admission, CellStatus, Registry, SpawnWaiter};
use super::transport::TransportConnection;
use async_trait::async_trait;
use interop_core::{InteropError, LifecycleConfig, Result};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Broker-side contract for reaching applications.
#[async_trait]
pub trait AppLifecycleManager: Send + Sync {
    /// Descriptors of all currently established connections.
    fn get_online_connections(&self) -> Vec<ApplicationConnectionDescriptor>;

    /// Start a new connection attempt for `application_id`.
    ///
    /// The launcher is asked to start the application only when no attempt is
    /// in flight; a call made while one is pending joins it and resolves with
    /// the same outcome. A call made while the application is connected fails
    /// with `AlreadyConnected` instead of launching a second instance, since
    /// at most one connection per application may be established.
    async fn spawn_connection(&self, application_id: &str)
        -> Result<ApplicationConnectionDescriptor>;

    /// Return the established connection, joining or starting a spawn if needed.
    async fn get_or_spawn_connection(
        &self,
        application_id: &str,
    ) -> Result<ApplicationConnectionDescriptor>;

    /// Register an inbound, already handshaken transport connection.
    async fn accept_connection(
        &self,
        transport: Box<dyn TransportConnection>,
        descriptor: ApplicationConnectionDescriptor,
    ) -> Result<Arc<ApplicationConnection>>;
}

struct Inner {
    registry: Registry,
    launcher: Arc<dyn ApplicationLauncher>,
    config: LifecycleConfig,
    events: broadcast::Sender<LifecycleEvent>,
}

/// Lifecycle manager backed by an [`ApplicationLauncher`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<Inner>,
}

impl LifecycleManager {
    pub fn new(launcher: Arc<dyn ApplicationLauncher>, config: LifecycleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(launcher, config))
    }

    pub fn with_default_config(launcher: Arc<dyn ApplicationLauncher>) -> Self {
        Self::build(launcher, LifecycleConfig::default())
    }

    fn build(launcher: Arc<dyn ApplicationLauncher>, config: LifecycleConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                registry: Registry::new(),
                launcher,
                config,
                events,
            }),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    /// The established connection for `application_id`, if any.
    pub fn connection(&self, application_id: &str) -> Option<Arc<ApplicationConnection>> {
        self.inner.registry.connection(application_id)
    }

    pub fn cell_status(&self, application_id: &str) -> CellStatus {
        self.inner.registry.status(application_id)
    }

    /// Close the established connection of `application_id`.
    ///
    /// Returns false if the application was not connected.
    pub async fn terminate(&self, application_id: &str) -> Result<bool> {
        let Some(connection) = self.inner.registry.connection(application_id) else {
            return Ok(false);
        };
        info!(
            "Terminating connection {} for {}",
            connection.connection_id(),
            application_id
        );
        connection.close().await?;
        self.inner.disconnected(application_id, connection.descriptor());
        Ok(true)
    }

    async fn request(
        &self,
        application_id: &str,
        reuse_established: bool,
    ) -> Result<ApplicationConnectionDescriptor> {
        validate_application_id(application_id)?;

        match self.inner.registry.admit(application_id, reuse_established)? {
            Admission::Established(descriptor) => {
                debug!(
                    "Reusing connection {} for {}",
                    descriptor.connection_id, application_id
                );
                Ok(descriptor)
            }
            Admission::Joined(waiter) => {
                debug!("Joining pending spawn for {}", application_id);
                waiter.wait().await
            }
            Admission::Started { generation, waiter } => {
                info!("Spawning {} (generation {})", application_id, generation);
                self.inner.emit(LifecycleEvent::Spawning {
                    application_id: application_id.to_string(),
                });
                // Detached so that caller cancellation never aborts the spawn.
                tokio::spawn(Inner::drive_spawn(
                    self.inner.clone(),
                    application_id.to_string(),
                    generation,
                    waiter.clone(),
                ));
                waiter.wait().await
            }
        }
    }

    fn watch_teardown(&self, connection: &ApplicationConnection) {
        let closed = connection.transport().closed();
        let application_id = connection.application_id().to_string();
        let descriptor = connection.descriptor().clone();
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            closed.await;
            if let Some(inner) = inner.upgrade() {
                inner.disconnected(&application_id, &descriptor);
            }
        });
    }
}

impl Inner {
    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Launch the application and wait for its handshake.
    ///
    /// The whole generation, launch included, must settle within the handshake
    /// timeout measured from admission.
    async fn drive_spawn(
        self: Arc<Self>,
        application_id: String,
        generation: u64,
        waiter: SpawnWaiter,
    ) {
        let timeout = self.config.handshake_timeout;
        let deadline = Instant::now() + timeout;
        let expired = || InteropError::HandshakeTimeout {
            app: application_id.clone(),
            timeout,
        };

        let launch = self.launcher.launch(&application_id);
        let launched = tokio::select! {
            // The application may connect back before the launcher returns.
            _ = waiter.clone().wait() => return,
            launched = tokio::time::timeout_at(deadline, launch) => launched,
        };
        let launched = match launched {
            Ok(result) => result.and_then(|handle| handle.into_result(&application_id)),
            Err(_) => {
                warn!("Launcher for {} did not return in time", application_id);
                self.fail_generation(&application_id, generation, expired());
                return;
            }
        };

        match launched {
            Ok(handle) => {
                debug!(
                    "Launched {} (generation {}, pid {:?}); awaiting handshake",
                    application_id, generation, handle.pid
                );
            }
            Err(error) => {
                let error = launch_failure(&application_id, error);
                self.fail_generation(&application_id, generation, error);
                return;
            }
        }

        if tokio::time::timeout_at(deadline, waiter.wait()).await.is_err() {
            self.fail_generation(&application_id, generation, expired());
        }
    }

    fn fail_generation(&self, application_id: &str, generation: u64, error: InteropError) {
        if self.registry.fail(application_id, generation, error.clone()) {
            warn!("Spawn of {} failed: {}", application_id, error);
            self.emit(LifecycleEvent::SpawnFailed {
                application_id: application_id.to_string(),
                error,
            });
        } else {
            debug!(
                "Ignoring late failure for {} generation {}: {}",
                application_id, generation, error
            );
        }
    }

    fn disconnected(&self, application_id: &str, descriptor: &ApplicationConnectionDescriptor) {
        if let Some(connection) = self
            .registry
            .remove_connection(application_id, descriptor.connection_id)
        {
            info!(
                "Connection {} for {} closed",
                connection.connection_id(),
                application_id
            );
            self.emit(LifecycleEvent::Disconnected(connection.descriptor().clone()));
        }
    }
}

#[async_trait]
impl AppLifecycleManager for LifecycleManager {
    fn get_online_connections(&self) -> Vec<ApplicationConnectionDescriptor> {
        self.inner.registry.online()
    }

    async fn spawn_connection(
        &self,
        application_id: &str,
    ) -> Result<ApplicationConnectionDescriptor> {
        self.request(application_id, false).await
    }

    async fn get_or_spawn_connection(
        &self,
        application_id: &str,
    ) -> Result<ApplicationConnectionDescriptor> {
        self.request(application_id, true).await
    }

    async fn accept_connection(
        &self,
        transport: Box<dyn TransportConnection>,
        descriptor: ApplicationConnectionDescriptor,
    ) -> Result<Arc<ApplicationConnection>> {
        validate_application_id(&descriptor.application_id)?;

        let application_id = descriptor.application_id.clone();
        let connection = Arc::new(ApplicationConnection::new(
            descriptor.established(),
            transport,
        ));

        let installed = match self.inner.registry.install(
            connection.clone(),
            self.inner.config.unsolicited,
            self.inner.config.replacement,
        ) {
            Ok(installed) => installed,
            Err(error) => {
                warn!(
                    "Rejected connection {} for {}: {}",
                    connection.connection_id(),
                    application_id,
                    error
                );
                if let Err(close_error) = connection.close().await {
                    debug!("Failed to close rejected transport: {}", close_error);
                }
                return Err(error);
            }
        };

        // Nothing below awaits: once installed, the connection is watched.
        self.watch_teardown(&connection);

        if let Some(replaced) = installed.replaced {
            info!(
                "Connection {} replaces {} for {}",
                connection.connection_id(),
                replaced.connection_id(),
                application_id
            );
            self.inner
                .emit(LifecycleEvent::Disconnected(replaced.descriptor().clone()));
            tokio::spawn(async move {
                if let Err(error) = replaced.close().await {
                    warn!("Failed to close replaced connection: {}", error);
                }
            });
        }

        info!(
            "Accepted connection {} for {} ({})",
            connection.connection_id(),
            application_id,
            if installed.solicited {
                "spawned"
            } else {
                "unsolicited"
            }
        );
        self.inner
            .emit(LifecycleEvent::Connected(connection.descriptor().clone()));
        Ok(connection)
    }
}
