//! Per-application connection state.
//!
//! Each application id maps to a cell that is absent, pending (one spawn
//! generation in flight) or established (one live connection). Every
//! transition is a single check-and-set under the cell's lock, and no lock is
//! held across an await point. Waiters observe a generation's outcome through
//! a watch channel owned by the pending cell.

use super::connection::ApplicationConnection;
use super::descriptor::{ApplicationConnectionDescriptor, ConnectionId};
use interop_core::{InteropError, ReplacementPolicy, Result, UnsolicitedPolicy};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::watch;

/// How one spawn generation ended.
pub(crate) type SpawnOutcome = Result<ApplicationConnectionDescriptor>;

/// Externally visible state of one application's cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Absent,
    Pending,
    Established,
}

enum Cell {
    Absent,
    Pending(PendingSpawn),
    Established(Arc<ApplicationConnection>),
}

impl Cell {
    fn status(&self) -> CellStatus {
        match self {
            Cell::Absent => CellStatus::Absent,
            Cell::Pending(_) => CellStatus::Pending,
            Cell::Established(_) => CellStatus::Established,
        }
    }
}

struct PendingSpawn {
    generation: u64,
    outcome: watch::Sender<Option<SpawnOutcome>>,
}

impl PendingSpawn {
    fn settle(self, outcome: SpawnOutcome) {
        self.outcome.send_replace(Some(outcome));
    }
}

/// Handle on the eventual outcome of one spawn generation.
#[derive(Clone)]
pub(crate) struct SpawnWaiter {
    application_id: String,
    rx: watch::Receiver<Option<SpawnOutcome>>,
}

impl SpawnWaiter {
    /// Wait for the generation to settle.
    ///
    /// Every waiter of a generation receives the same outcome. Dropping the
    /// future abandons only this waiter.
    pub(crate) async fn wait(mut self) -> SpawnOutcome {
        let settled = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| {
            Err(InteropError::SpawnAbandoned {
                app: self.application_id.clone(),
            })
        })
    }
}

/// Result of asking for a connection.
pub(crate) enum Admission {
    /// The application is already connected.
    Established(ApplicationConnectionDescriptor),
    /// A spawn is in flight; wait on it.
    Joined(SpawnWaiter),
    /// The caller opened a new generation and must drive the launch.
    Started { generation: u64, waiter: SpawnWaiter },
}

/// Result of installing an accepted connection.
#[derive(Debug)]
pub(crate) struct Installed {
    /// Whether a pending spawn was waiting for this connection.
    pub solicited: bool,
    /// The connection this one displaced, if any.
    pub replaced: Option<Arc<ApplicationConnection>>,
}

/// Keyed connection state for all applications.
#[derive(Default)]
pub(crate) struct Registry {
    cells: RwLock<HashMap<String, Arc<Mutex<Cell>>>>,
    next_generation: AtomicU64,
}

fn lock_cell(cell: &Mutex<Cell>) -> MutexGuard<'_, Cell> {
    // Cell updates are single assignments, so a poisoned cell is still consistent.
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_cell(&self, application_id: &str) -> Option<Arc<Mutex<Cell>>> {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(application_id)
            .cloned()
    }

    fn cell(&self, application_id: &str) -> Arc<Mutex<Cell>> {
        if let Some(cell) = self.existing_cell(application_id) {
            return cell;
        }
        self.cells
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(application_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Cell::Absent)))
            .clone()
    }

    /// Drop the map entry of an absent cell nobody else holds.
    fn prune(&self, application_id: &str) {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        let removable = cells.get(application_id).is_some_and(|cell| {
            // New clones are only taken under the map lock, which we hold.
            Arc::strong_count(cell) == 1 && matches!(*lock_cell(cell), Cell::Absent)
        });
        if removable {
            cells.remove(application_id);
        }
    }

    /// Current status of one application.
    pub fn status(&self, application_id: &str) -> CellStatus {
        self.existing_cell(application_id)
            .map(|cell| lock_cell(&cell).status())
            .unwrap_or(CellStatus::Absent)
    }

    /// The established connection for `application_id`, if any.
    pub fn connection(&self, application_id: &str) -> Option<Arc<ApplicationConnection>> {
        let cell = self.existing_cell(application_id)?;
        let guard = lock_cell(&cell);
        match &*guard {
            Cell::Established(connection) => Some(connection.clone()),
            _ => None,
        }
    }

    /// Descriptors of every established connection, ordered by application id.
    pub fn online(&self) -> Vec<ApplicationConnectionDescriptor> {
        let cells = self.cells.read().unwrap_or_else(PoisonError::into_inner);
        let mut online: Vec<_> = cells
            .values()
            .filter_map(|cell| match &*lock_cell(cell) {
                Cell::Established(connection) => Some(connection.descriptor().clone()),
                _ => None,
            })
            .collect();
        online.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        online
    }

    /// Ask for a connection to `application_id`.
    ///
    /// An absent cell becomes pending under a fresh generation. A pending cell
    /// is joined. An established cell is returned when `reuse_established` is
    /// set and is an `AlreadyConnected` error otherwise.
    pub(crate) fn admit(&self, application_id: &str, reuse_established: bool) -> Result<Admission> {
        let cell = self.cell(application_id);
        let mut guard = lock_cell(&cell);
        if matches!(*guard, Cell::Absent) {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let (outcome, rx) = watch::channel(None);
            *guard = Cell::Pending(PendingSpawn {
                generation,
                outcome,
            });
            return Ok(Admission::Started {
                generation,
                waiter: SpawnWaiter {
                    application_id: application_id.to_string(),
                    rx,
                },
            });
        }
        match &*guard {
            Cell::Established(connection) if reuse_established => {
                Ok(Admission::Established(connection.descriptor().clone()))
            }
            Cell::Pending(pending) => Ok(Admission::Joined(SpawnWaiter {
                application_id: application_id.to_string(),
                rx: pending.outcome.subscribe(),
            })),
            _ => Err(InteropError::AlreadyConnected {
                app: application_id.to_string(),
            }),
        }
    }

    /// Settle `generation` with `error` if it is still the pending one.
    ///
    /// Returns false when the generation was already settled or superseded.
    pub(crate) fn fail(&self, application_id: &str, generation: u64, error: InteropError) -> bool {
        let Some(cell) = self.existing_cell(application_id) else {
            return false;
        };
        let pending = {
            let mut guard = lock_cell(&cell);
            let current = matches!(&*guard, Cell::Pending(pending) if pending.generation == generation);
            if current {
                match std::mem::replace(&mut *guard, Cell::Absent) {
                    Cell::Pending(pending) => Some(pending),
                    _ => None,
                }
            } else {
                None
            }
        };
        drop(cell);
        match pending {
            Some(pending) => {
                pending.settle(Err(error));
                self.prune(application_id);
                true
            }
            None => false,
        }
    }

    /// Install an accepted connection, subject to the acceptance policies.
    ///
    /// A rejected connection leaves the cell untouched.
    pub(crate) fn install(
        &self,
        connection: Arc<ApplicationConnection>,
        unsolicited: UnsolicitedPolicy,
        replacement: ReplacementPolicy,
    ) -> Result<Installed> {
        let application_id = connection.application_id().to_string();
        let cell = self.cell(&application_id);
        let mut guard = lock_cell(&cell);
        let decision = match &*guard {
            Cell::Pending(_) => Ok(Installed {
                solicited: true,
                replaced: None,
            }),
            Cell::Absent if unsolicited == UnsolicitedPolicy::Accept => Ok(Installed {
                solicited: false,
                replaced: None,
            }),
            Cell::Absent => Err(InteropError::UnknownPending {
                app: application_id.clone(),
            }),
            Cell::Established(existing) if replacement == ReplacementPolicy::Replace => {
                Ok(Installed {
                    solicited: false,
                    replaced: Some(existing.clone()),
                })
            }
            Cell::Established(_) => Err(InteropError::AlreadyConnected {
                app: application_id.clone(),
            }),
        };
        let installed = match decision {
            Ok(installed) => installed,
            Err(error) => {
                drop(guard);
                drop(cell);
                self.prune(&application_id);
                return Err(error);
            }
        };

        let descriptor = connection.descriptor().clone();
        if let Cell::Pending(pending) = std::mem::replace(&mut *guard, Cell::Established(connection)) {
            pending.settle(Ok(descriptor));
        }
        Ok(installed)
    }

    /// Remove the established connection `connection_id` of `application_id`.
    ///
    /// Does nothing if the cell now holds a different connection or none.
    pub(crate) fn remove_connection(
        &self,
        application_id: &str,
        connection_id: ConnectionId,
    ) -> Option<Arc<ApplicationConnection>> {
        let cell = self.existing_cell(application_id)?;
        let removed = {
            let mut guard = lock_cell(&cell);
            let current = matches!(
                &*guard,
                Cell::Established(current) if current.connection_id() == connection_id
            );
            if current {
                match std::mem::replace(&mut *guard, Cell::Absent) {
                    Cell::Established(connection) => Some(connection),
                    _ => None,
                }
            } else {
                None
            }
        };
        drop(cell);
        if removed.is_some() {
            self.prune(application_id);
        }
        removed
    }
}
