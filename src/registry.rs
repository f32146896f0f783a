//! Process-local bookkeeping of job-server contexts.
//!
//! The registry is the single source of truth for deduplicating context
//! creation: a name is claimed atomically under the map lock, and every
//! later caller for the same name either adopts the existing context or
//! waits for the in-flight transition to settle. Each entry carries a
//! watch channel broadcasting its state transitions, so waiters never
//! busy-poll.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::warn;

use crate::error::RemoteError;

/// Compute-context variants the job-server can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextType {
    /// A plain Spark context.
    SparkContext,
    /// A SQL context, backed by the job-server's SQL context factory.
    SqlContext,
    /// A streaming context, backed by the streaming context factory.
    StreamingContext,
}

/// Lifecycle states of a context this manager knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// A creation claim exists; the remote create is in flight.
    Creating,
    /// The context exists on the job-server and accepts jobs.
    Ready,
    /// A deletion is in flight.
    Deleting,
    /// The context was deleted; the registry entry is gone.
    Deleted,
    /// Creation or deletion failed; the name is free again.
    Failed,
}

/// Creation parameters for a named context.
#[derive(Debug, Clone)]
pub struct ContextSpec {
    pub name: String,
    pub executor_count: u32,
    pub memory_per_node: String,
    pub cores_per_executor: u32,
    pub context_type: ContextType,
    /// `0` disables auto-expiry; any other value schedules eviction that
    /// many seconds after creation.
    pub timeout_seconds: u64,
}

impl ContextSpec {
    /// Start a spec with the job-server's usual minimal sizing.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executor_count: 1,
            memory_per_node: "512m".to_string(),
            cores_per_executor: 1,
            context_type: ContextType::SparkContext,
            timeout_seconds: 0,
        }
    }

    pub fn executors(mut self, count: u32) -> Self {
        self.executor_count = count;
        self
    }

    pub fn memory_per_node(mut self, memory: impl Into<String>) -> Self {
        self.memory_per_node = memory.into();
        self
    }

    pub fn cores_per_executor(mut self, cores: u32) -> Self {
        self.cores_per_executor = cores;
        self
    }

    pub fn context_type(mut self, context_type: ContextType) -> Self {
        self.context_type = context_type;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// A context known to this manager instance.
#[derive(Debug, Clone)]
pub struct ContextDescriptor {
    pub name: String,
    pub executor_count: u32,
    pub memory_per_node: String,
    pub cores_per_executor: u32,
    pub context_type: ContextType,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub state: ContextState,
}

impl ContextDescriptor {
    fn from_spec(spec: &ContextSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            name: spec.name.clone(),
            executor_count: spec.executor_count,
            memory_per_node: spec.memory_per_node.clone(),
            cores_per_executor: spec.cores_per_executor,
            context_type: spec.context_type,
            timeout_seconds: spec.timeout_seconds,
            created_at,
            state: ContextState::Creating,
        }
    }
}

/// Broadcast payload for a context's state transitions.
#[derive(Debug, Clone)]
enum Signal {
    Creating,
    Ready,
    Deleting,
    Deleted,
    Failed(RemoteError),
}

/// Terminal outcome observed while waiting on a busy context name.
#[derive(Debug, Clone)]
pub enum Settled {
    /// The context reached READY.
    Ready,
    /// The context was deleted (or its entry vanished).
    Deleted,
    /// The in-flight creation failed with this error.
    Failed(RemoteError),
}

/// A subscription to one context entry's state transitions.
#[derive(Debug, Clone)]
pub struct StateWatcher {
    rx: watch::Receiver<Signal>,
}

impl StateWatcher {
    /// Wait until the entry leaves its transient state.
    ///
    /// Returns the first settled outcome observed. A dropped sender (the
    /// entry was removed without a terminal broadcast) counts as deleted.
    pub async fn settled(mut self) -> Settled {
        loop {
            let signal = self.rx.borrow_and_update().clone();
            match signal {
                Signal::Ready => return Settled::Ready,
                Signal::Deleted => return Settled::Deleted,
                Signal::Failed(err) => return Settled::Failed(err),
                Signal::Creating | Signal::Deleting => {}
            }
            if self.rx.changed().await.is_err() {
                return Settled::Deleted;
            }
        }
    }
}

/// Outcome of an atomic claim on a context name.
#[derive(Debug)]
pub enum ReservationOutcome {
    /// The name was free; a CREATING entry now exists and the caller owns
    /// the remote creation. The watcher observes the owner's commit.
    Acquired(StateWatcher),
    /// A READY context with this name already exists.
    AlreadyExists,
    /// The name is busy (creating or deleting); wait for the broadcast.
    InProgress {
        busy: ContextState,
        watcher: StateWatcher,
    },
}

struct Entry {
    descriptor: ContextDescriptor,
    tx: watch::Sender<Signal>,
}

/// In-memory map from context name to descriptor, with per-entry state
/// broadcasts. All transitions serialize through the map lock.
pub struct ContextRegistry {
    contexts: Mutex<HashMap<String, Entry>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Atomic check-and-insert for a context name.
    pub async fn reserve(&self, spec: &ContextSpec) -> ReservationOutcome {
        let mut contexts = self.contexts.lock().await;

        if let Some(entry) = contexts.get(&spec.name) {
            let watcher = StateWatcher {
                rx: entry.tx.subscribe(),
            };
            match entry.descriptor.state {
                ContextState::Ready => return ReservationOutcome::AlreadyExists,
                ContextState::Creating => {
                    return ReservationOutcome::InProgress {
                        busy: ContextState::Creating,
                        watcher,
                    };
                }
                ContextState::Deleting => {
                    return ReservationOutcome::InProgress {
                        busy: ContextState::Deleting,
                        watcher,
                    };
                }
                // Terminal states never persist in the map; if one slipped
                // through, drop the stale entry and claim the name fresh.
                ContextState::Deleted | ContextState::Failed => {
                    warn!(
                        "dropping stale registry entry for context {} in state {:?}",
                        spec.name, entry.descriptor.state
                    );
                    contexts.remove(&spec.name);
                }
            }
        }

        let descriptor = ContextDescriptor::from_spec(spec, Utc::now());
        let (tx, rx) = watch::channel(Signal::Creating);
        contexts.insert(spec.name.clone(), Entry { descriptor, tx });

        ReservationOutcome::Acquired(StateWatcher { rx })
    }

    /// Settle an owned CREATING reservation.
    ///
    /// Success promotes the entry to READY; failure broadcasts the error
    /// and frees the name so a later create can try again.
    pub async fn commit(&self, name: &str, result: Result<(), RemoteError>) {
        let mut contexts = self.contexts.lock().await;

        match result {
            Ok(()) => match contexts.get_mut(name) {
                Some(entry) if entry.descriptor.state == ContextState::Creating => {
                    entry.descriptor.state = ContextState::Ready;
                    entry.tx.send_replace(Signal::Ready);
                }
                Some(entry) => {
                    warn!(
                        "ignoring commit for context {} in state {:?}",
                        name, entry.descriptor.state
                    );
                }
                None => warn!("ignoring commit for unknown context {}", name),
            },
            Err(err) => match contexts.remove(name) {
                Some(entry) => {
                    entry.tx.send_replace(Signal::Failed(err));
                }
                None => warn!("ignoring failed commit for unknown context {}", name),
            },
        }
    }

    /// Transition READY → DELETING. Returns false when the entry is absent
    /// or not READY, in which case the caller must not delete.
    pub async fn mark_deleting(&self, name: &str) -> bool {
        let mut contexts = self.contexts.lock().await;
        match contexts.get_mut(name) {
            Some(entry) if entry.descriptor.state == ContextState::Ready => {
                entry.descriptor.state = ContextState::Deleting;
                entry.tx.send_replace(Signal::Deleting);
                true
            }
            _ => false,
        }
    }

    /// Revert a failed deletion back to READY so the caller can retry.
    pub async fn abandon_delete(&self, name: &str) {
        let mut contexts = self.contexts.lock().await;
        if let Some(entry) = contexts.get_mut(name) {
            if entry.descriptor.state == ContextState::Deleting {
                entry.descriptor.state = ContextState::Ready;
                entry.tx.send_replace(Signal::Ready);
            }
        }
    }

    /// Drop an entry, broadcasting DELETED to any waiters.
    pub async fn remove(&self, name: &str) {
        let mut contexts = self.contexts.lock().await;
        if let Some(entry) = contexts.remove(name) {
            entry.tx.send_replace(Signal::Deleted);
        }
    }

    /// Read-only copy of a context's descriptor.
    pub async fn snapshot(&self, name: &str) -> Option<ContextDescriptor> {
        self.contexts
            .lock()
            .await
            .get(name)
            .map(|entry| entry.descriptor.clone())
    }

    /// Subscribe to an existing entry's transitions.
    pub async fn watch(&self, name: &str) -> Option<StateWatcher> {
        self.contexts.lock().await.get(name).map(|entry| StateWatcher {
            rx: entry.tx.subscribe(),
        })
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
