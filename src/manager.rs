//! Context lifecycle orchestration: creation dedup, deletion, eviction.
//!
//! The manager sits between callers and the remote API, using the
//! registry to guarantee at most one in-flight creation per context name.
//! The remote create runs on a spawned owner task, so a caller that
//! abandons its wait never strands a reservation; every caller (owner or
//! latecomer) observes the same committed outcome. Contexts created with a
//! timeout get an eviction task that deletes them once the lifetime
//! elapses, unless a manual delete got there first.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::client::JobserverApi;
use crate::error::ContextError;
use crate::registry::{
    ContextDescriptor, ContextRegistry, ContextSpec, ContextState, ReservationOutcome, Settled,
};

type EvictionTasks = Arc<StdMutex<Vec<JoinHandle<()>>>>;

/// Orchestrates context creation, deletion and timeout eviction.
pub struct ContextManager {
    api: Arc<dyn JobserverApi>,
    registry: Arc<ContextRegistry>,
    evictions: EvictionTasks,
}

impl ContextManager {
    pub fn new(api: Arc<dyn JobserverApi>, registry: Arc<ContextRegistry>) -> Self {
        Self {
            api,
            registry,
            evictions: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Create a named context, or adopt one that already exists.
    ///
    /// Concurrent calls for the same name collapse into a single remote
    /// create whose outcome all of them share. With `run_async` the call
    /// returns as soon as the creation claim is placed; the outcome is
    /// observable through [`Self::context_exists`].
    pub async fn create_context(
        &self,
        spec: ContextSpec,
        run_async: bool,
    ) -> Result<bool, ContextError> {
        if run_async {
            let api = Arc::clone(&self.api);
            let registry = Arc::clone(&self.registry);
            let evictions = Arc::clone(&self.evictions);
            let name = spec.name.clone();
            tokio::spawn(async move {
                if let Err(err) = run_create(api, registry, evictions, spec).await {
                    warn!("async creation of context {} failed: {}", name, err);
                }
            });
            return Ok(true);
        }

        run_create(
            Arc::clone(&self.api),
            Arc::clone(&self.registry),
            Arc::clone(&self.evictions),
            spec,
        )
        .await
    }

    /// Whether the context exists on the job-server.
    ///
    /// The remote answer is authoritative: another manager instance (or an
    /// eviction there) may have deleted the context without this registry
    /// hearing about it. A stale local READY entry is dropped on mismatch.
    pub async fn context_exists(&self, name: &str) -> Result<bool, ContextError> {
        let local = self.registry.snapshot(name).await;
        if let Some(descriptor) = &local {
            debug!("context {} known locally in state {:?}", name, descriptor.state);
        }

        let exists = self.api.context_exists(name).await?;

        if !exists {
            if let Some(descriptor) = local {
                if descriptor.state == ContextState::Ready {
                    warn!(
                        "context {} is gone on the job-server; dropping stale local entry",
                        name
                    );
                    self.registry.remove(name).await;
                }
            }
        }

        Ok(exists)
    }

    /// Delete a named context. Deleting an unknown name is a no-op success.
    ///
    /// A failed remote delete reverts the entry to READY and surfaces the
    /// error so the caller can retry.
    pub async fn delete_context(&self, name: &str) -> Result<bool, ContextError> {
        loop {
            let state = self.registry.snapshot(name).await.map(|d| d.state);
            match state {
                None => {
                    // Not tracked here; the context may still exist on the
                    // server (created by another manager instance).
                    self.api.delete_context(name).await?;
                    return Ok(true);
                }
                Some(ContextState::Ready) => {
                    if !self.registry.mark_deleting(name).await {
                        continue; // lost the claim, re-evaluate
                    }
                    info!("deleting context {}", name);
                    match self.api.delete_context(name).await {
                        Ok(_) => {
                            self.registry.remove(name).await;
                            return Ok(true);
                        }
                        Err(err) => {
                            error!("deletion of context {} failed: {}", name, err);
                            self.registry.abandon_delete(name).await;
                            return Err(err.into());
                        }
                    }
                }
                Some(ContextState::Creating) => {
                    return Err(ContextError::NotReady {
                        name: name.to_string(),
                        state: ContextState::Creating,
                    });
                }
                Some(ContextState::Deleting) => {
                    // Another deletion is in flight; adopt its outcome.
                    let Some(watcher) = self.registry.watch(name).await else {
                        return Ok(true);
                    };
                    match watcher.settled().await {
                        Settled::Deleted => return Ok(true),
                        Settled::Ready => continue,
                        Settled::Failed(err) => return Err(err.into()),
                    }
                }
                // Terminal states never persist in the registry map.
                Some(ContextState::Deleted) | Some(ContextState::Failed) => return Ok(true),
            }
        }
    }

    /// Abort outstanding eviction tasks.
    ///
    /// Contexts keep whatever server-side lifetime they have; only this
    /// manager's scheduled deletions stop.
    pub fn shutdown(&self) {
        if let Ok(mut evictions) = self.evictions.lock() {
            let pending = evictions.len();
            for handle in evictions.drain(..) {
                handle.abort();
            }
            if pending > 0 {
                debug!("aborted {} eviction task(s)", pending);
            }
        }
    }
}

async fn run_create(
    api: Arc<dyn JobserverApi>,
    registry: Arc<ContextRegistry>,
    evictions: EvictionTasks,
    spec: ContextSpec,
) -> Result<bool, ContextError> {
    loop {
        match registry.reserve(&spec).await {
            ReservationOutcome::AlreadyExists => {
                debug!("context {} already exists; skipping remote create", spec.name);
                return Ok(true);
            }
            ReservationOutcome::Acquired(watcher) => {
                let Some(descriptor) = registry.snapshot(&spec.name).await else {
                    continue; // reservation vanished under us; reclaim
                };
                spawn_creation_owner(
                    Arc::clone(&api),
                    Arc::clone(&registry),
                    Arc::clone(&evictions),
                    descriptor,
                );
                return match watcher.settled().await {
                    Settled::Ready => Ok(true),
                    Settled::Failed(err) => Err(err.into()),
                    // Created, then deleted before we observed READY.
                    Settled::Deleted => Ok(true),
                };
            }
            ReservationOutcome::InProgress {
                busy: ContextState::Deleting,
                watcher,
            } => match watcher.settled().await {
                Settled::Deleted => continue, // name is free now, claim it
                Settled::Ready => return Ok(true), // the deletion was abandoned
                Settled::Failed(err) => return Err(err.into()),
            },
            ReservationOutcome::InProgress { watcher, .. } => {
                // Someone else owns the in-flight creation; adopt its outcome.
                return match watcher.settled().await {
                    Settled::Ready => Ok(true),
                    Settled::Failed(err) => Err(err.into()),
                    Settled::Deleted => Ok(true),
                };
            }
        }
    }
}

/// Run the remote create on its own task and settle the reservation.
/// Runs to completion even if every caller stops waiting.
fn spawn_creation_owner(
    api: Arc<dyn JobserverApi>,
    registry: Arc<ContextRegistry>,
    evictions: EvictionTasks,
    descriptor: ContextDescriptor,
) {
    tokio::spawn(async move {
        info!(
            "creating context {} ({} executor(s), {} per node, {} core(s))",
            descriptor.name,
            descriptor.executor_count,
            descriptor.memory_per_node,
            descriptor.cores_per_executor
        );
        let result = api.create_context(&descriptor).await;
        let created = result.is_ok();
        if let Err(err) = &result {
            error!("creation of context {} failed: {}", descriptor.name, err);
        }
        registry.commit(&descriptor.name, result).await;

        if created && descriptor.timeout_seconds > 0 {
            let lifetime = Duration::from_secs(descriptor.timeout_seconds);
            let handle = tokio::spawn(evict_after(api, registry, descriptor, lifetime));
            if let Ok(mut evictions) = evictions.lock() {
                evictions.retain(|h| !h.is_finished());
                evictions.push(handle);
            }
        }
    });
}

/// Wait out the context's lifetime, then delete it if it is still the same
/// READY incarnation. Firing on an absent or replaced context is a no-op.
async fn evict_after(
    api: Arc<dyn JobserverApi>,
    registry: Arc<ContextRegistry>,
    descriptor: ContextDescriptor,
    lifetime: Duration,
) {
    sleep(lifetime).await;

    let Some(current) = registry.snapshot(&descriptor.name).await else {
        debug!("context {} already gone before eviction", descriptor.name);
        return;
    };
    if current.state != ContextState::Ready || current.created_at != descriptor.created_at {
        debug!(
            "context {} was replaced or is busy; skipping eviction",
            descriptor.name
        );
        return;
    }
    if !registry.mark_deleting(&descriptor.name).await {
        return; // a manual delete won the claim
    }

    match api.delete_context(&descriptor.name).await {
        Ok(_) => {
            registry.remove(&descriptor.name).await;
            info!(
                "evicted context {} after {}s",
                descriptor.name, descriptor.timeout_seconds
            );
        }
        Err(err) => {
            warn!("eviction of context {} failed: {}", descriptor.name, err);
            registry.abandon_delete(&descriptor.name).await;
        }
    }
}
