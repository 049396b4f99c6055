pub mod config;

use crate::core::{MaintenanceError, Result};
use config::InvokerConfig;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info};

type HandleFactory<H> = Box<dyn Fn() -> Result<H> + Send + Sync>;

/// Shared resource invoker
///
/// Lazily creates one expensive handle, lends it to any number of concurrent
/// callers and disposes it once nobody has touched it for the configured idle
/// period. Creation and disposal are serialized by a single mutex; the work
/// closures themselves run outside of it, which is why `H` must be `Sync`.
///
/// After [`shutdown`](Self::shutdown) every call to
/// [`try_invoke`](Self::try_invoke) returns `Ok(None)`.
pub struct SharedResourceInvoker<H: Send + Sync + 'static> {
    shared: Arc<Shared<H>>,
    /// Idle eviction supervisor thread
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<H> {
    config: InvokerConfig,
    factory: HandleFactory<H>,
    state: Mutex<InvokerState<H>>,
    /// Signals the supervisor that a handle was created or shutdown started
    wake: Condvar,
    /// Callers currently inside `try_invoke`
    active_callers: AtomicUsize,
    /// Number of handles constructed over the invoker's lifetime
    created: AtomicU64,
}

struct InvokerState<H> {
    handle: Option<Arc<H>>,
    /// One-way: once set, no handle is ever created again
    disposing: bool,
    /// Earliest instant at which an unused handle may be evicted
    idle_deadline: Option<Instant>,
    generation: u64,
}

impl<H: Send + Sync + 'static> SharedResourceInvoker<H> {
    /// Create an invoker that builds handles with `factory`
    ///
    /// No handle is created until the first call to `try_invoke`.
    pub fn new<F>(config: InvokerConfig, factory: F) -> Result<Self>
    where
        F: Fn() -> Result<H> + Send + Sync + 'static,
    {
        config.validate().map_err(MaintenanceError::Config)?;

        let shared = Arc::new(Shared {
            config,
            factory: Box::new(factory),
            state: Mutex::new(InvokerState {
                handle: None,
                disposing: false,
                idle_deadline: None,
                generation: 0,
            }),
            wake: Condvar::new(),
            active_callers: AtomicUsize::new(0),
            created: AtomicU64::new(0),
        });

        let supervisor_shared = Arc::clone(&shared);
        let supervisor = std::thread::Builder::new()
            .name("shared-handle-idle".to_string())
            .spawn(move || supervisor_shared.supervise())?;

        Ok(Self {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// Run `work` against the shared handle, creating it if necessary
    ///
    /// Returns `Ok(None)` without running `work` once shutdown has started.
    /// Errors raised by `work` are logged and handed back to the caller.
    pub fn try_invoke<T, F>(&self, work: F) -> Result<Option<T>>
    where
        F: FnOnce(&H) -> Result<T>,
    {
        let _caller = CallerGuard::enter(&self.shared.active_callers);

        let handle = match self.shared.fetch_handle()? {
            Some(handle) => handle,
            None => return Ok(None),
        };

        match work(&handle) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                error!(error = %err, "shared handle invocation failed");
                Err(err)
            }
        }
    }

    /// Permanently stop handing out the shared handle and dispose it
    ///
    /// Idempotent. Callers already inside `work` keep their reference until
    /// they return; the handle is destroyed when the last one finishes.
    pub fn shutdown(&self) {
        let disposed = {
            let mut state = self.shared.lock_state();
            state.disposing = true;
            state.idle_deadline = None;
            state.handle.take()
        };
        self.shared.wake.notify_all();

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.join();
        }

        if disposed.is_some() {
            info!("disposed shared handle on shutdown");
        }
    }

    /// True once `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.lock_state().disposing
    }

    /// Get invoker statistics
    pub fn stats(&self) -> InvokerStats {
        let state = self.shared.lock_state();

        InvokerStats {
            live: state.handle.is_some(),
            generation: state.generation,
            active_callers: self.shared.active_callers.load(Ordering::SeqCst),
            created: self.shared.created.load(Ordering::SeqCst),
            disposing: state.disposing,
        }
    }
}

impl<H: Send + Sync + 'static> Drop for SharedResourceInvoker<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<H> Shared<H> {
    // Nothing inside the critical sections can leave the state half-updated,
    // so a poisoned guard is still safe to use.
    fn lock_state(&self) -> MutexGuard<'_, InvokerState<H>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch_handle(&self) -> Result<Option<Arc<H>>> {
        let mut state = self.lock_state();
        if state.disposing {
            return Ok(None);
        }

        let existing = state.handle.clone();
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let handle = Arc::new(self.create_handle()?);
                state.handle = Some(Arc::clone(&handle));
                state.generation += 1;
                self.created.fetch_add(1, Ordering::SeqCst);
                debug!(generation = state.generation, "created shared handle");
                self.wake.notify_all();
                handle
            }
        };

        state.idle_deadline = Some(Instant::now() + self.config.idle_period);
        Ok(Some(handle))
    }

    fn create_handle(&self) -> Result<H> {
        let created = catch_unwind(AssertUnwindSafe(|| (self.factory)())).map_err(|_| {
            MaintenanceError::HandleCreation("handle factory panicked".to_string())
        })?;

        created.map_err(|err| {
            error!(error = %err, "failed to create shared handle");
            err
        })
    }

    /// Idle eviction loop
    ///
    /// Sleeps until the current deadline, re-reading it after every wakeup so
    /// that accesses in the meantime push eviction further out.
    fn supervise(&self) {
        let mut state = self.lock_state();

        loop {
            if state.disposing {
                return;
            }

            let deadline = match (state.handle.is_some(), state.idle_deadline) {
                (true, Some(deadline)) => deadline,
                _ => {
                    state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
            };

            let now = Instant::now();
            if now < deadline {
                state = self
                    .wake
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }

            if self.active_callers.load(Ordering::SeqCst) > 0 {
                state.idle_deadline = Some(now + self.config.idle_period);
                continue;
            }

            let evicted = state.handle.take();
            state.idle_deadline = None;
            let generation = state.generation;
            drop(state);

            drop(evicted);
            info!(generation, "disposed idle shared handle");

            state = self.lock_state();
        }
    }
}

/// Keeps the active caller count raised for the duration of one invocation,
/// including when the work closure returns an error or panics.
struct CallerGuard<'a> {
    active_callers: &'a AtomicUsize,
}

impl<'a> CallerGuard<'a> {
    fn enter(active_callers: &'a AtomicUsize) -> Self {
        active_callers.fetch_add(1, Ordering::SeqCst);
        Self { active_callers }
    }
}

impl Drop for CallerGuard<'_> {
    fn drop(&mut self) {
        self.active_callers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared resource invoker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerStats {
    pub live: bool,
    pub generation: u64,
    pub active_callers: usize,
    pub created: u64,
    pub disposing: bool,
}

impl std::fmt::Display for InvokerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Shared handle: {} (generation {}), {} active callers, {} created{}",
            if self.live { "live" } else { "not loaded" },
            self.generation,
            self.active_callers,
            self.created,
            if self.disposing { ", shut down" } else { "" }
        )
    }
}
