//! Model residency manager
//!
//! Keeps at most one configuration loaded and decides, per request, whether
//! the resident one can be reused or must be replaced:
//! - same configuration: hand out the resident handle, no backend calls
//! - different configuration: release the resident handle, then load
//! - load failure (including timeout or cancellation): stay `Empty`
//!
//! The whole check → unload → load → install sequence runs under one async
//! mutex. Callers get an `Arc` lease on the handle and use it after the lock
//! is released, so long-running inference never blocks the next lookup.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use crate::backend::ModelLoader;
use crate::error::{BlendError, Result};
use crate::model::LoadPurpose;

/// What is resident right now
enum ResidentState<C, H> {
    Empty,
    Loaded {
        configuration: C,
        handle: Arc<H>,
        loaded_at: DateTime<Utc>,
    },
}

/// Snapshot of the residency state for reporting
#[derive(Debug, Clone, PartialEq)]
pub enum ResidencyStatus<C> {
    Empty,
    Loading,
    Loaded {
        configuration: C,
        loaded_at: DateTime<Utc>,
    },
}

/// Single-slot model residency manager
pub struct ResidencyManager<L: ModelLoader> {
    loader: Arc<L>,
    state: Mutex<ResidentState<L::Config, L::Handle>>,
    /// Upper bound on a single load
    load_timeout: Option<Duration>,
    /// Waiters allowed behind an in-flight load before new requests are rejected
    max_waiting: Option<usize>,
    waiting: AtomicUsize,
    loading: AtomicBool,
    loads: AtomicU64,
}

/// Counts a request as waiting for the lock until dropped
struct WaitTicket<'a> {
    counter: &'a AtomicUsize,
    position: usize,
}

impl<'a> WaitTicket<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let position = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, position }
    }
}

impl Drop for WaitTicket<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Marks a load as in flight until dropped, including on cancellation
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<L: ModelLoader> ResidencyManager<L> {
    /// Create an empty manager
    pub fn new(loader: Arc<L>) -> Self {
        Self {
            loader,
            state: Mutex::new(ResidentState::Empty),
            load_timeout: None,
            max_waiting: None,
            waiting: AtomicUsize::new(0),
            loading: AtomicBool::new(false),
            loads: AtomicU64::new(0),
        }
    }

    /// Bound every load by `timeout` (`None` = unbounded)
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Reject requests once `max` are already queued behind a load
    /// (`None` = unbounded)
    pub fn with_max_waiting(mut self, max: Option<usize>) -> Self {
        self.max_waiting = max;
        self
    }

    /// The backend this manager loads through
    pub fn loader(&self) -> &Arc<L> {
        &self.loader
    }

    /// Number of successful loads since creation
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Return a handle for `requested`, loading or replacing the resident
    /// configuration if needed.
    pub async fn ensure_resident(
        &self,
        requested: &L::Config,
        purpose: LoadPurpose,
    ) -> Result<Arc<L::Handle>> {
        let mut state = self.acquire().await?;

        if let ResidentState::Loaded {
            configuration,
            handle,
            ..
        } = &*state
        {
            if configuration == requested {
                tracing::debug!("Reusing resident models {}", configuration);
                return Ok(Arc::clone(handle));
            }
            tracing::info!(
                "Models changed from {} to {}; unloading resident models",
                configuration,
                requested
            );
        }

        // Release before loading so a failed load can never leave stale state
        *state = ResidentState::Empty;

        let handle = Arc::new(self.load(requested, purpose).await?);
        *state = ResidentState::Loaded {
            configuration: requested.clone(),
            handle: Arc::clone(&handle),
            loaded_at: Utc::now(),
        };
        self.loads.fetch_add(1, Ordering::SeqCst);

        Ok(handle)
    }

    /// Drop the resident configuration, if any
    pub async fn unload(&self) -> bool {
        let mut state = self.state.lock().await;
        let was_loaded = matches!(*state, ResidentState::Loaded { .. });
        *state = ResidentState::Empty;
        was_loaded
    }

    /// Report what is resident without waiting behind an in-flight load
    pub async fn status(&self) -> ResidencyStatus<L::Config> {
        if self.loading.load(Ordering::SeqCst) {
            return ResidencyStatus::Loading;
        }
        match &*self.state.lock().await {
            ResidentState::Empty => ResidencyStatus::Empty,
            ResidentState::Loaded {
                configuration,
                loaded_at,
                ..
            } => ResidencyStatus::Loaded {
                configuration: configuration.clone(),
                loaded_at: *loaded_at,
            },
        }
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ResidentState<L::Config, L::Handle>>> {
        if let Ok(guard) = self.state.try_lock() {
            return Ok(guard);
        }

        // Reuse holders release the lock almost at once; only a cold load
        // makes the queue grow
        let ticket = WaitTicket::enter(&self.waiting);
        if let Some(max) = self.max_waiting {
            if ticket.position > max && self.loading.load(Ordering::SeqCst) {
                tracing::warn!(
                    "Rejecting request: {} already waiting on model residency",
                    ticket.position - 1
                );
                return Err(BlendError::ResidencyBusy {
                    waiting: ticket.position - 1,
                });
            }
        }

        Ok(self.state.lock().await)
    }

    async fn load(&self, requested: &L::Config, purpose: LoadPurpose) -> Result<L::Handle> {
        let _flag = LoadingFlag::raise(&self.loading);
        tracing::info!("Loading models {} ({:?})...", requested, purpose);
        let start = Instant::now();

        let loading = self.loader.load(requested, purpose);
        let result = match self.load_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, loading).await {
                Ok(result) => result,
                Err(_) => Err(BlendError::LoadTimeout {
                    configuration: requested.to_string(),
                    timeout,
                }),
            },
            None => loading.await,
        };

        match &result {
            Ok(_) => tracing::info!("Loaded {} in {:.2?}", requested, start.elapsed()),
            Err(e) => tracing::error!("Failed to load {}: {}", requested, e),
        }
        result
    }
}
