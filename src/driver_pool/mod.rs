//! Lazily launched pool of browser-driver sessions
//!
//! The pool holds at most `size` sessions and hands them out as exclusive
//! leases, so no two renders ever share a session at the same time. Sessions
//! are launched on demand: nothing starts until the first `acquire`, and a new
//! launch only happens while holding a lease permit with no idle session
//! available. With `size = 1` this means concurrent first callers trigger
//! exactly one launch and then take turns on the same session.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{ExportError, ExportResult};
use crate::render::session::{RenderSession, SessionLauncher};

// =============================================================================
// Pooled Session
// =============================================================================

/// A session with pool metadata
#[derive(Debug)]
pub struct PooledSession<S> {
    /// Unique identifier within this pool
    pub id: u64,
    pub session: S,
    pub created_at: Instant,
    /// Last time this session was handed out or returned
    pub last_used: Instant,
}

impl<S> PooledSession<S> {
    fn new(id: u64, session: S) -> Self {
        let now = Instant::now();
        Self {
            id,
            session,
            created_at: now,
            last_used: now,
        }
    }
}

// =============================================================================
// Driver Pool
// =============================================================================

pub struct DriverPool<L: SessionLauncher> {
    launcher: L,
    size: usize,
    /// One permit per session slot; a lease owns a permit for its lifetime
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<PooledSession<L::Session>>>,
    next_id: AtomicU64,
    launches: AtomicUsize,
    shutdown: AtomicBool,
}

impl<L: SessionLauncher> std::fmt::Debug for DriverPool<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverPool")
            .field("size", &self.size)
            .field("idle", &self.idle.lock().len())
            .field("launches", &self.launches.load(Ordering::Relaxed))
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<L: SessionLauncher> DriverPool<L> {
    /// Create an empty pool. No session is launched here.
    pub fn new(launcher: L, size: usize) -> Arc<Self> {
        let size = size.max(1);
        Arc::new(Self {
            launcher,
            size,
            permits: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
            launches: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Lease a session, launching one if no healthy idle session exists
    ///
    /// Waits while all `size` sessions are leased. A failed launch is not
    /// cached; the permit is returned and the next caller tries again.
    pub async fn acquire(self: &Arc<Self>) -> ExportResult<SessionLease<L>> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(pool_closed());
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| pool_closed())?;

        loop {
            let candidate = self.idle.lock().pop_front();
            let Some(mut pooled) = candidate else {
                break;
            };

            if pooled.session.is_alive().await {
                pooled.last_used = Instant::now();
                debug!(session_id = pooled.id, "Reusing browser session");
                return Ok(SessionLease::new(pooled, Arc::clone(self), permit));
            }

            warn!(
                session_id = pooled.id,
                "Browser session failed health check, discarding"
            );
            discard(pooled);
        }

        let pooled = self.launch().await?;
        Ok(SessionLease::new(pooled, Arc::clone(self), permit))
    }

    async fn launch(&self) -> ExportResult<PooledSession<L::Session>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(session_id = id, "Launching browser session");

        let session = self.launcher.launch().await.map_err(|e| {
            warn!(session_id = id, error = %format!("{e:#}"), "Browser launch failed");
            ExportError::DriverLaunchFailure(format!("{e:#}"))
        })?;

        self.launches.fetch_add(1, Ordering::Relaxed);
        info!(session_id = id, "Browser session ready");
        Ok(PooledSession::new(id, session))
    }

    /// Return a session. Dirty sessions and anything returned after shutdown
    /// are closed instead of pooled.
    fn release(&self, mut pooled: PooledSession<L::Session>, dirty: bool) {
        if dirty || self.shutdown.load(Ordering::Acquire) {
            debug!(session_id = pooled.id, dirty, "Discarding released session");
            discard(pooled);
            return;
        }

        pooled.last_used = Instant::now();
        debug!(session_id = pooled.id, "Released session back to pool");
        self.idle.lock().push_back(pooled);
    }

    /// Close all idle sessions and refuse further leases
    ///
    /// Sessions currently leased are closed when their lease drops.
    pub async fn shutdown(&self) {
        info!("Shutting down driver pool");
        self.shutdown.store(true, Ordering::Release);
        self.permits.close();

        let drained: Vec<_> = self.idle.lock().drain(..).collect();
        for mut pooled in drained {
            if let Err(e) = pooled.session.close().await {
                warn!(session_id = pooled.id, "Failed to close browser session: {e:#}");
            }
        }

        info!("Driver pool shutdown complete");
    }

    /// Number of successful launches since the pool was created
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

fn pool_closed() -> ExportError {
    ExportError::DriverLaunchFailure("driver pool is shut down".to_string())
}

/// Close a session off the caller's path; dropped outright without a runtime
fn discard<S: RenderSession>(mut pooled: PooledSession<S>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            if let Err(e) = pooled.session.close().await {
                warn!(session_id = pooled.id, "Failed to close discarded session: {e:#}");
            }
        });
    }
}

// =============================================================================
// RAII Lease
// =============================================================================

/// Exclusive use of one pooled session; returns it to the pool on drop
///
/// A lease starts clean. Mark it dirty before driving the browser and clean
/// again once the work finished normally: a lease dropped while dirty (failed
/// render, or a job future cancelled mid-render) has its session closed
/// rather than reused, so the next job never inherits a half-navigated page.
pub struct SessionLease<L: SessionLauncher> {
    pooled: Option<PooledSession<L::Session>>,
    pool: Arc<DriverPool<L>>,
    dirty: bool,
    // Dropped after `Drop::drop` has returned the session to the idle queue
    _permit: OwnedSemaphorePermit,
}

impl<L: SessionLauncher> std::fmt::Debug for SessionLease<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.pooled.as_ref().map(|p| p.id))
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl<L: SessionLauncher> SessionLease<L> {
    fn new(
        pooled: PooledSession<L::Session>,
        pool: Arc<DriverPool<L>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pooled: Some(pooled),
            pool,
            dirty: false,
            _permit: permit,
        }
    }

    pub fn session(&self) -> &L::Session {
        &self
            .pooled
            .as_ref()
            .expect("lease holds its session until dropped")
            .session
    }

    /// Pool-unique id of the leased session
    pub fn id(&self) -> u64 {
        self.pooled
            .as_ref()
            .expect("lease holds its session until dropped")
            .id
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl<L: SessionLauncher> Drop for SessionLease<L> {
    fn drop(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.release(pooled, self.dirty);
        }
    }
}
