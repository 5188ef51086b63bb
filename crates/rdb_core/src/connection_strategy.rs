use crate::db_mode::DbMode;
use crate::lock::ConnectionLock;
use crate::tracked_connection::TrackedConnection;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Whether a requested connection will be used for reads or writes. Drives
/// `ConnectionStrategy::pinned_for` in `SingleWriter` mode, where only
/// writes get the pinned connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Read,
    Write,
}

/// A connection handed out by `DatabaseContext::get_connection`. `Owned`
/// connections are this call's alone to close; `Shared` connections are a
/// reference into a pinned-mode connection that the caller must never
/// close directly — `DatabaseContext::close_and_dispose_connection` treats
/// disposing a `Shared` handle as a no-op.
pub enum ConnectionHandle {
    Owned(TrackedConnection),
    Shared(Arc<AsyncMutex<TrackedConnection>>),
}

impl ConnectionHandle {
    pub async fn guard(&self) -> ConnectionGuard<'_> {
        match self {
            ConnectionHandle::Owned(tc) => ConnectionGuard::Owned(tc),
            ConnectionHandle::Shared(arc) => ConnectionGuard::Shared(arc.lock().await),
        }
    }

    /// Consumes the handle into a guard with no borrow back into `self`,
    /// suitable for storing for an entire transaction's lifetime. A
    /// `Shared` handle acquires the pinned connection's mutex via
    /// `lock_owned`, which clones the `Arc` instead of borrowing it —
    /// avoiding the self-referential guard that a plain `MutexGuard` would
    /// require here.
    pub async fn into_owned_guard(self) -> OwnedConnectionGuard {
        match self {
            ConnectionHandle::Owned(tc) => OwnedConnectionGuard::Owned(tc),
            ConnectionHandle::Shared(arc) => OwnedConnectionGuard::Shared(arc.lock_owned().await),
        }
    }

    /// Identity check used by tests asserting "the same pinned connection
    /// is returned on every call" (§8 invariant 13): two `Shared` handles
    /// compare equal iff they point at the same underlying connection;
    /// `Owned` handles are never equal to anything, being ephemeral by
    /// construction.
    pub fn points_at_same_connection(&self, other: &ConnectionHandle) -> bool {
        match (self, other) {
            (ConnectionHandle::Shared(a), ConnectionHandle::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Borrow of whatever `TrackedConnection` a `ConnectionHandle` refers to,
/// obtained without caring whether it required an async mutex lock.
pub enum ConnectionGuard<'a> {
    Owned(&'a TrackedConnection),
    Shared(tokio::sync::MutexGuard<'a, TrackedConnection>),
}

impl std::ops::Deref for ConnectionGuard<'_> {
    type Target = TrackedConnection;

    fn deref(&self) -> &TrackedConnection {
        match self {
            ConnectionGuard::Owned(tc) => tc,
            ConnectionGuard::Shared(guard) => guard,
        }
    }
}

/// Owned counterpart of `ConnectionGuard`, held for an entire
/// transaction's lifetime rather than re-acquired per call.
pub enum OwnedConnectionGuard {
    Owned(TrackedConnection),
    Shared(tokio::sync::OwnedMutexGuard<TrackedConnection>),
}

impl std::ops::Deref for OwnedConnectionGuard {
    type Target = TrackedConnection;

    fn deref(&self) -> &TrackedConnection {
        match self {
            OwnedConnectionGuard::Owned(tc) => tc,
            OwnedConnectionGuard::Shared(guard) => guard,
        }
    }
}

impl std::ops::DerefMut for OwnedConnectionGuard {
    fn deref_mut(&mut self) -> &mut TrackedConnection {
        match self {
            OwnedConnectionGuard::Owned(tc) => tc,
            OwnedConnectionGuard::Shared(guard) => guard,
        }
    }
}

/// The effective connection-lifecycle policy, resolved once at construction
/// time from `coerce_mode`'s output. Holds whatever pinned connection the
/// mode requires (`KeepAlive`'s warm connection, `SingleWriter`'s writer,
/// `SingleConnection`'s single handle) plus the lock vended through it.
pub struct ConnectionStrategy {
    mode: DbMode,
    pinned: Option<Arc<AsyncMutex<TrackedConnection>>>,
    lock: ConnectionLock,
}

impl ConnectionStrategy {
    /// `Standard` has no pinned connection and a no-op lock.
    pub fn standard() -> Self {
        Self {
            mode: DbMode::Standard,
            pinned: None,
            lock: ConnectionLock::NoOp,
        }
    }

    /// `KeepAlive`/`SingleWriter`/`SingleConnection` all retain one pinned
    /// connection (§4.1's "retain the initialization connection"), guarded
    /// by a shared `PinnedLock`.
    pub fn pinned(mode: DbMode, connection: TrackedConnection) -> Self {
        debug_assert!(matches!(mode, DbMode::KeepAlive | DbMode::SingleWriter | DbMode::SingleConnection));
        let lock = Arc::new(crate::lock::PinnedLock::new());
        Self {
            mode,
            pinned: Some(Arc::new(AsyncMutex::new(connection))),
            lock: ConnectionLock::Pinned(lock),
        }
    }

    pub fn mode(&self) -> DbMode {
        self.mode
    }

    pub fn lock(&self) -> &ConnectionLock {
        &self.lock
    }

    /// The pinned connection this strategy retains, if any.
    pub fn pinned_connection(&self) -> Option<Arc<AsyncMutex<TrackedConnection>>> {
        self.pinned.clone()
    }

    /// Whether `get_connection(kind)` should hand back the pinned
    /// connection rather than opening a fresh ephemeral one, per §4.1.2's
    /// dispatch table:
    ///
    /// - `Standard`: never (no pinned connection exists).
    /// - `KeepAlive`: never — the warm connection is internal upkeep only;
    ///   callers see `Standard`-shaped ephemeral traffic.
    /// - `SingleWriter`: only for `Write` — reads always get an ephemeral
    ///   RO-configured connection, even if the caller otherwise expected a
    ///   shared handle.
    /// - `SingleConnection`: always, for both `Read` and `Write`.
    pub fn wants_pinned(&self, kind: ConnectionKind) -> bool {
        match self.mode {
            DbMode::Standard | DbMode::KeepAlive => false,
            DbMode::SingleWriter => kind == ConnectionKind::Write,
            DbMode::SingleConnection => true,
        }
    }
}
