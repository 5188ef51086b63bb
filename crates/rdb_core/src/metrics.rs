use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const PERCENTILE_WINDOW_CAPACITY: usize = 512;

/// Read-only point-in-time view of a `Metrics` collector, handed to
/// `MetricsUpdated` subscribers after every command completion.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub commands_executed: u64,
    pub commands_failed: u64,
    pub commands_timed_out: u64,
    pub rows_affected_total: u64,
    pub rows_read_total: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_current: i64,
    pub connections_max: u64,
    pub transactions_active: i64,
    pub transactions_max: u64,
    pub prepared_statements: u64,
    pub statements_cached: u64,
    pub statements_evicted: u64,
    pub long_lived_connections: u64,
    pub max_parameters_observed: usize,
    pub avg_command: Duration,
    pub p95_command: Duration,
    pub p99_command: Duration,
}

/// Outcome of one completed command, as reported to `Metrics::record_command`.
#[derive(Debug, Clone, Copy)]
pub struct CommandOutcome {
    pub duration: Duration,
    pub rows_affected: Option<u64>,
    pub rows_read: Option<u64>,
    pub failed: bool,
    pub timed_out: bool,
    pub parameter_count: usize,
}

type Subscriber = Box<dyn Fn(&MetricsSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Lock-free counters (atomics) plus a small windowed reservoir for
/// command-latency percentiles. The reservoir is the only part that takes
/// a lock, matching the spec's "atomic counters, windowed reservoirs"
/// phrasing — counters never block.
pub struct Metrics {
    commands_executed: AtomicU64,
    commands_failed: AtomicU64,
    commands_timed_out: AtomicU64,
    rows_affected_total: AtomicU64,
    rows_read_total: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    connections_current: AtomicI64,
    connections_max: AtomicU64,
    transactions_active: AtomicI64,
    transactions_max: AtomicU64,
    prepared_statements: AtomicU64,
    statements_cached: AtomicU64,
    statements_evicted: AtomicU64,
    long_lived_connections: AtomicU64,
    max_parameters_observed: AtomicUsize,
    reservoir: Mutex<VecDeque<Duration>>,
    subscribers: Mutex<Vec<(u64, Subscriber)>>,
    next_subscriber_id: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            commands_executed: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            commands_timed_out: AtomicU64::new(0),
            rows_affected_total: AtomicU64::new(0),
            rows_read_total: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_closed: AtomicU64::new(0),
            connections_current: AtomicI64::new(0),
            connections_max: AtomicU64::new(0),
            transactions_active: AtomicI64::new(0),
            transactions_max: AtomicU64::new(0),
            prepared_statements: AtomicU64::new(0),
            statements_cached: AtomicU64::new(0),
            statements_evicted: AtomicU64::new(0),
            long_lived_connections: AtomicU64::new(0),
            max_parameters_observed: AtomicUsize::new(0),
            reservoir: Mutex::new(VecDeque::with_capacity(PERCENTILE_WINDOW_CAPACITY)),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        let current = self.connections_current.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections_max.fetch_max(current.max(0) as u64, Ordering::Relaxed);
    }

    /// A pinned connection transitioning to Broken must not double-decrement
    /// the open-connection counter; callers close it at most once.
    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        self.connections_current.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn transaction_started(&self) {
        let current = self.transactions_active.fetch_add(1, Ordering::Relaxed) + 1;
        self.transactions_max.fetch_max(current.max(0) as u64, Ordering::Relaxed);
    }

    pub fn transaction_ended(&self) {
        self.transactions_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn statement_cached(&self) {
        self.statements_cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn statement_evicted(&self, count: usize) {
        self.statements_evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn statement_prepared(&self) {
        self.prepared_statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one completed command and notifies every subscriber with a
    /// fresh snapshot. Subscribers removed before this call MUST NOT run.
    pub fn record_command(&self, outcome: CommandOutcome) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
        if outcome.failed {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.timed_out {
            self.commands_timed_out.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(rows) = outcome.rows_affected {
            self.rows_affected_total.fetch_add(rows, Ordering::Relaxed);
        }
        if let Some(rows) = outcome.rows_read {
            self.rows_read_total.fetch_add(rows, Ordering::Relaxed);
        }
        self.max_parameters_observed
            .fetch_max(outcome.parameter_count, Ordering::Relaxed);

        {
            let mut reservoir = lock_mutex(&self.reservoir);
            if reservoir.len() == PERCENTILE_WINDOW_CAPACITY {
                reservoir.pop_front();
            }
            reservoir.push_back(outcome.duration);
        }

        self.notify_subscribers();
    }

    pub fn subscribe(&self, callback: impl Fn(&MetricsSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        lock_mutex(&self.subscribers).push((id, Box::new(callback)));
        SubscriptionId(id)
    }

    /// Symmetric with `subscribe`: a handler removed here is guaranteed not
    /// to run for any `record_command` call that starts afterward.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock_mutex(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id.0);
        subscribers.len() != before
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (avg, p95, p99) = percentiles(&lock_mutex(&self.reservoir));

        MetricsSnapshot {
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            commands_timed_out: self.commands_timed_out.load(Ordering::Relaxed),
            rows_affected_total: self.rows_affected_total.load(Ordering::Relaxed),
            rows_read_total: self.rows_read_total.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            connections_current: self.connections_current.load(Ordering::Relaxed),
            connections_max: self.connections_max.load(Ordering::Relaxed),
            transactions_active: self.transactions_active.load(Ordering::Relaxed),
            transactions_max: self.transactions_max.load(Ordering::Relaxed),
            prepared_statements: self.prepared_statements.load(Ordering::Relaxed),
            statements_cached: self.statements_cached.load(Ordering::Relaxed),
            statements_evicted: self.statements_evicted.load(Ordering::Relaxed),
            long_lived_connections: self.long_lived_connections.load(Ordering::Relaxed),
            max_parameters_observed: self.max_parameters_observed.load(Ordering::Relaxed),
            avg_command: avg,
            p95_command: p95,
            p99_command: p99,
        }
    }

    fn notify_subscribers(&self) {
        let snapshot = self.snapshot();
        let subscribers = lock_mutex(&self.subscribers);
        for (_, callback) in subscribers.iter() {
            callback(&snapshot);
        }
    }
}

fn percentiles(reservoir: &VecDeque<Duration>) -> (Duration, Duration, Duration) {
    if reservoir.is_empty() {
        return (Duration::ZERO, Duration::ZERO, Duration::ZERO);
    }

    let mut sorted: Vec<Duration> = reservoir.iter().copied().collect();
    sorted.sort();

    let avg_nanos = sorted.iter().map(Duration::as_nanos).sum::<u128>() / sorted.len() as u128;
    let avg = Duration::from_nanos(avg_nanos as u64);

    let p95 = sorted[percentile_index(sorted.len(), 0.95)];
    let p99 = sorted[percentile_index(sorted.len(), 0.99)];

    (avg, p95, p99)
}

fn percentile_index(len: usize, fraction: f64) -> usize {
    let idx = (fraction * (len as f64 - 1.0)).round() as usize;
    idx.min(len - 1)
}

fn lock_mutex<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
