use crate::{
    ColumnarConnection, Connection, ConnectionUrl, DbError, DocumentConnection, Driver,
    ErrorKind, IsolationLevel, KvConnection, RelationalConnection, Result, ResultSet, driver_for,
};
use serde_json::json;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How many candidate connections a single borrow may destroy and replace
/// after failed validation before giving up with `PoolExhausted`.
const BORROW_VALIDATION_ATTEMPTS: usize = 3;

/// Pool sizing, timeout and validation policy.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Connections created synchronously before the constructor returns.
    pub initial_size: usize,
    /// Hard upper bound on idle + active connections.
    pub max_size: usize,
    /// Idle floor the maintenance task restores on each pass.
    pub min_idle: usize,
    /// Longest a borrow waits on a saturated pool before `PoolTimeout`.
    pub connection_timeout: Duration,
    /// Idle connections older than this are evicted by maintenance.
    pub idle_timeout: Duration,
    /// Connections older than this since creation are retired on return.
    pub max_lifetime: Duration,
    /// Maintenance cadence.
    pub validation_interval: Duration,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    /// Backend probe, e.g. `SELECT 1`; the KV family pings instead.
    pub validation_query: String,
    /// Session default applied to every borrowed relational connection.
    pub transaction_isolation: Option<IsolationLevel>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            initial_size: 0,
            max_size: 10,
            min_idle: 0,
            connection_timeout: Duration::from_millis(5000),
            idle_timeout: Duration::from_millis(60_000),
            max_lifetime: Duration::from_millis(1_800_000),
            validation_interval: Duration::from_millis(30_000),
            test_on_borrow: true,
            test_on_return: false,
            validation_query: "SELECT 1".to_string(),
            transaction_isolation: None,
        }
    }
}

/// Family-specific half of a pool: how to create, probe, reset and destroy
/// one connection. The control plane is identical across families.
pub trait PoolHooks: Send + Sync + 'static {
    type Conn: Send;

    fn create(&self) -> Result<Self::Conn>;

    /// Probe a candidate; failure destroys it.
    fn validate(&self, conn: &Self::Conn) -> Result<()>;

    /// Reset session state on return, the `reset_for_pool` contract.
    fn reset(&self, conn: &Self::Conn) -> Result<()>;

    /// Arm session defaults on a connection about to be handed out.
    fn on_borrow(&self, conn: &Self::Conn) -> Result<()> {
        let _ = conn;
        Ok(())
    }

    /// Physically close; errors are logged, never propagated.
    fn destroy(&self, conn: Self::Conn);
}

struct IdleEntry<C> {
    conn: C,
    created_at: Instant,
    idle_since: Instant,
}

struct PoolState<C> {
    idle: VecDeque<IdleEntry<C>>,
    total: usize,
    shutdown: bool,
}

struct PoolInner<H: PoolHooks> {
    hooks: H,
    options: PoolOptions,
    state: Mutex<PoolState<H::Conn>>,
    available: Condvar,
    maintenance_wakeup: Condvar,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

/// Point-in-time pool accounting. `active + idle == total <= max_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub total: usize,
    pub idle: usize,
    pub active: usize,
}

/// Bounded pool of warm, validated connections with borrowing semantics.
///
/// One logical pool exists per (URL, credentials) target; the four family
/// variants are instantiations over their [`PoolHooks`]. The pool strongly
/// owns connections while they idle; a borrow transfers ownership into the
/// returned [`PooledConnection`] guard, whose drop gives it back.
pub struct Pool<H: PoolHooks> {
    inner: Arc<PoolInner<H>>,
}

impl<H: PoolHooks> Clone for Pool<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: PoolHooks> std::fmt::Debug for Pool<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Pool")
            .field("total", &status.total)
            .field("idle", &status.idle)
            .finish_non_exhaustive()
    }
}

impl<H: PoolHooks> Pool<H> {
    /// Build a pool over explicit hooks. The family constructors are the
    /// usual entry point; this one exists for custom backends and tests.
    pub fn with_hooks(hooks: H, options: PoolOptions) -> Result<Self> {
        let inner = Arc::new(PoolInner {
            hooks,
            options,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            maintenance_wakeup: Condvar::new(),
            maintenance: Mutex::new(None),
        });

        {
            let mut state = inner.state.lock().expect("pool state poisoned");
            let warm = inner.options.initial_size.min(inner.options.max_size);
            for _ in 0..warm {
                let conn = inner.hooks.create()?;
                let now = Instant::now();
                state.total += 1;
                state.idle.push_back(IdleEntry {
                    conn,
                    created_at: now,
                    idle_since: now,
                });
            }
        }

        let weak = Arc::downgrade(&inner);
        let interval = inner.options.validation_interval;
        let handle = std::thread::Builder::new()
            .name("silo-pool-maintenance".to_string())
            .spawn(move || maintenance_loop(weak, interval))
            .map_err(|e| {
                DbError::new(
                    "M6QV1XDJS3HN",
                    ErrorKind::ConnectFailure,
                    format!("cannot spawn pool maintenance worker: {e}"),
                )
            })?;
        *inner.maintenance.lock().expect("maintenance slot poisoned") = Some(handle);

        Ok(Self { inner })
    }

    /// Borrow a connection, waiting up to `connection_timeout` when the
    /// pool is saturated.
    pub fn get(&self) -> Result<PooledConnection<H>> {
        let inner = &self.inner;
        let options = &inner.options;
        if options.max_size == 0 {
            return Err(DbError::new(
                "T1GB8ZKWF5CA",
                ErrorKind::PoolExhausted,
                "pool has max_size 0",
            ));
        }
        let deadline = Instant::now() + options.connection_timeout;
        let mut failed_candidates = 0usize;
        let mut state = inner.state.lock().expect("pool state poisoned");
        loop {
            if state.shutdown {
                return Err(DbError::new(
                    "J9RN4ECUH7PY",
                    ErrorKind::PoolClosed,
                    "pool is closed",
                ));
            }

            if let Some(entry) = state.idle.pop_front() {
                drop(state);
                match self.prepare_for_borrow(entry.conn, options.test_on_borrow) {
                    Ok(conn) => {
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            created_at: entry.created_at,
                            pool: Arc::downgrade(inner),
                        });
                    }
                    Err(error) => {
                        state = inner.state.lock().expect("pool state poisoned");
                        state.total -= 1;
                        inner.available.notify_one();
                        failed_candidates += 1;
                        log::warn!("pool candidate failed validation, destroyed: {error}");
                        if failed_candidates >= BORROW_VALIDATION_ATTEMPTS {
                            return Err(DbError::new(
                                "B5KX7MJQT0WS",
                                ErrorKind::PoolExhausted,
                                format!(
                                    "{failed_candidates} candidates failed validation in a row"
                                ),
                            ));
                        }
                        continue;
                    }
                }
            }

            if state.total < options.max_size {
                let conn = inner.hooks.create()?;
                state.total += 1;
                drop(state);
                match self.prepare_for_borrow(conn, false) {
                    Ok(conn) => {
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            created_at: Instant::now(),
                            pool: Arc::downgrade(inner),
                        });
                    }
                    Err(error) => {
                        let mut state = inner.state.lock().expect("pool state poisoned");
                        state.total -= 1;
                        inner.available.notify_one();
                        drop(state);
                        return Err(error);
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DbError::new(
                    "Z3WD6PFLR9VM",
                    ErrorKind::PoolTimeout,
                    format!(
                        "no connection became available within {} ms",
                        options.connection_timeout.as_millis()
                    ),
                ));
            }
            let (guard, _) = inner
                .available
                .wait_timeout(state, deadline - now)
                .expect("pool state poisoned");
            state = guard;
        }
    }

    /// Validate (optionally) and arm session defaults; on failure the
    /// connection is destroyed and the error reported to the caller.
    fn prepare_for_borrow(&self, conn: H::Conn, validate: bool) -> Result<H::Conn> {
        if validate {
            if let Err(error) = self.inner.hooks.validate(&conn) {
                self.inner.hooks.destroy(conn);
                return Err(error);
            }
        }
        if let Err(error) = self.inner.hooks.on_borrow(&conn) {
            self.inner.hooks.destroy(conn);
            return Err(error);
        }
        Ok(conn)
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock().expect("pool state poisoned");
        PoolStatus {
            total: state.total,
            idle: state.idle.len(),
            active: state.total - state.idle.len(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("pool state poisoned")
            .shutdown
    }

    /// Shut the pool down: wake and fail all waiters, destroy the idle
    /// set, join the maintenance worker. Idempotent. Connections already
    /// handed out keep working and are destroyed on return.
    pub fn close(&self) {
        let drained = {
            let mut state = self.inner.state.lock().expect("pool state poisoned");
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            self.inner.available.notify_all();
            self.inner.maintenance_wakeup.notify_all();
            drained
        };
        for entry in drained {
            self.inner.hooks.destroy(entry.conn);
        }
        let handle = self
            .inner
            .maintenance
            .lock()
            .expect("maintenance slot poisoned")
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("pool maintenance worker panicked");
            }
        }
    }
}

impl<H: PoolHooks> PoolInner<H> {
    /// Return path: reset the session, then re-idle, retire or destroy.
    fn give_back(self: &Arc<Self>, conn: H::Conn, created_at: Instant) {
        if let Err(error) = self.hooks.reset(&conn) {
            log::warn!("connection failed session reset, destroying: {error}");
            self.discard(conn);
            return;
        }
        if created_at.elapsed() > self.options.max_lifetime {
            log::debug!("retiring connection past max lifetime");
            self.discard(conn);
            return;
        }
        if self.options.test_on_return {
            if let Err(error) = self.hooks.validate(&conn) {
                log::warn!("connection failed return validation, destroying: {error}");
                self.discard(conn);
                return;
            }
        }
        let mut state = self.state.lock().expect("pool state poisoned");
        if state.shutdown {
            state.total -= 1;
            drop(state);
            self.hooks.destroy(conn);
            return;
        }
        state.idle.push_back(IdleEntry {
            conn,
            created_at,
            idle_since: Instant::now(),
        });
        self.available.notify_one();
    }

    /// Destroy a connection that is still counted, then free its slot.
    fn discard(self: &Arc<Self>, conn: H::Conn) {
        {
            let mut state = self.state.lock().expect("pool state poisoned");
            state.total -= 1;
        }
        self.hooks.destroy(conn);
        self.available.notify_one();
    }
}

fn maintenance_loop<H: PoolHooks>(weak: Weak<PoolInner<H>>, interval: Duration) {
    loop {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let state = inner.state.lock().expect("pool state poisoned");
        if state.shutdown {
            return;
        }
        let (mut state, _) = inner
            .maintenance_wakeup
            .wait_timeout(state, interval)
            .expect("pool state poisoned");
        if state.shutdown {
            return;
        }

        // Evict idle connections past their idle timeout.
        let mut victims = Vec::new();
        let mut keep = VecDeque::with_capacity(state.idle.len());
        while let Some(entry) = state.idle.pop_front() {
            if entry.idle_since.elapsed() > inner.options.idle_timeout {
                victims.push(entry.conn);
            } else {
                keep.push_back(entry);
            }
        }
        state.idle = keep;
        state.total -= victims.len();

        // Restore the idle floor, bounded by max_size.
        while state.idle.len() < inner.options.min_idle && state.total < inner.options.max_size {
            match inner.hooks.create() {
                Ok(conn) => {
                    let now = Instant::now();
                    state.total += 1;
                    state.idle.push_back(IdleEntry {
                        conn,
                        created_at: now,
                        idle_since: now,
                    });
                    inner.available.notify_one();
                }
                Err(error) => {
                    log::warn!("pool maintenance could not refill idle floor: {error}");
                    break;
                }
            }
        }
        drop(state);

        for conn in victims {
            log::debug!("evicting idle connection past idle timeout");
            inner.hooks.destroy(conn);
        }
        drop(inner);
    }
}

/// Exclusive guard over a borrowed connection.
///
/// Dropping the guard returns the connection to its pool (resetting the
/// session on the way); if the pool is already gone the connection is
/// simply dropped and closes with it.
pub struct PooledConnection<H: PoolHooks> {
    conn: Option<H::Conn>,
    created_at: Instant,
    pool: Weak<PoolInner<H>>,
}

impl<H: PoolHooks> std::fmt::Debug for PooledConnection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl<H: PoolHooks> Deref for PooledConnection<H> {
    type Target = H::Conn;

    fn deref(&self) -> &H::Conn {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<H: PoolHooks> DerefMut for PooledConnection<H> {
    fn deref_mut(&mut self) -> &mut H::Conn {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl<H: PoolHooks> Drop for PooledConnection<H> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            match self.pool.upgrade() {
                Some(inner) => inner.give_back(conn, self.created_at),
                None => log::debug!("pool gone before return, dropping connection"),
            }
        }
    }
}

/// Relational pool hooks: registry-backed factory, probe query validation,
/// session reset plus default-isolation arming.
pub struct RelationalPoolHooks {
    driver: Arc<dyn Driver>,
    url: ConnectionUrl,
    validation_query: String,
    default_isolation: Option<IsolationLevel>,
}

impl PoolHooks for RelationalPoolHooks {
    type Conn = Box<dyn RelationalConnection>;

    fn create(&self) -> Result<Self::Conn> {
        self.driver.connect_relational(&self.url)
    }

    fn validate(&self, conn: &Self::Conn) -> Result<()> {
        let mut rows = conn.execute_query(&self.validation_query).map_err(|e| {
            DbError::new(
                "L7HS2AQXN8DT",
                ErrorKind::ValidationFailed,
                format!("validation query failed: {e}"),
            )
        })?;
        let _ = rows.close();
        Ok(())
    }

    fn reset(&self, conn: &Self::Conn) -> Result<()> {
        conn.reset_for_pool()
    }

    fn on_borrow(&self, conn: &Self::Conn) -> Result<()> {
        if let Some(level) = self.default_isolation {
            conn.set_transaction_isolation(level)?;
        }
        Ok(())
    }

    fn destroy(&self, conn: Self::Conn) {
        if let Err(error) = conn.close() {
            log::warn!("error closing pooled connection: {error}");
        }
    }
}

/// Pool of relational connections.
pub type RelationalPool = Pool<RelationalPoolHooks>;

impl Pool<RelationalPoolHooks> {
    pub fn open(url: &str, options: PoolOptions) -> Result<Self> {
        let parsed = ConnectionUrl::parse(url)?;
        let hooks = RelationalPoolHooks {
            driver: driver_for(url)?,
            url: parsed,
            validation_query: options.validation_query.clone(),
            default_isolation: options.transaction_isolation,
        };
        Self::with_hooks(hooks, options)
    }
}

/// Document pool hooks: validation runs a `ping` command.
pub struct DocumentPoolHooks {
    driver: Arc<dyn Driver>,
    url: ConnectionUrl,
}

impl PoolHooks for DocumentPoolHooks {
    type Conn = Box<dyn DocumentConnection>;

    fn create(&self) -> Result<Self::Conn> {
        self.driver.connect_document(&self.url)
    }

    fn validate(&self, conn: &Self::Conn) -> Result<()> {
        conn.run_command(json!({ "ping": 1 })).map_err(|e| {
            DbError::new(
                "V4CY9KWBJ1RQ",
                ErrorKind::ValidationFailed,
                format!("ping command failed: {e}"),
            )
        })?;
        Ok(())
    }

    fn reset(&self, conn: &Self::Conn) -> Result<()> {
        conn.reset_for_pool()
    }

    fn destroy(&self, conn: Self::Conn) {
        if let Err(error) = conn.close() {
            log::warn!("error closing pooled connection: {error}");
        }
    }
}

pub type DocumentPool = Pool<DocumentPoolHooks>;

impl Pool<DocumentPoolHooks> {
    pub fn open(url: &str, options: PoolOptions) -> Result<Self> {
        let hooks = DocumentPoolHooks {
            driver: driver_for(url)?,
            url: ConnectionUrl::parse(url)?,
        };
        Self::with_hooks(hooks, options)
    }
}

/// Columnar pool hooks: validation executes the probe CQL statement.
pub struct ColumnarPoolHooks {
    driver: Arc<dyn Driver>,
    url: ConnectionUrl,
    validation_query: String,
}

impl PoolHooks for ColumnarPoolHooks {
    type Conn = Box<dyn ColumnarConnection>;

    fn create(&self) -> Result<Self::Conn> {
        self.driver.connect_columnar(&self.url)
    }

    fn validate(&self, conn: &Self::Conn) -> Result<()> {
        let mut rows = conn.execute_query(&self.validation_query).map_err(|e| {
            DbError::new(
                "G2NF5TDMX7UW",
                ErrorKind::ValidationFailed,
                format!("validation query failed: {e}"),
            )
        })?;
        let _ = rows.close();
        Ok(())
    }

    fn reset(&self, conn: &Self::Conn) -> Result<()> {
        conn.reset_for_pool()
    }

    fn destroy(&self, conn: Self::Conn) {
        if let Err(error) = conn.close() {
            log::warn!("error closing pooled connection: {error}");
        }
    }
}

pub type ColumnarPool = Pool<ColumnarPoolHooks>;

impl Pool<ColumnarPoolHooks> {
    pub fn open(url: &str, options: PoolOptions) -> Result<Self> {
        let hooks = ColumnarPoolHooks {
            driver: driver_for(url)?,
            url: ConnectionUrl::parse(url)?,
            validation_query: options.validation_query.clone(),
        };
        Self::with_hooks(hooks, options)
    }
}

/// Key-value pool hooks: validation pings.
pub struct KvPoolHooks {
    driver: Arc<dyn Driver>,
    url: ConnectionUrl,
}

impl PoolHooks for KvPoolHooks {
    type Conn = Box<dyn KvConnection>;

    fn create(&self) -> Result<Self::Conn> {
        self.driver.connect_kv(&self.url)
    }

    fn validate(&self, conn: &Self::Conn) -> Result<()> {
        conn.ping().map_err(|e| {
            DbError::new(
                "R0JZ3VSEC6KP",
                ErrorKind::ValidationFailed,
                format!("ping failed: {e}"),
            )
        })
    }

    fn reset(&self, conn: &Self::Conn) -> Result<()> {
        conn.reset_for_pool()
    }

    fn destroy(&self, conn: Self::Conn) {
        if let Err(error) = conn.close() {
            log::warn!("error closing pooled connection: {error}");
        }
    }
}

pub type KvPool = Pool<KvPoolHooks>;

impl Pool<KvPoolHooks> {
    pub fn open(url: &str, options: PoolOptions) -> Result<Self> {
        let hooks = KvPoolHooks {
            driver: driver_for(url)?,
            url: ConnectionUrl::parse(url)?,
        };
        Self::with_hooks(hooks, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Hooks over plain counters, no backend involved.
    struct CounterHooks {
        created: AtomicUsize,
        destroyed: AtomicUsize,
        resets: AtomicUsize,
        fail_validations: AtomicUsize,
        fail_creates: AtomicUsize,
    }

    impl CounterHooks {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                created: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
                fail_validations: AtomicUsize::new(0),
                fail_creates: AtomicUsize::new(0),
            })
        }
    }

    impl PoolHooks for Arc<CounterHooks> {
        type Conn = usize;

        fn create(&self) -> Result<usize> {
            if self.fail_creates.load(Ordering::SeqCst) > 0 {
                self.fail_creates.fetch_sub(1, Ordering::SeqCst);
                return Err(DbError::new(
                    "Y8WQ1BNKD4JE",
                    ErrorKind::ConnectFailure,
                    "scripted create failure",
                ));
            }
            Ok(self.created.fetch_add(1, Ordering::SeqCst))
        }

        fn validate(&self, _conn: &usize) -> Result<()> {
            if self.fail_validations.load(Ordering::SeqCst) > 0 {
                self.fail_validations.fetch_sub(1, Ordering::SeqCst);
                return Err(DbError::new(
                    "H6ES9RCVU2XF",
                    ErrorKind::ValidationFailed,
                    "scripted validation failure",
                ));
            }
            Ok(())
        }

        fn reset(&self, _conn: &usize) -> Result<()> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&self, _conn: usize) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn small_options() -> PoolOptions {
        PoolOptions {
            initial_size: 1,
            max_size: 1,
            connection_timeout: Duration::from_millis(2000),
            validation_interval: Duration::from_millis(50),
            ..PoolOptions::default()
        }
    }

    #[test]
    fn waiter_gets_the_returned_connection() {
        let hooks = CounterHooks::new();
        let pool = Pool::with_hooks(hooks.clone(), small_options()).unwrap();

        let first = pool.get().unwrap();
        let first_id = *first;
        let pool2 = pool.clone();
        let waiter = thread::spawn(move || {
            let conn = pool2.get().unwrap();
            *conn
        });
        thread::sleep(Duration::from_millis(300));
        drop(first);

        assert_eq!(waiter.join().unwrap(), first_id);
        assert_eq!(hooks.created.load(Ordering::SeqCst), 1);
        pool.close();
    }

    #[test]
    fn saturated_pool_times_out() {
        let hooks = CounterHooks::new();
        let mut options = small_options();
        options.connection_timeout = Duration::from_millis(200);
        let pool = Pool::with_hooks(hooks, options).unwrap();

        let held = pool.get().unwrap();
        let started = Instant::now();
        let err = pool.get().unwrap_err();
        assert_eq!(err, ErrorKind::PoolTimeout);
        assert!(started.elapsed() >= Duration::from_millis(200));
        drop(held);
        pool.close();
    }

    #[test]
    fn accounting_identity_holds_under_concurrency() {
        let hooks = CounterHooks::new();
        let options = PoolOptions {
            initial_size: 2,
            max_size: 4,
            connection_timeout: Duration::from_millis(5000),
            ..PoolOptions::default()
        };
        let pool = Pool::with_hooks(hooks, options).unwrap();

        let mut workers = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..20 {
                    let conn = pool.get().unwrap();
                    let status = pool.status();
                    assert!(status.total <= 4);
                    assert_eq!(status.active + status.idle, status.total);
                    drop(conn);
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        pool.close();
    }

    #[test]
    fn failed_validation_destroys_one_candidate_each() {
        let hooks = CounterHooks::new();
        let mut options = small_options();
        options.initial_size = 1;
        hooks.fail_validations.store(1, Ordering::SeqCst);
        let pool = Pool::with_hooks(hooks.clone(), options).unwrap();

        let conn = pool.get().unwrap();
        drop(conn);
        assert_eq!(hooks.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.created.load(Ordering::SeqCst), 2);
        pool.close();
    }

    #[test]
    fn repeated_validation_failures_exhaust_the_borrow() {
        let hooks = CounterHooks::new();
        let options = PoolOptions {
            initial_size: 4,
            max_size: 4,
            ..PoolOptions::default()
        };
        hooks.fail_validations.store(4, Ordering::SeqCst);
        let pool = Pool::with_hooks(hooks.clone(), options).unwrap();

        let err = pool.get().unwrap_err();
        assert_eq!(err, ErrorKind::PoolExhausted);
        assert_eq!(hooks.destroyed.load(Ordering::SeqCst), 3);
        pool.close();
    }

    #[test]
    fn zero_capacity_pool_fails_fast() {
        let hooks = CounterHooks::new();
        let options = PoolOptions {
            max_size: 0,
            connection_timeout: Duration::from_millis(10_000),
            ..PoolOptions::default()
        };
        let pool = Pool::with_hooks(hooks, options).unwrap();
        let started = Instant::now();
        let err = pool.get().unwrap_err();
        assert_eq!(err, ErrorKind::PoolExhausted);
        assert!(started.elapsed() < Duration::from_millis(1000));
        pool.close();
    }

    #[test]
    fn close_wakes_waiters_and_drains_idle() {
        let hooks = CounterHooks::new();
        let pool = Pool::with_hooks(hooks.clone(), small_options()).unwrap();

        let held = pool.get().unwrap();
        let pool2 = pool.clone();
        let waiter = thread::spawn(move || pool2.get().unwrap_err());
        thread::sleep(Duration::from_millis(100));
        pool.close();
        assert_eq!(waiter.join().unwrap(), ErrorKind::PoolClosed);

        // The borrowed connection still works and is destroyed on return.
        drop(held);
        assert_eq!(hooks.destroyed.load(Ordering::SeqCst), 1);
        pool.close();
    }

    #[test]
    fn maintenance_restores_the_idle_floor() {
        let hooks = CounterHooks::new();
        let options = PoolOptions {
            initial_size: 0,
            max_size: 4,
            min_idle: 2,
            validation_interval: Duration::from_millis(25),
            ..PoolOptions::default()
        };
        let pool = Pool::with_hooks(hooks, options).unwrap();
        thread::sleep(Duration::from_millis(300));
        let status = pool.status();
        assert!(status.idle >= 2, "idle floor not restored: {status:?}");
        pool.close();
    }

    #[test]
    fn maintenance_evicts_stale_idle_connections() {
        let hooks = CounterHooks::new();
        let options = PoolOptions {
            initial_size: 2,
            max_size: 4,
            min_idle: 0,
            idle_timeout: Duration::from_millis(50),
            validation_interval: Duration::from_millis(25),
            ..PoolOptions::default()
        };
        let pool = Pool::with_hooks(hooks.clone(), options).unwrap();
        thread::sleep(Duration::from_millis(400));
        assert_eq!(pool.status().idle, 0);
        assert_eq!(hooks.destroyed.load(Ordering::SeqCst), 2);
        pool.close();
    }

    #[test]
    fn session_reset_runs_on_every_return() {
        let hooks = CounterHooks::new();
        let pool = Pool::with_hooks(hooks.clone(), small_options()).unwrap();
        for _ in 0..3 {
            let conn = pool.get().unwrap();
            drop(conn);
        }
        assert_eq!(hooks.resets.load(Ordering::SeqCst), 3);
        pool.close();
    }
}
