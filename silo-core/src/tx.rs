use crate::{
    DbError, ErrorKind, PooledConnection, RelationalConnection, RelationalPool,
    RelationalPoolHooks, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Shared handle to a connection enrolled in a named transaction.
///
/// Borrowed from the manager; callers run statements through it but must
/// not close it — commit, rollback and reaping are the manager's job, and
/// the underlying connection flows back to the pool when the last handle
/// drops after the entry is removed.
pub type TransactionConnection = Arc<PooledConnection<RelationalPoolHooks>>;

struct TxContext {
    conn: TransactionConnection,
    last_access: Instant,
}

struct TmInner {
    pool: RelationalPool,
    transactions: Mutex<HashMap<String, TxContext>>,
    timeout_ms: AtomicU64,
    running: AtomicBool,
    reaper_gate: Mutex<()>,
    reaper_wakeup: Condvar,
}

/// Directory of named in-flight transactions over a relational pool.
///
/// `begin_transaction` borrows a connection, turns auto-commit off and
/// files it under a fresh UUID so later requests — possibly on other
/// threads — can pick the same transaction back up by id. Idle
/// transactions are rolled back by a reaper thread on a fixed cadence.
pub struct TransactionManager {
    inner: Arc<TmInner>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionManager {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);
    pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(5_000);

    pub fn new(pool: RelationalPool) -> Result<Self> {
        Self::with_settings(pool, Self::DEFAULT_TIMEOUT, Self::DEFAULT_REAP_INTERVAL)
    }

    pub fn with_settings(
        pool: RelationalPool,
        timeout: Duration,
        reap_interval: Duration,
    ) -> Result<Self> {
        let inner = Arc::new(TmInner {
            pool,
            transactions: Mutex::new(HashMap::new()),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            running: AtomicBool::new(true),
            reaper_gate: Mutex::new(()),
            reaper_wakeup: Condvar::new(),
        });
        let weak = Arc::downgrade(&inner);
        let handle = std::thread::Builder::new()
            .name("silo-tx-reaper".to_string())
            .spawn(move || reaper_loop(weak, reap_interval))
            .map_err(|e| {
                DbError::new(
                    "P9DK4WYHF2LU",
                    ErrorKind::ConnectFailure,
                    format!("cannot spawn transaction reaper: {e}"),
                )
            })?;
        Ok(Self {
            inner,
            reaper: Mutex::new(Some(handle)),
        })
    }

    /// Borrow a connection, disable auto-commit and register it under a
    /// fresh transaction id.
    pub fn begin_transaction(&self) -> Result<String> {
        let conn = self.inner.pool.get()?;
        conn.set_auto_commit(false)?;
        let id = Uuid::new_v4().as_hyphenated().to_string();
        let mut transactions = self
            .inner
            .transactions
            .lock()
            .expect("transaction map poisoned");
        transactions.insert(
            id.clone(),
            TxContext {
                conn: Arc::new(conn),
                last_access: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Look up the connection enrolled under `id`, refreshing its
    /// last-access time.
    pub fn transaction_connection(&self, id: &str) -> Result<TransactionConnection> {
        let mut transactions = self
            .inner
            .transactions
            .lock()
            .expect("transaction map poisoned");
        let ctx = transactions.get_mut(id).ok_or_else(|| unknown(id))?;
        ctx.last_access = Instant::now();
        Ok(ctx.conn.clone())
    }

    pub fn commit_transaction(&self, id: &str) -> Result<()> {
        self.inner.finish(id, true)
    }

    pub fn rollback_transaction(&self, id: &str) -> Result<()> {
        self.inner.finish(id, false)
    }

    /// True while the id is registered and within the idle timeout. An
    /// expired transaction is rolled back inline and reported inactive.
    pub fn is_transaction_active(&self, id: &str) -> bool {
        let expired = {
            let transactions = self
                .inner
                .transactions
                .lock()
                .expect("transaction map poisoned");
            match transactions.get(id) {
                None => return false,
                Some(ctx) => ctx.last_access.elapsed() > self.inner.timeout(),
            }
        };
        if expired {
            if let Err(error) = self.inner.finish(id, false) {
                log::warn!("rollback of expired transaction {id} failed: {error}");
            }
            return false;
        }
        true
    }

    pub fn active_transaction_count(&self) -> usize {
        self.inner
            .transactions
            .lock()
            .expect("transaction map poisoned")
            .len()
    }

    /// Update the idle threshold applied to current and future transactions.
    pub fn set_transaction_timeout(&self, timeout: Duration) {
        self.inner
            .timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    /// Stop the reaper and roll back every remaining transaction.
    /// Idempotent.
    pub fn close(&self) {
        {
            // Flip the flag and notify under the gate so the reaper either
            // sees the flag before sleeping or is woken out of its sleep.
            let _gate = self.inner.reaper_gate.lock().expect("reaper gate poisoned");
            if !self.inner.running.swap(false, Ordering::SeqCst) {
                return;
            }
            self.inner.reaper_wakeup.notify_all();
        }
        let handle = self.reaper.lock().expect("reaper slot poisoned").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("transaction reaper panicked");
            }
        }
        let ids: Vec<String> = {
            let transactions = self
                .inner
                .transactions
                .lock()
                .expect("transaction map poisoned");
            transactions.keys().cloned().collect()
        };
        for id in ids {
            if let Err(error) = self.inner.finish(&id, false) {
                log::warn!("rollback of transaction {id} during shutdown failed: {error}");
            }
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl TmInner {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst))
    }

    /// Remove the entry, then commit or roll back. Auto-commit is restored
    /// even when the terminal operation fails, and the connection returns
    /// to the pool once the last shared handle drops.
    fn finish(&self, id: &str, commit: bool) -> Result<()> {
        let ctx = {
            let mut transactions = self.transactions.lock().expect("transaction map poisoned");
            transactions.remove(id).ok_or_else(|| unknown(id))?
        };
        let outcome = if commit {
            ctx.conn.commit()
        } else {
            ctx.conn.rollback()
        };
        let restored = ctx.conn.set_auto_commit(true);
        match outcome {
            Ok(()) => restored,
            Err(error) => {
                if let Err(restore_error) = restored {
                    log::warn!("auto-commit restore after failed finish: {restore_error}");
                }
                Err(error)
            }
        }
    }

    /// One reaper pass: roll back every transaction past the idle timeout.
    fn reap(&self) {
        let timeout = self.timeout();
        let expired: Vec<String> = {
            let transactions = self.transactions.lock().expect("transaction map poisoned");
            transactions
                .iter()
                .filter(|(_, ctx)| ctx.last_access.elapsed() > timeout)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in expired {
            log::info!("reaping idle transaction {id}");
            if let Err(error) = self.finish(&id, false) {
                log::warn!("rollback of reaped transaction {id} failed: {error}");
            }
        }
    }
}

fn reaper_loop(weak: Weak<TmInner>, interval: Duration) {
    loop {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        {
            let gate = inner.reaper_gate.lock().expect("reaper gate poisoned");
            if !inner.running.load(Ordering::SeqCst) {
                return;
            }
            let (_gate, _) = inner
                .reaper_wakeup
                .wait_timeout(gate, interval)
                .expect("reaper gate poisoned");
        }
        if !inner.running.load(Ordering::SeqCst) {
            return;
        }
        inner.reap();
        drop(inner);
    }
}

fn unknown(id: &str) -> DbError {
    DbError::new(
        "X6TM0RBGQ4ZC",
        ErrorKind::UnknownTransaction,
        format!("transaction {id} is not registered"),
    )
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    #[test]
    fn generated_ids_are_version_4_uuids() {
        let id = Uuid::new_v4().as_hyphenated().to_string();
        assert_eq!(id.len(), 36);
        let groups: Vec<&str> = id.split('-').collect();
        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(groups[2].starts_with('4'));
        assert!(matches!(
            groups[3].chars().next().unwrap(),
            '8' | '9' | 'a' | 'b'
        ));
    }
}
