pub mod audit;
pub mod clock;
pub mod error;
pub mod hooks;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod queries;
pub mod thread;
pub mod unread;

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info};

pub use audit::EditAuditLog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, StoreError};
pub use hooks::{ContentChange, MessageHook};
pub use notifications::NotificationDispatcher;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The entity store. One writer connection behind a mutex; every mutation
/// runs in a single IMMEDIATE transaction together with its hooks.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    hooks: RwLock<Vec<Arc<dyn MessageHook>>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets other connections to the file read while this one writes.
        // Within the process every call still queues on the single mutex.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let db = Self::init(conn, clock)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_clock(Arc::new(SystemClock))
    }

    pub fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, clock)
    }

    fn init(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        let db = Self {
            conn: Mutex::new(conn),
            clock,
            hooks: RwLock::new(Vec::new()),
        };
        db.register_hook(Arc::new(EditAuditLog))?;
        db.register_hook(Arc::new(NotificationDispatcher))?;
        Ok(db)
    }

    /// Appends a hook. Hooks run in registration order.
    pub fn register_hook(&self, hook: Arc<dyn MessageHook>) -> Result<()> {
        debug!(hook = hook.name(), "registering message hook");
        self.hooks
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(hook);
        Ok(())
    }

    pub(crate) fn hooks(&self) -> Result<Vec<Arc<dyn MessageHook>>> {
        Ok(self
            .hooks
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` in one atomic unit. Any error rolls everything back,
    /// including writes made by hooks.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}
