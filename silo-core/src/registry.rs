use crate::{
    ColumnarConnection, ConnectionUrl, DbError, DocumentConnection, Driver, ErrorKind,
    KvConnection, RelationalConnection, Result,
};
use std::sync::{Arc, Mutex, OnceLock};

// Process-wide driver directory. Populated by explicit registration before
// first use, never torn down.
static DRIVERS: OnceLock<Mutex<Vec<Arc<dyn Driver>>>> = OnceLock::new();

fn drivers() -> &'static Mutex<Vec<Arc<dyn Driver>>> {
    DRIVERS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a driver.
///
/// Idempotent for the same tag-driver pair: re-registering the identical
/// driver instance under the same name is a no-op. Distinct instances are
/// appended and resolved in insertion order.
pub fn register_driver(driver: Arc<dyn Driver>) {
    let mut registered = drivers().lock().expect("driver registry poisoned");
    if registered
        .iter()
        .any(|d| d.name() == driver.name() && Arc::ptr_eq(d, &driver))
    {
        return;
    }
    log::info!(
        "registering driver `{}` ({} family)",
        driver.name(),
        driver.family()
    );
    registered.push(driver);
}

/// Names of all registered drivers, in resolution order.
pub fn registered_drivers() -> Vec<&'static str> {
    drivers()
        .lock()
        .expect("driver registry poisoned")
        .iter()
        .map(|d| d.name())
        .collect()
}

/// First registered driver whose accepts-URL predicate matches.
pub fn driver_for(url: &str) -> Result<Arc<dyn Driver>> {
    let registered = drivers().lock().expect("driver registry poisoned");
    registered
        .iter()
        .find(|d| d.accepts_url(url))
        .cloned()
        .ok_or_else(|| {
            DbError::new(
                "S8VJ2MFYQ6LB",
                ErrorKind::NoDriver,
                format!("no registered driver accepts `{url}`"),
            )
        })
}

pub fn connect_relational(url: &str) -> Result<Box<dyn RelationalConnection>> {
    let driver = driver_for(url)?;
    driver.connect_relational(&ConnectionUrl::parse(url)?)
}

pub fn connect_document(url: &str) -> Result<Box<dyn DocumentConnection>> {
    let driver = driver_for(url)?;
    driver.connect_document(&ConnectionUrl::parse(url)?)
}

pub fn connect_columnar(url: &str) -> Result<Box<dyn ColumnarConnection>> {
    let driver = driver_for(url)?;
    driver.connect_columnar(&ConnectionUrl::parse(url)?)
}

pub fn connect_kv(url: &str) -> Result<Box<dyn KvConnection>> {
    let driver = driver_for(url)?;
    driver.connect_kv(&ConnectionUrl::parse(url)?)
}
