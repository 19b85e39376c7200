use crate::SqliteConnection;
use silo_core::{
    ConnectionFamily, ConnectionUrl, Driver, RelationalConnection, Result,
};

/// SQLite driver. URL form: `silo:sqlite://<path>` where `<path>` is a
/// filesystem path or the literal `:memory:`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub const fn new() -> Self {
        Self
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn family(&self) -> ConnectionFamily {
        ConnectionFamily::Relational
    }

    fn connect_relational(&self, url: &ConnectionUrl) -> Result<Box<dyn RelationalConnection>> {
        let connection = SqliteConnection::open(url.target(), url.as_str(), url.options())?;
        Ok(Box::new(connection))
    }
}
