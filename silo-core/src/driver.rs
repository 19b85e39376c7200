use crate::{
    ColumnarConnection, ConnectionUrl, DbError, DocumentConnection, ErrorKind, KvConnection,
    RelationalConnection, Result,
};
use std::fmt::{self, Display, Formatter};

/// API shape a backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionFamily {
    Relational,
    Document,
    Columnar,
    KeyValue,
}

impl Display for ConnectionFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionFamily::Relational => "relational",
            ConnectionFamily::Document => "document",
            ConnectionFamily::Columnar => "columnar",
            ConnectionFamily::KeyValue => "key-value",
        })
    }
}

/// Backend connector: parses URLs it recognizes and opens connections of
/// its family.
///
/// Drivers are registered process wide (see [`crate::register_driver`]) and
/// resolved in insertion order by [`Driver::accepts_url`]. The four connect
/// methods are family typed; a driver implements exactly the one matching
/// [`Driver::family`] and leaves the rest at their `WrongFamily` defaults.
pub trait Driver: Send + Sync {
    /// Scheme tag, e.g. `mysql`. Also the default `accepts_url` match.
    fn name(&self) -> &'static str;

    fn family(&self) -> ConnectionFamily;

    fn accepts_url(&self, url: &str) -> bool {
        url.strip_prefix("silo:")
            .and_then(|rest| rest.strip_prefix(self.name()))
            .is_some_and(|rest| rest.starts_with("://"))
    }

    fn connect_relational(&self, url: &ConnectionUrl) -> Result<Box<dyn RelationalConnection>> {
        let _ = url;
        Err(wrong_family(self, ConnectionFamily::Relational))
    }

    fn connect_document(&self, url: &ConnectionUrl) -> Result<Box<dyn DocumentConnection>> {
        let _ = url;
        Err(wrong_family(self, ConnectionFamily::Document))
    }

    fn connect_columnar(&self, url: &ConnectionUrl) -> Result<Box<dyn ColumnarConnection>> {
        let _ = url;
        Err(wrong_family(self, ConnectionFamily::Columnar))
    }

    fn connect_kv(&self, url: &ConnectionUrl) -> Result<Box<dyn KvConnection>> {
        let _ = url;
        Err(wrong_family(self, ConnectionFamily::KeyValue))
    }
}

fn wrong_family(driver: &(impl Driver + ?Sized), requested: ConnectionFamily) -> DbError {
    DbError::new(
        "H4WN1TQK38RZ",
        ErrorKind::WrongFamily,
        format!(
            "driver `{}` serves the {} family, not {requested}",
            driver.name(),
            driver.family(),
        ),
    )
}
