//! MongoDB driver for silo.
//!
//! Document family: collections of JSON documents. The driver speaks BSON
//! to the server and converts at the boundary, so callers only ever see
//! `serde_json::Value`. Collection handles hold a weak reference to the
//! connection core and stop working the moment the connection closes.

mod connection;
mod driver;

pub use connection::*;
pub use driver::*;
