//! ScyllaDB / Cassandra driver for silo.
//!
//! Columnar family: CQL statements with bound parameters, fully buffered
//! result sets. The native client is asynchronous; each connection embeds
//! a current-thread runtime and drives it to completion under the
//! per-connection mutex, so the blocking core contract holds.

mod connection;
mod driver;
mod statement;
mod values;

pub use connection::*;
pub use driver::*;
pub use statement::*;
