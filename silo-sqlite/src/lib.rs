//! SQLite driver for silo.
//!
//! SQLite is a cursor-model backend: every row advance and column read
//! flows through the `sqlite3*` connection handle, so result sets share
//! the owning connection's mutex. Statements and result sets hold weak
//! references to the connection core; closing the connection finalizes
//! every child statement handle first and only then releases the database
//! handle.

mod connection;
mod driver;
mod extract;
mod result_set;
mod statement;

pub use connection::*;
pub use driver::*;
pub use result_set::*;
pub use statement::*;
