//! MySQL driver for silo.
//!
//! MySQL is a buffered-model backend: `execute_query` materializes every
//! row client side, so result sets are independent of the connection once
//! built. Session state (auto-commit, isolation) is managed with explicit
//! `SET` statements on the wire.

mod connection;
mod driver;
mod statement;
mod values;

pub use connection::*;
pub use driver::*;
pub use statement::*;
