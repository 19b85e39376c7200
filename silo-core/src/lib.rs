//! Core abstractions of the silo data layer.
//!
//! Everything backend-neutral lives here: the error taxonomy, the blob and
//! stream types, connection URLs, the process-wide driver registry, the
//! four connection family contracts, prepared statements and result sets,
//! the pooled connection lifecycle and the named transaction manager.
//! Backend drivers live in their own crates and plug in through
//! [`register_driver`].

mod blob;
mod config;
mod connection;
mod connection_url;
mod driver;
mod error;
mod isolation;
mod pool;
mod registry;
mod result_set;
mod statement;
mod stream;
mod tx;
mod value;

pub use blob::*;
pub use config::*;
pub use connection::*;
pub use connection_url::*;
pub use driver::*;
pub use error::*;
pub use isolation::*;
pub use pool::*;
pub use registry::*;
pub use result_set::*;
pub use statement::*;
pub use stream::*;
pub use tx::*;
pub use value::*;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DbError>;
