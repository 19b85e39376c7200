//! Redis driver for silo.
//!
//! Key-value family: a thin blocking wrapper exposing `ping` and verbatim
//! commands whose replies map onto [`silo_core::KvReply`]. The URL target
//! is the numeric database index, defaulting to 0.

mod connection;
mod driver;

pub use connection::*;
pub use driver::*;
