use crate::RedisConnection;
use silo_core::{ConnectionFamily, ConnectionUrl, Driver, KvConnection, Result};

/// Redis driver. URL form: `silo:redis://host:6379/<db-index>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisDriver;

impl RedisDriver {
    pub const fn new() -> Self {
        Self
    }
}

impl Driver for RedisDriver {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn family(&self) -> ConnectionFamily {
        ConnectionFamily::KeyValue
    }

    fn connect_kv(&self, url: &ConnectionUrl) -> Result<Box<dyn KvConnection>> {
        Ok(Box::new(RedisConnection::open(url)?))
    }
}
