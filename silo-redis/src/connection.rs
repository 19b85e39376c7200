use silo_core::{
    Connection, ConnectionUrl, DbError, ErrorKind, KvConnection, KvReply, Result,
};
use std::sync::{Mutex, MutexGuard};

pub(crate) fn from_redis_error(mark: &'static str, error: redis::RedisError) -> DbError {
    if error.is_connection_refusal() || error.is_io_error() {
        return DbError::new(mark, ErrorKind::ConnectFailure, error.to_string());
    }
    DbError::backend(
        mark,
        error.code().unwrap_or("ERR").to_string(),
        error.to_string(),
    )
}

fn to_kv_reply(value: redis::Value) -> KvReply {
    match value {
        redis::Value::Nil => KvReply::Nil,
        redis::Value::Okay => KvReply::Status("OK".to_string()),
        redis::Value::SimpleString(text) => KvReply::Status(text),
        redis::Value::Int(v) => KvReply::Integer(v),
        redis::Value::BulkString(bytes) => KvReply::Data(bytes),
        redis::Value::Array(items) => {
            KvReply::Array(items.into_iter().map(to_kv_reply).collect())
        }
        redis::Value::Set(items) => {
            KvReply::Array(items.into_iter().map(to_kv_reply).collect())
        }
        redis::Value::Map(pairs) => KvReply::Array(
            pairs
                .into_iter()
                .flat_map(|(k, v)| [to_kv_reply(k), to_kv_reply(v)])
                .collect(),
        ),
        redis::Value::Double(v) => KvReply::Data(v.to_string().into_bytes()),
        redis::Value::Boolean(v) => KvReply::Integer(v as i64),
        other => KvReply::Status(format!("{other:?}")),
    }
}

struct RedisState {
    conn: Option<redis::Connection>,
    db_index: u32,
}

/// Open Redis session.
pub struct RedisConnection {
    url: String,
    state: Mutex<RedisState>,
}

impl RedisConnection {
    pub(crate) fn open(url: &ConnectionUrl) -> Result<Self> {
        let db_index = url.db_index()?;
        let auth = match (url.username(), url.password()) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (None, Some(password)) => format!(":{password}@"),
            _ => String::new(),
        };
        let native_url = format!(
            "redis://{auth}{}:{}/{db_index}",
            url.host(),
            url.port().unwrap_or(6379)
        );
        let client = redis::Client::open(native_url)
            .map_err(|e| from_redis_error("N7KD2WSXQ4BJ", e))?;
        let conn = client.get_connection().map_err(|e| {
            let error = from_redis_error("H1VG8EMCT5YA", e);
            log::error!("redis connect failed: {error}");
            error
        })?;
        log::debug!("connected to redis at {}", url.authority(6379));
        Ok(Self {
            url: url.as_str().to_string(),
            state: Mutex::new(RedisState {
                conn: Some(conn),
                db_index,
            }),
        })
    }

    fn guard(&self) -> Result<MutexGuard<'_, RedisState>> {
        let state = self.state.lock().expect("redis state poisoned");
        if state.conn.is_none() {
            return Err(DbError::new(
                "S3FU6JRLZ0PW",
                ErrorKind::ConnectionClosed,
                "redis connection is closed",
            ));
        }
        Ok(state)
    }
}

impl Connection for RedisConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn is_closed(&self) -> bool {
        self.state
            .lock()
            .expect("redis state poisoned")
            .conn
            .is_none()
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock().expect("redis state poisoned");
        // Dropping the client connection closes the socket.
        state.conn.take();
        Ok(())
    }

    fn reset_for_pool(&self) -> Result<()> {
        let mut state = self.guard()?;
        let index = state.db_index;
        let conn = state.conn.as_mut().expect("guarded connection");
        // Re-select the configured database in case a borrower switched.
        redis::cmd("SELECT")
            .arg(index)
            .query::<()>(conn)
            .map_err(|e| from_redis_error("B9QY4TNEK7XC", e))
    }
}

impl KvConnection for RedisConnection {
    fn ping(&self) -> Result<()> {
        let mut state = self.guard()?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let reply: String = redis::cmd("PING")
            .query(conn)
            .map_err(|e| from_redis_error("G5WM1ZAJD8RV", e))?;
        if reply != "PONG" {
            return Err(DbError::new(
                "K2TH7CQBN6SE",
                ErrorKind::ValidationFailed,
                format!("unexpected ping reply `{reply}`"),
            ));
        }
        Ok(())
    }

    fn command(&self, parts: &[&str]) -> Result<KvReply> {
        let Some((&name, args)) = parts.split_first() else {
            return Err(DbError::new(
                "V8XL3PFYU1MD",
                ErrorKind::BindError,
                "empty command",
            ));
        };
        let mut state = self.guard()?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let mut command = redis::cmd(name);
        for arg in args {
            command.arg(*arg);
        }
        let value: redis::Value = command
            .query(conn)
            .map_err(|e| from_redis_error("Z4RN9HGWS2KQ", e))?;
        Ok(to_kv_reply(value))
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing redis connection in drop: {error}");
        }
    }
}
