use crate::connection::{MySqlCore, buffer_result};
use crate::values::{from_mysql_error, to_mysql_value};
use mysql::prelude::Queryable;
use mysql::{Params, Statement};
use silo_core::{
    DbError, ErrorKind, ParamSlots, PreparedStatement, Result, ResultSet, Value,
};
use std::sync::{Arc, Weak};

/// Server-prepared MySQL statement with positional parameters.
pub struct MySqlPreparedStatement {
    core: Weak<MySqlCore>,
    statement: Statement,
    params: ParamSlots,
    closed: bool,
}

impl MySqlPreparedStatement {
    pub(crate) fn new(core: Weak<MySqlCore>, statement: Statement, params: ParamSlots) -> Self {
        Self {
            core,
            statement,
            params,
            closed: false,
        }
    }

    fn core(&self) -> Result<Arc<MySqlCore>> {
        if self.closed {
            return Err(DbError::new(
                "K2EQ7DZVW5RY",
                ErrorKind::StatementClosed,
                "statement is closed",
            ));
        }
        let core = self.core.upgrade().ok_or_else(|| {
            DbError::new(
                "B6NG1TJXH9SC",
                ErrorKind::ConnectionClosed,
                "owning connection is gone",
            )
        })?;
        drop(core.guard()?);
        Ok(core)
    }

    fn wire_params(&self) -> Result<Params> {
        if self.params.is_empty() {
            return Ok(Params::Empty);
        }
        let values = self
            .params
            .values()
            .iter()
            .map(to_mysql_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(Params::Positional(values))
    }
}

impl PreparedStatement for MySqlPreparedStatement {
    fn set_value(&mut self, index: usize, value: Value) -> Result<()> {
        self.core()?;
        self.params.set(index, value)
    }

    fn clear_parameters(&mut self) -> Result<()> {
        self.core()?;
        self.params.clear();
        Ok(())
    }

    fn execute_query(&mut self) -> Result<Box<dyn ResultSet>> {
        let core = self.core()?;
        let params = self.wire_params()?;
        let mut state = core.guard()?;
        MySqlCore::ensure_tx(&mut state)?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let mut result = conn
            .exec_iter(&self.statement, params)
            .map_err(|e| from_mysql_error("D3WU8MKRF0PJ", e))?;
        buffer_result(&mut result)
    }

    fn execute_update(&mut self) -> Result<u64> {
        let core = self.core()?;
        let params = self.wire_params()?;
        let mut state = core.guard()?;
        MySqlCore::ensure_tx(&mut state)?;
        let conn = state.conn.as_mut().expect("guarded connection");
        let result = conn
            .exec_iter(&self.statement, params)
            .map_err(|e| from_mysql_error("X1PA5YQEN7VL", e))?;
        Ok(result.affected_rows())
    }

    fn execute(&mut self) -> Result<bool> {
        let mut rows = self.execute_query()?;
        let produced = rows.column_count() > 0;
        rows.close()?;
        Ok(produced)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(core) = self.core.upgrade() {
            if let Ok(mut state) = core.guard() {
                let conn = state.conn.as_mut().expect("guarded connection");
                if let Err(error) = conn.close(self.statement.clone()) {
                    log::warn!("error deallocating mysql statement: {error}");
                }
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MySqlPreparedStatement {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::warn!("error closing mysql statement in drop: {error}");
        }
    }
}
