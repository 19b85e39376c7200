use crate::connection::{ScyllaCore, buffer_result};
use crate::values::to_cql_value;
use scylla::statement::prepared::PreparedStatement as NativeStatement;
use scylla::value::CqlValue;
use silo_core::{
    DbError, ErrorKind, ParamSlots, PreparedStatement, Result, ResultSet, Value,
};
use std::sync::{Arc, Weak};

/// Server-prepared CQL statement with positional parameters.
pub struct ScyllaPreparedStatement {
    core: Weak<ScyllaCore>,
    statement: NativeStatement,
    params: ParamSlots,
    closed: bool,
}

impl ScyllaPreparedStatement {
    pub(crate) fn new(core: Weak<ScyllaCore>, statement: NativeStatement, params: ParamSlots) -> Self {
        Self {
            core,
            statement,
            params,
            closed: false,
        }
    }

    fn core(&self) -> Result<Arc<ScyllaCore>> {
        if self.closed {
            return Err(DbError::new(
                "T0GB3YQEN6HU",
                ErrorKind::StatementClosed,
                "statement is closed",
            ));
        }
        let core = self.core.upgrade().ok_or_else(|| {
            DbError::new(
                "R7VJ1XWSM4AD",
                ErrorKind::ConnectionClosed,
                "owning connection is gone",
            )
        })?;
        drop(core.guard()?);
        Ok(core)
    }

    fn wire_params(&self) -> Result<Vec<Option<CqlValue>>> {
        self.params.values().iter().map(to_cql_value).collect()
    }

    fn run(&self) -> Result<Box<dyn ResultSet>> {
        let core = self.core()?;
        let params = self.wire_params()?;
        let state = core.guard()?;
        let bridge = state.as_ref().expect("guarded bridge");
        let result = bridge
            .runtime
            .block_on(bridge.session.execute_unpaged(&self.statement, params))
            .map_err(|e| DbError::backend("L5NK8CDQJ2XF", "scylla", e.to_string()))?;
        buffer_result(result)
    }
}

impl PreparedStatement for ScyllaPreparedStatement {
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
        self.run()
    }

    /// CQL does not report affected-row counts; successful execution
    /// returns 0.
    fn execute_update(&mut self) -> Result<u64> {
        self.run()?;
        Ok(0)
    }

    fn execute(&mut self) -> Result<bool> {
        let mut rows = self.run()?;
        let produced = rows.column_count() > 0;
        rows.close()?;
        Ok(produced)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
