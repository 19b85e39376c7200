use crate::connection::PgCore;
use crate::values::{from_pg_column, from_pg_error, to_pg_param};
use postgres::Statement;
use postgres::types::ToSql;
use silo_core::{
    BufferedResultSet, DbError, ErrorKind, ParamSlots, PreparedStatement, Result, ResultSet,
    Value,
};
use std::sync::{Arc, Weak};

/// Server-prepared PostgreSQL statement with positional parameters.
pub struct PgPreparedStatement {
    core: Weak<PgCore>,
    statement: Statement,
    params: ParamSlots,
    closed: bool,
}

impl PgPreparedStatement {
    pub(crate) fn new(core: Weak<PgCore>, statement: Statement, params: ParamSlots) -> Self {
        Self {
            core,
            statement,
            params,
            closed: false,
        }
    }

    fn core(&self) -> Result<Arc<PgCore>> {
        if self.closed {
            return Err(DbError::new(
                "L6BQ9VYTM3EH",
                ErrorKind::StatementClosed,
                "statement is closed",
            ));
        }
        let core = self.core.upgrade().ok_or_else(|| {
            DbError::new(
                "C8ZW2KJDN7XP",
                ErrorKind::ConnectionClosed,
                "owning connection is gone",
            )
        })?;
        drop(core.guard()?);
        Ok(core)
    }

    /// Convert bind slots into wire parameters matching the statement's
    /// declared types.
    fn wire_params(&self) -> Result<Vec<Box<dyn ToSql + Sync>>> {
        self.params
            .values()
            .iter()
            .zip(self.statement.params())
            .map(|(value, ty)| to_pg_param(value, ty))
            .collect()
    }
}

impl PreparedStatement for PgPreparedStatement {
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
        PgCore::ensure_tx(&mut state)?;
        let client = state.client.as_mut().expect("guarded client");
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        let columns: Vec<String> = self
            .statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let fetched = client
            .query(&self.statement, &refs)
            .map_err(|e| from_pg_error("Y1TG5RSWA9DK", e))?;
        let mut rows = Vec::with_capacity(fetched.len());
        for row in &fetched {
            let values = (0..row.len())
                .map(|i| from_pg_column(row, i))
                .collect::<Result<Vec<_>>>()?;
            rows.push(values);
        }
        Ok(Box::new(BufferedResultSet::new(columns, rows)))
    }

    fn execute_update(&mut self) -> Result<u64> {
        let core = self.core()?;
        let params = self.wire_params()?;
        let mut state = core.guard()?;
        PgCore::ensure_tx(&mut state)?;
        let client = state.client.as_mut().expect("guarded client");
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
        client
            .execute(&self.statement, &refs)
            .map_err(|e| from_pg_error("F7NC0XEUJ4QB", e))
    }

    fn execute(&mut self) -> Result<bool> {
        let mut rows = self.execute_query()?;
        let produced = rows.column_count() > 0;
        rows.close()?;
        Ok(produced)
    }

    fn close(&mut self) -> Result<()> {
        // Statement deallocation happens when the last handle drops; the
        // client keeps prepared statements per session.
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
