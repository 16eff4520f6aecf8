use rusqlite::{Connection, params};
use serde_json::{Value, json};
use tracing::debug;

use super::{CalcEngine, ConsolidationType};
use crate::error::EngineError;
use crate::metadata::CalcStatus;
use crate::metadata::sqlite::{POV_STATUS_FILTER, pov_key, read_calc_status};
use crate::slice::Pov;
use crate::util::now_utc_string;

/// Engine backed by the local store: every call is appended to the
/// `journal` table and clears the status flag the operation resolves.
/// Allocation only journals.
pub struct JournalEngine<'c> {
    connection: &'c Connection,
    run_id: String,
}

impl<'c> JournalEngine<'c> {
    pub fn new(connection: &'c Connection, run_id: impl Into<String>) -> Self {
        Self {
            connection,
            run_id: run_id.into(),
        }
    }

    fn record(
        &self,
        operation: &str,
        pov: &Pov<'_>,
        options: Value,
        resolves: CalcStatus,
    ) -> Result<(), EngineError> {
        let status = read_calc_status(self.connection, pov)?;
        if status.contains(CalcStatus::LOCKED) {
            return Err(format!("{pov} is locked").into());
        }

        let key = pov_key(pov);
        self.connection.execute(
            "INSERT INTO journal(run_id, operation, pov, scenario_id, year_id, period_id,
               entity_id, parent_id, value_id, options, recorded_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                self.run_id,
                operation,
                pov.to_string(),
                key[0],
                key[1],
                key[2],
                key[3],
                key[4],
                key[5],
                options.to_string(),
                now_utc_string()
            ],
        )?;

        if !resolves.is_empty() {
            let cleared = self.connection.execute(
                &format!("UPDATE calc_status SET flags = flags & ~?7 WHERE {POV_STATUS_FILTER}"),
                params![key[0], key[1], key[2], key[3], key[4], key[5], resolves.bits()],
            )?;
            debug!(pov = %pov, rows = cleared, "status updated");
        }
        Ok(())
    }
}

impl CalcEngine for JournalEngine<'_> {
    fn allocate(&mut self, pov: &Pov<'_>) -> Result<(), EngineError> {
        self.record("allocate", pov, json!({}), CalcStatus::empty())
    }

    fn calculate(&mut self, pov: &Pov<'_>, force: bool) -> Result<(), EngineError> {
        self.record(
            "calculate",
            pov,
            json!({ "force": force }),
            CalcStatus::NEEDS_CALCULATION,
        )
    }

    fn translate(&mut self, pov: &Pov<'_>, force: bool) -> Result<(), EngineError> {
        self.record(
            "translate",
            pov,
            json!({ "force": force }),
            CalcStatus::NEEDS_TRANSLATION,
        )
    }

    fn consolidate(
        &mut self,
        pov: &Pov<'_>,
        consolidation_type: ConsolidationType,
    ) -> Result<(), EngineError> {
        self.record(
            "consolidate",
            pov,
            json!({ "consolidation_type": consolidation_type.as_str() }),
            CalcStatus::NEEDS_CONSOLIDATION,
        )
    }
}
