//! Calculation engine collaborator.

use clap::ValueEnum;
use serde::Serialize;

use crate::error::EngineError;
use crate::slice::Pov;

pub mod journal;

pub use journal::JournalEngine;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsolidationType {
    All,
    AllWithData,
    EntityOnly,
    ForceEntityOnly,
    /// Only POVs whose status says they need it.
    Impacted,
}

impl ConsolidationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::AllWithData => "all-with-data",
            Self::EntityOnly => "entity-only",
            Self::ForceEntityOnly => "force-entity-only",
            Self::Impacted => "impacted",
        }
    }
}

/// One synchronous call per POV and operation kind. Implementations are not
/// expected to be safe for concurrent use.
pub trait CalcEngine {
    fn allocate(&mut self, pov: &Pov<'_>) -> Result<(), EngineError>;

    fn calculate(&mut self, pov: &Pov<'_>, force: bool) -> Result<(), EngineError>;

    fn translate(&mut self, pov: &Pov<'_>, force: bool) -> Result<(), EngineError>;

    fn consolidate(
        &mut self,
        pov: &Pov<'_>,
        consolidation_type: ConsolidationType,
    ) -> Result<(), EngineError>;
}
