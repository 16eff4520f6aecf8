use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::ConsolidationType;
use crate::subcube::SubcubeOutcome;

/// Metadata seed file accepted by `cubeop load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSeed {
    #[serde(default)]
    pub application: Option<String>,
    pub dimensions: Vec<DimensionSeed>,
    #[serde(default)]
    pub member_lists: Vec<MemberListSeed>,
    #[serde(default)]
    pub calc_status: Vec<CalcStatusSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionSeed {
    pub name: String,
    #[serde(default)]
    pub hierarchical: bool,
    pub members: Vec<MemberSeed>,
}

/// The first parent listed is the member's default parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberSeed {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// A stored member list; each entry is a member specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberListSeed {
    pub dimension: String,
    pub name: String,
    pub members: Vec<String>,
}

/// Status flags applied to every POV of the given member specifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcStatusSeed {
    pub scenario: Vec<String>,
    pub year: Vec<String>,
    pub period: Vec<String>,
    pub entity: Vec<String>,
    #[serde(default)]
    pub value: Option<Vec<String>>,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadCounts {
    pub dimensions: usize,
    pub members: usize,
    pub hierarchy_edges: usize,
    pub member_lists: usize,
    pub member_list_items: usize,
    pub calc_status_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidation_type: Option<ConsolidationType>,
    pub max_povs: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub operation: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub db_path: String,
    pub options: OperationOptions,
    pub member_specs: BTreeMap<String, Vec<String>>,
    pub outcome: SubcubeOutcome,
    pub failure_reason: Option<String>,
}
