use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::engine::ConsolidationType;
use crate::slice::{Axis, AxisSpecs};

#[derive(Parser, Debug)]
#[command(
    name = "cubeop",
    version,
    about = "Bulk allocate, calculate, translate and consolidate over subcubes"
)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Load(LoadArgs),
    Allocate(OperationArgs),
    Calculate(ForcedOperationArgs),
    Translate(ForcedOperationArgs),
    Consolidate(ConsolidateArgs),
    Members(MembersArgs),
    MemberLists(MemberListsArgs),
    ListMembers(ListMembersArgs),
    Status,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, global = true, default_value = ".cache/cubeop")]
    pub cache_root: PathBuf,

    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("cube.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_root.join("manifests")
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// JSON metadata seed file.
    #[arg(long)]
    pub source: PathBuf,
}

/// Member specifications for the four entity-level axes.
#[derive(Args, Debug, Clone, Default)]
pub struct EntityAxisArgs {
    #[arg(long = "scenario")]
    pub scenarios: Vec<String>,

    #[arg(long = "year")]
    pub years: Vec<String>,

    #[arg(long = "period")]
    pub periods: Vec<String>,

    #[arg(long = "entity")]
    pub entities: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stop after this many POVs (at least 1).
    #[arg(long)]
    pub max_povs: Option<NonZeroUsize>,

    /// Warn when a single engine call runs longer than this many seconds (at least 1).
    #[arg(long)]
    pub stall_warn_secs: Option<NonZeroU64>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct OperationArgs {
    #[command(flatten)]
    pub axes: EntityAxisArgs,

    #[arg(long = "value")]
    pub values: Vec<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ForcedOperationArgs {
    #[command(flatten)]
    pub operation: OperationArgs,

    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ConsolidateArgs {
    #[command(flatten)]
    pub axes: EntityAxisArgs,

    #[arg(long, value_enum, default_value_t = ConsolidationType::Impacted)]
    pub consolidation_type: ConsolidationType,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MembersArgs {
    #[arg(long)]
    pub dimension: String,

    /// Wildcard pattern (`*`, `?`) matched against member labels.
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MemberListsArgs {
    #[arg(long)]
    pub dimension: String,
}

#[derive(Args, Debug, Clone)]
pub struct ListMembersArgs {
    #[arg(long)]
    pub dimension: String,

    /// Member specification, e.g. `{Group.[Base]}`.
    #[arg(long)]
    pub member_list: String,
}

impl EntityAxisArgs {
    /// Axes given no members on the command line stay unassigned.
    pub fn axis_specs(&self) -> AxisSpecs {
        let mut specs = AxisSpecs::new();
        for (axis, values) in [
            (Axis::Scenario, &self.scenarios),
            (Axis::Year, &self.years),
            (Axis::Period, &self.periods),
            (Axis::Entity, &self.entities),
        ] {
            if !values.is_empty() {
                specs.set(axis, values.iter().cloned());
            }
        }
        specs
    }
}

impl OperationArgs {
    pub fn axis_specs(&self) -> AxisSpecs {
        let mut specs = self.axes.axis_specs();
        if !self.values.is_empty() {
            specs.set(Axis::Value, self.values.iter().cloned());
        }
        specs
    }
}

pub fn default_manifest_path(dir: &Path, operation: &str, run_id: &str) -> PathBuf {
    dir.join(format!("{operation}-{run_id}.json"))
}
