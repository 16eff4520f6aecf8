use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{LoadArgs, StoreArgs};
use crate::model::MetadataSeed;
use crate::store::{load_seed, open_store, set_metadata_value};
use crate::util::sha256_hex;

pub fn run(store: &StoreArgs, args: LoadArgs) -> Result<()> {
    let raw = fs::read(&args.source)
        .with_context(|| format!("failed to read {}", args.source.display()))?;
    let seed: MetadataSeed = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.source.display()))?;
    let sha256 = sha256_hex(&raw);

    let db_path = store.resolved_db_path();
    let mut connection = open_store(&db_path)?;
    let counts = load_seed(&mut connection, &seed)
        .with_context(|| format!("failed to load {}", args.source.display()))?;

    set_metadata_value(&connection, "seed_path", &args.source.display().to_string())?;
    set_metadata_value(&connection, "seed_sha256", &sha256)?;

    info!(
        path = %db_path.display(),
        source = %args.source.display(),
        sha256 = %sha256,
        members = counts.members,
        member_list_items = counts.member_list_items,
        "load completed"
    );
    Ok(())
}
