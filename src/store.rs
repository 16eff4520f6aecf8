use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tracing::{info, warn};

use crate::metadata::sqlite::{LIST_KIND_STORED, LIST_KIND_SYSTEM, SYSTEM_LISTS, pov_key};
use crate::metadata::{CalcStatus, SqliteMetadata};
use crate::model::{CalcStatusSeed, LoadCounts, MetadataSeed};
use crate::session::Session;
use crate::slice::{Axis, AxisSpecs};
use crate::util::{ensure_directory, now_utc_string};

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

pub fn open_store(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dimensions (
          dimension_id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE COLLATE NOCASE,
          hierarchical INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS members (
          dimension_id INTEGER NOT NULL,
          member_id INTEGER NOT NULL,
          label TEXT NOT NULL COLLATE NOCASE,
          default_parent_id INTEGER,
          order_index INTEGER NOT NULL,
          PRIMARY KEY(dimension_id, member_id),
          UNIQUE(dimension_id, label),
          FOREIGN KEY(dimension_id) REFERENCES dimensions(dimension_id)
        );

        CREATE TABLE IF NOT EXISTS hierarchy (
          dimension_id INTEGER NOT NULL,
          parent_id INTEGER NOT NULL,
          child_id INTEGER NOT NULL,
          order_index INTEGER NOT NULL,
          PRIMARY KEY(dimension_id, parent_id, child_id),
          FOREIGN KEY(dimension_id) REFERENCES dimensions(dimension_id)
        );

        CREATE TABLE IF NOT EXISTS member_lists (
          list_id INTEGER PRIMARY KEY,
          dimension_id INTEGER NOT NULL,
          name TEXT NOT NULL COLLATE NOCASE,
          kind TEXT NOT NULL,
          UNIQUE(dimension_id, name),
          FOREIGN KEY(dimension_id) REFERENCES dimensions(dimension_id)
        );

        CREATE TABLE IF NOT EXISTS member_list_items (
          list_id INTEGER NOT NULL,
          order_index INTEGER NOT NULL,
          member_id INTEGER NOT NULL,
          parent_id INTEGER,
          PRIMARY KEY(list_id, order_index),
          FOREIGN KEY(list_id) REFERENCES member_lists(list_id)
        );

        CREATE TABLE IF NOT EXISTS calc_status (
          scenario_id INTEGER NOT NULL,
          year_id INTEGER NOT NULL,
          period_id INTEGER NOT NULL,
          entity_id INTEGER NOT NULL,
          parent_id INTEGER NOT NULL,
          value_id INTEGER NOT NULL,
          flags INTEGER NOT NULL,
          PRIMARY KEY(scenario_id, year_id, period_id, entity_id, parent_id, value_id)
        );

        CREATE TABLE IF NOT EXISTS journal (
          entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
          run_id TEXT NOT NULL,
          operation TEXT NOT NULL,
          pov TEXT NOT NULL,
          scenario_id INTEGER NOT NULL,
          year_id INTEGER NOT NULL,
          period_id INTEGER NOT NULL,
          entity_id INTEGER NOT NULL,
          parent_id INTEGER NOT NULL,
          value_id INTEGER NOT NULL,
          options TEXT NOT NULL,
          recorded_at TEXT NOT NULL
        );
        ",
        )
        .context("failed to initialize store schema")?;

    set_metadata_value(connection, "db_schema_version", DB_SCHEMA_VERSION)?;
    Ok(())
}

pub fn set_metadata_value(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [key, value],
        )
        .with_context(|| format!("failed to store metadata key {key}"))?;
    Ok(())
}

pub fn metadata_value(connection: &Connection, key: &str) -> Result<Option<String>> {
    use rusqlite::OptionalExtension;

    connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("failed to read metadata key {key}"))
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

/// Replaces the store's dimensions, members, lists and status with `seed`.
/// The journal is kept.
pub fn load_seed(connection: &mut Connection, seed: &MetadataSeed) -> Result<LoadCounts> {
    let mut counts = LoadCounts::default();

    let tx = connection.transaction()?;
    tx.execute_batch(
        "
        DELETE FROM calc_status;
        DELETE FROM member_list_items;
        DELETE FROM member_lists;
        DELETE FROM hierarchy;
        DELETE FROM members;
        DELETE FROM dimensions;
        ",
    )
    .context("failed to clear existing metadata")?;

    for (dimension_index, dimension) in seed.dimensions.iter().enumerate() {
        let dimension_id = dimension_index as i32 + 1;
        tx.execute(
            "INSERT INTO dimensions(dimension_id, name, hierarchical) VALUES(?1, ?2, ?3)",
            params![dimension_id, dimension.name.trim(), dimension.hierarchical],
        )
        .with_context(|| format!("failed to insert dimension {}", dimension.name))?;
        counts.dimensions += 1;

        let mut ids: HashMap<String, i32> = HashMap::new();
        for (member_index, member) in dimension.members.iter().enumerate() {
            let label = member.name.trim();
            if !is_addressable(label) {
                bail!(
                    "invalid member name '{}' in dimension {}",
                    member.name,
                    dimension.name
                );
            }
            let member_id = member_index as i32 + 1;
            if ids.insert(label.to_lowercase(), member_id).is_some() {
                bail!("duplicate member '{label}' in dimension {}", dimension.name);
            }
        }

        let mut edge_index: i64 = 0;
        for (member_index, member) in dimension.members.iter().enumerate() {
            let member_id = member_index as i32 + 1;
            let mut default_parent = None;
            for parent in &member.parents {
                let parent_id = *ids.get(&parent.trim().to_lowercase()).with_context(|| {
                    format!(
                        "parent '{parent}' of '{}' is not a member of {}",
                        member.name, dimension.name
                    )
                })?;
                default_parent.get_or_insert(parent_id);
                tx.execute(
                    "INSERT INTO hierarchy(dimension_id, parent_id, child_id, order_index)
                     VALUES(?1, ?2, ?3, ?4)",
                    params![dimension_id, parent_id, member_id, edge_index],
                )?;
                edge_index += 1;
                counts.hierarchy_edges += 1;
            }

            tx.execute(
                "INSERT INTO members(dimension_id, member_id, label, default_parent_id, order_index)
                 VALUES(?1, ?2, ?3, ?4, ?5)",
                params![
                    dimension_id,
                    member_id,
                    member.name.trim(),
                    default_parent,
                    member_index as i64
                ],
            )?;
            counts.members += 1;
        }

        for list in SYSTEM_LISTS {
            tx.execute(
                "INSERT INTO member_lists(dimension_id, name, kind) VALUES(?1, ?2, ?3)",
                params![dimension_id, list, LIST_KIND_SYSTEM],
            )?;
            counts.member_lists += 1;
        }
    }

    load_member_lists(&tx, seed, &mut counts)?;
    load_calc_status(&tx, &seed.calc_status, &mut counts)?;
    tx.commit()?;

    set_metadata_value(connection, "metadata_loaded_at", &now_utc_string())?;
    if let Some(application) = &seed.application {
        set_metadata_value(connection, "application", application)?;
    }

    info!(
        dimensions = counts.dimensions,
        members = counts.members,
        member_lists = counts.member_lists,
        calc_status_rows = counts.calc_status_rows,
        "metadata loaded"
    );
    Ok(counts)
}

/// Stored lists are resolved in file order, so a list may reference lists
/// defined before it.
/// Names must survive the member-spec grammar: no separators or braces.
fn is_addressable(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', '{', '}'])
}

fn load_member_lists(
    connection: &Connection,
    seed: &MetadataSeed,
    counts: &mut LoadCounts,
) -> Result<()> {
    let metadata = SqliteMetadata::new(connection);
    let mut session = Session::new(&metadata)?;

    for list in &seed.member_lists {
        let dimension = session
            .dimension(&list.dimension)
            .with_context(|| format!("member list {} references an unknown dimension", list.name))?;
        let name = list.name.trim();
        if !is_addressable(name) {
            bail!(
                "invalid member list name '{}' in dimension {}",
                list.name,
                list.dimension
            );
        }
        let members = session
            .resolve_members(&list.dimension, &list.members)
            .with_context(|| format!("failed to resolve members of list {}", list.name))?;

        connection
            .execute(
                "INSERT INTO member_lists(dimension_id, name, kind) VALUES(?1, ?2, ?3)",
                params![dimension.id.0, name, LIST_KIND_STORED],
            )
            .with_context(|| format!("failed to insert member list {}", list.name))?;
        let list_id = connection.last_insert_rowid();
        counts.member_lists += 1;
        if members.is_empty() {
            warn!(
                dimension = %members.dimension().name,
                list = %list.name,
                "member list resolved to no members"
            );
        }

        let items = members.member_ids().into_iter().zip(members.parent_ids());
        for (order_index, (member, parent)) in items.enumerate() {
            connection.execute(
                "INSERT INTO member_list_items(list_id, order_index, member_id, parent_id)
                 VALUES(?1, ?2, ?3, ?4)",
                params![list_id, order_index as i64, member.0, parent.map(|parent| parent.0)],
            )?;
            counts.member_list_items += 1;
        }
    }
    Ok(())
}

fn load_calc_status(
    connection: &Connection,
    entries: &[CalcStatusSeed],
    counts: &mut LoadCounts,
) -> Result<()> {
    let metadata = SqliteMetadata::new(connection);
    let mut session = Session::new(&metadata)?;

    for entry in entries {
        let flags = CalcStatus::from_names(entry.flags.iter().map(String::as_str))
            .with_context(|| format!("unknown calc status flag in {:?}", entry.flags))?;

        let mut specs = AxisSpecs::new()
            .with(Axis::Scenario, entry.scenario.iter().cloned())
            .with(Axis::Year, entry.year.iter().cloned())
            .with(Axis::Period, entry.period.iter().cloned())
            .with(Axis::Entity, entry.entity.iter().cloned());
        if let Some(values) = &entry.value {
            specs.set(Axis::Value, values.iter().cloned());
        }

        let slice = session
            .build_slice(&specs)
            .context("failed to resolve calc status members")?;
        for pov in &slice.combos() {
            let key = pov_key(&pov);
            connection.execute(
                "INSERT INTO calc_status(scenario_id, year_id, period_id, entity_id, parent_id, value_id, flags)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(scenario_id, year_id, period_id, entity_id, parent_id, value_id)
                 DO UPDATE SET flags = flags | excluded.flags",
                params![key[0], key[1], key[2], key[3], key[4], key[5], flags.bits()],
            )?;
            counts.calc_status_rows += 1;
        }
    }
    Ok(())
}
