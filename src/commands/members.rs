use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{ListMembersArgs, MemberListsArgs, MembersArgs, StoreArgs};
use crate::member::Member;
use crate::metadata::{MetadataService, SqliteMetadata};
use crate::session::Session;
use crate::store::open_store;
use crate::util::wildcard_regex;

pub fn run_members(store: &StoreArgs, args: MembersArgs) -> Result<()> {
    let connection = open_store(&store.resolved_db_path())?;
    let metadata = SqliteMetadata::new(&connection);
    let labels = member_labels(&metadata, &args.dimension, args.filter.as_deref())?;

    write_lines(&labels)?;
    info!(dimension = %args.dimension, count = labels.len(), "members listed");
    Ok(())
}

pub fn run_member_lists(store: &StoreArgs, args: MemberListsArgs) -> Result<()> {
    let connection = open_store(&store.resolved_db_path())?;
    let metadata = SqliteMetadata::new(&connection);
    let mut session = Session::new(&metadata)?;
    let dimension = session.dimension(&args.dimension)?;
    let names = metadata.member_list_names(&dimension)?;

    write_lines(&names)?;
    info!(dimension = %dimension.name, count = names.len(), "member lists listed");
    Ok(())
}

pub fn run_list_members(store: &StoreArgs, args: ListMembersArgs) -> Result<()> {
    let connection = open_store(&store.resolved_db_path())?;
    let metadata = SqliteMetadata::new(&connection);
    let members = resolve_members(&metadata, &args.dimension, &args.member_list)?;

    let lines: Vec<String> = members.iter().map(member_line).collect();
    write_lines(&lines)?;
    info!(
        dimension = %args.dimension,
        spec = %args.member_list,
        count = members.len(),
        "member specification resolved"
    );
    Ok(())
}

/// Labels of `dimension` in store order, optionally narrowed by a `*`/`?`
/// wildcard pattern.
pub fn member_labels<M>(metadata: &M, dimension: &str, filter: Option<&str>) -> Result<Vec<String>>
where
    M: MetadataService + ?Sized,
{
    let mut session = Session::new(metadata)?;
    let dimension = session.dimension(dimension)?;
    let labels = metadata.member_labels(&dimension)?;

    let Some(pattern) = filter else {
        return Ok(labels);
    };
    let matcher =
        wildcard_regex(pattern).with_context(|| format!("invalid member filter '{pattern}'"))?;
    Ok(labels
        .into_iter()
        .filter(|label| matcher.is_match(label))
        .collect())
}

pub fn resolve_members<M>(metadata: &M, dimension: &str, spec: &str) -> Result<Vec<Member>>
where
    M: MetadataService + ?Sized,
{
    let mut session = Session::new(metadata)?;
    let members = session
        .resolve_members(dimension, &[spec])
        .with_context(|| format!("failed to resolve '{spec}'"))?;
    Ok(members.iter().cloned().collect())
}

fn member_line(member: &Member) -> String {
    match &member.parent {
        Some(parent) => format!("{}\t{}\t{}", member.id, parent.id, member),
        None => format!("{}\t\t{}", member.id, member),
    }
}

fn write_lines(lines: &[String]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    for line in lines {
        writeln!(output, "{line}")?;
    }
    output.flush()?;
    Ok(())
}
