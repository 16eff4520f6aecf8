use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension, params};

use super::{
    CalcStatus, DimensionHandle, DimensionId, MemberId, MemberListId, MetadataService,
};
use crate::error::{CubeError, CubeResult};
use crate::slice::{Axis, Pov};

pub(crate) const LIST_KIND_STORED: &str = "stored";
pub(crate) const LIST_KIND_SYSTEM: &str = "system";

/// Lists every dimension gets when metadata is loaded.
pub(crate) const SYSTEM_LISTS: [&str; 4] = ["[Members]", "[Children]", "[Descendants]", "[Base]"];

/// Matches the status rows of one POV. An unconstrained value (-1) matches
/// every value row.
pub(crate) const POV_STATUS_FILTER: &str = "scenario_id = ?1 AND year_id = ?2 AND period_id = ?3
     AND entity_id = ?4 AND parent_id = ?5
     AND (?6 = -1 OR value_id = ?6 OR value_id = -1)";

/// Raw ids of a POV in `calc_status` column order, -1 for unconstrained.
pub(crate) fn pov_key(pov: &Pov<'_>) -> [i32; 6] {
    let raw = |id: Option<MemberId>| id.map(|id| id.0).unwrap_or(-1);
    [
        raw(pov.id(Axis::Scenario)),
        raw(pov.id(Axis::Year)),
        raw(pov.id(Axis::Period)),
        raw(pov.id(Axis::Entity)),
        raw(pov.entity_parent()),
        raw(pov.id(Axis::Value)),
    ]
}

pub(crate) fn read_calc_status(connection: &Connection, pov: &Pov<'_>) -> rusqlite::Result<CalcStatus> {
    let key = pov_key(pov);
    let mut statement = connection.prepare_cached(&format!(
        "SELECT flags FROM calc_status WHERE {POV_STATUS_FILTER}"
    ))?;
    let rows = statement.query_map(
        params![key[0], key[1], key[2], key[3], key[4], key[5]],
        |row| row.get::<_, u32>(0),
    )?;

    let mut status = CalcStatus::empty();
    for flags in rows {
        status |= CalcStatus::from_bits_truncate(flags?);
    }
    Ok(status)
}

/// Metadata store backed by the `cubeop` SQLite schema.
pub struct SqliteMetadata<'c> {
    connection: &'c Connection,
}

impl<'c> SqliteMetadata<'c> {
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }

    fn hierarchy(&self, dimension: DimensionId) -> rusqlite::Result<Hierarchy> {
        let mut statement = self.connection.prepare_cached(
            "SELECT member_id FROM members WHERE dimension_id = ?1 ORDER BY order_index",
        )?;
        let members = statement
            .query_map([dimension.0], |row| row.get::<_, i32>(0).map(MemberId))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut statement = self.connection.prepare_cached(
            "SELECT parent_id, child_id FROM hierarchy WHERE dimension_id = ?1 ORDER BY order_index",
        )?;
        let edges = statement
            .query_map([dimension.0], |row| {
                Ok((MemberId(row.get(0)?), MemberId(row.get(1)?)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut children: HashMap<MemberId, Vec<MemberId>> = HashMap::new();
        let mut has_parent = HashSet::new();
        for (parent, child) in edges {
            children.entry(parent).or_default().push(child);
            has_parent.insert(child);
        }

        let roots = members
            .iter()
            .copied()
            .filter(|member| !has_parent.contains(member))
            .collect();

        Ok(Hierarchy {
            members,
            roots,
            children,
        })
    }

    fn expand_system_list(
        &self,
        dimension: &DimensionHandle,
        list_name: &str,
        top: Option<MemberId>,
    ) -> CubeResult<Vec<(MemberId, Option<MemberId>)>> {
        let hierarchy = self.hierarchy(dimension.id)?;
        let list = list_name.to_ascii_lowercase();

        let pairs = match (list.as_str(), top) {
            ("[members]", None) => {
                let mut pairs = Vec::with_capacity(hierarchy.members.len());
                for member in &hierarchy.members {
                    pairs.push((*member, self.default_parent(dimension, *member)?));
                }
                pairs
            }
            ("[members]", Some(top)) => {
                let mut pairs = vec![(top, self.default_parent(dimension, top)?)];
                pairs.extend(hierarchy.descendants_of(top));
                pairs
            }
            ("[children]", None) => hierarchy.roots.iter().map(|root| (*root, None)).collect(),
            ("[children]", Some(top)) => hierarchy
                .children_of(top)
                .iter()
                .map(|child| (*child, Some(top)))
                .collect(),
            ("[descendants]", None) => hierarchy.descendants_from_roots(),
            ("[descendants]", Some(top)) => hierarchy.descendants_of(top),
            ("[base]", None) => hierarchy.leaves(hierarchy.descendants_from_roots()),
            ("[base]", Some(top)) => hierarchy.leaves(hierarchy.descendants_of(top)),
            _ => Vec::new(),
        };

        if dimension.hierarchical {
            Ok(pairs)
        } else {
            Ok(pairs.into_iter().map(|(member, _)| (member, None)).collect())
        }
    }

    fn expand_stored_list(
        &self,
        dimension: &DimensionHandle,
        list: MemberListId,
        top: Option<MemberId>,
    ) -> CubeResult<Vec<(MemberId, Option<MemberId>)>> {
        let mut statement = self.connection.prepare_cached(
            "SELECT member_id, parent_id FROM member_list_items WHERE list_id = ?1 ORDER BY order_index",
        )?;
        let items = statement
            .query_map([list.0], |row| {
                Ok((
                    MemberId(row.get(0)?),
                    row.get::<_, Option<i32>>(1)?.map(MemberId),
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let Some(top) = top else {
            return Ok(items);
        };

        let hierarchy = self.hierarchy(dimension.id)?;
        let mut scope: HashSet<MemberId> = hierarchy
            .descendants_of(top)
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        scope.insert(top);

        Ok(items
            .into_iter()
            .filter(|(member, _)| scope.contains(member))
            .collect())
    }
}

#[derive(Debug)]
struct Hierarchy {
    members: Vec<MemberId>,
    roots: Vec<MemberId>,
    children: HashMap<MemberId, Vec<MemberId>>,
}

impl Hierarchy {
    fn children_of(&self, member: MemberId) -> &[MemberId] {
        self.children
            .get(&member)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pre-order walk below `top`; a member with several parents appears
    /// once per parent.
    fn descendants_of(&self, top: MemberId) -> Vec<(MemberId, Option<MemberId>)> {
        let mut out = Vec::new();
        let mut path = vec![top];
        self.walk(top, &mut path, &mut out);
        out
    }

    fn descendants_from_roots(&self) -> Vec<(MemberId, Option<MemberId>)> {
        let mut out = Vec::new();
        for root in &self.roots {
            out.push((*root, None));
            let mut path = vec![*root];
            self.walk(*root, &mut path, &mut out);
        }
        out
    }

    fn walk(
        &self,
        parent: MemberId,
        path: &mut Vec<MemberId>,
        out: &mut Vec<(MemberId, Option<MemberId>)>,
    ) {
        for child in self.children_of(parent) {
            if path.contains(child) {
                continue;
            }
            out.push((*child, Some(parent)));
            path.push(*child);
            self.walk(*child, path, out);
            path.pop();
        }
    }

    fn leaves(
        &self,
        pairs: Vec<(MemberId, Option<MemberId>)>,
    ) -> Vec<(MemberId, Option<MemberId>)> {
        pairs
            .into_iter()
            .filter(|(member, _)| self.children_of(*member).is_empty())
            .collect()
    }
}

impl MetadataService for SqliteMetadata<'_> {
    fn dimension_id(&self, name: &str) -> CubeResult<DimensionId> {
        self.connection
            .query_row(
                "SELECT dimension_id FROM dimensions WHERE name = ?1",
                [name],
                |row| row.get::<_, i32>(0),
            )
            .optional()?
            .map(DimensionId)
            .ok_or_else(|| CubeError::UnknownDimension(name.to_string()))
    }

    fn dimension(&self, id: DimensionId) -> CubeResult<DimensionHandle> {
        self.connection
            .query_row(
                "SELECT name, hierarchical FROM dimensions WHERE dimension_id = ?1",
                [id.0],
                |row| {
                    Ok(DimensionHandle {
                        id,
                        name: row.get(0)?,
                        hierarchical: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| CubeError::UnknownDimension(format!("#{}", id.0)))
    }

    fn member_id(&self, dimension: &DimensionHandle, name: &str) -> CubeResult<Option<MemberId>> {
        let id = self
            .connection
            .query_row(
                "SELECT member_id FROM members WHERE dimension_id = ?1 AND label = ?2",
                params![dimension.id.0, name],
                |row| row.get::<_, i32>(0),
            )
            .optional()?;
        Ok(id.map(MemberId))
    }

    fn member_label(
        &self,
        dimension: &DimensionHandle,
        id: MemberId,
    ) -> CubeResult<Option<String>> {
        let label = self
            .connection
            .query_row(
                "SELECT label FROM members WHERE dimension_id = ?1 AND member_id = ?2",
                params![dimension.id.0, id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label)
    }

    fn member_list_id(
        &self,
        dimension: &DimensionHandle,
        list_name: &str,
    ) -> CubeResult<Option<MemberListId>> {
        let id = self
            .connection
            .query_row(
                "SELECT list_id FROM member_lists WHERE dimension_id = ?1 AND name = ?2",
                params![dimension.id.0, list_name],
                |row| row.get::<_, i32>(0),
            )
            .optional()?;
        Ok(id.map(MemberListId))
    }

    fn expand_member_list(
        &self,
        dimension: &DimensionHandle,
        list: MemberListId,
        top: Option<MemberId>,
    ) -> CubeResult<Vec<(MemberId, Option<MemberId>)>> {
        let (name, kind): (String, String) = self.connection.query_row(
            "SELECT name, kind FROM member_lists WHERE list_id = ?1",
            [list.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if kind == LIST_KIND_SYSTEM {
            self.expand_system_list(dimension, &name, top)
        } else {
            self.expand_stored_list(dimension, list, top)
        }
    }

    fn default_parent(
        &self,
        dimension: &DimensionHandle,
        member: MemberId,
    ) -> CubeResult<Option<MemberId>> {
        let parent = self
            .connection
            .query_row(
                "SELECT default_parent_id FROM members WHERE dimension_id = ?1 AND member_id = ?2",
                params![dimension.id.0, member.0],
                |row| row.get::<_, Option<i32>>(0),
            )
            .optional()?
            .flatten();
        Ok(parent.map(MemberId))
    }

    fn calc_status(&self, pov: &Pov<'_>) -> CubeResult<CalcStatus> {
        Ok(read_calc_status(self.connection, pov)?)
    }

    fn member_labels(&self, dimension: &DimensionHandle) -> CubeResult<Vec<String>> {
        let mut statement = self.connection.prepare_cached(
            "SELECT label FROM members WHERE dimension_id = ?1 ORDER BY order_index",
        )?;
        let labels = statement
            .query_map([dimension.id.0], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(labels)
    }

    fn member_list_names(&self, dimension: &DimensionHandle) -> CubeResult<Vec<String>> {
        let mut statement = self.connection.prepare_cached(
            "SELECT name FROM member_lists WHERE dimension_id = ?1 ORDER BY list_id",
        )?;
        let names = statement
            .query_map([dimension.id.0], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }
}
