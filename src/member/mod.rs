//! Resolution of member specifications into concrete members.
//!
//! Members are built in two phases: a [`PendingMember`] records whichever of
//! id or name is known, and [`PendingMember::resolve`] performs the lookups
//! that fill in the rest. A resolved [`Member`] never touches the metadata
//! store again.

use std::fmt;

use tracing::debug;

use crate::error::{CubeError, CubeResult};
use crate::metadata::{DimensionHandle, MemberId, MetadataService};

pub mod spec;

pub use spec::{MemberSpec, SpecParser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub id: MemberId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub parent: Option<ParentRef>,
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}.{}", parent.name, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    Id(MemberId),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingParent {
    None,
    /// Ask the store for the member's default parent.
    Default,
    Known(MemberRef),
}

/// A member reference that has not been looked up yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMember {
    member: MemberRef,
    parent: PendingParent,
}

impl PendingMember {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            member: MemberRef::Name(name.into()),
            parent: PendingParent::None,
        }
    }

    pub fn named_with_parent(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            member: MemberRef::Name(name.into()),
            parent: PendingParent::Known(MemberRef::Name(parent.into())),
        }
    }

    pub fn from_ids(id: MemberId, parent: Option<MemberId>) -> Self {
        Self {
            member: MemberRef::Id(id),
            parent: parent
                .map(|parent| PendingParent::Known(MemberRef::Id(parent)))
                .unwrap_or(PendingParent::None),
        }
    }

    /// Requests the store's default parent when none was given.
    pub fn with_default_parent(mut self) -> Self {
        if self.parent == PendingParent::None {
            self.parent = PendingParent::Default;
        }
        self
    }

    /// Looks up the missing halves. `spec` is the text the reference came
    /// from and is only used for error reporting.
    pub fn resolve<M>(
        &self,
        dimension: &DimensionHandle,
        metadata: &M,
        spec: &str,
    ) -> CubeResult<Member>
    where
        M: MetadataService + ?Sized,
    {
        let (id, name) = resolve_ref(&self.member, dimension, metadata, spec)?;

        let parent = match &self.parent {
            PendingParent::None => None,
            PendingParent::Known(reference) => {
                let (id, name) = resolve_ref(reference, dimension, metadata, spec)?;
                Some(ParentRef { id, name })
            }
            PendingParent::Default => match metadata.default_parent(dimension, id)? {
                Some(parent_id) => {
                    let (id, name) =
                        resolve_ref(&MemberRef::Id(parent_id), dimension, metadata, spec)?;
                    Some(ParentRef { id, name })
                }
                None => None,
            },
        };

        Ok(Member { id, name, parent })
    }
}

fn resolve_ref<M>(
    reference: &MemberRef,
    dimension: &DimensionHandle,
    metadata: &M,
    spec: &str,
) -> CubeResult<(MemberId, String)>
where
    M: MetadataService + ?Sized,
{
    match reference {
        MemberRef::Name(name) => {
            let id = metadata
                .member_id(dimension, name)?
                .ok_or_else(|| CubeError::UnknownMember {
                    dimension: dimension.name.clone(),
                    member: name.clone(),
                    spec: spec.to_string(),
                })?;
            // Lookups ignore case; keep the stored spelling.
            let label = metadata
                .member_label(dimension, id)?
                .unwrap_or_else(|| name.clone());
            Ok((id, label))
        }
        MemberRef::Id(id) => {
            let name =
                metadata
                    .member_label(dimension, *id)?
                    .ok_or_else(|| CubeError::UnknownMemberId {
                        dimension: dimension.name.clone(),
                        id: id.0,
                    })?;
            Ok((*id, name))
        }
    }
}

/// Members of one dimension in specification order. Duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberList {
    dimension: DimensionHandle,
    members: Vec<Member>,
}

impl MemberList {
    pub fn new(dimension: DimensionHandle) -> Self {
        Self {
            dimension,
            members: Vec::new(),
        }
    }

    /// Resolves each specification in turn and concatenates the results.
    pub fn resolve<M, S>(
        dimension: &DimensionHandle,
        specs: &[S],
        metadata: &M,
        parser: &SpecParser,
    ) -> CubeResult<Self>
    where
        M: MetadataService + ?Sized,
        S: AsRef<str>,
    {
        let mut list = Self::new(dimension.clone());
        for spec in specs {
            let members = resolve_spec(dimension, spec.as_ref(), metadata, parser)?;
            list.extend(members);
        }

        debug!(
            dimension = %dimension.name,
            specs = specs.len(),
            members = list.len(),
            "resolved member specifications"
        );
        Ok(list)
    }

    pub fn dimension(&self) -> &DimensionHandle {
        &self.dimension
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Member> {
        self.members.iter()
    }

    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|member| member.id).collect()
    }

    pub fn parent_ids(&self) -> Vec<Option<MemberId>> {
        self.members
            .iter()
            .map(|member| member.parent.as_ref().map(|parent| parent.id))
            .collect()
    }

    pub fn push(&mut self, member: Member) {
        self.members.push(member);
    }

    pub fn extend(&mut self, members: impl IntoIterator<Item = Member>) {
        self.members.extend(members);
    }
}

impl<'a> IntoIterator for &'a MemberList {
    type Item = &'a Member;
    type IntoIter = std::slice::Iter<'a, Member>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Resolves one specification string into the members it denotes.
pub fn resolve_spec<M>(
    dimension: &DimensionHandle,
    text: &str,
    metadata: &M,
    parser: &SpecParser,
) -> CubeResult<Vec<Member>>
where
    M: MetadataService + ?Sized,
{
    match parser.parse(&dimension.name, text)? {
        MemberSpec::Member { parent, name } => {
            let pending = match parent {
                Some(parent) => PendingMember::named_with_parent(name, parent),
                None if dimension.hierarchical => PendingMember::named(name).with_default_parent(),
                None => PendingMember::named(name),
            };
            Ok(vec![pending.resolve(dimension, metadata, text)?])
        }
        MemberSpec::List { top, list } => {
            let top_id = match top {
                Some(top) => Some(
                    metadata
                        .member_id(dimension, &top)?
                        .ok_or_else(|| CubeError::UnknownMember {
                            dimension: dimension.name.clone(),
                            member: top.clone(),
                            spec: text.to_string(),
                        })?,
                ),
                None => None,
            };

            let list_id = metadata
                .member_list_id(dimension, &list)?
                .ok_or_else(|| CubeError::UnknownMemberList {
                    dimension: dimension.name.clone(),
                    list: list.clone(),
                    spec: text.to_string(),
                })?;

            metadata
                .expand_member_list(dimension, list_id, top_id)?
                .into_iter()
                .map(|(id, parent)| PendingMember::from_ids(id, parent).resolve(dimension, metadata, text))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests;
