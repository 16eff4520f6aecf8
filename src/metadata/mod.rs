//! Metadata collaborator: member name and id mapping, member lists and
//! per-POV calculation status.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::CubeResult;
use crate::slice::Pov;

pub mod sqlite;

pub use sqlite::SqliteMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimensionId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberListId(pub i32);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to one dimension of the application, as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionHandle {
    pub id: DimensionId,
    pub name: String,
    /// Members of a hierarchical dimension are always addressed relative to
    /// a parent.
    pub hierarchical: bool,
}

bitflags! {
    /// Calculation status flags for one POV.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CalcStatus: u32 {
        const NEEDS_CALCULATION = 1 << 0;
        const NEEDS_TRANSLATION = 1 << 1;
        const NEEDS_CONSOLIDATION = 1 << 2;
        const LOCKED = 1 << 3;
        const NO_DATA = 1 << 4;
    }
}

impl CalcStatus {
    pub fn needs_consolidation(self) -> bool {
        self.contains(Self::NEEDS_CONSOLIDATION)
    }

    /// Parses flag names such as `needs_consolidation` (case-insensitive).
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut status = Self::empty();
        for name in names {
            let flag = Self::from_name(&name.trim().to_ascii_uppercase())?;
            status |= flag;
        }
        Some(status)
    }
}

/// Lookups the resolver and executor need from the metadata store.
///
/// `member_id`, `member_label` and `member_list_id` return `Ok(None)` when
/// the name or id is not defined; callers turn that into a specification
/// error carrying the original text.
pub trait MetadataService {
    fn dimension_id(&self, name: &str) -> CubeResult<DimensionId>;

    fn dimension(&self, id: DimensionId) -> CubeResult<DimensionHandle>;

    fn member_id(&self, dimension: &DimensionHandle, name: &str) -> CubeResult<Option<MemberId>>;

    fn member_label(&self, dimension: &DimensionHandle, id: MemberId)
    -> CubeResult<Option<String>>;

    fn member_list_id(
        &self,
        dimension: &DimensionHandle,
        list_name: &str,
    ) -> CubeResult<Option<MemberListId>>;

    /// Expands a stored member list into (member, parent) pairs, optionally
    /// restricted to the descendants of `top`.
    fn expand_member_list(
        &self,
        dimension: &DimensionHandle,
        list: MemberListId,
        top: Option<MemberId>,
    ) -> CubeResult<Vec<(MemberId, Option<MemberId>)>>;

    fn default_parent(
        &self,
        dimension: &DimensionHandle,
        member: MemberId,
    ) -> CubeResult<Option<MemberId>>;

    fn calc_status(&self, pov: &Pov) -> CubeResult<CalcStatus>;

    fn member_labels(&self, dimension: &DimensionHandle) -> CubeResult<Vec<String>>;

    fn member_list_names(&self, dimension: &DimensionHandle) -> CubeResult<Vec<String>>;
}
