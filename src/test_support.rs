use std::cell::Cell;
use std::collections::HashMap;

use crate::engine::{CalcEngine, ConsolidationType};
use crate::error::{CubeError, CubeResult, EngineError};
use crate::member::{Member, MemberList, ParentRef};
use crate::metadata::{
    CalcStatus, DimensionHandle, DimensionId, MemberId, MemberListId, MetadataService,
};
use crate::model::{CalcStatusSeed, DimensionSeed, MemberListSeed, MemberSeed, MetadataSeed};
use crate::progress::{CancelToken, ProgressSink};
use crate::slice::{Axis, Pov};

pub(crate) fn dimension(id: i32, name: &str, hierarchical: bool) -> DimensionHandle {
    DimensionHandle {
        id: DimensionId(id),
        name: name.to_string(),
        hierarchical,
    }
}

/// Builds an already resolved member list: `(id, name, Some((parent_id, parent_name)))`.
pub(crate) fn member_list(
    dimension_name: &str,
    members: &[(i32, &str, Option<(i32, &str)>)],
) -> MemberList {
    let mut list = MemberList::new(dimension(0, dimension_name, dimension_name == "Entity"));
    for (id, name, parent) in members {
        list.push(Member {
            id: MemberId(*id),
            name: name.to_string(),
            parent: parent.map(|(parent_id, parent_name)| ParentRef {
                id: MemberId(parent_id),
                name: parent_name.to_string(),
            }),
        });
    }
    list
}

type ListKey = (MemberListId, Option<MemberId>);

#[derive(Debug, Default)]
pub(crate) struct FakeMetadata {
    dimensions: Vec<DimensionHandle>,
    members: HashMap<(DimensionId, String), MemberId>,
    labels: HashMap<(DimensionId, MemberId), String>,
    default_parents: HashMap<(DimensionId, MemberId), MemberId>,
    lists: HashMap<(DimensionId, String), MemberListId>,
    list_items: HashMap<ListKey, Vec<(MemberId, Option<MemberId>)>>,
    statuses: HashMap<(Option<MemberId>, Option<MemberId>), CalcStatus>,
    pub(crate) dimension_lookups: Cell<usize>,
}

impl FakeMetadata {
    pub(crate) fn with_dimension(mut self, name: &str, hierarchical: bool) -> Self {
        let id = self.dimensions.len() as i32 + 1;
        self.dimensions.push(dimension(id, name, hierarchical));
        self
    }

    fn dimension_id_of(&self, name: &str) -> DimensionId {
        self.dimensions
            .iter()
            .find(|dimension| dimension.name.eq_ignore_ascii_case(name))
            .map(|dimension| dimension.id)
            .unwrap_or_else(|| panic!("fake dimension {name} not registered"))
    }

    pub(crate) fn with_members(mut self, dimension: &str, members: &[(i32, &str)]) -> Self {
        let dimension_id = self.dimension_id_of(dimension);
        for (id, name) in members {
            self.members
                .insert((dimension_id, name.to_ascii_lowercase()), MemberId(*id));
            self.labels
                .insert((dimension_id, MemberId(*id)), name.to_string());
        }
        self
    }

    pub(crate) fn with_default_parent(mut self, dimension: &str, member: i32, parent: i32) -> Self {
        let dimension_id = self.dimension_id_of(dimension);
        self.default_parents
            .insert((dimension_id, MemberId(member)), MemberId(parent));
        self
    }

    pub(crate) fn with_list(
        mut self,
        dimension: &str,
        list_id: i32,
        name: &str,
        top: Option<i32>,
        items: &[(i32, Option<i32>)],
    ) -> Self {
        let dimension_id = self.dimension_id_of(dimension);
        self.lists
            .insert((dimension_id, name.to_ascii_lowercase()), MemberListId(list_id));
        self.list_items.insert(
            (MemberListId(list_id), top.map(MemberId)),
            items
                .iter()
                .map(|(id, parent)| (MemberId(*id), parent.map(MemberId)))
                .collect(),
        );
        self
    }

    pub(crate) fn with_status(mut self, period: i32, entity: i32, status: CalcStatus) -> Self {
        self.statuses
            .insert((Some(MemberId(period)), Some(MemberId(entity))), status);
        self
    }
}

/// Scenario, Year, Period, Entity (hierarchical) and Value with a handful
/// of members and an Entity `[Base]` list.
pub(crate) fn sample_metadata() -> FakeMetadata {
    FakeMetadata::default()
        .with_dimension("Scenario", false)
        .with_dimension("Year", false)
        .with_dimension("Period", false)
        .with_dimension("Entity", true)
        .with_dimension("Value", false)
        .with_members("Scenario", &[(1, "Actual"), (2, "Budget")])
        .with_members("Year", &[(2024, "2024"), (2025, "2025")])
        .with_members("Period", &[(1, "Jan"), (2, "Feb"), (3, "Mar")])
        .with_members(
            "Entity",
            &[(1, "Group"), (2, "Europe"), (10, "UK"), (11, "FR"), (12, "DE")],
        )
        .with_members("Value", &[(7, "USD"), (8, "EUR")])
        .with_default_parent("Entity", 10, 1)
        .with_default_parent("Entity", 11, 1)
        .with_default_parent("Entity", 12, 2)
        .with_default_parent("Entity", 2, 1)
        .with_list(
            "Entity",
            1,
            "[Base]",
            None,
            &[(10, Some(1)), (11, Some(1)), (12, Some(2))],
        )
        .with_list("Entity", 1, "[Base]", Some(2), &[(12, Some(2))])
        .with_list("Period", 5, "Q1", None, &[(1, None), (2, None), (3, None)])
}

impl MetadataService for FakeMetadata {
    fn dimension_id(&self, name: &str) -> CubeResult<DimensionId> {
        self.dimension_lookups.set(self.dimension_lookups.get() + 1);
        self.dimensions
            .iter()
            .find(|dimension| dimension.name.eq_ignore_ascii_case(name))
            .map(|dimension| dimension.id)
            .ok_or_else(|| CubeError::UnknownDimension(name.to_string()))
    }

    fn dimension(&self, id: DimensionId) -> CubeResult<DimensionHandle> {
        self.dimensions
            .iter()
            .find(|dimension| dimension.id == id)
            .cloned()
            .ok_or_else(|| CubeError::UnknownDimension(format!("#{}", id.0)))
    }

    fn member_id(&self, dimension: &DimensionHandle, name: &str) -> CubeResult<Option<MemberId>> {
        Ok(self
            .members
            .get(&(dimension.id, name.to_ascii_lowercase()))
            .copied())
    }

    fn member_label(
        &self,
        dimension: &DimensionHandle,
        id: MemberId,
    ) -> CubeResult<Option<String>> {
        Ok(self.labels.get(&(dimension.id, id)).cloned())
    }

    fn member_list_id(
        &self,
        dimension: &DimensionHandle,
        list_name: &str,
    ) -> CubeResult<Option<MemberListId>> {
        Ok(self
            .lists
            .get(&(dimension.id, list_name.to_ascii_lowercase()))
            .copied())
    }

    fn expand_member_list(
        &self,
        _dimension: &DimensionHandle,
        list: MemberListId,
        top: Option<MemberId>,
    ) -> CubeResult<Vec<(MemberId, Option<MemberId>)>> {
        Ok(self.list_items.get(&(list, top)).cloned().unwrap_or_default())
    }

    fn default_parent(
        &self,
        dimension: &DimensionHandle,
        member: MemberId,
    ) -> CubeResult<Option<MemberId>> {
        Ok(self.default_parents.get(&(dimension.id, member)).copied())
    }

    fn calc_status(&self, pov: &Pov<'_>) -> CubeResult<CalcStatus> {
        Ok(self
            .statuses
            .get(&(pov.id(Axis::Period), pov.id(Axis::Entity)))
            .copied()
            .unwrap_or_default())
    }

    fn member_labels(&self, dimension: &DimensionHandle) -> CubeResult<Vec<String>> {
        let mut labels: Vec<(MemberId, String)> = self
            .labels
            .iter()
            .filter(|((dimension_id, _), _)| *dimension_id == dimension.id)
            .map(|((_, id), label)| (*id, label.clone()))
            .collect();
        labels.sort();
        Ok(labels.into_iter().map(|(_, label)| label).collect())
    }

    fn member_list_names(&self, dimension: &DimensionHandle) -> CubeResult<Vec<String>> {
        let mut names: Vec<String> = self
            .lists
            .keys()
            .filter(|(dimension_id, _)| *dimension_id == dimension.id)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Engine double that records every call and can fail on the n-th one.
#[derive(Debug, Default)]
pub(crate) struct RecordingEngine {
    pub(crate) calls: Vec<(&'static str, String)>,
    pub(crate) fail_on_call: Option<usize>,
}

impl RecordingEngine {
    fn record(&mut self, operation: &'static str, pov: &Pov<'_>) -> Result<(), EngineError> {
        let call_number = self.calls.len() + 1;
        if self.fail_on_call == Some(call_number) {
            return Err(format!("engine rejected {pov}").into());
        }
        self.calls.push((operation, pov.to_string()));
        Ok(())
    }
}

impl CalcEngine for RecordingEngine {
    fn allocate(&mut self, pov: &Pov<'_>) -> Result<(), EngineError> {
        self.record("allocate", pov)
    }

    fn calculate(&mut self, pov: &Pov<'_>, _force: bool) -> Result<(), EngineError> {
        self.record("calculate", pov)
    }

    fn translate(&mut self, pov: &Pov<'_>, _force: bool) -> Result<(), EngineError> {
        self.record("translate", pov)
    }

    fn consolidate(
        &mut self,
        pov: &Pov<'_>,
        _consolidation_type: ConsolidationType,
    ) -> Result<(), EngineError> {
        self.record("consolidate", pov)
    }
}

/// Progress double that counts notifications and can request a stop or
/// trip a cancel token after a number of iterations.
#[derive(Debug, Default)]
pub(crate) struct RecordingProgress {
    pub(crate) label: Option<String>,
    pub(crate) total: Option<usize>,
    pub(crate) iterations: usize,
    pub(crate) end_calls: usize,
    pub(crate) blocking_started: usize,
    pub(crate) blocking_completed: usize,
    pub(crate) stop_after: Option<usize>,
    pub(crate) cancel_after: Option<(usize, CancelToken)>,
}

impl ProgressSink for RecordingProgress {
    fn init_progress(&mut self, label: &str, total: usize) {
        self.label = Some(label.to_string());
        self.total = Some(total);
    }

    fn iteration_complete(&mut self) -> bool {
        self.iterations += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.iterations >= *after {
                token.cancel();
            }
        }
        self.stop_after
            .is_some_and(|limit| self.iterations >= limit)
    }

    fn end_progress(&mut self) {
        self.end_calls += 1;
    }

    fn monitor_blocking_task(&mut self) {
        self.blocking_started += 1;
    }

    fn blocking_task_complete(&mut self) {
        self.blocking_completed += 1;
    }
}

/// Seed equivalent of [`sample_metadata`] for the SQLite store. Ids are
/// assigned by the loader in file order, so Entity is Group=1, Europe=2,
/// UK=3, FR=4, DE=5. FR rolls up to both Group (default) and Europe.
pub(crate) fn sample_seed() -> MetadataSeed {
    let flat = |name: &str, members: &[&str]| DimensionSeed {
        name: name.to_string(),
        hierarchical: false,
        members: members
            .iter()
            .map(|member| MemberSeed {
                name: member.to_string(),
                parents: Vec::new(),
            })
            .collect(),
    };
    let child = |name: &str, parents: &[&str]| MemberSeed {
        name: name.to_string(),
        parents: parents.iter().map(|parent| parent.to_string()).collect(),
    };
    let strings = |items: &[&str]| items.iter().map(|item| item.to_string()).collect::<Vec<_>>();

    MetadataSeed {
        application: Some("Sample".to_string()),
        dimensions: vec![
            flat("Scenario", &["Actual", "Budget"]),
            flat("Year", &["2024", "2025"]),
            flat("Period", &["Jan", "Feb", "Mar"]),
            DimensionSeed {
                name: "Entity".to_string(),
                hierarchical: true,
                members: vec![
                    child("Group", &[]),
                    child("Europe", &["Group"]),
                    child("UK", &["Group"]),
                    child("FR", &["Group", "Europe"]),
                    child("DE", &["Europe"]),
                ],
            },
            flat("Value", &["USD", "EUR"]),
        ],
        member_lists: vec![
            MemberListSeed {
                dimension: "Period".to_string(),
                name: "Q1".to_string(),
                members: strings(&["Jan", "Feb", "Mar"]),
            },
            MemberListSeed {
                dimension: "Entity".to_string(),
                name: "Core".to_string(),
                members: strings(&["Group.UK", "Europe.DE", "Europe.FR"]),
            },
        ],
        calc_status: vec![
            CalcStatusSeed {
                scenario: strings(&["Actual"]),
                year: strings(&["2024"]),
                period: strings(&["Jan"]),
                entity: strings(&["Group.UK", "Europe.DE"]),
                value: None,
                flags: strings(&["needs_consolidation"]),
            },
            CalcStatusSeed {
                scenario: strings(&["Actual"]),
                year: strings(&["2024"]),
                period: strings(&["Jan"]),
                entity: strings(&["Group.FR"]),
                value: Some(strings(&["EUR"])),
                flags: strings(&["needs_calculation", "needs_translation"]),
            },
        ],
    }
}

/// In-memory store loaded with [`sample_seed`].
pub(crate) fn sample_store() -> rusqlite::Connection {
    let mut connection = rusqlite::Connection::open_in_memory().expect("in-memory db");
    crate::store::ensure_schema(&connection).expect("schema");
    crate::store::load_seed(&mut connection, &sample_seed()).expect("seed loads");
    connection
}
