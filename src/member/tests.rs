use super::*;
use crate::metadata::MetadataService;
use crate::test_support::{FakeMetadata, sample_metadata};

fn handle(metadata: &FakeMetadata, name: &str) -> DimensionHandle {
    let id = metadata.dimension_id(name).expect("dimension id");
    metadata.dimension(id).expect("dimension handle")
}

fn resolve(metadata: &FakeMetadata, dimension: &str, specs: &[&str]) -> CubeResult<MemberList> {
    let parser = SpecParser::new().expect("spec patterns should compile");
    MemberList::resolve(&handle(metadata, dimension), specs, metadata, &parser)
}

fn pairs(list: &MemberList) -> Vec<(i32, Option<i32>)> {
    list.member_ids()
        .into_iter()
        .zip(list.parent_ids())
        .map(|(id, parent)| (id.0, parent.map(|parent| parent.0)))
        .collect()
}

#[test]
fn plain_member_on_flat_dimension_has_no_parent() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Period", &["Feb"]).unwrap();
    assert_eq!(pairs(&list), vec![(2, None)]);
    assert_eq!(list.members()[0].name, "Feb");
}

#[test]
fn member_lookup_is_case_insensitive() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Scenario", &["aCtUaL"]).unwrap();
    assert_eq!(pairs(&list), vec![(1, None)]);
    assert_eq!(list.members()[0].name, "Actual");
}

#[test]
fn case_folded_names_display_with_stored_labels() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Entity", &["uk", "group.fr"]).unwrap();
    let shown: Vec<String> = list.iter().map(ToString::to_string).collect();
    assert_eq!(shown, vec!["Group.UK", "Group.FR"]);
}

#[test]
fn plain_entity_uses_default_parent() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Entity", &["DE"]).unwrap();
    assert_eq!(pairs(&list), vec![(12, Some(2))]);
    assert_eq!(list.members()[0].to_string(), "Europe.DE");
}

#[test]
fn top_level_entity_without_default_parent_has_none() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Entity", &["Group"]).unwrap();
    assert_eq!(pairs(&list), vec![(1, None)]);
}

#[test]
fn qualified_entity_pairs_member_with_explicit_parent() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Entity", &["Group.DE"]).unwrap();
    assert_eq!(pairs(&list), vec![(12, Some(1))]);
}

#[test]
fn member_list_expands_without_top() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Entity", &["{[Base]}"]).unwrap();
    assert_eq!(pairs(&list), vec![(10, Some(1)), (11, Some(1)), (12, Some(2))]);
    assert_eq!(list.members()[2].to_string(), "Europe.DE");
}

#[test]
fn member_list_with_top_restricts_expansion() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Entity", &["{Europe.[Base]}"]).unwrap();
    assert_eq!(pairs(&list), vec![(12, Some(2))]);
}

#[test]
fn member_list_names_are_case_insensitive() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Period", &["{q1}"]).unwrap();
    assert_eq!(list.len(), 3);
}

#[test]
fn multiple_specs_concatenate_in_order_without_dedup() {
    let metadata = sample_metadata();
    let list = resolve(&metadata, "Period", &["Mar", "{Q1}", "Jan"]).unwrap();
    let ids: Vec<i32> = list.member_ids().into_iter().map(|id| id.0).collect();
    assert_eq!(ids, vec![3, 1, 2, 3, 1]);
}

#[test]
fn unknown_member_reports_original_spec() {
    let metadata = sample_metadata();
    match resolve(&metadata, "Entity", &["Group.Atlantis"]) {
        Err(CubeError::UnknownMember {
            dimension,
            member,
            spec,
        }) => {
            assert_eq!(dimension, "Entity");
            assert_eq!(member, "Atlantis");
            assert_eq!(spec, "Group.Atlantis");
        }
        other => panic!("expected unknown member, got {other:?}"),
    }
}

#[test]
fn unknown_top_member_is_reported() {
    let metadata = sample_metadata();
    let err = resolve(&metadata, "Entity", &["{Asia.[Base]}"]).unwrap_err();
    assert!(matches!(err, CubeError::UnknownMember { ref member, .. } if member == "Asia"));
}

#[test]
fn unknown_member_list_is_reported() {
    let metadata = sample_metadata();
    match resolve(&metadata, "Entity", &["{[Nope]}"]) {
        Err(CubeError::UnknownMemberList { list, spec, .. }) => {
            assert_eq!(list, "[Nope]");
            assert_eq!(spec, "{[Nope]}");
        }
        other => panic!("expected unknown member list, got {other:?}"),
    }
}

#[test]
fn malformed_spec_fails_instead_of_returning_nothing() {
    let metadata = sample_metadata();
    for text in ["", "{unterminated", "..two..dots"] {
        let err = resolve(&metadata, "Period", &["Jan", text]).unwrap_err();
        assert!(err.is_specification_error(), "{text:?} gave {err:?}");
    }
}

#[test]
fn pending_member_from_ids_resolves_labels() {
    let metadata = sample_metadata();
    let entity = handle(&metadata, "Entity");
    let member = PendingMember::from_ids(MemberId(11), Some(MemberId(1)))
        .resolve(&entity, &metadata, "{[Base]}")
        .unwrap();
    assert_eq!(member.name, "FR");
    assert_eq!(
        member.parent,
        Some(ParentRef {
            id: MemberId(1),
            name: "Group".to_string()
        })
    );
}

#[test]
fn pending_member_with_unknown_id_fails() {
    let metadata = sample_metadata();
    let entity = handle(&metadata, "Entity");
    let err = PendingMember::from_ids(MemberId(99), None)
        .resolve(&entity, &metadata, "{[Base]}")
        .unwrap_err();
    assert!(matches!(err, CubeError::UnknownMemberId { id: 99, .. }));
}
