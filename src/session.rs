use tracing::debug;

use crate::dimension::DimensionCache;
use crate::error::CubeResult;
use crate::member::{MemberList, SpecParser};
use crate::metadata::{DimensionHandle, MetadataService};
use crate::slice::{AxisSpecs, Slice};

/// Per-run resolution context: the metadata store plus everything cached
/// against it while one command runs.
pub struct Session<'m, M: MetadataService + ?Sized> {
    metadata: &'m M,
    dimensions: DimensionCache,
    parser: SpecParser,
}

impl<'m, M: MetadataService + ?Sized> Session<'m, M> {
    pub fn new(metadata: &'m M) -> CubeResult<Self> {
        Ok(Self {
            metadata,
            dimensions: DimensionCache::new(),
            parser: SpecParser::new()?,
        })
    }

    pub fn dimension(&mut self, name: &str) -> CubeResult<DimensionHandle> {
        self.dimensions.get_or_resolve(self.metadata, name)
    }

    pub fn resolve_members<S: AsRef<str>>(
        &mut self,
        dimension: &str,
        specs: &[S],
    ) -> CubeResult<MemberList> {
        let dimension = self.dimension(dimension)?;
        MemberList::resolve(&dimension, specs, self.metadata, &self.parser)
    }

    /// Resolves every assigned axis; unassigned axes stay unconstrained.
    pub fn build_slice(&mut self, specs: &AxisSpecs) -> CubeResult<Slice> {
        let mut slice = Slice::new();
        for (axis, axis_specs) in specs.iter() {
            let members = self.resolve_members(axis.dimension_name(), axis_specs)?;
            slice.set(axis, members);
        }
        debug!(
            axes = specs.iter().count(),
            dimensions = self.dimensions.len(),
            povs = slice.combos().len(),
            "slice built"
        );
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::Axis;
    use crate::test_support::sample_metadata;

    #[test]
    fn build_slice_resolves_each_axis_and_reuses_dimensions() {
        let metadata = sample_metadata();
        let mut session = Session::new(&metadata).unwrap();

        let specs = AxisSpecs::new()
            .with(Axis::Scenario, ["Actual"])
            .with(Axis::Year, ["2024"])
            .with(Axis::Period, ["Jan", "Feb"])
            .with(Axis::Entity, ["{[Base]}"])
            .with(Axis::Value, ["USD"]);

        let slice = session.build_slice(&specs).unwrap();
        assert_eq!(slice.combos().len(), 6);

        session.resolve_members("entity", &["UK"]).unwrap();
        assert_eq!(metadata.dimension_lookups.get(), 5);
    }

    #[test]
    fn build_slice_leaves_unassigned_axes_open() {
        let metadata = sample_metadata();
        let mut session = Session::new(&metadata).unwrap();

        let specs = AxisSpecs::new()
            .with(Axis::Scenario, ["Actual"])
            .with(Axis::Entity, ["UK"]);

        let slice = session.build_slice(&specs).unwrap();
        assert!(slice.is_assigned(Axis::Entity));
        assert!(!slice.is_assigned(Axis::Value));
        assert_eq!(slice.combos().len(), 1);
    }

    #[test]
    fn build_slice_surfaces_specification_errors() {
        let metadata = sample_metadata();
        let mut session = Session::new(&metadata).unwrap();

        let specs = AxisSpecs::new().with(Axis::Period, ["{unterminated"]);
        let err = session.build_slice(&specs).unwrap_err();
        assert!(err.is_specification_error());
    }
}
