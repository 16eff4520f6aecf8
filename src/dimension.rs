use std::collections::HashMap;

use tracing::debug;

use crate::error::CubeResult;
use crate::metadata::{DimensionHandle, MetadataService};

/// Dimension handles resolved during one run, keyed by lower-cased name.
#[derive(Debug, Default)]
pub struct DimensionCache {
    dimensions: HashMap<String, DimensionHandle>,
}

impl DimensionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resolve<M>(&mut self, metadata: &M, name: &str) -> CubeResult<DimensionHandle>
    where
        M: MetadataService + ?Sized,
    {
        let key = name.trim().to_lowercase();
        if let Some(dimension) = self.dimensions.get(&key) {
            return Ok(dimension.clone());
        }

        let id = metadata.dimension_id(name.trim())?;
        let dimension = metadata.dimension(id)?;
        debug!(
            dimension = %dimension.name,
            id = dimension.id.0,
            hierarchical = dimension.hierarchical,
            "resolved dimension"
        );

        self.dimensions.insert(key, dimension.clone());
        Ok(dimension)
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }
}
