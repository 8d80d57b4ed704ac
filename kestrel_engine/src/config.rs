use kestrel_materials::prelude::MaterialSystemConfig;
use kestrel_resources::prelude::CacheConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub materials: MaterialSystemConfig,
    /// Directory a [`kestrel_resources::prelude::FileBroker`] serves assets from
    pub asset_root: Option<PathBuf>,
}

impl EngineConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_materials(mut self, materials: MaterialSystemConfig) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_asset_root(mut self, asset_root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(asset_root.into());
        self
    }

    pub fn asset_root(&self) -> Option<&Path> {
        self.asset_root.as_deref()
    }

    /// Every material needs a cache entry, plus one for each texture it maps
    pub fn validate(&self) -> anyhow::Result<()> {
        self.cache.validate()?;
        self.materials.validate()?;
        if self.materials.max_material_count > self.cache.max_resource_count {
            anyhow::bail!(
                "max_material_count ({}) exceeds max_resource_count ({})",
                self.materials.max_material_count,
                self.cache.max_resource_count
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_more_materials_than_resources() {
        let config = EngineConfig::default()
            .with_cache(CacheConfig::default().with_max_resource_count(8))
            .with_materials(
                MaterialSystemConfig::default()
                    .with_max_material_count(16)
                    .with_max_instance_count(16),
            );
        assert!(config.validate().is_err());
        let config = config.with_cache(CacheConfig::default().with_max_resource_count(0));
        assert!(config.validate().is_err());
    }
}
