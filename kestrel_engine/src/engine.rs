use crate::config::EngineConfig;
use anyhow::{Context, Result};
use kestrel_materials::prelude::*;
use kestrel_resources::prelude::*;
use std::sync::Arc;

/// Owns the resource cache, the material system and the shader binder, and drives them once per
/// frame. Everything that would otherwise be reached through globals goes through here.
#[derive(Debug)]
pub struct Engine<B: ShaderBinder> {
    config: EngineConfig,
    cache: ResourceCache,
    materials: MaterialSystem,
    binder: B,
    frame_number: u64,
    shut_down: bool,
}

impl<B: ShaderBinder> Engine<B> {
    pub fn new(config: EngineConfig, broker: Arc<dyn AssetBroker>, mut binder: B) -> Result<Self> {
        config.validate().context("Invalid engine configuration")?;
        let mut cache = ResourceCache::new(config.cache, broker)?;
        cache
            .register_handler(ResourceType::Text, TextHandler)
            .context("Registering text handler")?;
        cache
            .register_handler(ResourceType::Binary, BinaryHandler)
            .context("Registering binary handler")?;
        cache
            .register_handler(ResourceType::Texture, TextureHandler)
            .context("Registering texture handler")?;
        cache
            .register_handler(ResourceType::Material, MaterialHandler)
            .context("Registering material handler")?;

        let mut materials = MaterialSystem::new(config.materials)?;
        materials
            .initialize(&mut cache, &mut binder)
            .context("Creating default material")?;
        tracing::info!(
            "Engine started with handlers for {:?}",
            cache.handlers().registered()
        );
        Ok(Self {
            config,
            cache,
            materials,
            binder,
            frame_number: 0,
            shut_down: false,
        })
    }

    /// Engine serving assets from `config.asset_root` through a [`FileBroker`]
    pub fn with_asset_root(config: EngineConfig, binder: B) -> Result<Self> {
        let root = config
            .asset_root()
            .context("No asset root configured")?
            .to_path_buf();
        let broker = FileBroker::new(&root)
            .with_context(|| format!("Starting file broker at {}", root.display()))?;
        Self::new(config, Arc::new(broker), binder)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Applies loader results and material completions, then advances the frame number
    pub fn frame(&mut self) -> u64 {
        let results = self.cache.pump();
        let completions = self.materials.update(&mut self.cache, &mut self.binder);
        if results > 0 || completions > 0 {
            tracing::trace!(
                "Frame {}: {} asset results, {} material completions",
                self.frame_number,
                results,
                completions
            );
        }
        self.frame_number += 1;
        self.frame_number
    }

    pub fn acquire_material(
        &mut self,
        name: impl Into<Name>,
    ) -> Result<MaterialInstance, MaterialError> {
        self.materials
            .acquire(&mut self.cache, &mut self.binder, name)
    }

    pub fn default_material_instance(&mut self) -> Result<MaterialInstance, MaterialError> {
        self.materials
            .default_instance(&mut self.cache, &mut self.binder)
    }

    pub fn release_material(&mut self, instance: MaterialInstance) -> Result<(), MaterialError> {
        self.materials
            .release(&mut self.cache, &mut self.binder, instance)
    }

    /// Applies `instance` for the current frame
    pub fn apply_material(&mut self, instance: MaterialInstance) -> Result<(), MaterialError> {
        self.materials
            .apply(&mut self.binder, instance, self.frame_number)
    }

    pub fn dump(&self) -> (Vec<ResourceSummary>, Vec<MaterialSummary>) {
        (self.cache.dump(), self.materials.dump())
    }

    /// Materials go first so their cache references are released before the cache tears down
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.materials.shutdown(&mut self.cache, &mut self.binder);
        self.cache.shutdown();
        self.shut_down = true;
        tracing::info!("Engine shut down after {} frames", self.frame_number);
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResourceCache {
        &mut self.cache
    }

    pub fn materials(&self) -> &MaterialSystem {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialSystem {
        &mut self.materials
    }

    pub fn binder(&self) -> &B {
        &self.binder
    }

    pub fn binder_mut(&mut self) -> &mut B {
        &mut self.binder
    }
}

impl<B: ShaderBinder> Drop for Engine<B> {
    fn drop(&mut self) {
        tracing::trace!("Dropping engine");
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn engine(broker: Arc<MemoryBroker>) -> Engine<HeadlessBinder> {
        Engine::new(EngineConfig::default(), broker, HeadlessBinder::default()).unwrap()
    }

    #[test]
    fn test_startup_registers_handlers() {
        let engine = engine(Arc::new(MemoryBroker::new()));
        assert_eq!(
            engine.cache().handlers().registered(),
            vec![
                ResourceType::Text,
                ResourceType::Binary,
                ResourceType::Texture,
                ResourceType::Material
            ]
        );
        assert!(engine.materials().default_material().is_some());
        assert!(engine.cache().contains(DEFAULT_MATERIAL_NAME));
    }

    #[test]
    fn test_invalid_config_aborts_startup() {
        let config =
            EngineConfig::default().with_cache(CacheConfig::default().with_max_resource_count(0));
        let result = Engine::new(
            config,
            Arc::new(MemoryBroker::new()),
            HeadlessBinder::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_asset_root() {
        let result = Engine::with_asset_root(EngineConfig::default(), HeadlessBinder::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_resolves_deferred_materials() {
        let broker = Arc::new(MemoryBroker::deferred());
        broker.insert("materials", "brick", MaterialAsset::default());
        let mut engine = engine(broker.clone());
        let a = engine.acquire_material("brick").unwrap();
        let b = engine.acquire_material("brick").unwrap();
        assert_eq!(engine.apply_material(a), Err(MaterialError::NotReady));

        broker.flush();
        assert_eq!(engine.frame(), 1);
        engine.materials_mut().set_base_colour(b, Vec4::ZERO).unwrap();
        for _ in 0..3 {
            engine.apply_material(a).unwrap();
            engine.apply_material(b).unwrap();
            engine.frame();
        }
        let shader = engine.binder().shader_for(MaterialKind::Standard).unwrap();
        let stats = engine.binder().stats(shader).unwrap();
        assert_eq!(stats.group_uploads, 3);
        assert_eq!(stats.per_draw_uploads, 2);
        assert_eq!(engine.frame_number(), 4);
    }

    #[test]
    fn test_shutdown_is_ordered_and_idempotent() {
        let broker = Arc::new(MemoryBroker::new());
        broker.insert("materials", "brick", MaterialAsset::default());
        let mut engine = engine(broker);
        let instance = engine.acquire_material("brick").unwrap();
        engine.default_material_instance().unwrap();

        engine.shutdown();
        assert!(engine.cache().is_empty());
        assert_eq!(engine.materials().material_count(), 0);
        assert_eq!(engine.binder().stats(0).unwrap().live_groups, 0);
        assert_eq!(
            engine.release_material(instance),
            Err(MaterialError::StaleHandle)
        );
        engine.shutdown();
    }

    #[test]
    fn test_file_assets() {
        let root = std::env::temp_dir().join(format!("kestrel_engine_{}", std::process::id()));
        std::fs::create_dir_all(root.join("text")).unwrap();
        std::fs::write(root.join("text").join("motd.txt"), "hello").unwrap();

        let mut engine = Engine::with_asset_root(
            EngineConfig::default().with_asset_root(&root),
            HeadlessBinder::default(),
        )
        .unwrap();
        let handle = engine
            .cache_mut()
            .request(
                "motd",
                ResourceType::Text,
                RequestInfo::new()
                    .with_asset(AssetInfo::new(AssetType::Text, "text", "motd.txt"))
                    .synchronous(true),
            )
            .unwrap();
        let text = engine.cache().payload::<TextResource>(&handle).unwrap();
        assert_eq!(text.text, "hello");
        drop(engine);
        std::fs::remove_dir_all(root).unwrap();
    }
}
