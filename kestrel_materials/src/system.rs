use crate::asset::{MaterialAsset, MaterialInput, MaterialKind, MaterialModel, TextureChannel};
use crate::binder::{ShaderBinder, ShaderId};
use crate::error::MaterialError;
use crate::flags::{MaterialFlags, TextureFlags};
use crate::handler::MaterialResource;
use crate::uniforms::{InstanceUniforms, MaterialUniforms};
use crossbeam_channel::{Receiver, Sender};
use derivative::Derivative;
use glam::{Vec3, Vec4};
use kestrel_containers::prelude::{Handle, SlotArena};
use kestrel_resources::prelude::*;
use std::collections::HashMap;

/// Name of the built-in material created by [`MaterialSystem::initialize`]
pub const DEFAULT_MATERIAL_NAME: &str = "default_material";

pub type MaterialHandle = Handle<MaterialData>;
pub type InstanceHandle = Handle<InstanceData>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaterialSystemConfig {
    pub max_material_count: u32,
    pub max_instance_count: u32,
    /// Package material assets are requested from
    pub package: Name,
}

impl Default for MaterialSystemConfig {
    fn default() -> Self {
        Self {
            max_material_count: 256,
            max_instance_count: 4096,
            package: Name::from("materials"),
        }
    }
}

impl MaterialSystemConfig {
    pub fn with_max_material_count(mut self, max_material_count: u32) -> Self {
        self.max_material_count = max_material_count;
        self
    }

    pub fn with_max_instance_count(mut self, max_instance_count: u32) -> Self {
        self.max_instance_count = max_instance_count;
        self
    }

    pub fn with_package(mut self, package: impl Into<Name>) -> Self {
        self.package = package.into();
        self
    }

    pub fn validate(&self) -> Result<(), MaterialError> {
        if self.max_material_count == 0 {
            return Err(MaterialError::InvalidConfig(
                "max_material_count must be greater than 0",
            ));
        }
        if self.max_instance_count < self.max_material_count {
            return Err(MaterialError::InvalidConfig(
                "max_instance_count must be at least max_material_count",
            ));
        }
        Ok(())
    }
}

/// Composite key of an instance: the base material and the instance overlay on it
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct MaterialInstance {
    pub material: MaterialHandle,
    pub instance: InstanceHandle,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MaterialStatus {
    /// Waiting on the cache to finish loading the material resource
    #[default]
    Pending,
    Ready,
}

/// Texture resolved for one of a material's inputs
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaterialTexture {
    pub slot: TextureFlags,
    pub name: Name,
    pub handle: ResourceHandle,
    pub channel: TextureChannel,
}

/// Base material. Owns one shader group and the cache references taken on its behalf.
#[derive(Debug, Default)]
pub struct MaterialData {
    name: Name,
    status: MaterialStatus,
    resource: ResourceHandle,
    resource_generation: u32,
    kind: MaterialKind,
    model: MaterialModel,
    shader: Option<ShaderId>,
    group_id: Option<u32>,
    /// Frame the group uniforms were last uploaded in
    renderer_frame_number: Option<u64>,
    flags: MaterialFlags,
    texture_flags: TextureFlags,
    texture_channels: u32,
    base_colour: Vec4,
    emissive: Vec4,
    normal: Vec3,
    /// metallic, roughness, ao
    mra: Vec3,
    uv_offset: Vec3,
    uv_scale: Vec3,
    textures: Vec<MaterialTexture>,
    instances: Vec<InstanceHandle>,
    held_references: u32,
}

impl MaterialData {
    pub fn name(&self) -> Name {
        self.name
    }

    pub fn status(&self) -> MaterialStatus {
        self.status
    }

    pub fn kind(&self) -> MaterialKind {
        self.kind
    }

    pub fn model(&self) -> MaterialModel {
        self.model
    }

    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }

    pub fn resource_generation(&self) -> u32 {
        self.resource_generation
    }

    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    pub fn group_id(&self) -> Option<u32> {
        self.group_id
    }

    pub fn renderer_frame_number(&self) -> Option<u64> {
        self.renderer_frame_number
    }

    pub fn flags(&self) -> MaterialFlags {
        self.flags
    }

    pub fn texture_flags(&self) -> TextureFlags {
        self.texture_flags
    }

    pub fn textures(&self) -> &[MaterialTexture] {
        &self.textures
    }

    pub fn base_colour(&self) -> Vec4 {
        self.base_colour
    }

    pub fn instances(&self) -> &[InstanceHandle] {
        &self.instances
    }

    pub fn uniforms(&self) -> MaterialUniforms {
        MaterialUniforms {
            base_colour: self.base_colour.to_array(),
            emissive: self.emissive.to_array(),
            normal: self.normal.extend(0.0).to_array(),
            mra: self.mra.extend(0.0).to_array(),
            material_flags: self.flags.bits(),
            texture_flags: self.texture_flags.bits(),
            texture_channels: self.texture_channels,
            model: self.model as u32,
        }
    }

    /// Reads every input of `asset`, resolving texture maps through the cache, and accumulates the
    /// capability flags. Textures from a previous assembly are released first.
    fn assemble(&mut self, cache: &mut ResourceCache, asset: &MaterialAsset) {
        self.release_textures(cache);
        self.kind = asset.kind;
        self.model = asset.model;
        self.flags = MaterialFlags::from_asset(asset);
        self.texture_flags = TextureFlags::empty();

        self.base_colour = self.input(cache, TextureFlags::BaseColour, &asset.base_colour);
        self.normal = self.input(cache, TextureFlags::Normal, &asset.normal);
        self.emissive = self.input(cache, TextureFlags::Emissive, &asset.emissive);
        self.mra = if asset.mra_enabled {
            self.input(cache, TextureFlags::Mra, &asset.mra)
        } else {
            Vec3::new(
                self.input(cache, TextureFlags::Metallic, &asset.metallic),
                self.input(cache, TextureFlags::Roughness, &asset.roughness),
                self.input(cache, TextureFlags::Ao, &asset.ao),
            )
        };
        self.texture_channels = self
            .textures
            .iter()
            .fold(0, |channels, texture| {
                channels | channel_bits(texture.slot, texture.channel)
            });
        self.uv_offset = asset.uv_offset;
        self.uv_scale = asset.uv_scale;
    }

    /// Value of `input`. A texture map is requested from the cache; if that fails the inline value
    /// is used on its own.
    fn input<T: Copy>(
        &mut self,
        cache: &mut ResourceCache,
        slot: TextureFlags,
        input: &MaterialInput<T>,
    ) -> T {
        let Some(map) = input.map else {
            return input.value;
        };
        let info = RequestInfo::new().with_asset(AssetInfo::new(
            AssetType::Image,
            map.package_name,
            map.resource_name,
        ));
        match cache.request(map.resource_name, ResourceType::Texture, info) {
            Ok(handle) => {
                self.texture_flags |= slot;
                self.textures.push(MaterialTexture {
                    slot,
                    name: map.resource_name,
                    handle,
                    channel: map.channel,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Material {}: texture {} unavailable, using the inline value: {}",
                    self.name,
                    map.resource_name,
                    e
                );
            }
        }
        input.value
    }

    /// Drops the reference held on each texture. Textures whose entry was torn down since they
    /// were requested hold nothing and are skipped.
    fn release_textures(&mut self, cache: &mut ResourceCache) {
        for texture in self.textures.drain(..) {
            match cache.release_handle(&texture.handle) {
                Ok(_) => {}
                Err(ResourceError::StaleHandleUse) => {
                    tracing::debug!(
                        "Material {}: texture {} is already gone",
                        self.name,
                        texture.name
                    );
                }
                Err(e) => tracing::warn!("Material {}: {}", self.name, e),
            }
        }
    }

    /// Forgets textures whose population failed after they were requested, falling back to the
    /// inline values
    fn prune_textures(&mut self, cache: &ResourceCache) {
        let before = self.textures.len();
        let name = self.name;
        self.textures.retain(|texture| {
            let live = !cache.is_stale(&texture.handle);
            if !live {
                tracing::warn!(
                    "Material {}: texture {} failed to load, using the inline value",
                    name,
                    texture.name
                );
            }
            live
        });
        if self.textures.len() == before {
            return;
        }
        self.texture_flags = self
            .textures
            .iter()
            .fold(TextureFlags::empty(), |flags, texture| flags | texture.slot);
        self.texture_channels = self
            .textures
            .iter()
            .fold(0, |channels, texture| {
                channels | channel_bits(texture.slot, texture.channel)
            });
        self.renderer_frame_number = None;
    }
}

/// Two bits per scalar input, metallic in the lowest pair
fn channel_bits(slot: TextureFlags, channel: TextureChannel) -> u32 {
    let shift = if slot == TextureFlags::Metallic {
        0
    } else if slot == TextureFlags::Roughness {
        2
    } else if slot == TextureFlags::Ao {
        4
    } else {
        return 0;
    };
    (channel as u32) << shift
}

/// Per-use overlay on a base material
#[derive(Debug, Default)]
pub struct InstanceData {
    material: MaterialHandle,
    ready: bool,
    is_dirty: bool,
    per_draw_id: Option<u32>,
    base_colour: Vec4,
    uv_offset: Vec3,
    uv_scale: Vec3,
    flags: MaterialFlags,
}

impl InstanceData {
    pub fn material(&self) -> MaterialHandle {
        self.material
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn per_draw_id(&self) -> Option<u32> {
        self.per_draw_id
    }

    pub fn uniforms(&self) -> InstanceUniforms {
        InstanceUniforms {
            base_colour: self.base_colour.to_array(),
            uv_offset: self.uv_offset.extend(0.0).to_array(),
            uv_scale: self.uv_scale.extend(0.0).to_array(),
            flags: self.flags.bits(),
            _padding: [0; 3],
        }
    }

    /// Copies the base's current values and claims a per-draw slot
    fn initialize(
        &mut self,
        binder: &mut dyn ShaderBinder,
        material: &MaterialData,
    ) -> Result<(), MaterialError> {
        let shader = material.shader.ok_or(MaterialError::NotReady)?;
        self.per_draw_id = Some(binder.acquire_per_draw(shader)?);
        self.base_colour = material.base_colour;
        self.uv_offset = material.uv_offset;
        self.uv_scale = material.uv_scale;
        self.flags = material.flags;
        self.is_dirty = true;
        self.ready = true;
        Ok(())
    }

    fn release_per_draw(&mut self, binder: &mut dyn ShaderBinder, shader: Option<ShaderId>) {
        if let (Some(shader), Some(per_draw_id)) = (shader, self.per_draw_id.take()) {
            binder.release_per_draw(shader, per_draw_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialSummary {
    pub name: Name,
    pub kind: MaterialKind,
    pub status: MaterialStatus,
    pub generation: u32,
    pub instances: usize,
}

/// Base materials and their instances.
///
/// Every acquired instance holds one reference on its material's cache entry. The first acquire of a
/// name reserves the base and listens for the cache's completion; the base and any instances
/// acquired in the meantime are created by [`MaterialSystem::update`] once the resource loads.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct MaterialSystem {
    config: MaterialSystemConfig,
    materials: SlotArena<MaterialData>,
    instances: SlotArena<InstanceData>,
    by_name: HashMap<Name, MaterialHandle>,
    #[derivative(Debug = "ignore")]
    events_send: Sender<ResourceEvent>,
    #[derivative(Debug = "ignore")]
    events_recv: Receiver<ResourceEvent>,
    default_material: Option<MaterialHandle>,
}

impl MaterialSystem {
    pub fn new(config: MaterialSystemConfig) -> Result<Self, MaterialError> {
        config.validate()?;
        let (events_send, events_recv) = crossbeam_channel::unbounded();
        Ok(Self {
            config,
            materials: SlotArena::with_capacity(config.max_material_count as usize),
            instances: SlotArena::with_capacity(config.max_instance_count as usize),
            by_name: HashMap::new(),
            events_send,
            events_recv,
            default_material: None,
        })
    }

    pub fn config(&self) -> &MaterialSystemConfig {
        &self.config
    }

    /// Creates the default material from an inline source. It is never auto-released.
    pub fn initialize(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
    ) -> Result<(), MaterialError> {
        if self.default_material.is_some() {
            return Ok(());
        }
        let name = Name::from(DEFAULT_MATERIAL_NAME);
        let info = RequestInfo::new()
            .with_source(MaterialAsset::default())
            .auto_release(false);
        let material = self.reserve_material(cache, name, info)?;
        if let Some((_, error)) = self
            .drain_events(cache, binder)
            .into_iter()
            .find(|(failed, _)| *failed == material)
        {
            return Err(error);
        }
        self.default_material = Some(material);
        tracing::info!(
            "Material system initialized with room for {} materials and {} instances",
            self.config.max_material_count,
            self.config.max_instance_count
        );
        Ok(())
    }

    pub fn default_material(&self) -> Option<MaterialHandle> {
        self.default_material
    }

    /// New instance of the built-in default material
    pub fn default_instance(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
    ) -> Result<MaterialInstance, MaterialError> {
        self.initialize(cache, binder)?;
        self.acquire(cache, binder, DEFAULT_MATERIAL_NAME)
    }

    /// Acquires a new instance of the material `name` from the configured package
    pub fn acquire(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        name: impl Into<Name>,
    ) -> Result<MaterialInstance, MaterialError> {
        let name = name.into();
        let info = RequestInfo::new().with_asset(AssetInfo::new(
            AssetType::Material,
            self.config.package,
            name,
        ));
        self.acquire_from(cache, binder, name, info)
    }

    /// Acquires a new instance of `name`, populating the material from `info` if it is not cached
    pub fn acquire_from(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        name: impl Into<Name>,
        info: RequestInfo,
    ) -> Result<MaterialInstance, MaterialError> {
        let name = name.into();
        let instance = self.instances.acquire_slot()?;
        let material = match self.by_name.get(&name).copied() {
            Some(material) => {
                if let Err(e) = cache.request(name, ResourceType::Material, info) {
                    self.instances.release_slot(instance.index())?;
                    return Err(e.into());
                }
                if let Some(data) = self.materials.get_mut(&material) {
                    data.held_references += 1;
                }
                material
            }
            None => match self.reserve_material(cache, name, info) {
                Ok(material) => material,
                Err(e) => {
                    self.instances.release_slot(instance.index())?;
                    return Err(e);
                }
            },
        };
        let handle = MaterialInstance { material, instance };

        let data = self
            .materials
            .get_mut(&material)
            .ok_or(MaterialError::StaleHandle)?;
        data.instances.push(instance);
        let slot = self
            .instances
            .get_mut(&instance)
            .ok_or(MaterialError::StaleHandle)?;
        slot.material = material;
        if data.status == MaterialStatus::Ready {
            if let Err(e) = slot.initialize(binder, data) {
                self.release(cache, binder, handle)?;
                return Err(e);
            }
        }

        // completions that arrived while requesting
        for (failed, error) in self.drain_events(cache, binder) {
            if failed == material {
                return Err(error);
            }
        }
        tracing::trace!("Acquired instance {:?} of {}", instance, name);
        Ok(handle)
    }

    /// Claims a base slot for `name` and requests its resource, listening for completion
    fn reserve_material(
        &mut self,
        cache: &mut ResourceCache,
        name: Name,
        info: RequestInfo,
    ) -> Result<MaterialHandle, MaterialError> {
        let material = self.materials.acquire_slot()?;
        let info = info.listener(self.events_send.clone(), material.unique_id());
        match cache.request(name, ResourceType::Material, info) {
            Ok(resource) => {
                if let Some(data) = self.materials.get_mut(&material) {
                    data.name = name;
                    data.resource = resource;
                    data.held_references = 1;
                }
                self.by_name.insert(name, material);
                tracing::debug!("Reserved material {}", name);
                Ok(material)
            }
            Err(e) => {
                self.materials.release_slot(material.index())?;
                Err(e.into())
            }
        }
    }

    /// Applies cache completions and picks up reloaded materials. Returns the number of
    /// completions processed.
    pub fn update(&mut self, cache: &mut ResourceCache, binder: &mut dyn ShaderBinder) -> usize {
        let processed = self.events_recv.len();
        self.drain_events(cache, binder);
        self.sync_generations(cache);
        processed
    }

    fn drain_events(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
    ) -> Vec<(MaterialHandle, MaterialError)> {
        let mut failures = Vec::new();
        while let Ok(event) = self.events_recv.try_recv() {
            let Some(material) = self
                .by_name
                .get(&event.name)
                .copied()
                .filter(|material| material.unique_id() == event.context)
            else {
                tracing::debug!("Dropping completion for released material {}", event.name);
                continue;
            };
            let result = match event.outcome.clone() {
                Ok(()) => self.material_create(cache, binder, material, &event),
                Err(error) => {
                    // the cache entry is already gone
                    if let Some(data) = self.materials.get_mut(&material) {
                        data.held_references = 0;
                    }
                    self.destroy_material(cache, binder, material);
                    Err(error.into())
                }
            };
            if let Err(error) = result {
                tracing::error!("Material {} failed: {}", event.name, error);
                failures.push((material, error));
            }
        }
        failures
    }

    fn material_create(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        material: MaterialHandle,
        event: &ResourceEvent,
    ) -> Result<(), MaterialError> {
        let asset = cache
            .payload::<MaterialResource>(&event.handle)
            .and_then(|payload| payload.asset.clone());
        let result = match asset {
            Some(asset) => self.build_material(cache, binder, material, &asset, event),
            None => Err(ResourceError::StaleHandleUse.into()),
        };
        if result.is_err() {
            self.destroy_material(cache, binder, material);
        }
        result
    }

    fn build_material(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        material: MaterialHandle,
        asset: &MaterialAsset,
        event: &ResourceEvent,
    ) -> Result<(), MaterialError> {
        let data = self
            .materials
            .get_mut(&material)
            .ok_or(MaterialError::StaleHandle)?;
        if data.status == MaterialStatus::Ready {
            return Ok(());
        }
        let shader = binder
            .shader_for(asset.kind)
            .ok_or(MaterialError::UnsupportedKind(asset.kind))?;
        data.shader = Some(shader);
        data.group_id = Some(binder.acquire_group(shader)?);
        data.assemble(cache, asset);
        data.resource = event.handle;
        data.resource_generation = event.generation;
        data.renderer_frame_number = None;
        data.status = MaterialStatus::Ready;

        for instance in data.instances.iter() {
            if let Some(slot) = self.instances.get_mut(instance) {
                slot.initialize(binder, data)?;
            }
        }
        tracing::debug!(
            "Created material {} ({:?}) with {} instances",
            data.name,
            data.kind,
            data.instances.len()
        );
        Ok(())
    }

    /// Re-reads materials whose cache entry was reloaded since they were created
    fn sync_generations(&mut self, cache: &mut ResourceCache) {
        for (_, data) in self.materials.iter_mut() {
            if data.status != MaterialStatus::Ready {
                continue;
            }
            data.prune_textures(cache);
            let Ok(resource) = cache.get(&data.resource) else {
                continue;
            };
            let generation = resource.generation();
            if !resource.is_loaded() || generation == data.resource_generation {
                continue;
            }
            let Some(asset) = resource
                .payload::<MaterialResource>()
                .and_then(|payload| payload.asset.clone())
            else {
                continue;
            };
            if asset.kind != data.kind {
                tracing::warn!(
                    "Material {} reloaded as {:?}, unload it to change its kind",
                    data.name,
                    asset.kind
                );
                data.resource_generation = generation;
                continue;
            }
            data.assemble(cache, &asset);
            data.resource_generation = generation;
            data.renderer_frame_number = None;
            for instance in data.instances.iter() {
                if let Some(slot) = self.instances.get_mut(instance) {
                    slot.is_dirty = true;
                }
            }
            tracing::debug!("Material {} synced to generation {}", data.name, generation);
        }
    }

    /// Destroys every instance of `material`, then the material itself, releasing the cache
    /// references it still holds
    fn destroy_material(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        material: MaterialHandle,
    ) {
        let Some(data) = self.materials.get_mut(&material) else {
            return;
        };
        let shader = data.shader;
        for instance in std::mem::take(&mut data.instances) {
            if let Err(e) = self
                .instances
                .remove_with(instance, |slot| slot.release_per_draw(binder, shader))
            {
                tracing::debug!("Skipping instance {:?} of {}: {}", instance, data.name, e);
            }
        }
        let released = self.materials.remove_with(material, |data| {
            data.release_textures(cache);
            for _ in 0..data.held_references {
                match cache.release_handle(&data.resource) {
                    Ok(_) => {}
                    Err(ResourceError::StaleHandleUse) => {
                        tracing::debug!("Material {}: resource is already gone", data.name);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Material {}: {}", data.name, e);
                        break;
                    }
                }
            }
            if let (Some(shader), Some(group_id)) = (data.shader, data.group_id.take()) {
                binder.release_group(shader, group_id);
            }
            data.name
        });
        if let Ok(name) = released {
            if self.by_name.get(&name) == Some(&material) {
                self.by_name.remove(&name);
            }
            tracing::debug!("Destroyed material {}", name);
        }
        if self.default_material == Some(material) {
            self.default_material = None;
        }
    }

    /// Destroys `handle`'s instance and drops its cache reference. The material goes with it once
    /// the cache tears its resource down.
    pub fn release(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        handle: MaterialInstance,
    ) -> Result<(), MaterialError> {
        self.instance(handle)?;
        let resource = self
            .materials
            .get(&handle.material)
            .ok_or(MaterialError::StaleHandle)?
            .resource;
        // the cache reference goes first so a refusal leaves the instance intact
        let released = cache.release_handle(&resource)?;
        let data = self
            .materials
            .get_mut(&handle.material)
            .ok_or(MaterialError::StaleHandle)?;
        let shader = data.shader;
        data.instances.retain(|instance| *instance != handle.instance);
        data.held_references = data.held_references.saturating_sub(1);
        let name = data.name;
        if let Err(e) = self
            .instances
            .remove_with(handle.instance, |slot| slot.release_per_draw(binder, shader))
        {
            tracing::debug!(
                "Instance {:?} of {} was already gone: {}",
                handle.instance,
                name,
                e
            );
        }
        match released {
            Released::TornDown => self.destroy_material(cache, binder, handle.material),
            Released::Remaining(count) => {
                tracing::trace!("Material {} has {} references left", name, count);
            }
        }
        Ok(())
    }

    /// Destroys the material `name` and all of its instances regardless of outstanding handles
    pub fn unload(
        &mut self,
        cache: &mut ResourceCache,
        binder: &mut dyn ShaderBinder,
        name: impl Into<Name>,
    ) -> Result<(), MaterialError> {
        let name = name.into();
        let material = *self
            .by_name
            .get(&name)
            .ok_or(ResourceError::UnknownResource(name))?;
        self.destroy_material(cache, binder, material);
        Ok(())
    }

    /// Binds and uploads what `handle` needs for a draw in `frame_number`.
    ///
    /// The material's group uniforms go up at most once per frame however many of its instances
    /// are applied. Instance uniforms go up only when they changed.
    pub fn apply(
        &mut self,
        binder: &mut dyn ShaderBinder,
        handle: MaterialInstance,
        frame_number: u64,
    ) -> Result<(), MaterialError> {
        if !self.instance(handle)?.ready {
            return Err(MaterialError::NotReady);
        }
        let material = self
            .materials
            .get_mut(&handle.material)
            .ok_or(MaterialError::StaleHandle)?;
        let (Some(shader), Some(group_id)) = (material.shader, material.group_id) else {
            return Err(MaterialError::NotReady);
        };
        if material.renderer_frame_number != Some(frame_number) {
            binder.bind_group(shader, group_id)?;
            binder.upload_group(shader, group_id, bytemuck::bytes_of(&material.uniforms()))?;
            material.renderer_frame_number = Some(frame_number);
        }

        let instance = self
            .instances
            .get_mut(&handle.instance)
            .ok_or(MaterialError::StaleHandle)?;
        if instance.is_dirty {
            let per_draw_id = instance.per_draw_id.ok_or(MaterialError::NotReady)?;
            binder.upload_per_draw(
                shader,
                per_draw_id,
                bytemuck::bytes_of(&instance.uniforms()),
            )?;
            instance.is_dirty = false;
        }
        Ok(())
    }

    pub fn instance(&self, handle: MaterialInstance) -> Result<&InstanceData, MaterialError> {
        let instance = self
            .instances
            .get(&handle.instance)
            .ok_or(MaterialError::StaleHandle)?;
        if instance.material != handle.material || self.materials.is_stale(&handle.material) {
            return Err(MaterialError::StaleHandle);
        }
        Ok(instance)
    }

    fn ready_instance(&self, handle: MaterialInstance) -> Result<&InstanceData, MaterialError> {
        let instance = self.instance(handle)?;
        if !instance.ready {
            return Err(MaterialError::NotReady);
        }
        Ok(instance)
    }

    fn ready_instance_mut(
        &mut self,
        handle: MaterialInstance,
    ) -> Result<&mut InstanceData, MaterialError> {
        self.ready_instance(handle)?;
        self.instances
            .get_mut(&handle.instance)
            .ok_or(MaterialError::StaleHandle)
    }

    pub fn is_ready(&self, handle: MaterialInstance) -> bool {
        self.ready_instance(handle).is_ok()
    }

    pub fn is_dirty(&self, handle: MaterialInstance) -> Result<bool, MaterialError> {
        Ok(self.instance(handle)?.is_dirty)
    }

    pub fn base_colour(&self, handle: MaterialInstance) -> Result<Vec4, MaterialError> {
        Ok(self.ready_instance(handle)?.base_colour)
    }

    pub fn set_base_colour(
        &mut self,
        handle: MaterialInstance,
        base_colour: Vec4,
    ) -> Result<(), MaterialError> {
        let instance = self.ready_instance_mut(handle)?;
        instance.base_colour = base_colour;
        instance.is_dirty = true;
        Ok(())
    }

    pub fn uv_offset(&self, handle: MaterialInstance) -> Result<Vec3, MaterialError> {
        Ok(self.ready_instance(handle)?.uv_offset)
    }

    pub fn set_uv_offset(
        &mut self,
        handle: MaterialInstance,
        uv_offset: Vec3,
    ) -> Result<(), MaterialError> {
        let instance = self.ready_instance_mut(handle)?;
        instance.uv_offset = uv_offset;
        instance.is_dirty = true;
        Ok(())
    }

    pub fn uv_scale(&self, handle: MaterialInstance) -> Result<Vec3, MaterialError> {
        Ok(self.ready_instance(handle)?.uv_scale)
    }

    pub fn set_uv_scale(
        &mut self,
        handle: MaterialInstance,
        uv_scale: Vec3,
    ) -> Result<(), MaterialError> {
        let instance = self.ready_instance_mut(handle)?;
        instance.uv_scale = uv_scale;
        instance.is_dirty = true;
        Ok(())
    }

    pub fn flag(&self, handle: MaterialInstance, flag: MaterialFlags) -> Result<bool, MaterialError> {
        Ok(self.ready_instance(handle)?.flags.contains(flag))
    }

    pub fn set_flag(
        &mut self,
        handle: MaterialInstance,
        flag: MaterialFlags,
        enabled: bool,
    ) -> Result<(), MaterialError> {
        let instance = self.ready_instance_mut(handle)?;
        instance.flags.set(flag, enabled);
        instance.is_dirty = true;
        Ok(())
    }

    pub fn material(&self, handle: &MaterialHandle) -> Option<&MaterialData> {
        self.materials.get(handle)
    }

    pub fn material_by_name(&self, name: impl Into<Name>) -> Option<MaterialHandle> {
        self.by_name.get(&name.into()).copied()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Logs and returns one row per material
    pub fn dump(&self) -> Vec<MaterialSummary> {
        let mut summaries: Vec<MaterialSummary> = self
            .materials
            .iter()
            .map(|(_, data)| MaterialSummary {
                name: data.name,
                kind: data.kind,
                status: data.status,
                generation: data.resource_generation,
                instances: data.instances.len(),
            })
            .collect();
        summaries.sort_by_key(|summary| summary.name);
        tracing::info!("{} materials", summaries.len());
        for summary in summaries.iter() {
            tracing::info!(
                "  {} ({:?}) {:?} gen={} instances={}",
                summary.name,
                summary.kind,
                summary.status,
                summary.generation,
                summary.instances
            );
        }
        summaries
    }

    /// Destroys every material, instances first, and drops all cache references held
    pub fn shutdown(&mut self, cache: &mut ResourceCache, binder: &mut dyn ShaderBinder) {
        if self.materials.is_empty() && self.instances.is_empty() {
            return;
        }
        let count = self.materials.len();
        for material in self.materials.handles() {
            self.destroy_material(cache, binder, material);
        }
        self.by_name.clear();
        let dropped = self.events_recv.try_iter().count();
        tracing::info!(
            "Material system shut down, destroyed {} materials and dropped {} completions",
            count,
            dropped
        );
    }
}
