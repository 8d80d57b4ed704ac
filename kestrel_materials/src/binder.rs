use crate::asset::MaterialKind;
use kestrel_containers::prelude::SlotArena;

pub type ShaderId = u32;

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Shader {0} does not exist")]
    UnknownShader(ShaderId),
    #[error("Shader {0} has no free binding ids left")]
    OutOfIds(ShaderId),
    #[error("Binding id {id} is not live on shader {shader}")]
    InvalidId { shader: ShaderId, id: u32 },
}

/// Shader-uniform wiring used by the material system.
///
/// A group holds the uniforms shared by every instance of a material; a per-draw slot holds one
/// instance's overrides. Uniform blocks are handed over as raw bytes.
pub trait ShaderBinder {
    fn shader_for(&self, kind: MaterialKind) -> Option<ShaderId>;

    fn acquire_group(&mut self, shader: ShaderId) -> Result<u32, BindingError>;

    fn release_group(&mut self, shader: ShaderId, group_id: u32);

    fn acquire_per_draw(&mut self, shader: ShaderId) -> Result<u32, BindingError>;

    fn release_per_draw(&mut self, shader: ShaderId, per_draw_id: u32);

    fn bind_group(&mut self, shader: ShaderId, group_id: u32) -> Result<(), BindingError>;

    fn upload_group(
        &mut self,
        shader: ShaderId,
        group_id: u32,
        uniforms: &[u8],
    ) -> Result<(), BindingError>;

    fn upload_per_draw(
        &mut self,
        shader: ShaderId,
        per_draw_id: u32,
        uniforms: &[u8],
    ) -> Result<(), BindingError>;
}

/// Calls observed by a recording [`HeadlessBinder`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinderCall {
    AcquireGroup(ShaderId, u32),
    ReleaseGroup(ShaderId, u32),
    AcquirePerDraw(ShaderId, u32),
    ReleasePerDraw(ShaderId, u32),
    BindGroup(ShaderId, u32),
    UploadGroup(ShaderId, u32),
    UploadPerDraw(ShaderId, u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ShaderStats {
    pub binds: usize,
    pub group_uploads: usize,
    pub per_draw_uploads: usize,
    pub live_groups: usize,
    pub live_per_draws: usize,
}

#[derive(Debug)]
struct HeadlessShader {
    kind: MaterialKind,
    groups: SlotArena<()>,
    per_draws: SlotArena<()>,
    stats: ShaderStats,
}

impl HeadlessShader {
    fn new(kind: MaterialKind, max_groups: usize, max_per_draws: usize) -> Self {
        Self {
            kind,
            groups: SlotArena::with_capacity(max_groups),
            per_draws: SlotArena::with_capacity(max_per_draws),
            stats: ShaderStats::default(),
        }
    }
}

/// Binder without a GPU behind it. Hands out group and per-draw ids from bounded pools and counts
/// uploads, optionally recording every call.
#[derive(Debug)]
pub struct HeadlessBinder {
    shaders: Vec<HeadlessShader>,
    calls: Option<Vec<BinderCall>>,
}

impl Default for HeadlessBinder {
    fn default() -> Self {
        Self::new(1024, 4096)
    }
}

impl HeadlessBinder {
    /// One shader each for the standard, water and blended material kinds
    pub fn new(max_groups: usize, max_per_draws: usize) -> Self {
        let shaders = [MaterialKind::Standard, MaterialKind::Water, MaterialKind::Blended]
            .into_iter()
            .map(|kind| HeadlessShader::new(kind, max_groups, max_per_draws))
            .collect();
        Self {
            shaders,
            calls: None,
        }
    }

    pub fn recording(mut self) -> Self {
        self.calls = Some(Vec::new());
        self
    }

    pub fn calls(&self) -> &[BinderCall] {
        self.calls.as_deref().unwrap_or_default()
    }

    pub fn stats(&self, shader: ShaderId) -> Option<ShaderStats> {
        self.shaders.get(shader as usize).map(|shader| shader.stats)
    }

    fn record(&mut self, call: BinderCall) {
        if let Some(calls) = self.calls.as_mut() {
            calls.push(call);
        }
    }

    fn shader_mut(&mut self, shader: ShaderId) -> Result<&mut HeadlessShader, BindingError> {
        self.shaders
            .get_mut(shader as usize)
            .ok_or(BindingError::UnknownShader(shader))
    }
}

impl ShaderBinder for HeadlessBinder {
    fn shader_for(&self, kind: MaterialKind) -> Option<ShaderId> {
        self.shaders
            .iter()
            .position(|shader| shader.kind == kind)
            .map(|index| index as ShaderId)
    }

    fn acquire_group(&mut self, shader: ShaderId) -> Result<u32, BindingError> {
        let state = self.shader_mut(shader)?;
        let id = state
            .groups
            .acquire_slot()
            .map_err(|_| BindingError::OutOfIds(shader))?
            .index();
        state.stats.live_groups += 1;
        self.record(BinderCall::AcquireGroup(shader, id));
        Ok(id)
    }

    fn release_group(&mut self, shader: ShaderId, group_id: u32) {
        let Ok(state) = self.shader_mut(shader) else {
            return;
        };
        if state.groups.release_slot(group_id).is_ok() {
            state.stats.live_groups -= 1;
            self.record(BinderCall::ReleaseGroup(shader, group_id));
        } else {
            tracing::warn!("Release of unknown group {} on shader {}", group_id, shader);
        }
    }

    fn acquire_per_draw(&mut self, shader: ShaderId) -> Result<u32, BindingError> {
        let state = self.shader_mut(shader)?;
        let id = state
            .per_draws
            .acquire_slot()
            .map_err(|_| BindingError::OutOfIds(shader))?
            .index();
        state.stats.live_per_draws += 1;
        self.record(BinderCall::AcquirePerDraw(shader, id));
        Ok(id)
    }

    fn release_per_draw(&mut self, shader: ShaderId, per_draw_id: u32) {
        let Ok(state) = self.shader_mut(shader) else {
            return;
        };
        if state.per_draws.release_slot(per_draw_id).is_ok() {
            state.stats.live_per_draws -= 1;
            self.record(BinderCall::ReleasePerDraw(shader, per_draw_id));
        } else {
            tracing::warn!(
                "Release of unknown per-draw id {} on shader {}",
                per_draw_id,
                shader
            );
        }
    }

    fn bind_group(&mut self, shader: ShaderId, group_id: u32) -> Result<(), BindingError> {
        let state = self.shader_mut(shader)?;
        if state.groups.get_index(group_id).is_none() {
            return Err(BindingError::InvalidId {
                shader,
                id: group_id,
            });
        }
        state.stats.binds += 1;
        self.record(BinderCall::BindGroup(shader, group_id));
        Ok(())
    }

    fn upload_group(
        &mut self,
        shader: ShaderId,
        group_id: u32,
        uniforms: &[u8],
    ) -> Result<(), BindingError> {
        let state = self.shader_mut(shader)?;
        if state.groups.get_index(group_id).is_none() {
            return Err(BindingError::InvalidId {
                shader,
                id: group_id,
            });
        }
        state.stats.group_uploads += 1;
        tracing::trace!("Uploaded {} bytes to group {}", uniforms.len(), group_id);
        self.record(BinderCall::UploadGroup(shader, group_id));
        Ok(())
    }

    fn upload_per_draw(
        &mut self,
        shader: ShaderId,
        per_draw_id: u32,
        uniforms: &[u8],
    ) -> Result<(), BindingError> {
        let state = self.shader_mut(shader)?;
        if state.per_draws.get_index(per_draw_id).is_none() {
            return Err(BindingError::InvalidId {
                shader,
                id: per_draw_id,
            });
        }
        state.stats.per_draw_uploads += 1;
        tracing::trace!(
            "Uploaded {} bytes to per-draw slot {}",
            uniforms.len(),
            per_draw_id
        );
        self.record(BinderCall::UploadPerDraw(shader, per_draw_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_reused() {
        let mut binder = HeadlessBinder::new(2, 2);
        let shader = binder.shader_for(MaterialKind::Standard).unwrap();
        let a = binder.acquire_group(shader).unwrap();
        let b = binder.acquire_group(shader).unwrap();
        assert_eq!(
            binder.acquire_group(shader),
            Err(BindingError::OutOfIds(shader))
        );
        binder.release_group(shader, a);
        assert_eq!(binder.acquire_group(shader), Ok(a));
        assert_ne!(a, b);
        assert_eq!(binder.stats(shader).unwrap().live_groups, 2);
    }

    #[test]
    fn test_custom_kind_has_no_shader() {
        let binder = HeadlessBinder::default();
        assert!(binder.shader_for(MaterialKind::Custom).is_none());
        assert!(binder.shader_for(MaterialKind::Water).is_some());
    }

    #[test]
    fn test_recording_and_invalid_ids() {
        let mut binder = HeadlessBinder::default().recording();
        let shader = binder.shader_for(MaterialKind::Blended).unwrap();
        let group = binder.acquire_group(shader).unwrap();
        binder.bind_group(shader, group).unwrap();
        binder.upload_group(shader, group, &[0; 4]).unwrap();
        assert_eq!(
            binder.upload_per_draw(shader, 9, &[]),
            Err(BindingError::InvalidId { shader, id: 9 })
        );
        assert_eq!(
            binder.calls(),
            &[
                BinderCall::AcquireGroup(shader, group),
                BinderCall::BindGroup(shader, group),
                BinderCall::UploadGroup(shader, group),
            ]
        );
        assert_eq!(binder.bind_group(42, 0), Err(BindingError::UnknownShader(42)));
    }
}
