use crate::name::Name;
use derivative::Derivative;
use std::any::Any;

/// Generation of a resource that has never finished populating
pub const INVALID_GENERATION: u32 = u32::MAX;

/// Type tag used to dispatch to a [`crate::handler::ResourceHandler`]
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    Text = 0,
    Binary = 1,
    Texture = 2,
    Material = 3,
    Shader = 4,
    StaticMesh = 5,
    BitmapFont = 6,
    SystemFont = 7,
    Scene = 8,
    Audio = 9,
}

impl ResourceType {
    pub const COUNT: usize = 10;

    pub const ALL: [ResourceType; Self::COUNT] = [
        ResourceType::Text,
        ResourceType::Binary,
        ResourceType::Texture,
        ResourceType::Material,
        ResourceType::Shader,
        ResourceType::StaticMesh,
        ResourceType::BitmapFont,
        ResourceType::SystemFont,
        ResourceType::Scene,
        ResourceType::Audio,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ResourceState {
    /// Lookup entry exists, nothing populated yet
    #[default]
    Uninitialized = 0,
    /// CPU-side data attached
    Initialized = 1,
    /// Waiting on the loading collaborator
    Loading = 2,
    Loaded = 3,
}

/// A named, typed unit of cached data.
///
/// The payload is created by the handler's `allocate` and is only ever touched through the
/// handler or the cache.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Resource {
    name: Name,
    kind: ResourceType,
    state: ResourceState,
    generation: u32,
    tags: Vec<Name>,
    #[derivative(Debug = "ignore")]
    payload: Box<dyn Any + Send + Sync>,
}

impl Resource {
    pub fn new(name: Name, kind: ResourceType, payload: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            name,
            kind,
            state: ResourceState::Uninitialized,
            generation: INVALID_GENERATION,
            tags: Vec::new(),
            payload,
        }
    }

    pub fn name(&self) -> Name {
        self.name
    }

    pub fn kind(&self) -> ResourceType {
        self.kind
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn set_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ResourceState::Loaded
    }

    /// [`INVALID_GENERATION`] until the first successful population, then 0, 1, ...
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.state = ResourceState::Loaded;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Takes over the generation and tags of the resource this one replaces on reload
    pub(crate) fn inherit(&mut self, previous: &mut Resource) {
        self.generation = previous.generation;
        self.tags = std::mem::take(&mut previous.tags);
    }

    pub fn tags(&self) -> &[Name] {
        &self.tags
    }

    pub fn has_tag(&self, tag: Name) -> bool {
        self.tags.contains(&tag)
    }

    pub fn add_tag(&mut self, tag: Name) {
        if !self.has_tag(tag) {
            self.tags.push(tag);
        }
    }

    pub fn remove_tag(&mut self, tag: Name) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| *existing != tag);
        before != self.tags.len()
    }

    pub(crate) fn clear_tags(&mut self) {
        self.tags = Vec::new();
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.downcast_mut::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_starts_invalid() {
        let mut resource = Resource::new(Name::new("r"), ResourceType::Text, Box::new(0u32));
        assert_eq!(resource.state(), ResourceState::Uninitialized);
        assert_eq!(resource.generation(), INVALID_GENERATION);
        resource.mark_loaded();
        assert_eq!(resource.generation(), 0);
        resource.mark_loaded();
        assert_eq!(resource.generation(), 1);
        assert!(resource.is_loaded());
    }

    #[test]
    fn test_tags_are_a_set() {
        let mut resource = Resource::new(Name::new("r"), ResourceType::Text, Box::new(()));
        resource.add_tag(Name::new("ui"));
        resource.add_tag(Name::new("UI"));
        resource.add_tag(Name::new("font"));
        assert_eq!(resource.tags().len(), 2);
        assert!(resource.remove_tag(Name::new("ui")));
        assert!(!resource.has_tag(Name::new("ui")));
    }

    #[test]
    fn test_payload_downcast() {
        let mut resource = Resource::new(Name::new("r"), ResourceType::Binary, Box::new(vec![1u8]));
        assert_eq!(resource.payload::<Vec<u8>>(), Some(&vec![1u8]));
        assert!(resource.payload::<String>().is_none());
        resource.payload_mut::<Vec<u8>>().unwrap().push(2);
        assert_eq!(resource.payload::<Vec<u8>>().unwrap().len(), 2);
    }

    #[test]
    fn test_type_index_matches_all() {
        for (i, kind) in ResourceType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
