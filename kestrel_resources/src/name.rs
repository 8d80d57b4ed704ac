use dashmap::DashMap;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Original spellings of every name created in this process, keyed by id
fn interner() -> &'static DashMap<u64, Arc<str>> {
    static INTERNER: OnceLock<DashMap<u64, Arc<str>>> = OnceLock::new();
    INTERNER.get_or_init(DashMap::new)
}

/// Interned, case-insensitive identifier.
///
/// Two names built from strings differing only in case compare equal. The first spelling seen is
/// kept for display.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Name(u64);

impl Name {
    pub const NONE: Name = Name(0);

    pub fn new(value: &str) -> Self {
        if value.is_empty() {
            return Self::NONE;
        }
        let mut hasher = std::hash::DefaultHasher::new();
        for c in value.chars().flat_map(char::to_lowercase) {
            c.hash(&mut hasher);
        }
        // 0 is reserved for NONE
        let id = hasher.finish().max(1);
        interner().entry(id).or_insert_with(|| Arc::from(value));
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn as_str(&self) -> Option<Arc<str>> {
        interner().get(&self.0).map(|entry| entry.value().clone())
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&String> for Name {
    fn from(value: &String) -> Self {
        Self::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.as_str() {
            Some(value) => f.write_str(&value),
            None if self.is_none() => f.write_str("<none>"),
            None => write!(f, "#{:016x}", self.0),
        }
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name(\"{}\")", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive() {
        assert_eq!(Name::new("Textures/Wood"), Name::new("textures/wood"));
        assert_ne!(Name::new("wood"), Name::new("stone"));
    }

    #[test]
    fn test_display_keeps_first_spelling() {
        let name = Name::new("Kestrel_Display_Test");
        let again = Name::new("kestrel_display_test");
        assert_eq!(name.to_string(), "Kestrel_Display_Test");
        assert_eq!(again.to_string(), "Kestrel_Display_Test");
    }

    #[test]
    fn test_empty_is_none() {
        assert!(Name::new("").is_none());
        assert_eq!(Name::default(), Name::NONE);
        assert_eq!(Name::NONE.to_string(), "<none>");
    }
}
