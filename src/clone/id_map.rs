use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("source identifier {source_id} is already mapped")]
pub struct DuplicateMapping {
    pub source_id: String,
}

/// Run-local source → target identifier mapping.
///
/// Insert-only: a source identifier maps to exactly one target for the life
/// of a run.
#[derive(Debug, Clone)]
pub struct IdentifierMap<S, T> {
    entries: HashMap<S, T>,
}

impl<S, T> Default for IdentifierMap<S, T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S, T> IdentifierMap<S, T>
where
    S: Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: S, target: T) -> Result<(), DuplicateMapping> {
        if self.entries.contains_key(&source) {
            return Err(DuplicateMapping {
                source_id: format!("{source:?}"),
            });
        }
        self.entries.insert(source, target);
        Ok(())
    }

    pub fn get(&self, source: &S) -> Option<&T> {
        self.entries.get(source)
    }

    pub fn contains(&self, source: &S) -> bool {
        self.entries.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, &T)> {
        self.entries.iter()
    }
}
