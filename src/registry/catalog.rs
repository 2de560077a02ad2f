//! Load-once catalog shared by every definition type.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::{CoreError, CoreResult};

/// A content definition that can live in a [`Catalog`].
pub trait Definition {
    type Id: Clone + Eq + Hash + Ord + fmt::Display + AsRef<str>;

    /// Human-readable kind used in error messages ("item", "schedule", ...)
    const KIND: &'static str;

    fn id(&self) -> &Self::Id;

    /// Structural checks run before the definition is accepted.
    fn validate(&self) -> CoreResult<()> {
        Ok(())
    }
}

/// Definitions of one kind keyed by id. Loading rejects empty, duplicate and
/// invalid entries; lookups reject empty and unknown ids.
#[derive(Debug, Clone)]
pub struct Catalog<D: Definition> {
    entries: HashMap<D::Id, D>,
}

impl<D: Definition> Default for Catalog<D> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<D: Definition> Catalog<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, def: D) -> CoreResult<()> {
        let id = def.id();
        if id.as_ref().is_empty() {
            return Err(CoreError::EmptyId { kind: D::KIND });
        }
        if self.entries.contains_key(id) {
            return Err(CoreError::duplicate(D::KIND, id));
        }
        def.validate()?;
        self.entries.insert(id.clone(), def);
        Ok(())
    }

    pub fn get(&self, id: &D::Id) -> CoreResult<&D> {
        if id.as_ref().is_empty() {
            return Err(CoreError::EmptyId { kind: D::KIND });
        }
        self.entries
            .get(id)
            .ok_or_else(|| CoreError::not_found(D::KIND, id))
    }

    pub fn contains(&self, id: &D::Id) -> bool {
        self.entries.contains_key(id)
    }

    /// All ids, sorted.
    pub fn ids(&self) -> Vec<D::Id> {
        let mut ids: Vec<D::Id> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
