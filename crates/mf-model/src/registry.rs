//! Declaration-ordered registries for species and parameters.

use std::collections::HashMap;

use mf_expr::Expr;

/// Anything stored in a `Registry` is addressed by a string id.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl<T: Keyed> Keyed for std::sync::Arc<T> {
    fn key(&self) -> &str {
        (**self).key()
    }
}

/// A named numeric state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub id: String,
    pub name: String,
    pub initial_value: f64,
    /// Current value; updated by simulation write-back.
    pub value: f64,
    /// Aggregated rate law from the last successful compile.
    pub rate_law: Option<Expr>,
}

impl Species {
    pub fn new(id: impl Into<String>, initial_value: f64, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            initial_value,
            value: initial_value,
            rate_law: None,
        }
    }
}

impl Keyed for Species {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A named numeric constant referenced by rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub value: f64,
}

impl Parameter {
    pub fn new(id: impl Into<String>, value: f64, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value,
        }
    }
}

impl Keyed for Parameter {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Ordered, id-indexed store.
///
/// Iteration order is insertion order; removal preserves the relative order
/// of the remaining entries.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Keyed> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns the item back if its id is already taken.
    pub fn insert(&mut self, item: T) -> Result<usize, T> {
        if self.index.contains_key(item.key()) {
            return Err(item);
        }
        let position = self.items.len();
        self.index.insert(item.key().to_string(), position);
        self.items.push(item);
        Ok(position)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let position = self.index.remove(id)?;
        let item = self.items.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(item)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.index.get(id).map(|&i| &mut self.items[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Declaration-order position of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Keyed::key)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a, T: Keyed> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
