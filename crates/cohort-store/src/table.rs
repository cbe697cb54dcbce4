//! Generic indexed table.
//!
//! Rows keep their insertion order for the life of the process. Integer page
//! tokens index into that order, so rows are never reordered or removed once
//! a [`Table`] is built.

use std::collections::HashMap;

use cohort_types::CompoundId;

use crate::error::{Result, StoreError};

/// Anything stored in a [`Table`].
pub trait Entity {
    /// Kind name used in error messages.
    const KIND: &'static str;

    fn id(&self) -> &CompoundId;

    /// Local name of the owning dataset.
    fn dataset_name(&self) -> &str;

    /// Name, unique within the owning dataset.
    fn name(&self) -> &str;
}

/// Rows of one entity kind with id, name and dataset indices.
#[derive(Debug, Clone)]
pub struct Table<T> {
    rows: Vec<T>,
    by_id: HashMap<CompoundId, usize>,
    by_name: HashMap<(String, String), usize>,
    by_dataset: HashMap<String, Vec<usize>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            by_dataset: HashMap::new(),
        }
    }
}

impl<T: Entity> Table<T> {
    pub(crate) fn insert(&mut self, row: T) -> Result<()> {
        let key = (row.dataset_name().to_string(), row.name().to_string());
        if self.by_name.contains_key(&key) || self.by_id.contains_key(row.id()) {
            return Err(StoreError::Duplicate {
                kind: T::KIND,
                dataset: key.0,
                name: key.1,
            });
        }
        let index = self.rows.len();
        self.by_id.insert(row.id().clone(), index);
        self.by_dataset.entry(key.0.clone()).or_default().push(index);
        self.by_name.insert(key, index);
        self.rows.push(row);
        Ok(())
    }

    pub fn get(&self, id: &CompoundId) -> Result<&T> {
        self.by_id
            .get(id)
            .map(|&i| &self.rows[i])
            .ok_or_else(|| StoreError::not_found(T::KIND, id.as_str()))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&T> {
        self.rows.get(index)
    }

    pub fn get_by_name(&self, dataset: &str, name: &str) -> Result<&T> {
        self.by_name
            .get(&(dataset.to_string(), name.to_string()))
            .map(|&i| &self.rows[i])
            .ok_or_else(|| StoreError::not_found(T::KIND, format!("{dataset}/{name}")))
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows owned by `dataset`, in table order.
    pub fn list<'a>(&'a self, dataset: &str) -> impl ExactSizeIterator<Item = &'a T> + use<'a, T> {
        self.by_dataset
            .get(dataset)
            .map_or(&[][..], Vec::as_slice)
            .iter()
            .map(|&i| &self.rows[i])
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> {
        self.rows.iter()
    }
}
