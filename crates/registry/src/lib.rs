//! Immutable catalog of invocable projects.
//!
//! A [`Registry`] is built once at startup from a list of
//! [`ProjectDescriptor`]s and is read-only afterwards. Lookups are O(1) by
//! project id; listing preserves registration order.

use std::collections::{BTreeSet, HashMap};

use shared::domain::{ProjectDescriptor, ProjectId};
use thiserror::Error;

mod catalog;

pub use catalog::builtin_catalog;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("project '{0}' not found")]
    NotFound(String),
    #[error("project '{0}' is registered more than once")]
    Duplicate(ProjectId),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    projects: Vec<ProjectDescriptor>,
    index: HashMap<ProjectId, usize>,
}

impl Registry {
    pub fn new(projects: Vec<ProjectDescriptor>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(projects.len());
        for (position, project) in projects.iter().enumerate() {
            if index.insert(project.id.clone(), position).is_some() {
                return Err(RegistryError::Duplicate(project.id.clone()));
            }
        }
        Ok(Self { projects, index })
    }

    /// Registry holding only the compiled-in catalog.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(builtin_catalog())
    }

    pub fn list_projects(&self) -> &[ProjectDescriptor] {
        &self.projects
    }

    pub fn list_categories(&self) -> BTreeSet<String> {
        self.projects
            .iter()
            .map(|project| project.category.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<&ProjectDescriptor, RegistryError> {
        self.index
            .get(id)
            .map(|&position| &self.projects[position])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
