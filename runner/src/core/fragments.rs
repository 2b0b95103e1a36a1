//! Ordered store of named file fragments.

use std::collections::BTreeMap;

use crate::core::error::AssemblyError;

/// Identifies the file a fragment contributes to (its absolute path).
pub type FileId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub target: FileId,
    pub name: String,
    pub order: i64,
    pub content: String,
}

impl Fragment {
    pub fn new(
        target: impl Into<FileId>,
        name: impl Into<String>,
        order: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            name: name.into(),
            order,
            content: content.into(),
        }
    }
}

/// At most one fragment per `(target, name)`.
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    fragments: BTreeMap<(FileId, String), Fragment>,
}

impl FragmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any fragment sharing `(target, name)`; last write wins.
    pub fn upsert(&mut self, fragment: Fragment) {
        let key = (fragment.target.clone(), fragment.name.clone());
        self.fragments.insert(key, fragment);
    }

    /// Insert a fragment that must not already exist.
    ///
    /// Used by the assembly pipeline, where a repeated key means two
    /// contributors collided.
    pub fn insert(&mut self, fragment: Fragment) -> Result<(), AssemblyError> {
        let key = (fragment.target.clone(), fragment.name.clone());
        if self.fragments.contains_key(&key) {
            return Err(AssemblyError::DuplicateFragment {
                target: fragment.target,
                name: fragment.name,
            });
        }
        self.fragments.insert(key, fragment);
        Ok(())
    }

    /// Fragments for `target`, ascending by `(order, name)`.
    pub fn list(&self, target: &str) -> Vec<&Fragment> {
        let mut out: Vec<&Fragment> = self
            .fragments
            .values()
            .filter(|fragment| fragment.target == target)
            .collect();
        out.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        out
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}
