//! Renders a target's fragments into one managed file.

use crate::core::fragments::FragmentStore;

/// Literal first line of every managed file.
pub const MANAGED_HEADER: &str = "# MANAGED BY RUNNER-FLEET";

/// Fixed ownership and permissions of a managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o444,
        }
    }
}

/// A fully regenerated managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub path: String,
    pub metadata: FileMetadata,
    pub ensure_trailing_newline: bool,
    /// Fragment contents in render order.
    pub body: Vec<String>,
}

impl AssembledFile {
    /// Final file bytes: one `\n` between fragments and exactly one at EOF.
    pub fn contents(&self) -> String {
        let mut out = String::new();
        for (idx, chunk) in self.body.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            out.push_str(chunk.trim_end_matches('\n'));
        }
        if self.ensure_trailing_newline && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Assemble every fragment registered for `target`.
pub fn render(store: &FragmentStore, target: &str, metadata: &FileMetadata) -> AssembledFile {
    let body = store
        .list(target)
        .into_iter()
        .map(|fragment| fragment.content.clone())
        .collect();
    AssembledFile {
        path: target.to_string(),
        metadata: metadata.clone(),
        ensure_trailing_newline: true,
        body,
    }
}
