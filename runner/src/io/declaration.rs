//! Declaration file loading.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::declaration::Declaration;

/// Parse a TOML declaration. Unknown keys and invalid `ensure` values are
/// rejected here, before anything else runs.
pub fn parse_declaration(raw: &str) -> Result<Declaration> {
    let declaration: Declaration = toml::from_str(raw).context("parse declaration")?;
    Ok(declaration)
}

pub fn load_declaration(path: &Path) -> Result<Declaration> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read declaration {}", path.display()))?;
    let declaration =
        parse_declaration(&contents).with_context(|| format!("load {}", path.display()))?;
    debug!(
        path = %path.display(),
        runners = declaration.runners.len(),
        "declaration loaded"
    );
    Ok(declaration)
}
