//! Writes an assembled file only when its managed section changes.
//!
//! The registration binary appends its own `[[runners]]` stanzas to the same
//! file. Everything from the first such line onward belongs to it: change
//! detection ignores that tail and every rewrite carries it over.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::assembler::AssembledFile;
use crate::io::process::run_command_with_timeout;

/// First line of a section owned by the registration binary.
pub const RUNNER_SECTION: &str = "[[runners]]";

/// Outcome of syncing a managed file to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSync {
    Unchanged,
    /// Content matched but the mode had drifted and was reset.
    MetadataRepaired,
    Written,
}

/// How [`sync_file`] treats ownership and foreign sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Run `chown` on the file (needs root).
    pub manage_ownership: bool,
    /// Line prefix where the externally owned tail starts.
    pub preserve_from: Option<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Bring `file.path` in line with the assembled content and metadata.
///
/// The file is replaced atomically when its managed section differs from the
/// assembled content. Otherwise only the mode is checked and repaired. With
/// `manage_ownership`, `chown` is reasserted on every pass.
#[instrument(skip_all, fields(path = %file.path))]
pub fn sync_file(file: &AssembledFile, options: &SyncOptions) -> Result<FileSync> {
    let path = Path::new(&file.path);
    let contents = file.contents();
    let existing = if path.exists() {
        Some(fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?)
    } else {
        None
    };
    let (managed, owned_tail) = match (&existing, &options.preserve_from) {
        (Some(existing), Some(marker)) => split_owned(existing, marker),
        (Some(existing), None) => (existing.as_str(), ""),
        (None, _) => ("", ""),
    };

    if existing.is_some() && managed == contents {
        debug!(preserved_bytes = owned_tail.len(), "managed section unchanged");
        let repaired = repair_mode(path, file.metadata.mode)?;
        if options.manage_ownership {
            chown(path, &file.metadata.owner, &file.metadata.group, options)?;
        }
        return Ok(if repaired {
            FileSync::MetadataRepaired
        } else {
            FileSync::Unchanged
        });
    }

    let mut full = contents;
    full.push_str(owned_tail);

    let parent = path
        .parent()
        .with_context(|| format!("managed file missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("tmp");
    // A leftover read-only temp file from an interrupted pass would block the write.
    if tmp_path.exists() {
        fs::remove_file(&tmp_path)
            .with_context(|| format!("remove stale {}", tmp_path.display()))?;
    }
    fs::write(&tmp_path, &full)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    set_mode(&tmp_path, file.metadata.mode)?;
    if options.manage_ownership {
        chown(&tmp_path, &file.metadata.owner, &file.metadata.group, options)?;
    }
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    info!(
        bytes = full.len(),
        preserved_bytes = owned_tail.len(),
        "managed file written"
    );
    Ok(FileSync::Written)
}

/// Split `existing` at the first line starting with `marker`.
fn split_owned<'a>(existing: &'a str, marker: &str) -> (&'a str, &'a str) {
    let mut offset = 0;
    for line in existing.split_inclusive('\n') {
        if line.trim_start().starts_with(marker) {
            return existing.split_at(offset);
        }
        offset += line.len();
    }
    (existing, "")
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("set mode {mode:o} on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Reset the mode when it drifted. Returns whether anything changed.
#[cfg(unix)]
fn repair_mode(path: &Path, mode: u32) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let current = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions()
        .mode()
        & 0o7777;
    if current == mode {
        return Ok(false);
    }
    warn!(
        current = %format_args!("{current:o}"),
        expected = %format_args!("{mode:o}"),
        "mode drifted"
    );
    set_mode(path, mode)?;
    Ok(true)
}

#[cfg(not(unix))]
fn repair_mode(_path: &Path, _mode: u32) -> Result<bool> {
    Ok(false)
}

fn chown(path: &Path, owner: &str, group: &str, options: &SyncOptions) -> Result<()> {
    let args = vec![format!("{owner}:{group}"), path.display().to_string()];
    let output =
        run_command_with_timeout("chown", &args, options.timeout, options.output_limit_bytes)
            .with_context(|| format!("chown {}", path.display()))?;
    if output.timed_out {
        return Err(anyhow!(
            "chown {owner}:{group} {} timed out after {}s",
            path.display(),
            options.timeout.as_secs()
        ));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "chown {owner}:{group} {} failed with status {:?}: {}",
            path.display(),
            output.status.code(),
            output.stderr_tail()
        ));
    }
    Ok(())
}
