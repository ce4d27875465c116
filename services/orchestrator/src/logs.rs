//! On-disk layout of a run's logs.
//!
//! ```text
//! <log root>/
//! └── <scenario>/
//!     ├── vmssId.txt
//!     └── diagnostics/
//!         ├── cluster-provision.log
//!         └── ...
//! ```

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// File holding the ARM resource ID of the scenario's scale set.
pub const VMSS_ID_FILE: &str = "vmssId.txt";

/// Directory for artifacts pulled off the instance.
pub const DIAGNOSTICS_DIR: &str = "diagnostics";

/// Root of the run's log tree.
#[derive(Debug, Clone)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    /// Create the log root if missing.
    pub async fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create and return the scenario's directory, emptying a leftover one
    /// from a previous run.
    pub async fn scenario_dir(&self, scenario: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(sanitize_file_name(scenario));
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(dir = %dir.display(), "Removed stale scenario log dir"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

/// Write `contents` to `dir/name`, creating `dir` if needed.
pub async fn write_file(dir: &Path, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(sanitize_file_name(name));
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}

/// Reduce a remote-supplied name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// [`sanitize_file_name`], with `-1`, `-2`, ... inserted before the
/// extension when the result is already in `taken`.
pub fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    let name = sanitize_file_name(name);
    if taken.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name.as_str(), None),
    };
    let mut n = 1u32;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
