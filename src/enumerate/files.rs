//! Recursive `.mwm` discovery for geometry index recalculation.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::EnumerationError;
use crate::scheduler::WorkUnit;

/// File suffix of map files.
pub const MWM_SUFFIX: &str = ".mwm";

/// Map files that never get a geometry index.
pub const EXCLUDED_MWMS: [&str; 2] = ["WorldCoasts.mwm", "WorldCoasts_migrate.mwm"];

/// One map file and the directory it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MwmUnit {
    pub file_name: String,
    pub dir: PathBuf,
}

impl MwmUnit {
    pub fn new(file_name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            dir: dir.into(),
        }
    }

    /// File name with the `.mwm` suffix removed; the generator's `--output`.
    pub fn country_name(&self) -> &str {
        self.file_name
            .strip_suffix(MWM_SUFFIX)
            .unwrap_or(&self.file_name)
    }
}

impl fmt::Display for MwmUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.file_name, self.dir.display())
    }
}

impl WorkUnit for MwmUnit {}

/// Recursively finds files ending in `suffix` under `root`, skipping names
/// in `exclude`. The walk is depth first with each directory's entries in
/// name order, so repeated scans yield the same sequence.
///
/// # Errors
///
/// Returns `EnumerationError::NotADirectory` if `root` is not a directory,
/// or `EnumerationError::Walk` if part of the tree cannot be read.
pub fn find_mwms(
    root: &Path,
    suffix: &str,
    exclude: &[&str],
) -> Result<Vec<MwmUnit>, EnumerationError> {
    if !root.is_dir() {
        return Err(EnumerationError::NotADirectory(root.to_path_buf()));
    }

    let mut units = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(EnumerationError::Walk {
                    path: root.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        // Symlinks count when they resolve to a regular file.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };
        if !name.ends_with(suffix) || exclude.contains(&name) {
            continue;
        }

        let dir = entry
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        units.push(MwmUnit::new(name, dir));
    }

    debug!(root = %root.display(), found = units.len(), "Scanned for map files");
    Ok(units)
}

/// Scans the resources directory and, when it differs, the writable one.
pub fn scan_data_dirs(
    resources_dir: &Path,
    writable_dir: &Path,
) -> Result<Vec<MwmUnit>, EnumerationError> {
    let mut units = find_mwms(resources_dir, MWM_SUFFIX, &EXCLUDED_MWMS)?;
    if writable_dir != resources_dir {
        units.extend(find_mwms(writable_dir, MWM_SUFFIX, &EXCLUDED_MWMS)?);
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, b"").expect("create file");
    }

    #[test]
    fn test_find_mwms_recurses_and_filters() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        touch(&root.join("Berlin.mwm"));
        touch(&root.join("WorldCoasts.mwm"));
        touch(&root.join("readme.txt"));
        touch(&root.join("210101/Paris.mwm"));
        touch(&root.join("210101/WorldCoasts_migrate.mwm"));

        let units = find_mwms(root, MWM_SUFFIX, &EXCLUDED_MWMS).expect("scan succeeds");

        // Directory entries are visited in name order, depth first.
        assert_eq!(
            units,
            vec![
                MwmUnit::new("Paris.mwm", root.join("210101")),
                MwmUnit::new("Berlin.mwm", root),
            ]
        );
    }

    #[test]
    fn test_find_mwms_empty_tree() {
        let dir = TempDir::new().expect("tempdir");
        let units = find_mwms(dir.path(), MWM_SUFFIX, &EXCLUDED_MWMS).expect("scan succeeds");
        assert!(units.is_empty());
    }

    #[test]
    fn test_find_mwms_rejects_missing_root() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("nope");
        let err = find_mwms(&missing, MWM_SUFFIX, &EXCLUDED_MWMS).unwrap_err();
        assert!(matches!(err, EnumerationError::NotADirectory(_)));
    }

    #[test]
    fn test_scan_data_dirs_skips_duplicate_dir() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir.path().join("Berlin.mwm"));

        let same = scan_data_dirs(dir.path(), dir.path()).expect("scan succeeds");
        assert_eq!(same.len(), 1);

        let writable = TempDir::new().expect("tempdir");
        touch(&writable.path().join("Rome.mwm"));
        let both = scan_data_dirs(dir.path(), writable.path()).expect("scan succeeds");
        assert_eq!(both.len(), 2);
        assert_eq!(both[1].file_name, "Rome.mwm");
    }

    #[cfg(unix)]
    #[test]
    fn test_find_mwms_follows_file_symlinks() {
        let store = TempDir::new().expect("tempdir");
        touch(&store.path().join("Berlin.mwm"));

        let dir = TempDir::new().expect("tempdir");
        std::os::unix::fs::symlink(store.path().join("Berlin.mwm"), dir.path().join("Berlin.mwm"))
            .expect("symlink");
        std::os::unix::fs::symlink(store.path().join("Gone.mwm"), dir.path().join("Gone.mwm"))
            .expect("dangling symlink");

        let units = find_mwms(dir.path(), MWM_SUFFIX, &[]).expect("scan succeeds");
        assert_eq!(units, vec![MwmUnit::new("Berlin.mwm", dir.path())]);
    }

    #[cfg(unix)]
    #[test]
    fn test_find_mwms_skips_unreadable_subdir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        touch(&dir.path().join("Berlin.mwm"));
        let locked = dir.path().join("locked");
        touch(&locked.join("Paris.mwm"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");

        let readable = fs::read_dir(&locked).is_ok();
        let result = find_mwms(dir.path(), MWM_SUFFIX, &[]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod back");

        let units = result.expect("an unreadable subdirectory does not fail the scan");
        if readable {
            // Permission bits do not apply to this user (e.g. root).
            assert_eq!(units.len(), 2);
        } else {
            assert_eq!(units, vec![MwmUnit::new("Berlin.mwm", dir.path())]);
        }
    }

    #[test]
    fn test_country_name_and_display() {
        let unit = MwmUnit::new("Germany_Berlin.mwm", "/data/210101");
        assert_eq!(unit.country_name(), "Germany_Berlin");
        assert_eq!(unit.to_string(), "Germany_Berlin.mwm in /data/210101");
    }
}
