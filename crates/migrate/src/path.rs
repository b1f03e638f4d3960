//! Migration directory validation

use std::fs;
use std::path::Path;

use tracing::debug;

/// Extension recognised as a migration file
pub const MIGRATION_EXTENSION: &str = "sql";

/// Check whether `path` directly contains at least one regular `.sql` file.
///
/// An empty path, a path that cannot be listed, or a directory without any
/// such file yields `false`. Subdirectories are not searched.
pub fn has_migrations(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return false;
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot list migrations path {}: {}", path.display(), e);
            return false;
        }
    };

    entries.filter_map(Result::ok).any(|entry| {
        let is_file = entry.file_type().map_or(false, |ft| ft.is_file());
        is_file
            && entry
                .path()
                .extension()
                .map_or(false, |ext| ext == MIGRATION_EXTENSION)
    })
}
