use std::path::{Path, PathBuf};

/// Application-level constants
pub const APP_NAME: &str = "tagbridge";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that enables the diagnostic dump and names its directory.
pub const DUMP_DIR_ENV: &str = "TAGBRIDGE_DUMP_DIR";

/// Debug builds log the library at `debug`, release builds stay at `info`.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "info,tagbridge_lib=debug"
    } else {
        "info"
    }
}

/// Resolve the diagnostic dump base directory.
///
/// Priority:
/// 1. `TAGBRIDGE_DUMP_DIR` env var
/// 2. the directory from the mapping configuration
/// 3. `None` (dump disabled)
pub fn resolve_dump_dir(configured: Option<&Path>) -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(DUMP_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    configured.map(Path::to_path_buf)
}
