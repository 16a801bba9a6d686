//! Diagnostic dump: writes the artifacts of one mapping run to disk.
//!
//! Enables inspection of every oracle round: prompts, raw answers, parsed
//! matches, validation issues and the final report.
//!
//! **Activation**: only when the caller asked for debug output AND a dump
//! directory is known (`TAGBRIDGE_DUMP_DIR`, else `dump_dir` in the config).
//!
//! **Output structure**:
//! ```text
//! {dump_dir}/{run_id}/
//!   00-inputs.json
//!   01-segmentation.json
//!   02-global-round-1-prompt.txt
//!   03-global-round-1-response.txt
//!   04-global-round-1-issues.json
//!   ...
//!   NN-report.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

use crate::config;

pub struct DiagnosticDump {
    dir: PathBuf,
    sequence: AtomicUsize,
}

impl DiagnosticDump {
    /// Dump for `run_id` under the resolved base directory, or `None` if disabled.
    ///
    /// Returns `None` (with a warning) if directory creation fails; never
    /// blocks the pipeline.
    pub fn for_run(configured: Option<&Path>, run_id: &Uuid) -> Option<Self> {
        let base = config::resolve_dump_dir(configured)?;
        Self::open(&base, run_id)
    }

    pub fn open(base: &Path, run_id: &Uuid) -> Option<Self> {
        let dir = base.join(run_id.to_string());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Diagnostic dump: failed to create directory"
            );
            return None;
        }
        tracing::debug!(path = %dir.display(), "Diagnostic dump enabled");
        Some(Self {
            dir,
            sequence: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self, label: &str, extension: &str) -> PathBuf {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.dir.join(format!("{n:02}-{label}.{extension}"))
    }

    /// Write a text artifact (prompt, raw oracle answer). Never panics.
    pub fn text(&self, label: &str, text: &str) {
        let path = self.next_path(label, "txt");
        match std::fs::write(&path, text.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = text.len(),
                "Diagnostic dump: text written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write text"
            ),
        }
    }

    /// Write a pretty-printed JSON artifact. Never panics.
    pub fn json<T: serde::Serialize>(&self, label: &str, value: &T) {
        let path = self.next_path(label, "json");
        match serde_json::to_string_pretty(value) {
            Ok(json) => match std::fs::write(&path, json.as_bytes()) {
                Ok(()) => tracing::debug!(
                    path = %path.display(),
                    size = json.len(),
                    "Diagnostic dump: JSON written"
                ),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Diagnostic dump: failed to write JSON"
                ),
            },
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to serialize JSON"
            ),
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_run_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let dump = DiagnosticDump::open(tmp.path(), &run_id).unwrap();
        assert!(dump.dir().exists());
        assert!(dump.dir().ends_with(run_id.to_string()));
    }

    #[test]
    fn artifacts_are_numbered_in_write_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = DiagnosticDump::open(tmp.path(), &Uuid::new_v4()).unwrap();

        dump.text("prompt", "Reference placeholders");
        dump.json("issues", &vec!["collision"]);

        let prompt = std::fs::read_to_string(dump.dir().join("00-prompt.txt")).unwrap();
        assert_eq!(prompt, "Reference placeholders");
        let issues = std::fs::read_to_string(dump.dir().join("01-issues.json")).unwrap();
        assert!(issues.contains("\"collision\""));
        assert!(issues.contains('\n'));
    }

    #[test]
    fn configured_directory_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        // Tests never set TAGBRIDGE_DUMP_DIR, so the configured directory wins.
        let dump = DiagnosticDump::for_run(Some(tmp.path()), &run_id).unwrap();
        assert!(dump.dir().starts_with(tmp.path()));
    }

    #[test]
    fn unwritable_base_disables_dump() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(DiagnosticDump::open(file.path(), &Uuid::new_v4()).is_none());
    }

    #[test]
    fn write_failure_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = DiagnosticDump::open(tmp.path(), &Uuid::new_v4()).unwrap();
        std::fs::remove_dir_all(dump.dir()).unwrap();
        dump.text("prompt", "lost");
        dump.json("report", &"lost");
    }
}
