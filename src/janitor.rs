//! Background sweep of abandoned workspaces.
//!
//! Safety net for workspaces whose deferred cleanup never ran. Symlinks are
//! never followed or removed, and every candidate is re-validated against the
//! resolved root right before removal.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::interval;

use crate::metrics::JANITOR_REMOVED;
use crate::workspace::is_strict_descendant;

#[derive(Debug, Clone)]
pub struct Janitor {
    root: PathBuf,
    max_age: Duration,
}

/// Outcome of one sweep, mostly for logs and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub skipped_symlinks: usize,
    pub blocked: usize,
    pub failed: usize,
}

impl Janitor {
    pub fn new(root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            max_age,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    /// Sweep as if the current time were `now`.
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Janitor could not read workspace root");
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();

            // lstat: never follow links
            let meta = match std::fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(_) => continue,
            };

            if meta.file_type().is_symlink() {
                tracing::warn!(security = true, path = %path.display(), "Janitor skipping symlink");
                report.skipped_symlinks += 1;
                continue;
            }
            if !meta.is_dir() {
                continue;
            }

            let Ok(modified) = meta.modified() else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            self.reap(path, age, &mut report);
        }

        report
    }

    // Re-check containment against the resolved root, then remove
    fn reap(&self, path: PathBuf, age: Duration, report: &mut SweepReport) {
        if !is_strict_descendant(&self.root, &path) {
            tracing::warn!(security = true, path = %path.display(), "Janitor blocked traversal attempt");
            report.blocked += 1;
            return;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), age_secs = age.as_secs(), "Removed stale workspace");
                JANITOR_REMOVED.inc();
                report.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale workspace");
                report.failed += 1;
            }
        }
    }
}

// Janitor loop - runs every `every` for the life of the process
pub async fn run_janitor(janitor: Janitor, every: Duration) {
    let mut interval = interval(every);
    tracing::info!(root = %janitor.root().display(), interval = ?every, max_age = ?janitor.max_age, "Janitor started");

    loop {
        interval.tick().await;

        let sweeper = janitor.clone();
        match tokio::task::spawn_blocking(move || sweeper.sweep()).await {
            Ok(report) if !report.removed.is_empty() || report.failed > 0 => {
                tracing::info!(
                    removed = report.removed.len(),
                    failed = report.failed,
                    skipped_symlinks = report.skipped_symlinks,
                    blocked = report.blocked,
                    "Janitor sweep complete"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Janitor sweep panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAX_AGE: Duration = Duration::from_secs(300);

    fn later(by: Duration) -> SystemTime {
        SystemTime::now() + by
    }

    #[test]
    fn test_missing_root_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let janitor = Janitor::new(tmp.path().join("not-created-yet"), MAX_AGE);
        assert_eq!(janitor.sweep(), SweepReport::default());
    }

    #[test]
    fn test_removes_only_stale_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deck2pdf");
        let ws = root.join("a1b2");
        std::fs::create_dir_all(ws.join("nested")).unwrap();
        std::fs::write(ws.join("deck.pptx"), b"PK\x03\x04").unwrap();

        let janitor = Janitor::new(&root, MAX_AGE);

        // Younger than the threshold
        let report = janitor.sweep_at(later(Duration::from_secs(60)));
        assert!(report.removed.is_empty());
        assert!(ws.exists());

        // Older than the threshold
        let report = janitor.sweep_at(later(Duration::from_secs(301)));
        assert_eq!(report.removed, vec![ws.clone()]);
        assert!(!ws.exists());
        assert!(root.exists());
    }

    #[test]
    fn test_ignores_plain_files() {
        let tmp = TempDir::new().unwrap();
        let stray = tmp.path().join("stray.pdf");
        std::fs::write(&stray, b"%PDF").unwrap();

        let janitor = Janitor::new(tmp.path(), MAX_AGE);
        let report = janitor.sweep_at(later(Duration::from_secs(3600)));
        assert!(report.removed.is_empty());
        assert!(stray.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_never_follows_symlink_out_of_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deck2pdf");
        let outside = tmp.path().join("precious");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("keep.txt"), b"keep").unwrap();

        let link = root.join("evil");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        let janitor = Janitor::new(&root, MAX_AGE);
        let report = janitor.sweep_at(later(Duration::from_secs(3600)));

        assert_eq!(report.skipped_symlinks, 1);
        assert!(report.removed.is_empty());
        assert!(outside.join("keep.txt").exists());
        assert!(std::fs::symlink_metadata(&link).is_ok());
    }

    #[test]
    fn test_candidate_outside_root_is_blocked() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deck2pdf");
        let outside = tmp.path().join("deck2pdf-evil");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("keep.txt"), b"keep").unwrap();

        let janitor = Janitor::new(&root, MAX_AGE);
        let mut report = SweepReport::default();

        // Stale candidate that resolves outside the root, e.g. after the root was swapped
        janitor.reap(root.join("..").join("deck2pdf-evil"), Duration::from_secs(3600), &mut report);
        janitor.reap(outside.clone(), Duration::from_secs(3600), &mut report);

        assert_eq!(report.blocked, 2);
        assert!(report.removed.is_empty());
        assert!(outside.join("keep.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_through_symlinked_root_stays_inside_target() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real-root");
        let ws = real.join("stale");
        std::fs::create_dir_all(&ws).unwrap();
        let root = tmp.path().join("deck2pdf");
        std::os::unix::fs::symlink(&real, &root).unwrap();

        let janitor = Janitor::new(&root, MAX_AGE);
        let report = janitor.sweep_at(later(Duration::from_secs(3600)));

        assert_eq!(report.blocked, 0);
        assert_eq!(report.removed, vec![root.join("stale")]);
        assert!(!ws.exists());
        assert!(real.exists());
    }

    #[test]
    fn test_continues_after_multiple_candidates() {
        let tmp = TempDir::new().unwrap();
        for name in ["one", "two", "three"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }

        let janitor = Janitor::new(tmp.path(), MAX_AGE);
        let report = janitor.sweep_at(later(Duration::from_secs(600)));
        assert_eq!(report.removed.len(), 3);
        assert_eq!(report.failed, 0);
    }
}
