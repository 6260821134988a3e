// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Itinerary synchronization.
//!
//! The __synchronizer__ mirrors an itinerary onto the file system of its
//! target directory. It offers three independent operations, plus one
//! composite:
//!
//! 1. __Copy__: copy every path of every member manifest from its source root
//!    into the target. Files are overwritten unconditionally, last write wins.
//! 2. __Delete__: delete every tracked file from the target. Directories are
//!    left alone, and paths that are already gone are skipped.
//! 3. __Prune__: remove directories in the target that are left empty.
//! 4. __Redeploy__: delete, prune, then copy.
//!
//! Every operation is idempotent, so rerunning one after a partial failure
//! picks up where it left off.
//!
//! # Failure Policy
//!
//! By default the synchronizer stops at the first path that fails, and
//! propagates the error. With [`SyncOptions::ignore_errors`] set, the failure
//! is recorded and processing continues with the remaining paths. Either way
//! the report of the call is appended to the itinerary's history before the
//! call returns.

pub mod prune;
pub mod report;

use crate::{
    itinerary::Itinerary,
    manifest::Manifest,
    path::resolve,
    scan::ScanError,
    sync::report::{FileOpKind, FileOpResult},
};

use indicatif::ProgressBar;
use mkdirp::mkdirp;
use std::{
    fs::{self, File, Metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

/// Options steering synchronization.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Record per-path failures and keep going instead of stopping.
    pub ignore_errors: bool,
}

/// Copy, delete, and prune engine operating on itineraries.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    options: SyncOptions,
    progress: ProgressBar,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncOptions::default())
    }
}

impl Synchronizer {
    /// Construct new synchronizer without progress reporting.
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Tick progress bar once for every path processed.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Copy every member manifest into target.
    ///
    /// Produces one report per manifest, in root order.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NoTarget`] if itinerary has no target.
    /// - Return [`SyncError::Copy`] on first failed path, unless errors are
    ///   ignored.
    #[instrument(skip(self, itinerary), level = "debug")]
    pub fn copy(&self, itinerary: &mut Itinerary) -> Result<Vec<FileOpResult>> {
        let target = require_target(itinerary)?;
        let manifests = itinerary.manifests().cloned().collect::<Vec<_>>();
        self.progress.set_length(manifests.iter().map(|m| m.len() as u64).sum());

        let mut results = Vec::with_capacity(manifests.len());
        for manifest in &manifests {
            let (result, failure) = self.copy_manifest(manifest, &target);
            info!("{result}");
            itinerary.record(result.clone());
            results.push(result);

            if let Some(error) = failure {
                return Err(error);
            }
        }

        Ok(results)
    }

    /// Delete every tracked file from target.
    ///
    /// Paths that are already gone, and paths that are directories, are
    /// skipped. Symbolic links are removed, never followed.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NoTarget`] if itinerary has no target.
    /// - Return [`SyncError::Delete`] on first failed path, unless errors are
    ///   ignored.
    #[instrument(skip(self, itinerary), level = "debug")]
    pub fn delete(&self, itinerary: &mut Itinerary) -> Result<FileOpResult> {
        let target = require_target(itinerary)?;
        let paths = itinerary.all_paths_relative();
        self.progress.set_length(paths.len() as u64);

        let mut result = FileOpResult::new(FileOpKind::Delete, &target, &target);
        let mut failure = None;
        for relative in &paths {
            self.progress.inc(1);
            result.process(relative);
            let path = resolve(&target, relative);

            let outcome = match fs::symlink_metadata(&path) {
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    debug!("skip missing {:?}", path.display());
                    result.skip(relative);
                    continue;
                }
                Ok(meta) if meta.is_dir() => {
                    result.skip(relative);
                    continue;
                }
                Err(error) => Err(error),
                Ok(_) => fs::remove_file(&path),
            };

            match outcome {
                Ok(()) => {
                    debug!("delete {:?}", path.display());
                    result.succeed(relative);
                }
                Err(source) => {
                    let error = SyncError::Delete { source, path };
                    if let Some(error) = self.on_failure(&mut result, relative, error) {
                        failure = Some(error);
                        break;
                    }
                }
            }
        }

        self.conclude(itinerary, result, failure)
    }

    /// Remove directories left empty beneath target.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::NoTarget`] if itinerary has no target.
    /// - Return [`SyncError::Scan`] if target cannot be walked.
    /// - Return [`SyncError::Prune`] on first directory that cannot be
    ///   removed, unless errors are ignored.
    #[instrument(skip(self, itinerary), level = "debug")]
    pub fn prune(&self, itinerary: &mut Itinerary) -> Result<FileOpResult> {
        let target = require_target(itinerary)?;
        let (result, failure) =
            prune::prune_empty_dirs(&target, self.options.ignore_errors, &self.progress);

        self.conclude(itinerary, result, failure)
    }

    /// Delete tracked files, prune empty directories, then copy.
    ///
    /// Copying is skipped if deleting or pruning fails, unless errors are
    /// ignored.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError`] of the first step that failed.
    #[instrument(skip(self, itinerary), level = "debug")]
    pub fn redeploy(&self, itinerary: &mut Itinerary) -> Result<Vec<FileOpResult>> {
        let mut results = Vec::new();

        match self.delete(itinerary) {
            Ok(result) => results.push(result),
            Err(error) if !self.options.ignore_errors => return Err(error),
            Err(error) => warn!("redeploy continues after failed delete: {error}"),
        }

        match self.prune(itinerary) {
            Ok(result) => results.push(result),
            Err(error) if !self.options.ignore_errors => return Err(error),
            Err(error) => warn!("redeploy continues after failed prune: {error}"),
        }

        results.extend(self.copy(itinerary)?);

        Ok(results)
    }

    fn copy_manifest(
        &self,
        manifest: &Manifest,
        target: &Path,
    ) -> (FileOpResult, Option<SyncError>) {
        let mut result = FileOpResult::new(FileOpKind::Copy, manifest.root(), target);
        let mut failure = None;

        for relative in manifest.paths_relative() {
            self.progress.inc(1);
            result.process(relative);
            let source = resolve(manifest.root(), relative);
            let destination = resolve(target, relative);

            match copy_entry(&source, &destination) {
                Ok(CopyOutcome::Copied) => result.succeed(relative),
                Ok(CopyOutcome::FolderCreated) => result.create_folder(relative),
                Ok(CopyOutcome::FolderExists) => result.skip(relative),
                Err(error) => {
                    let error = SyncError::Copy {
                        source: error,
                        path: source,
                    };
                    if let Some(error) = self.on_failure(&mut result, relative, error) {
                        failure = Some(error);
                        break;
                    }
                }
            }
        }

        (result.finish(), failure)
    }

    fn on_failure(
        &self,
        result: &mut FileOpResult,
        relative: &str,
        error: SyncError,
    ) -> Option<SyncError> {
        result.fail(relative, error.to_string());
        if self.options.ignore_errors {
            warn!("{error}");
            return None;
        }

        error!("{error}");
        Some(error)
    }

    fn conclude(
        &self,
        itinerary: &mut Itinerary,
        result: FileOpResult,
        failure: Option<SyncError>,
    ) -> Result<FileOpResult> {
        let result = result.finish();
        info!("{result}");
        itinerary.record(result.clone());

        match failure {
            Some(error) => Err(error),
            None => Ok(result),
        }
    }
}

enum CopyOutcome {
    Copied,
    FolderCreated,
    FolderExists,
}

fn copy_entry(source: &Path, destination: &Path) -> std::io::Result<CopyOutcome> {
    let meta = fs::metadata(source)?;
    if meta.is_dir() {
        if destination.is_dir() {
            return Ok(CopyOutcome::FolderExists);
        }
        mkdirp(destination)?;
        return Ok(CopyOutcome::FolderCreated);
    }

    if let Some(parent) = destination.parent() {
        mkdirp(parent)?;
    }
    fs::copy(source, destination)?;
    preserve_mtime(&meta, destination)?;

    Ok(CopyOutcome::Copied)
}

fn preserve_mtime(meta: &Metadata, destination: &Path) -> std::io::Result<()> {
    let modified = meta.modified()?;

    // INVARIANT: Read-only copies still get their modification time.
    let file = match File::options().write(true).open(destination) {
        Ok(file) => file,
        Err(_) => File::open(destination)?,
    };

    file.set_modified(modified)
}

fn require_target(itinerary: &Itinerary) -> Result<PathBuf> {
    itinerary
        .target()
        .map(Path::to_path_buf)
        .ok_or_else(|| SyncError::NoTarget {
            key: itinerary.key().to_owned(),
        })
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Itinerary does not say where to synchronize to.
    #[error("itinerary {key:?} has no target directory")]
    NoTarget { key: String },

    /// Source path could not be copied into target.
    #[error("failed to copy {:?}", path.display())]
    Copy {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target file could not be deleted.
    #[error("failed to delete {:?}", path.display())]
    Delete {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Empty target directory could not be removed.
    #[error("failed to remove empty directory {:?}", path.display())]
    Prune {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target could not be walked for pruning.
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|path| path.to_string()).collect()
    }

    fn fixture() -> anyhow::Result<(TempDir, TempDir)> {
        let source = TempDir::new()?;
        let target = TempDir::new()?;
        fs::write(source.path().join("file1.txt"), "content1")?;
        fs::write(source.path().join("file2.txt"), "content2")?;
        Ok((source, target))
    }

    #[test]
    fn copy_into_empty_target() -> anyhow::Result<()> {
        let (source, target) = fixture()?;
        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::from_scan(source.path())?);

        let results = Synchronizer::default().copy(&mut itinerary)?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].succeeded(), &set(&["file1.txt", "file2.txt"]));
        assert!(results[0].failed().is_empty());
        assert_eq!(fs::read_to_string(target.path().join("file1.txt"))?, "content1");
        assert_eq!(fs::read_to_string(target.path().join("file2.txt"))?, "content2");
        assert_eq!(itinerary.results().len(), 1);

        Ok(())
    }

    #[test]
    fn copy_creates_directories_and_overwrites() -> anyhow::Result<()> {
        let (source, target) = fixture()?;
        fs::create_dir_all(source.path().join("sub").join("empty"))?;
        fs::write(source.path().join("sub").join("c.txt"), "new")?;
        fs::create_dir(target.path().join("sub"))?;
        fs::write(target.path().join("sub").join("c.txt"), "old")?;

        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::from_scan(source.path())?);
        let results = Synchronizer::default().copy(&mut itinerary)?;

        assert_eq!(results[0].folders_created(), &set(&["sub/empty"]));
        assert_eq!(results[0].skipped(), &set(&["sub"]));
        assert_eq!(fs::read_to_string(target.path().join("sub").join("c.txt"))?, "new");
        assert!(target.path().join("sub").join("empty").is_dir());

        Ok(())
    }

    #[test]
    fn copy_preserves_modification_time() -> anyhow::Result<()> {
        let (source, target) = fixture()?;
        let stamp = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        File::options()
            .write(true)
            .open(source.path().join("file1.txt"))?
            .set_modified(stamp)?;

        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::from_scan(source.path())?);
        Synchronizer::default().copy(&mut itinerary)?;

        let copied = fs::metadata(target.path().join("file1.txt"))?.modified()?;
        assert_eq!(copied, stamp);

        Ok(())
    }

    #[test]
    fn copy_missing_source_path_fails_fast() -> anyhow::Result<()> {
        let (source, target) = fixture()?;
        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::new(
            source.path(),
            ["file1.txt", "file1_gone.txt", "file2.txt"],
        ));

        let result = Synchronizer::default().copy(&mut itinerary);
        assert!(matches!(result, Err(SyncError::Copy { .. })));

        // Partial report still lands in history. Paths are walked in order.
        let report = &itinerary.results()[0];
        assert_eq!(report.succeeded(), &set(&["file1.txt"]));
        assert!(report.failed().contains_key("file1_gone.txt"));
        assert!(!target.path().join("file2.txt").exists());

        Ok(())
    }

    #[test]
    fn copy_missing_source_path_continues_when_ignoring_errors() -> anyhow::Result<()> {
        let (source, target) = fixture()?;
        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::new(
            source.path(),
            ["file1.txt", "file1_gone.txt", "file2.txt"],
        ));

        let sync = Synchronizer::new(SyncOptions { ignore_errors: true });
        let results = sync.copy(&mut itinerary)?;
        assert_eq!(results[0].succeeded(), &set(&["file1.txt", "file2.txt"]));
        assert_eq!(results[0].failed().len(), 1);

        Ok(())
    }

    #[test]
    fn delete_skips_missing_and_leaves_untracked() -> anyhow::Result<()> {
        let target = TempDir::new()?;
        fs::write(target.path().join("b.txt"), "b")?;
        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::new("/src", ["a.txt"]));

        let result = Synchronizer::default().delete(&mut itinerary)?;
        assert_eq!(result.skipped(), &set(&["a.txt"]));
        assert!(result.succeeded().is_empty());
        assert!(target.path().join("b.txt").exists());

        Ok(())
    }

    #[test]
    fn delete_leaves_directories_to_prune() -> anyhow::Result<()> {
        let target = TempDir::new()?;
        fs::create_dir(target.path().join("sub"))?;
        fs::write(target.path().join("sub").join("a.txt"), "a")?;
        fs::write(target.path().join("sub").join("c.txt"), "c")?;
        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::new("/src", ["sub", "sub/a.txt"]));

        let sync = Synchronizer::default();
        let result = sync.delete(&mut itinerary)?;
        assert_eq!(result.succeeded(), &set(&["sub/a.txt"]));
        assert_eq!(result.skipped(), &set(&["sub"]));

        // Directory still holds an untracked file.
        let result = sync.prune(&mut itinerary)?;
        assert_eq!(result.skipped(), &set(&["sub"]));
        assert!(target.path().join("sub").join("c.txt").exists());

        fs::remove_file(target.path().join("sub").join("c.txt"))?;
        let result = sync.prune(&mut itinerary)?;
        assert_eq!(result.succeeded(), &set(&["sub"]));
        assert!(!target.path().join("sub").exists());

        Ok(())
    }

    #[test]
    fn redeploy_refreshes_target() -> anyhow::Result<()> {
        let (source, target) = fixture()?;
        fs::create_dir(source.path().join("sub"))?;
        fs::write(source.path().join("sub").join("c.txt"), "c")?;

        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::from_scan(source.path())?);
        let sync = Synchronizer::default();
        sync.copy(&mut itinerary)?;
        fs::write(target.path().join("file1.txt"), "stale")?;

        let results = sync.redeploy(&mut itinerary)?;
        let kinds = results.iter().map(FileOpResult::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![FileOpKind::Delete, FileOpKind::PruneEmptyDirectories, FileOpKind::Copy]
        );
        assert_eq!(fs::read_to_string(target.path().join("file1.txt"))?, "content1");
        assert!(target.path().join("sub").join("c.txt").exists());

        Ok(())
    }

    // Target holds a file where a tracked path expects a directory, so
    // deleting "x/y.txt" fails no matter who runs the test.
    #[cfg(unix)]
    fn blocked_fixture() -> anyhow::Result<(TempDir, TempDir, Itinerary)> {
        let source = TempDir::new()?;
        let target = TempDir::new()?;
        fs::write(source.path().join("c.txt"), "c")?;
        fs::create_dir(source.path().join("x"))?;
        fs::write(source.path().join("x").join("y.txt"), "y")?;
        fs::write(target.path().join("x"), "in the way")?;

        let mut itinerary = Itinerary::for_target(target.path());
        itinerary.add_manifest(Manifest::new(source.path(), ["c.txt", "x/y.txt"]));
        Ok((source, target, itinerary))
    }

    #[cfg(unix)]
    #[test]
    fn delete_failure_is_reported() -> anyhow::Result<()> {
        let (_source, _target, mut itinerary) = blocked_fixture()?;

        let result = Synchronizer::default().delete(&mut itinerary);
        assert!(matches!(result, Err(SyncError::Delete { .. })));
        let report = &itinerary.results()[0];
        assert_eq!(report.skipped(), &set(&["c.txt"]));
        assert!(report.failed().contains_key("x/y.txt"));

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn redeploy_stops_before_copy_on_failed_delete() -> anyhow::Result<()> {
        let (_source, target, mut itinerary) = blocked_fixture()?;

        let result = Synchronizer::default().redeploy(&mut itinerary);
        assert!(matches!(result, Err(SyncError::Delete { .. })));
        assert!(!target.path().join("c.txt").exists());
        let kinds = itinerary.results().iter().map(FileOpResult::kind).collect::<Vec<_>>();
        assert_eq!(kinds, vec![FileOpKind::Delete]);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn redeploy_continues_past_failed_delete_when_ignoring_errors() -> anyhow::Result<()> {
        let (_source, target, mut itinerary) = blocked_fixture()?;

        let sync = Synchronizer::new(SyncOptions { ignore_errors: true });
        let results = sync.redeploy(&mut itinerary)?;
        let kinds = results.iter().map(FileOpResult::kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![FileOpKind::Delete, FileOpKind::PruneEmptyDirectories, FileOpKind::Copy]
        );
        assert!(results[0].failed().contains_key("x/y.txt"));
        assert_eq!(results[2].succeeded(), &set(&["c.txt"]));
        assert!(results[2].failed().contains_key("x/y.txt"));
        assert_eq!(fs::read_to_string(target.path().join("c.txt"))?, "c");

        Ok(())
    }

    #[test]
    fn operations_require_target() {
        let mut itinerary = Itinerary::named("nowhere");
        itinerary.add_manifest(Manifest::new("/src", ["a.txt"]));
        let result = Synchronizer::default().copy(&mut itinerary);
        assert!(matches!(result, Err(SyncError::NoTarget { .. })));
    }
}
