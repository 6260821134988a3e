// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run orchestration.
//!
//! One invocation of Itinerant is one [`RunConfig`]: what to do, where from,
//! where to, and which store remembers it. [`execute`] drives the whole
//! sequence. It loads the store, locates the itinerary of the target, scans
//! the source if the mode needs one, performs the mode's action, and saves the
//! store if anything changed.
//!
//! The store is saved even when a synchronization step fails part way, so the
//! partial report of the failed step is not lost. The error is returned after
//! the save. Should the save fail as well, the save error is logged and the
//! error of the step is returned.

use crate::{
    archive::{ArchiveError, Archiver},
    itinerary::{Itinerary, ItineraryError},
    manifest::{Manifest, MatchRule},
    path::store_key,
    scan::{ScanError, ScanOptions},
    store::{ItineraryStore, StoreError},
    sync::{report::FileOpResult, SyncError, SyncOptions, Synchronizer},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

/// Operation mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Track source, then copy every tracked path into target.
    Copy,

    /// Delete every tracked path from target, prune, then forget itinerary.
    Delete,

    /// Show what would be tracked without touching anything.
    Dry,

    /// Track source without copying anything.
    AddManifest,

    /// Stop tracking source.
    RemoveManifest,

    /// Forget itinerary of target without touching target.
    RemoveItinerary,

    /// Remove empty directories from target.
    Prune,

    /// Delete, prune, then copy again.
    Redeploy,
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::Dry => "dry run",
            Self::AddManifest => "add manifest",
            Self::RemoveManifest => "remove manifest",
            Self::RemoveItinerary => "remove itinerary",
            Self::Prune => "prune",
            Self::Redeploy => "redeploy",
        };
        fmt.write_str(name)
    }
}

/// Everything one run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub mode: Mode,
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub store_path: PathBuf,
    pub sync: SyncOptions,
    pub scan: ScanOptions,
    pub match_rule: MatchRule,
}

impl RunConfig {
    /// Construct new run configuration without a source.
    pub fn new(mode: Mode, target: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            source: None,
            target: target.into(),
            store_path: store_path.into(),
            sync: SyncOptions::default(),
            scan: ScanOptions::default(),
            match_rule: MatchRule::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Store was saved.
    pub changed: bool,

    /// Reports of every synchronization step, in order.
    pub results: Vec<FileOpResult>,

    /// Itinerary of target after the run, or the one that was forgotten.
    pub itinerary: Option<Itinerary>,
}

/// Execute a run without progress reporting.
///
/// # Errors
///
/// - Return [`RunError`] if any step of the run fails.
pub fn execute(config: &RunConfig) -> Result<Outcome> {
    execute_with(config, &Synchronizer::new(config.sync))
}

/// Execute a run through a given synchronizer.
///
/// # Errors
///
/// - Return [`RunError`] if any step of the run fails.
#[instrument(skip(config, sync), fields(mode = %config.mode), level = "debug")]
pub fn execute_with(config: &RunConfig, sync: &Synchronizer) -> Result<Outcome> {
    let mut store = ItineraryStore::load(&config.store_path);
    store.set_match_rule(config.match_rule);

    let outcome = apply(config, sync, &mut store);

    // INVARIANT: Save partial progress even if the action failed.
    let changed = store.is_dirty();
    if changed {
        if let Err(save_error) = store.save() {
            match outcome {
                Ok(_) => return Err(save_error.into()),
                Err(action_error) => {
                    error!("{save_error}");
                    return Err(action_error);
                }
            }
        }
    }

    let mut outcome = outcome?;
    outcome.changed = changed;

    Ok(outcome)
}

fn apply(config: &RunConfig, sync: &Synchronizer, store: &mut ItineraryStore) -> Result<Outcome> {
    let key = store_key(&config.target);
    let mut outcome = Outcome::default();

    match config.mode {
        Mode::Dry => {
            let mut view = store
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Itinerary::for_target(&config.target));
            if let Some(scanned) = scan_source(config)? {
                view.merge(&scanned)?;
            }
            info!("dry run: {view}");
            for path in view.paths_resolved() {
                debug!("would synchronize {:?}", path.display());
            }
            outcome.itinerary = Some(view);
        }
        Mode::AddManifest => {
            let scanned = scan_source(config)?
                .ok_or(RunError::MissingSource { mode: config.mode })?;
            store.upsert(scanned)?;
            outcome.itinerary = store.get(&key).cloned();
        }
        Mode::Copy => {
            if let Some(scanned) = scan_source(config)? {
                store.upsert(scanned)?;
            }
            let itinerary = store
                .get_mut(&key)
                .ok_or_else(|| RunError::UnknownItinerary { key: key.clone() })?;
            outcome.results = sync.copy(itinerary)?;
            outcome.itinerary = Some(itinerary.clone());
        }
        Mode::RemoveManifest => {
            let source = config
                .source
                .as_deref()
                .ok_or(RunError::MissingSource { mode: config.mode })?;
            let Some(itinerary) = store.get_mut(&key) else {
                warn!("no itinerary for {key:?}, nothing to remove");
                return Ok(outcome);
            };
            itinerary.remove_source(source);

            // INVARIANT: Empty itineraries do not stay in the store.
            if itinerary.is_empty() {
                info!("itinerary {key:?} has no sources left, forget it");
                outcome.itinerary = store.remove(&key);
            } else {
                outcome.itinerary = Some(itinerary.clone());
            }
        }
        Mode::RemoveItinerary => {
            outcome.itinerary = store.remove(&key);
            if outcome.itinerary.is_none() {
                warn!("no itinerary for {key:?}, nothing to forget");
            }
        }
        Mode::Delete => {
            let Some(itinerary) = store.get_mut(&key) else {
                warn!("no itinerary for {key:?}, nothing to delete");
                return Ok(outcome);
            };
            outcome.results = clean(itinerary, sync)?;
            outcome.itinerary = store.remove(&key);
        }
        Mode::Prune => match store.get_mut(&key) {
            Some(itinerary) => {
                outcome.results.push(sync.prune(itinerary)?);
                outcome.itinerary = Some(itinerary.clone());
            }
            None => {
                let mut untracked = Itinerary::for_target(&config.target);
                outcome.results.push(sync.prune(&mut untracked)?);
            }
        },
        Mode::Redeploy => {
            if let Some(scanned) = scan_source(config)? {
                store.upsert(scanned)?;
            }
            let Some(itinerary) = store.get_mut(&key) else {
                warn!("no itinerary for {key:?}, nothing to redeploy");
                return Ok(outcome);
            };
            outcome.results = sync.redeploy(itinerary)?;
            outcome.itinerary = Some(itinerary.clone());
        }
    }

    Ok(outcome)
}

fn scan_source(config: &RunConfig) -> Result<Option<Itinerary>> {
    let Some(source) = config.source.as_deref() else {
        return Ok(None);
    };

    let manifest = Manifest::from_scan_with(source, config.scan)?;
    let mut itinerary = Itinerary::for_target(&config.target).with_match_rule(config.match_rule);
    itinerary.add_manifest(manifest);

    Ok(Some(itinerary))
}

/// Plan removal of everything in target that source does not have.
///
/// The plan is a named itinerary over the target alone. Hand it to [`clean`]
/// once the user agrees.
///
/// # Errors
///
/// - Return [`RunError::Scan`] if source or target cannot be scanned.
pub fn plan_clean(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    options: ScanOptions,
) -> Result<Itinerary> {
    let target = target.as_ref();
    let leftovers = Manifest::target_minus_source(source, target, options)?;
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| store_key(target));
    info!("{} paths in {:?} are not in source", leftovers.len(), target.display());

    Ok(Itinerary::from_manifests([leftovers], Some(name.as_str())).with_target(target))
}

/// Plan removal of everything the given sources put into target.
///
/// Every source is scanned afresh, and the plan covers their combined paths
/// under target, whether or not any itinerary tracks them. Without a name,
/// the plan is named after the source directories. Hand it to [`clean`] once
/// the user agrees.
///
/// # Errors
///
/// - Return [`RunError::Scan`] if any source cannot be scanned.
pub fn plan_remove_sources(
    sources: impl IntoIterator<Item = impl AsRef<Path>>,
    target: impl AsRef<Path>,
    name: Option<&str>,
    options: ScanOptions,
) -> Result<Itinerary> {
    let target = target.as_ref();
    let plan = Itinerary::from_scans(sources, name, options)?.with_target(target);
    info!("{} source paths to remove from {:?}", plan.num_paths(), target.display());

    Ok(plan)
}

/// Delete every tracked path from target, then prune empty directories.
///
/// # Errors
///
/// - Return [`RunError::Sync`] if deleting or pruning fails.
pub fn clean(itinerary: &mut Itinerary, sync: &Synchronizer) -> Result<Vec<FileOpResult>> {
    let deleted = sync.delete(itinerary)?;
    let pruned = sync.prune(itinerary)?;

    Ok(vec![deleted, pruned])
}

/// Unpack archives into a temporary directory, then redeploy it to target.
///
/// The resulting itinerary is named after the archive directory. It is not
/// stored, since its source is gone once this returns.
///
/// # Errors
///
/// - Return [`RunError::Archive`] if any archive fails to unpack.
/// - Return [`RunError::Sync`] if redeploying fails.
#[instrument(skip(archiver, archives_dir, target, sync), level = "debug")]
pub fn redeploy_archives(
    archiver: &Archiver,
    archives_dir: impl AsRef<Path>,
    target: impl AsRef<Path>,
    options: ScanOptions,
    sync: &Synchronizer,
) -> Result<(Itinerary, Vec<FileOpResult>)> {
    let archives_dir = archives_dir.as_ref();
    let unpacked = archiver.unpack_to_temp(archives_dir)?;
    let name = archives_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archives".into());

    let mut itinerary =
        Itinerary::from_scans([unpacked.path()], Some(name.as_str()), options)?.with_target(target);
    let results = sync.redeploy(&mut itinerary)?;

    Ok((itinerary, results))
}

/// Run error types.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Mode needs a source, but none was given.
    #[error("{mode} needs a source directory")]
    MissingSource { mode: Mode },

    /// No itinerary exists for target.
    #[error("no itinerary for {key:?}")]
    UnknownItinerary { key: String },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Itinerary(#[from] ItineraryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Friendly result alias :3
pub type Result<T, E = RunError> = std::result::Result<T, E>;
