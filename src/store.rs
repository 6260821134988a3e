// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Itinerary store management and manipulation.
//!
//! Itinerant keeps every itinerary it knows about in one place called the
//! __itinerary store__: a single JSON document on disk, keyed by itinerary
//! key. The store is what lets a later run remember which paths an earlier
//! run copied into a target, so they can be deleted again.
//!
//! # Store Layout
//!
//! The store file can be placed anywhere on the user's file system. However,
//! the default location is `$XDG_DATA_HOME/itinerant/itineraries.json`. The
//! document looks like this:
//!
//! ```json
//! {
//!   "version": 1,
//!   "itineraries": [
//!     {
//!       "kind": "itinerary",
//!       "key": "/mnt/backup",
//!       "target": "/mnt/backup",
//!       "manifests": [
//!         {
//!           "kind": "manifest",
//!           "root": "/home/user/music",
//!           "paths_relative": ["album", "album/track.flac"],
//!           "created_at": "2025-01-01T00:00:00Z",
//!           "last_edit": "2025-01-01T00:00:00Z"
//!         }
//!       ],
//!       "results": []
//!     }
//!   ]
//! }
//! ```
//!
//! Every record names what it is through its `kind` tag. Path sets are plain
//! arrays, but their order means nothing, and duplicates collapse on load.
//!
//! # Concurrency
//!
//! The store performs no file locking. Two processes working on the same
//! store file at once will lose each other's updates. Making sure only one
//! process uses a store file at a time is the caller's responsibility.

use crate::{
    itinerary::{Itinerary, ItineraryError},
    manifest::MatchRule,
};

use mkdirp::mkdirp;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

const STORE_VERSION: u32 = 1;

/// Persisted collection of itineraries keyed by itinerary key.
#[derive(Debug, Clone)]
pub struct ItineraryStore {
    path: PathBuf,
    itineraries: BTreeMap<String, Itinerary>,
    match_rule: MatchRule,
    changed: bool,
}

impl ItineraryStore {
    /// Construct new empty store that saves to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            itineraries: BTreeMap::new(),
            match_rule: MatchRule::default(),
            changed: false,
        }
    }

    /// Load store from file.
    ///
    /// Never fails. A missing file yields an empty store. So does a file that
    /// cannot be read or decoded, after logging a warning. Tracking data can
    /// be rebuilt by scanning again, so losing it beats aborting.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::try_load(&path) {
            Ok(store) => store,
            Err(error) => {
                warn!("{error}, starting with empty store");
                Self::new(path)
            }
        }
    }

    /// Load store from file, exposing failures.
    ///
    /// A missing file still yields an empty store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if file exists, but cannot be read.
    /// - Return [`StoreError::Decode`] if file is not a valid store document.
    /// - Return [`StoreError::UnsupportedVersion`] if document has unknown
    ///   version.
    #[instrument(skip(path), level = "debug")]
    pub fn try_load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no store at {:?}, starting with empty store", path.display());
                return Ok(Self::new(path));
            }
            Err(source) => return Err(StoreError::Read { source, path }),
        };

        let document: Document = serde_json::from_str(&data).map_err(|source| StoreError::Decode {
            source,
            path: path.clone(),
        })?;
        if document.version != STORE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                version: document.version,
                path,
            });
        }

        let mut store = Self::new(path);
        for Record::Itinerary(itinerary) in document.itineraries {
            // INVARIANT: One itinerary per key, duplicates get merged.
            store.upsert(itinerary)?;
        }
        store.mark_clean();
        debug!("loaded {store}");

        Ok(store)
    }

    /// Save store to the file it was loaded from.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError`] if store cannot be encoded or written.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.save_to(path)?;
        self.mark_clean();

        Ok(())
    }

    /// Save store to a given file.
    ///
    /// The document is written to a temporary file next to `path` first, then
    /// renamed over it, so a crash mid-write never truncates the old store.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Encode`] if store cannot be serialized.
    /// - Return [`StoreError::Write`] if file cannot be written.
    #[instrument(skip(self, path), level = "debug")]
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        mkdirp(parent).map_err(|source| StoreError::Write {
            source,
            path: parent.into(),
        })?;

        let document = DocumentRef {
            version: STORE_VERSION,
            itineraries: self.itineraries.values().map(RecordRef::Itinerary).collect(),
        };

        let write_error = |source| StoreError::Write {
            source,
            path: path.into(),
        };
        let file = NamedTempFile::new_in(parent).map_err(write_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &document).map_err(|source| StoreError::Encode {
            source,
            path: path.into(),
        })?;
        writer.write_all(b"\n").map_err(write_error)?;
        let file = writer
            .into_inner()
            .map_err(|error| write_error(error.into_error()))?;
        file.as_file().sync_all().map_err(write_error)?;
        file.persist(path).map_err(|error| write_error(error.error))?;
        info!("saved {} itineraries to {:?}", self.itineraries.len(), path.display());

        Ok(())
    }

    /// Add itinerary, or merge it into the entry with the same key.
    ///
    /// Returns whether anything changed, so the caller can decide whether a
    /// save is warranted.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Itinerary`] if the existing entry has a
    ///   different target.
    pub fn upsert(&mut self, mut itinerary: Itinerary) -> Result<bool> {
        let changed = match self.itineraries.get_mut(itinerary.key()) {
            Some(existing) => existing.merge(&itinerary)?,
            None => {
                debug!("insert itinerary {:?}", itinerary.key());
                itinerary.set_match_rule(self.match_rule);
                self.itineraries.insert(itinerary.key().to_owned(), itinerary);
                true
            }
        };
        self.changed |= changed;

        Ok(changed)
    }

    /// Pop itinerary by key.
    ///
    /// Removing a key that is not present does nothing.
    pub fn remove(&mut self, key: &str) -> Option<Itinerary> {
        let itinerary = self.itineraries.remove(key)?;
        debug!("remove itinerary {key:?}");
        self.changed = true;

        Some(itinerary)
    }

    pub fn get(&self, key: &str) -> Option<&Itinerary> {
        self.itineraries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Itinerary> {
        self.itineraries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.itineraries.contains_key(key)
    }

    /// Iterate through itineraries ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = &Itinerary> {
        self.itineraries.values()
    }

    pub fn len(&self) -> usize {
        self.itineraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itineraries.is_empty()
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Set rule deciding manifest identity for every itinerary in the store.
    pub fn set_match_rule(&mut self, rule: MatchRule) {
        self.match_rule = rule;
        for itinerary in self.itineraries.values_mut() {
            itinerary.set_match_rule(rule);
        }
    }

    /// Store, or any itinerary in it, changed since last load or save.
    pub fn is_dirty(&self) -> bool {
        self.changed || self.itineraries.values().any(Itinerary::is_dirty)
    }

    fn mark_clean(&mut self) {
        self.changed = false;
        for itinerary in self.itineraries.values_mut() {
            itinerary.mark_clean();
        }
    }
}

impl Display for ItineraryStore {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let sources: usize = self.itineraries.values().map(Itinerary::len).sum();
        let paths: usize = self.itineraries.values().map(Itinerary::num_paths).sum();
        write!(
            fmt,
            "'{}': {} itineraries, {} sources, {} paths",
            self.path.display(),
            self.itineraries.len(),
            sources,
            paths
        )
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    itineraries: Vec<RecordRef<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RecordRef<'a> {
    Itinerary(&'a Itinerary),
}

#[derive(Deserialize)]
struct Document {
    version: u32,

    #[serde(default)]
    itineraries: Vec<Record>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Itinerary(Itinerary),
}

/// Itinerary store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store file exists, but could not be read.
    #[error("failed to read store {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store file is not a valid store document.
    #[error("failed to decode store {:?}", path.display())]
    Decode {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Store document has a version this build does not understand.
    #[error("store {:?} has unsupported version {version}", path.display())]
    UnsupportedVersion { version: u32, path: PathBuf },

    /// Store file could not be written.
    #[error("failed to write store {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Store could not be serialized.
    #[error("failed to encode store {:?}", path.display())]
    Encode {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Itinerary could not be merged into its existing entry.
    #[error(transparent)]
    Itinerary(#[from] ItineraryError),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
