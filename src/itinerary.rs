// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Itineraries of source manifests.
//!
//! An __itinerary__ names a place that files get mirrored into, and lists the
//! manifests of every source that should be mirrored there. It is identified
//! by a __key__: the absolute target path for itineraries created through
//! [`Itinerary::for_target`], or a free-form name for itineraries created
//! through [`Itinerary::named`].
//!
//! Manifests are kept in a map keyed by their root, so an itinerary holds at
//! most one manifest per source directory. Adding a manifest for a root that
//! is already present folds the new paths into the existing manifest instead
//! of replacing it.
//!
//! # Identity
//!
//! Two itineraries are equal if and only if they hold the same manifests by
//! value. Keys and targets take no part in equality, the same way roots take
//! no part in manifest equality. Storage lookups always go through the key.

use crate::{
    manifest::{Manifest, MatchRule},
    path::{absolute, store_key},
    scan::{ScanError, ScanOptions},
    sync::report::FileOpResult,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Number of synchronization results an itinerary remembers.
pub const HISTORY_LIMIT: usize = 32;

/// Target directory plus the manifests that should be mirrored into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Itinerary {
    key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<PathBuf>,

    #[serde(default, with = "tagged_manifests")]
    manifests: BTreeMap<String, Manifest>,

    #[serde(default)]
    results: Vec<FileOpResult>,

    #[serde(skip)]
    match_rule: MatchRule,

    #[serde(skip)]
    changes_made: bool,
}

impl Itinerary {
    /// Construct new empty itinerary keyed by its target directory.
    pub fn for_target(target: impl AsRef<Path>) -> Self {
        Self {
            key: store_key(target.as_ref()),
            target: Some(absolute(target)),
            manifests: BTreeMap::new(),
            results: Vec::new(),
            match_rule: MatchRule::default(),
            changes_made: false,
        }
    }

    /// Construct new empty itinerary keyed by a logical name.
    ///
    /// Named itineraries have no target until one is given through
    /// [`Itinerary::with_target`].
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            key: name.into(),
            target: None,
            manifests: BTreeMap::new(),
            results: Vec::new(),
            match_rule: MatchRule::default(),
            changes_made: false,
        }
    }

    /// Set target directory.
    pub fn with_target(mut self, target: impl AsRef<Path>) -> Self {
        self.target = Some(absolute(target));
        self
    }

    /// Set rule deciding when a manifest is already present.
    pub fn with_match_rule(mut self, rule: MatchRule) -> Self {
        self.match_rule = rule;
        self
    }

    /// Construct named itinerary from a listing of manifests.
    ///
    /// Without a name, the directory names of every manifest root are joined
    /// by `__` to make one.
    pub fn from_manifests(
        manifests: impl IntoIterator<Item = Manifest>,
        name: Option<&str>,
    ) -> Self {
        let manifests = manifests.into_iter().collect::<Vec<_>>();
        let name = match name {
            Some(name) => name.to_owned(),
            None => manifests
                .iter()
                .map(|manifest| {
                    manifest
                        .root()
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>()
                .join("__"),
        };

        let mut itinerary = Self::named(name);
        for manifest in manifests {
            itinerary.add_manifest(manifest);
        }
        itinerary.mark_clean();

        itinerary
    }

    /// Construct named itinerary by scanning a listing of source directories.
    ///
    /// # Errors
    ///
    /// - Return [`ScanError`] if any source cannot be scanned.
    pub fn from_scans(
        sources: impl IntoIterator<Item = impl AsRef<Path>>,
        name: Option<&str>,
        options: ScanOptions,
    ) -> Result<Self, ScanError> {
        let manifests = sources
            .into_iter()
            .map(|source| Manifest::from_scan_with(source, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_manifests(manifests, name))
    }

    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    pub fn match_rule(&self) -> MatchRule {
        self.match_rule
    }

    pub fn set_match_rule(&mut self, rule: MatchRule) {
        self.match_rule = rule;
    }

    /// Iterate through member manifests ordered by root.
    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.manifests.values()
    }

    /// Get manifest of a source root.
    pub fn manifest(&self, root: impl AsRef<Path>) -> Option<&Manifest> {
        self.manifests.get(&root_key(root.as_ref()))
    }

    /// Number of member manifests.
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// No member manifests left.
    ///
    /// An empty itinerary is considered deleted, and should be removed from
    /// the store by the caller.
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Check if an equivalent manifest is already a member.
    ///
    /// Equivalence is decided by the itinerary's [`MatchRule`].
    pub fn contains(&self, manifest: &Manifest) -> bool {
        self.manifests
            .values()
            .any(|member| self.match_rule.matches(member, manifest))
    }

    /// Add a manifest.
    ///
    /// Does nothing if an equal manifest is already a member. If a manifest of
    /// the same root is already a member, then both are combined. Otherwise the
    /// manifest is inserted under its root. Returns whether anything changed.
    pub fn add_manifest(&mut self, manifest: Manifest) -> bool {
        if self.match_rule == MatchRule::Content && self.contains(&manifest) {
            debug!("{manifest} already in itinerary {:?}, skip add", self.key);
            return false;
        }

        let key = root_key(manifest.root());
        let manifest = match self.manifests.get(&key) {
            Some(existing) => {
                let merged = existing.combine(&manifest);
                if merged.same_content(existing) {
                    debug!("{manifest} adds no new paths to itinerary {:?}", self.key);
                    return false;
                }
                info!("merge {manifest} into existing manifest of itinerary {:?}", self.key);
                merged
            }
            None => {
                info!("add {manifest} to itinerary {:?}", self.key);
                manifest
            }
        };

        self.manifests.insert(key, manifest);
        self.changes_made = true;

        true
    }

    /// Remove the manifest sharing the root of the given manifest.
    ///
    /// Returns whether anything changed.
    pub fn remove_manifest(&mut self, manifest: &Manifest) -> bool {
        self.remove_source(manifest.root())
    }

    /// Remove the manifest of a source root.
    ///
    /// Any spelling of the root works, relative or with trailing separators.
    /// Removing a source that is not a member does nothing. Returns whether
    /// anything changed.
    pub fn remove_source(&mut self, root: impl AsRef<Path>) -> bool {
        let key = root_key(root.as_ref());
        match self.manifests.remove(&key) {
            Some(manifest) => {
                debug!("remove {manifest} from itinerary {:?}", self.key);
                self.changes_made = true;
                true
            }
            None => {
                debug!("source {key:?} not in itinerary {:?}, skip remove", self.key);
                false
            }
        }
    }

    /// Fold every manifest of another itinerary into this one.
    ///
    /// Takes over the target of `other` if this itinerary has none, and
    /// appends its result history after this one's. Returns whether anything
    /// changed.
    ///
    /// # Errors
    ///
    /// - Return [`ItineraryError::TargetMismatch`] if both itineraries carry
    ///   different keys, or different targets.
    pub fn merge(&mut self, other: &Itinerary) -> Result<bool> {
        let targets_differ = matches!(
            (&self.target, &other.target),
            (Some(lhs), Some(rhs)) if lhs != rhs
        );
        if self.key != other.key || targets_differ {
            return Err(ItineraryError::TargetMismatch {
                lhs: self.describe_identity(),
                rhs: other.describe_identity(),
            });
        }

        let mut changed = false;
        if self.target.is_none() && other.target.is_some() {
            self.target = other.target.clone();
            self.changes_made = true;
            changed = true;
        }

        for manifest in other.manifests.values() {
            changed |= self.add_manifest(manifest.clone());
        }

        for result in &other.results {
            self.record(result.clone());
            changed = true;
        }

        Ok(changed)
    }

    /// Union of every member manifest's relative paths.
    pub fn all_paths_relative(&self) -> BTreeSet<String> {
        self.manifests
            .values()
            .flat_map(|manifest| manifest.paths_relative().iter().cloned())
            .collect()
    }

    /// Union of every member manifest's resolved paths.
    pub fn paths_resolved(&self) -> BTreeSet<PathBuf> {
        self.manifests
            .values()
            .flat_map(Manifest::paths_resolved)
            .collect()
    }

    /// Number of distinct relative paths across all member manifests.
    pub fn num_paths(&self) -> usize {
        self.all_paths_relative().len()
    }

    /// History of synchronization results, oldest first.
    pub fn results(&self) -> &[FileOpResult] {
        self.results.as_slice()
    }

    /// Append synchronization result to history.
    ///
    /// Only the latest [`HISTORY_LIMIT`] results are kept.
    pub fn record(&mut self, result: FileOpResult) {
        self.results.push(result);
        if self.results.len() > HISTORY_LIMIT {
            let excess = self.results.len() - HISTORY_LIMIT;
            self.results.drain(..excess);
        }
        self.changes_made = true;
    }

    /// Itinerary changed since it was loaded or last marked clean.
    pub fn is_dirty(&self) -> bool {
        self.changes_made
    }

    pub fn mark_clean(&mut self) {
        self.changes_made = false;
    }

    fn describe_identity(&self) -> String {
        match &self.target {
            Some(target) => format!("{} ({})", self.key, target.display()),
            None => self.key.clone(),
        }
    }
}

impl PartialEq for Itinerary {
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.manifests.values().map(Manifest::paths_relative).collect::<BTreeSet<_>>();
        let rhs = other.manifests.values().map(Manifest::paths_relative).collect::<BTreeSet<_>>();
        lhs == rhs
    }
}

impl Eq for Itinerary {}

impl Display for Itinerary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let sources = self
            .manifests
            .values()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            fmt,
            "'{}' - {} paths from {} sources: [{}]",
            self.key,
            self.num_paths(),
            self.manifests.len(),
            sources
        )
    }
}

fn root_key(root: &Path) -> String {
    store_key(root)
}

/// Serialize member manifests as a list of records tagged `"kind": "manifest"`.
mod tagged_manifests {
    use super::root_key;
    use crate::manifest::Manifest;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    enum RecordRef<'a> {
        Manifest(&'a Manifest),
    }

    #[derive(Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    enum Record {
        Manifest(Manifest),
    }

    pub(super) fn serialize<S>(
        manifests: &BTreeMap<String, Manifest>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(manifests.values().map(RecordRef::Manifest))
    }

    pub(super) fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Manifest>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut manifests: BTreeMap<String, Manifest> = BTreeMap::new();
        for Record::Manifest(manifest) in Vec::<Record>::deserialize(deserializer)? {
            // INVARIANT: One manifest per root, duplicates get combined.
            let key = root_key(manifest.root());
            let manifest = match manifests.get(&key) {
                Some(existing) => existing.combine(&manifest),
                None => manifest,
            };
            manifests.insert(key, manifest);
        }

        Ok(manifests)
    }
}

/// Itinerary error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ItineraryError {
    /// Attempted to merge itineraries that identify different places.
    #[error("cannot merge itinerary {rhs:?} into itinerary {lhs:?}: target mismatch")]
    TargetMismatch { lhs: String, rhs: String },
}

/// Friendly result alias :3
pub type Result<T, E = ItineraryError> = std::result::Result<T, E>;
