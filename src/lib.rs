// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest driven directory synchronization.
//!
//! Itinerant mirrors one or more __source__ directories into a __target__
//! directory, and remembers exactly which paths it put there. That memory is
//! what makes it safe to take the files back out again later: deleting only
//! ever touches paths that a source contributed, never anything else that
//! happens to live in the target.
//!
//! # Data Model
//!
//! - A [`Manifest`] is a snapshot of one source: its root directory plus the
//!   set of paths beneath it, relative to that root.
//! - An [`Itinerary`] ties manifests to the target they get mirrored into.
//! - The [`ItineraryStore`] persists every itinerary between runs.
//! - The [`Synchronizer`] copies, deletes, and prunes according to an
//!   itinerary, recording a [`FileOpResult`] for every call.

pub mod archive;
pub mod config;
pub mod itinerary;
pub mod manifest;
pub mod path;
pub mod run;
pub mod scan;
pub mod store;
pub mod sync;

#[doc(inline)]
pub use itinerary::Itinerary;

#[doc(inline)]
pub use manifest::{Manifest, MatchRule};

#[doc(inline)]
pub use store::ItineraryStore;

#[doc(inline)]
pub use sync::{report::FileOpResult, SyncOptions, Synchronizer};
