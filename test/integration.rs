// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{set, TreeFixture};

use anyhow::Result;
use itinerant::{
    path::store_key,
    run::{clean, execute, plan_remove_sources, Mode, RunConfig, RunError},
    scan::ScanOptions,
    store::ItineraryStore,
    sync::{report::FileOpKind, SyncError, Synchronizer},
    Itinerary,
};
use pretty_assertions::assert_eq;
use std::{fs, path::PathBuf};

#[test]
fn copy_into_empty_target() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("file1.txt", "content1")?;
    fixture.write_source("file2.txt", "content2")?;

    let outcome = execute(&fixture.config(Mode::Copy))?;
    assert!(outcome.changed);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].succeeded(), &set(&["file1.txt", "file2.txt"]));
    assert!(outcome.results[0].failed().is_empty());
    assert_eq!(fs::read_to_string(fixture.target().join("file1.txt"))?, "content1");
    assert_eq!(fs::read_to_string(fixture.target().join("file2.txt"))?, "content2");

    let store = ItineraryStore::try_load(fixture.store())?;
    let itinerary = store.get(&store_key(fixture.target()));
    assert_eq!(
        itinerary.map(Itinerary::all_paths_relative),
        Some(set(&["file1.txt", "file2.txt"]))
    );
    assert_eq!(itinerary.map(|itinerary| itinerary.results().len()), Some(1));

    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("file1.txt", "content1")?;
    fixture.write_source("sub/file2.txt", "content2")?;

    let outcome = execute(&fixture.config(Mode::Dry))?;
    assert!(!outcome.changed);
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.itinerary.map(|itinerary| itinerary.num_paths()), Some(3));
    assert!(fixture.target_paths()?.is_empty());
    assert!(!fixture.store().exists());

    Ok(())
}

#[test]
fn add_manifest_tracks_without_copying() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;

    let outcome = execute(&fixture.config(Mode::AddManifest))?;
    assert!(outcome.changed);
    assert!(fixture.target_paths()?.is_empty());

    let store = ItineraryStore::try_load(fixture.store())?;
    assert_eq!(
        store
            .get(&store_key(fixture.target()))
            .map(Itinerary::all_paths_relative),
        Some(set(&["a.txt"]))
    );

    Ok(())
}

#[test]
fn same_source_added_twice_merges() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    execute(&fixture.config(Mode::AddManifest))?;

    fixture.write_source("b.txt", "b")?;
    execute(&fixture.config(Mode::AddManifest))?;

    // Paths that vanish from the source stay tracked.
    fs::remove_file(fixture.source().join("a.txt"))?;
    let outcome = execute(&fixture.config(Mode::AddManifest))?;
    assert!(!outcome.changed);

    let store = ItineraryStore::try_load(fixture.store())?;
    let itinerary = store.get(&store_key(fixture.target()));
    assert_eq!(itinerary.map(Itinerary::len), Some(1));
    assert_eq!(
        itinerary.map(Itinerary::all_paths_relative),
        Some(set(&["a.txt", "b.txt"]))
    );

    Ok(())
}

#[test]
fn remove_manifest_forgets_emptied_itinerary() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    execute(&fixture.config(Mode::AddManifest))?;

    let outcome = execute(&fixture.config(Mode::RemoveManifest))?;
    assert!(outcome.changed);
    assert!(outcome.itinerary.is_some_and(|itinerary| itinerary.is_empty()));

    let store = ItineraryStore::try_load(fixture.store())?;
    assert!(!store.contains_key(&store_key(fixture.target())));

    Ok(())
}

#[test]
fn remove_itinerary_leaves_target_alone() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    execute(&fixture.config(Mode::Copy))?;

    let config = RunConfig::new(Mode::RemoveItinerary, fixture.target(), fixture.store());
    let outcome = execute(&config)?;
    assert!(outcome.itinerary.is_some());
    assert_eq!(fixture.target_paths()?, set(&["a.txt"]));
    assert!(ItineraryStore::try_load(fixture.store())?.is_empty());

    // Forgetting twice is harmless.
    let outcome = execute(&config)?;
    assert!(outcome.itinerary.is_none());
    assert!(!outcome.changed);

    Ok(())
}

#[test]
fn delete_removes_tracked_paths_only() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    fixture.write_source("sub/b.txt", "b")?;
    execute(&fixture.config(Mode::Copy))?;
    fixture.write_target("untracked.txt", "mine")?;

    let config = RunConfig::new(Mode::Delete, fixture.target(), fixture.store());
    let outcome = execute(&config)?;
    let kinds = outcome
        .results
        .iter()
        .map(|result| result.kind())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![FileOpKind::Delete, FileOpKind::PruneEmptyDirectories]);
    assert_eq!(fixture.target_paths()?, set(&["untracked.txt"]));
    assert!(fixture.target().exists());
    assert!(ItineraryStore::try_load(fixture.store())?.is_empty());

    Ok(())
}

#[test]
fn delete_skips_missing_paths() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    execute(&fixture.config(Mode::AddManifest))?;
    fixture.write_target("b.txt", "b")?;

    let config = RunConfig::new(Mode::Delete, fixture.target(), fixture.store());
    let outcome = execute(&config)?;
    assert_eq!(outcome.results[0].skipped(), &set(&["a.txt"]));
    assert!(outcome.results[0].failed().is_empty());
    assert_eq!(fixture.target_paths()?, set(&["b.txt"]));

    Ok(())
}

#[test]
fn prune_removes_only_empty_directories() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fs::create_dir_all(fixture.target().join("empty").join("deeper"))?;
    fixture.write_target("sub/c.txt", "c")?;

    let config = RunConfig::new(Mode::Prune, fixture.target(), fixture.store());
    let outcome = execute(&config)?;
    assert_eq!(outcome.results[0].succeeded(), &set(&["empty", "empty/deeper"]));
    assert_eq!(outcome.results[0].skipped(), &set(&["sub"]));
    assert_eq!(fixture.target_paths()?, set(&["sub", "sub/c.txt"]));

    let outcome = execute(&config)?;
    assert!(outcome.results[0].succeeded().is_empty());
    assert_eq!(fixture.target_paths()?, set(&["sub", "sub/c.txt"]));

    Ok(())
}

#[test]
fn redeploy_restores_target() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "fresh")?;
    fixture.write_source("sub/b.txt", "b")?;
    execute(&fixture.config(Mode::Copy))?;
    fixture.write_target("a.txt", "stale")?;

    let config = RunConfig::new(Mode::Redeploy, fixture.target(), fixture.store());
    let outcome = execute(&config)?;
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(fs::read_to_string(fixture.target().join("a.txt"))?, "fresh");
    assert_eq!(fixture.target_paths()?, set(&["a.txt", "sub", "sub/b.txt"]));

    Ok(())
}

#[test]
fn failed_copy_still_saves_history() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    fixture.write_source("b.txt", "b")?;
    execute(&fixture.config(Mode::AddManifest))?;
    fs::remove_file(fixture.source().join("a.txt"))?;

    let mut config = RunConfig::new(Mode::Copy, fixture.target(), fixture.store());
    let result = execute(&config);
    assert!(matches!(result, Err(RunError::Sync(SyncError::Copy { .. }))));

    let store = ItineraryStore::try_load(fixture.store())?;
    let history = store
        .get(&store_key(fixture.target()))
        .map(|itinerary| itinerary.results().to_vec())
        .unwrap_or_default();
    assert_eq!(history.len(), 1);
    assert!(history[0].failed().contains_key("a.txt"));

    config.sync.ignore_errors = true;
    let outcome = execute(&config)?;
    assert_eq!(outcome.results[0].succeeded(), &set(&["b.txt"]));
    assert_eq!(outcome.results[0].failed().len(), 1);
    assert_eq!(fixture.target_paths()?, set(&["b.txt"]));

    Ok(())
}

#[test]
fn target_spelling_does_not_split_itinerary() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    fixture.write_source("sub/b.txt", "b")?;

    let slashed = PathBuf::from(format!("{}/", fixture.target().display()));
    let config = RunConfig::new(Mode::Copy, slashed, fixture.store()).with_source(fixture.source());
    execute(&config)?;
    assert_eq!(fixture.target_paths()?, set(&["a.txt", "sub", "sub/b.txt"]));

    let config = RunConfig::new(Mode::Delete, fixture.target(), fixture.store());
    let outcome = execute(&config)?;
    assert!(outcome.itinerary.is_some());
    assert!(fixture.target_paths()?.is_empty());
    assert!(ItineraryStore::try_load(fixture.store())?.is_empty());

    Ok(())
}

#[test]
fn source_spelling_does_not_block_removal() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("a.txt", "a")?;
    execute(&fixture.config(Mode::AddManifest))?;

    let dotted = fixture.source().join("..").join("source");
    let config = RunConfig::new(Mode::RemoveManifest, fixture.target(), fixture.store())
        .with_source(dotted);
    let outcome = execute(&config)?;
    assert!(outcome.changed);
    assert!(ItineraryStore::try_load(fixture.store())?.is_empty());

    Ok(())
}

#[test]
fn strip_sources_leaves_foreign_files() -> Result<()> {
    let fixture = TreeFixture::new()?;
    fixture.write_source("sub/a.txt", "a")?;
    execute(&fixture.config(Mode::Copy))?;
    fixture.write_target("sub/mine.txt", "mine")?;

    let mut plan = plan_remove_sources(
        [fixture.source()],
        fixture.target(),
        Some("leftovers"),
        ScanOptions::default(),
    )?;
    assert_eq!(plan.key(), "leftovers");
    let results = clean(&mut plan, &Synchronizer::default())?;
    assert_eq!(results[0].succeeded(), &set(&["sub/a.txt"]));
    assert_eq!(fixture.target_paths()?, set(&["sub", "sub/mine.txt"]));

    Ok(())
}
