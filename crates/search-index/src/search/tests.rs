use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tempfile::TempDir;

use super::SearchIndex;
use crate::clock::Clock;
use crate::config::IndexConfig;
use crate::types::{IndexEntry, IndexUpdateEvent, KindFilter, SearchQuery, UpdateKind};

struct Fixture {
    _temp: TempDir,
    /// Caches and exports live here, outside the indexed root.
    scratch: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn empty() -> Self {
        let temp = TempDir::new().unwrap();
        let root = fs::canonicalize(temp.path()).unwrap();
        Self {
            _temp: temp,
            scratch: TempDir::new().unwrap(),
            root,
        }
    }

    /// `a.txt` ("hello world"), `b.bin` (2 bytes), `sub/c.txt` ("hello").
    fn scenario() -> Self {
        let fixture = Self::empty();
        fixture.write("a.txt", "hello world");
        fixture.write("b.bin", [0xde, 0xad]);
        fixture.write("sub/c.txt", "hello");
        fixture
    }

    fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn config(&self) -> IndexConfig {
        IndexConfig::with_roots([self.root.clone()])
    }

    fn index(&self) -> SearchIndex {
        let index = SearchIndex::new();
        assert!(index.initialize(self.config()));
        index
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Every catalog path, relative to the root.
    fn relative_paths(&self, index: &SearchIndex) -> BTreeSet<String> {
        index
            .search(&SearchQuery::new("").max_results(0))
            .iter()
            .map(|result| self.relative(&result.entry.path))
            .collect()
    }
}

fn record_events(index: &SearchIndex) -> Arc<Mutex<Vec<IndexUpdateEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    index.on_index_update(move |event| sink.lock().push(event.clone()));
    events
}

fn has_event(events: &Mutex<Vec<IndexUpdateEvent>>, kind: UpdateKind, path: &Path) -> bool {
    events
        .lock()
        .iter()
        .any(|event| event.kind == kind && event.path.as_deref() == Some(path))
}

/// Metadata that must survive identical passes.
fn state_of(index: &SearchIndex, fixture: &Fixture) -> Vec<(String, u64, SystemTime, u64, bool)> {
    let mut entries: Vec<IndexEntry> = fixture
        .relative_paths(index)
        .iter()
        .filter_map(|relative| index.get_entry(&fixture.path(relative)))
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
        .into_iter()
        .map(|entry| {
            (
                fixture.relative(&entry.path),
                entry.size,
                entry.modified_time,
                entry.content_hash,
                entry.is_directory,
            )
        })
        .collect()
}

#[test]
fn end_to_end_scenario() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));

    let stats = index.statistics();
    assert_eq!(stats.indexed_files, 3);
    assert_eq!(stats.content_indexed_files, 2);
    assert_eq!(stats.indexed_directories, 1);
    assert_eq!(stats.total_bytes, 11 + 2 + 5);
    assert!(stats.last_indexed_at.is_some());
    assert!(!stats.last_index_cancelled);

    let results = index.search(&SearchQuery::new("hello").content(true));
    let names: Vec<String> = results.iter().map(|r| fixture.relative(&r.entry.path)).collect();
    assert_eq!(names, ["a.txt", "sub/c.txt"]);
    assert!(results[0].score >= results[1].score);
    assert_eq!(results[0].match_context, "hello world");

    let quick = index.quick_search("c", 10);
    assert!(quick.iter().any(|path| path.ends_with("sub/c.txt")));
}

#[test]
fn rebuild_is_idempotent_and_tracks_single_file_changes() {
    let fixture = Fixture::scenario();
    let index = fixture.index();

    assert!(index.rebuild_index(None));
    let first = state_of(&index, &fixture);
    assert!(index.rebuild_index(None));
    let second = state_of(&index, &fixture);
    assert_eq!(first, second);

    fixture.write("a.txt", "hello brave new world");
    assert!(index.rebuild_index(None));
    let third = state_of(&index, &fixture);

    let changed: Vec<&String> = second
        .iter()
        .zip(&third)
        .filter(|(before, after)| before != after)
        .map(|(before, _)| &before.0)
        .collect();
    assert_eq!(changed, ["a.txt"]);
    let entry = index.get_entry(&fixture.path("a.txt")).unwrap();
    assert_eq!(entry.size, 21);
    assert_eq!(entry.content.as_deref(), Some("hello brave new world"));
}

#[test]
fn excluded_paths_never_reach_the_catalog() {
    let fixture = Fixture::scenario();
    fixture.write("node_modules/pkg/readme.txt", "hello");
    fixture.write(".git/config.txt", "hello");
    fixture.write("logs/app.log", "hello");
    fixture.write(".env", "SECRET=1");

    let index = SearchIndex::new();
    let config = IndexConfig {
        include_extensions: vec!["txt".into(), "log".into()],
        exclude_extensions: vec!["log".into()],
        ..fixture.config()
    };
    assert!(index.initialize(config));
    assert!(index.rebuild_index(None));

    let paths = fixture.relative_paths(&index);
    assert!(paths.iter().all(|path| !path.starts_with("node_modules")));
    assert!(paths.iter().all(|path| !path.starts_with(".git")));
    assert!(!paths.contains("logs/app.log"));
    assert!(!paths.contains(".env"));
    assert!(!paths.contains("b.bin"));
    assert!(paths.contains("a.txt"));
    assert!(paths.contains("logs"));
}

#[test]
fn filename_score_ordering() {
    let fixture = Fixture::empty();
    fixture.write("barfoo", "");
    fixture.write("foobar", "");
    fixture.write("foo", "");
    let index = fixture.index();
    assert!(index.rebuild_index(None));

    let results = index.search(&SearchQuery::new("foo"));
    let ranked: Vec<(String, f32)> = results
        .iter()
        .map(|r| (r.entry.filename.clone(), r.score))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("foo".to_string(), 1.0),
            ("foobar".to_string(), 0.8),
            ("barfoo".to_string(), 0.5)
        ]
    );
}

#[test]
fn content_score_has_diminishing_returns() {
    let fixture = Fixture::empty();
    fixture.write("ten.txt", "needle ".repeat(10));
    fixture.write("twenty.txt", "needle ".repeat(20));
    let index = fixture.index();
    assert!(index.rebuild_index(None));

    let results = index.search(&SearchQuery::new("needle").filenames(false).content(true));
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].score, results[1].score);
    assert!((results[0].score - 0.3).abs() < 1e-6);
    assert_eq!(results.iter().map(|r| r.matches.len()).max(), Some(20));
}

#[test]
fn metadata_filters_apply_before_scoring() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));

    let only_dirs = index.search(&SearchQuery::new("").kind(KindFilter::Directory));
    assert_eq!(only_dirs.len(), 1);
    assert!(only_dirs[0].entry.is_directory);

    let small_txt = index.search(
        &SearchQuery::new("")
            .extensions(["txt"])
            .size_between(None, Some(5)),
    );
    assert_eq!(small_txt.len(), 1);
    assert!(small_txt[0].entry.path.ends_with("sub/c.txt"));

    let future = SystemTime::now() + Duration::from_secs(3600);
    assert!(index.search(&SearchQuery::new("").modified_between(Some(future), None)).is_empty());
}

#[test]
fn persistence_round_trip_restores_metadata_without_content() {
    let fixture = Fixture::scenario();
    let cache = fixture.scratch.path().join("cache").join("index.bin.zst");
    let index = SearchIndex::new();
    assert!(index.initialize(IndexConfig {
        cache_path: Some(cache.clone()),
        ..fixture.config()
    }));
    assert!(index.rebuild_index(None));
    let stats1 = index.statistics();
    let paths1 = fixture.relative_paths(&index);
    assert!(index.save_index());
    assert!(cache.exists());

    index.clear_index();
    assert_eq!(index.statistics().indexed_files, 0);
    assert!(fixture.relative_paths(&index).is_empty());

    assert!(index.load_index());
    let stats2 = index.statistics();
    assert_eq!(stats1.indexed_files, stats2.indexed_files);
    assert_eq!(stats2.indexed_files, 3);
    assert_eq!(stats2.content_indexed_files, 0);
    assert_eq!(fixture.relative_paths(&index), paths1);

    let entry = index.get_entry(&fixture.path("a.txt")).unwrap();
    assert!(entry.content.is_none());
    assert_ne!(entry.content_hash, 0);
    assert_eq!(entry.size, 11);
}

#[test]
fn failed_load_keeps_catalog_and_reports_error() {
    let fixture = Fixture::scenario();
    let cache = fixture.scratch.path().join("missing").join("index.bin.zst");
    let index = SearchIndex::new();
    assert!(index.initialize(IndexConfig {
        cache_path: Some(cache.clone()),
        ..fixture.config()
    }));
    let events = record_events(&index);
    assert!(index.rebuild_index(None));

    assert!(!index.load_index());
    assert_eq!(index.statistics().indexed_files, 3);
    assert!(has_event(&events, UpdateKind::Error, &cache));

    fs::write(&cache, b"garbage").unwrap();
    assert!(!index.load_index());
    assert_eq!(index.statistics().indexed_files, 3);
}

#[test]
fn save_without_cache_path_fails_softly() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(!index.save_index());
    assert!(!index.load_index());
}

#[test]
fn export_and_import_json() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));
    let before = fixture.relative_paths(&index);

    let export = fixture.scratch.path().join("export.json");
    assert!(index.export_index(&export));
    index.clear_index();
    assert!(index.import_index(&export));

    assert_eq!(fixture.relative_paths(&index), before);
    assert_eq!(index.statistics().indexed_files, 3);
    assert!(!index.import_index(&fixture.path("nope.json")));
}

#[test]
fn cancelled_rebuild_does_not_corrupt_later_rebuild() {
    let fixture = Fixture::empty();
    for dir in 0..20 {
        for file in 0..50 {
            fixture.write(&format!("d{dir:02}/f{file:03}.txt"), format!("file {dir} {file}"));
        }
    }
    let expected = 20 * 50 + 20;
    let index = fixture.index();

    let processed = AtomicUsize::new(0);
    let cancel_early = |_: &Path, _: f32| {
        if processed.fetch_add(1, Ordering::SeqCst) == 0 {
            index.cancel_indexing();
        }
    };
    assert!(index.rebuild_index(Some(&cancel_early)));
    let stats = index.statistics();
    assert!(stats.last_index_cancelled);
    assert!(processed.load(Ordering::SeqCst) >= 1);
    assert!(processed.load(Ordering::SeqCst) < expected);
    assert_eq!(fixture.relative_paths(&index).len(), 0);

    assert!(index.rebuild_index(None));
    assert_eq!(fixture.relative_paths(&index).len(), expected);
    assert!(!index.statistics().last_index_cancelled);

    // A cancelled pass over a populated catalog leaves it untouched.
    processed.store(0, Ordering::SeqCst);
    assert!(index.rebuild_index(Some(&cancel_early)));
    assert_eq!(fixture.relative_paths(&index).len(), expected);
}

#[test]
fn concurrent_rebuild_is_refused() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    let nested_result = Mutex::new(None);

    let try_nested = |_: &Path, _: f32| {
        let mut slot = nested_result.lock();
        if slot.is_none() {
            assert!(index.is_indexing());
            *slot = Some(index.rebuild_index(None));
        }
    };
    assert!(index.rebuild_index(Some(&try_nested)));
    assert_eq!(*nested_result.lock(), Some(false));
    assert!(!index.is_indexing());
    assert_eq!(index.indexing_progress(), 1.0);
}

#[test]
fn progress_callback_reports_increasing_fractions() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    let fractions = Mutex::new(Vec::new());
    let record = |_: &Path, fraction: f32| fractions.lock().push(fraction);
    assert!(index.rebuild_index(Some(&record)));

    let mut fractions = fractions.into_inner();
    assert_eq!(fractions.len(), 4);
    fractions.sort_by(f32::total_cmp);
    assert!(fractions[0] > 0.0);
    assert_eq!(fractions[3], 1.0);
}

#[test]
fn searches_see_old_or_new_catalog_during_rebuild() {
    let fixture = Fixture::empty();
    for i in 0..40 {
        fixture.write(&format!("left/l{i:02}.txt"), "x");
        fixture.write(&format!("right/r{i:02}.txt"), "x");
    }
    let left = IndexConfig::with_roots([fixture.path("left")]);
    let right = IndexConfig::with_roots([fixture.path("right")]);
    let index = Arc::new(SearchIndex::new());
    assert!(index.initialize(left.clone()));
    assert!(index.rebuild_index(None));

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let query = SearchQuery::new("").kind(KindFilter::File).max_results(0);
            while !done.load(Ordering::SeqCst) {
                let results = index.search(&query);
                let lefts = results.iter().filter(|r| r.entry.filename.starts_with('l')).count();
                let rights = results.iter().filter(|r| r.entry.filename.starts_with('r')).count();
                assert!(
                    (lefts == 40 && rights == 0) || (lefts == 0 && rights == 40),
                    "mixed catalog: {lefts} left / {rights} right"
                );
            }
        })
    };

    for round in 0..10 {
        index.set_config(if round % 2 == 0 { right.clone() } else { left.clone() });
        assert!(index.rebuild_index(None));
    }
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();
}

#[test]
fn missing_root_is_not_fatal() {
    let fixture = Fixture::scenario();
    let missing = fixture.path("does-not-exist");
    let index = SearchIndex::new();
    assert!(index.initialize(IndexConfig::with_roots([missing.clone(), fixture.root.clone()])));
    let events = record_events(&index);

    assert!(index.rebuild_index(None));
    assert_eq!(index.statistics().indexed_files, 3);
    assert!(index.statistics().errors >= 1);
    assert!(has_event(&events, UpdateKind::Error, &missing));
}

#[test]
fn rebuild_emits_started_and_completed() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    let events = record_events(&index);
    assert!(index.rebuild_index(None));

    let kinds: Vec<UpdateKind> = events.lock().iter().map(|event| event.kind).collect();
    assert_eq!(kinds, [UpdateKind::Started, UpdateKind::Completed]);
}

#[test]
fn incremental_update_matches_rebuild_and_reports_changes() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));
    let events = record_events(&index);

    fixture.write("a.txt", "hello again, world");
    let added = fixture.write("d.txt", "fresh");
    fs::remove_file(fixture.path("sub/c.txt")).unwrap();

    assert!(index.update_index(None));
    assert!(has_event(&events, UpdateKind::Modified, &fixture.path("a.txt")));
    assert!(has_event(&events, UpdateKind::Added, &added));
    assert!(has_event(&events, UpdateKind::Removed, &fixture.path("sub/c.txt")));
    assert!(!has_event(&events, UpdateKind::Modified, &fixture.path("b.bin")));

    let updated = state_of(&index, &fixture);
    let a = index.get_entry(&fixture.path("a.txt")).unwrap();
    assert_eq!(a.content.as_deref(), Some("hello again, world"));

    let reference = fixture.index();
    assert!(reference.rebuild_index(None));
    assert_eq!(updated, state_of(&reference, &fixture));
}

#[test]
fn update_restores_content_after_load() {
    let fixture = Fixture::scenario();
    let export = fixture.scratch.path().join("export.json");
    let index = fixture.index();
    assert!(index.rebuild_index(None));
    assert!(index.export_index(&export));
    assert!(index.import_index(&export));
    assert_eq!(index.statistics().content_indexed_files, 0);

    assert!(index.update_index(None));
    assert_eq!(index.statistics().content_indexed_files, 2);
}

#[test]
fn single_path_mutations() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));
    let events = record_events(&index);

    let new_file = fixture.write("e.txt", "extra");
    assert!(!index.is_indexed(&new_file));
    assert!(index.add_to_index(&new_file));
    assert!(index.is_indexed(&new_file));
    assert!(has_event(&events, UpdateKind::Added, &new_file));
    assert_eq!(index.statistics().indexed_files, 4);

    let excluded = fixture.write("node_modules/x.txt", "x");
    assert!(!index.add_to_index(&excluded));
    assert!(!index.is_indexed(&excluded));

    let missing = fixture.path("ghost.txt");
    assert!(!index.add_to_index(&missing));
    assert!(has_event(&events, UpdateKind::Error, &missing));

    fixture.write("e.txt", "extra extra");
    assert!(index.update_entry(&new_file));
    assert_eq!(
        index.get_entry(&new_file).and_then(|entry| entry.content),
        Some("extra extra".to_string())
    );
    assert!(has_event(&events, UpdateKind::Modified, &new_file));

    fs::remove_file(&new_file).unwrap();
    assert!(index.update_entry(&new_file));
    assert!(!index.is_indexed(&new_file));
    assert!(has_event(&events, UpdateKind::Removed, &new_file));

    assert!(index.remove_from_index(&fixture.path("sub")));
    assert!(!index.is_indexed(&fixture.path("sub")));
    assert!(!index.is_indexed(&fixture.path("sub/c.txt")));
    assert!(has_event(&events, UpdateKind::Removed, &fixture.path("sub/c.txt")));
    assert!(!index.remove_from_index(&fixture.path("sub")));
    assert_eq!(index.statistics().indexed_files, 2);
}

#[test]
fn uninitialized_index_refuses_work() {
    let index = SearchIndex::new();
    assert!(!index.is_initialized());
    assert!(!index.rebuild_index(None));
    assert!(!index.update_index(None));
    assert!(!index.add_to_index(Path::new("/tmp")));
    assert!(index.search(&SearchQuery::new("x")).is_empty());
}

#[test]
fn search_async_delivers_results() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));

    let (sender, receiver) = mpsc::channel();
    index.search_async(SearchQuery::new("c.txt"), move |results| {
        sender.send(results).unwrap();
    });
    let results = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, 1.0);

    // Cancelling only affects searches already started.
    index.cancel_search();
    assert_eq!(index.search(&SearchQuery::new("c.txt")).len(), 1);
    index.shutdown();
    assert!(!index.is_initialized());
}

#[test]
fn verify_index_detects_missing_paths() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    assert!(index.rebuild_index(None));
    assert!(index.verify_index());

    fs::remove_file(fixture.path("b.bin")).unwrap();
    assert!(!index.verify_index());
}

#[test]
fn auto_update_picks_up_changes_and_stops() {
    let fixture = Fixture::scenario();
    let index = SearchIndex::new();
    assert!(index.initialize(IndexConfig {
        update_interval_secs: 1,
        ..fixture.config()
    }));
    assert!(index.rebuild_index(None));

    index.start_auto_update();
    index.start_auto_update();
    assert!(index.is_auto_update_running());

    let late = fixture.write("late.txt", "arrived later");
    let deadline = Instant::now() + Duration::from_secs(20);
    while !index.is_indexed(&late) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    assert!(index.is_indexed(&late));

    index.stop_auto_update();
    assert!(!index.is_auto_update_running());
}

#[test]
fn listeners_can_be_removed() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    let count = Arc::new(AtomicUsize::new(0));
    let id = {
        let count = Arc::clone(&count);
        index.on_index_update(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    assert!(index.rebuild_index(None));
    assert_eq!(count.load(Ordering::SeqCst), 2);

    assert!(index.remove_listener(id));
    assert!(index.rebuild_index(None));
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[derive(Debug)]
struct FixedClock(SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

#[test]
fn injected_clock_stamps_entries_and_events() {
    let fixture = Fixture::scenario();
    let fixed = UNIX_EPOCH + Duration::from_secs(4_000_000_000);
    let index = SearchIndex::with_clock(Arc::new(FixedClock(fixed)));
    assert!(index.initialize(fixture.config()));
    let events = record_events(&index);
    assert!(index.rebuild_index(None));

    assert_eq!(index.statistics().last_indexed_at, Some(fixed));
    assert_eq!(index.get_entry(&fixture.path("a.txt")).unwrap().indexed_time, fixed);
    assert!(events.lock().iter().all(|event| event.timestamp == fixed));
}

#[test]
fn config_round_trips_through_facade() {
    let fixture = Fixture::scenario();
    let index = fixture.index();
    let mut config = index.config();
    assert_eq!(config.roots, vec![fixture.root.clone()]);

    config.index_content = false;
    index.set_config(config);
    assert!(index.rebuild_index(None));
    assert_eq!(index.statistics().content_indexed_files, 0);
}
