//! Batch-level behaviour of the orchestrator.

mod common;

use bridge_traits::catalog::{
    CollectionGroup, CollectionKind, ExpandedCollection, SkippedGroup, SongRef,
};
use common::{file_name, mp3_bytes, FakeHttp, RecordingInjector, ScriptedCatalog, StreamStep, UrlScript};
use core_download::{
    BatchOptions, CollectionFolders, DownloadError, DownloadRequest, ErrorKind, FileFailureLog,
    JobOutcome, MemoryFailureLog, Orchestrator,
};
use core_metadata::tagging::LoftyTagInjector;
use core_runtime::config::DownloaderConfig;
use core_runtime::events::{DownloadEvent, EventBus};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config(output: &Path) -> DownloaderConfig {
    DownloaderConfig::builder()
        .api_base_url("http://api.test")
        .credential("MUSIC_U=test")
        .output_dir(output)
        .retry_base_delay(Duration::from_millis(1))
        .build()
        .unwrap()
}

fn songs(ids: &[&str]) -> Vec<SongRef> {
    ids.iter().map(|id| SongRef::new(*id)).collect()
}

fn playlist(name: &str, ids: &[&str]) -> ExpandedCollection {
    ExpandedCollection {
        title: name.to_string(),
        groups: vec![CollectionGroup {
            name: name.to_string(),
            songs: songs(ids),
        }],
        skipped: Vec::new(),
    }
}

#[tokio::test]
async fn test_end_to_end_mixed_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("download_failures.log");

    let catalog = ScriptedCatalog::new()
        .with_song("1", UrlScript::Stream { size: None })
        .with_song("2", UrlScript::NoRights)
        .with_song("3", UrlScript::Stream { size: None })
        .with_collection("pl", playlist("Road Trip", &["1", "2", "3"]));
    let http = Arc::new(
        FakeHttp::new()
            .with_stream("1", vec![StreamStep::Body(vec![9u8; 50_000])])
            .with_stream("3", vec![StreamStep::Timeout]),
    );
    let failure_log = Arc::new(FileFailureLog::new(&log_path));

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(catalog),
        http.clone(),
        Arc::new(RecordingInjector::new()),
        failure_log,
    );

    let report = orchestrator
        .run(
            &DownloadRequest::Collection {
                kind: CollectionKind::Playlist,
                id: "pl".to_string(),
            },
            &BatchOptions::default().with_concurrency(3),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed_ids, vec!["2".to_string(), "3".to_string()]);
    assert_eq!(report.total(), 3);

    let song_path = dir.path().join("Road Trip").join(file_name("1"));
    assert_eq!(std::fs::metadata(&song_path).unwrap().len(), 50_000);
    assert!(!dir.path().join("Road Trip").join(file_name("3")).exists());

    assert!(matches!(
        report.job("2").unwrap().outcome,
        JobOutcome::SkippedNoRights { .. }
    ));
    assert_eq!(report.job("2").unwrap().attempts, 1);
    assert_eq!(report.job("3").unwrap().attempts, 3);
    assert_eq!(http.stream_calls("3"), 3);

    let log = std::fs::read_to_string(&log_path).unwrap();
    let records: Vec<&str> = log.split_terminator("\n\n").collect();
    assert_eq!(records.len(), 2);
    assert!(log.contains("song 2 (Song 2)\nkind: RightsRestricted\n"));
    assert!(log.contains("song 3 (Song 3)\nkind: Transport\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_bound_is_respected() {
    let ids: Vec<String> = (1..=12).map(|i| i.to_string()).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let mut catalog = ScriptedCatalog::new();
    let mut http = FakeHttp::new().with_stream_delay(Duration::from_millis(30));
    for id in &id_refs {
        catalog = catalog.with_song(id, UrlScript::Stream { size: None });
        http = http.with_stream(id, vec![StreamStep::Body(vec![0u8; 1_000])]);
    }
    let http = Arc::new(http);
    let dir = tempfile::tempdir().unwrap();

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(catalog),
        http.clone(),
        Arc::new(RecordingInjector::new()),
        Arc::new(MemoryFailureLog::new()),
    );

    let resolver = CollectionFolders::new(dir.path());
    let groups = vec![CollectionGroup {
        name: String::new(),
        songs: songs(&id_refs),
    }];
    let report = orchestrator
        .run_batch(groups, &resolver, &BatchOptions::default().with_concurrency(3))
        .await
        .unwrap();

    assert_eq!(report.succeeded, 12);
    assert!(http.peak_concurrency() <= 3, "peak {}", http.peak_concurrency());
    assert!(http.peak_concurrency() > 1, "jobs never overlapped");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_worker_runs_jobs_one_at_a_time() {
    let mut catalog = ScriptedCatalog::new();
    let mut http = FakeHttp::new().with_stream_delay(Duration::from_millis(10));
    for id in ["1", "2", "3", "4"] {
        catalog = catalog.with_song(id, UrlScript::Stream { size: None });
        http = http.with_stream(id, vec![StreamStep::Body(vec![0u8; 10])]);
    }
    let http = Arc::new(http);
    let dir = tempfile::tempdir().unwrap();

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(catalog.with_collection("pl", playlist("", &["1", "2", "3", "4"]))),
        http.clone(),
        Arc::new(RecordingInjector::new()),
        Arc::new(MemoryFailureLog::new()),
    );

    // Zero is clamped up to one worker.
    let report = orchestrator
        .run(
            &DownloadRequest::Collection {
                kind: CollectionKind::Album,
                id: "pl".to_string(),
            },
            &BatchOptions::default().with_concurrency(0),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 4);
    assert_eq!(http.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_artist_catalog_groups_and_skipped_albums() {
    let dir = tempfile::tempdir().unwrap();
    let collection = ExpandedCollection {
        title: "Artist".to_string(),
        groups: vec![
            CollectionGroup {
                name: "Artist - First".to_string(),
                songs: songs(&["1"]),
            },
            CollectionGroup {
                name: "Artist - Second".to_string(),
                songs: songs(&["2"]),
            },
        ],
        skipped: vec![SkippedGroup {
            id: "a3".to_string(),
            name: "Artist - Third".to_string(),
            reason: "album has no tracks".to_string(),
        }],
    };
    let catalog = ScriptedCatalog::new()
        .with_song("1", UrlScript::Stream { size: None })
        .with_song("2", UrlScript::Stream { size: None })
        .with_collection("ar", collection);
    let http = FakeHttp::new()
        .with_stream("1", vec![StreamStep::Body(vec![1u8; 10])])
        .with_stream("2", vec![StreamStep::Body(vec![2u8; 20])]);
    let failures = Arc::new(MemoryFailureLog::new());
    let events = EventBus::new(256);
    let mut rx = events.subscribe();

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(catalog),
        Arc::new(http),
        Arc::new(RecordingInjector::new()),
        failures.clone(),
    )
    .with_event_bus(events);

    let report = orchestrator
        .run(
            &DownloadRequest::Collection {
                kind: CollectionKind::ArtistCatalog,
                id: "ar".to_string(),
            },
            &BatchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    assert!(report.failed_ids.is_empty());
    assert_eq!(report.skipped_groups.len(), 1);
    assert!(dir.path().join("Artist - First").join(file_name("1")).exists());
    assert!(dir.path().join("Artist - Second").join(file_name("2")).exists());
    assert!(!dir.path().join("Artist - Third").exists());

    let entries = failures.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].song_id, "a3");
    assert_eq!(entries[0].song_name.as_deref(), Some("Artist - Third"));
    assert_eq!(entries[0].kind, ErrorKind::CollectionExpansionError);

    let mut saw_skip = false;
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            DownloadEvent::GroupSkipped { name, .. } => {
                assert_eq!(name, "Artist - Third");
                saw_skip = true;
            }
            DownloadEvent::BatchCompleted {
                succeeded, failed, ..
            } => {
                assert_eq!((succeeded, failed), (2, 0));
                saw_completed = true;
            }
            _ => {}
        }
    }
    assert!(saw_skip && saw_completed);
}

#[tokio::test]
async fn test_unresolvable_collection_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let failures = Arc::new(MemoryFailureLog::new());

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(ScriptedCatalog::new()),
        Arc::new(FakeHttp::new()),
        Arc::new(RecordingInjector::new()),
        failures.clone(),
    );

    let err = orchestrator
        .run(
            &DownloadRequest::Collection {
                kind: CollectionKind::Playlist,
                id: "missing".to_string(),
            },
            &BatchOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::Expansion {
            kind: CollectionKind::Playlist,
            ..
        }
    ));
    assert!(err.to_string().contains("playlist missing"));
    assert!(failures.is_empty().await);
}

#[tokio::test]
async fn test_single_song_with_real_tags() {
    let dir = tempfile::tempdir().unwrap();
    let body = mp3_bytes(30);
    let body_len = body.len() as u64;

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(
            ScriptedCatalog::new()
                .with_song("186016", UrlScript::Stream { size: None })
                .with_lyrics("186016", "[00:01.000]line"),
        ),
        Arc::new(FakeHttp::new().with_stream("186016", vec![StreamStep::Body(body)])),
        Arc::new(LoftyTagInjector::new()),
        Arc::new(MemoryFailureLog::new()),
    );

    let report = orchestrator
        .run(&DownloadRequest::Song("186016".to_string()), &BatchOptions::default())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1, "{:?}", report.jobs);
    let path = dir.path().join(file_name("186016"));
    // The tag was prepended after the length check.
    assert!(std::fs::metadata(&path).unwrap().len() > body_len);
}

#[tokio::test]
async fn test_identical_file_names_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let mut twin = common::metadata("2");
    twin.title = "Song 1".to_string();

    let orchestrator = Orchestrator::new(
        config(dir.path()),
        Arc::new(
            ScriptedCatalog::new()
                .with_song("1", UrlScript::Stream { size: None })
                .with_song("2", UrlScript::Stream { size: None })
                .with_metadata(twin),
        ),
        Arc::new(
            FakeHttp::new()
                .with_stream("1", vec![StreamStep::Body(vec![1u8; 10])])
                .with_stream("2", vec![StreamStep::Body(vec![2u8; 10])]),
        ),
        Arc::new(RecordingInjector::new()),
        Arc::new(MemoryFailureLog::new()),
    );

    let resolver = CollectionFolders::new(dir.path());
    let report = orchestrator
        .run_batch(
            vec![CollectionGroup {
                name: String::new(),
                songs: songs(&["1", "2"]),
            }],
            &resolver,
            &BatchOptions::default().with_concurrency(1),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    // With one worker the second song is written last.
    assert_eq!(std::fs::read(dir.path().join(file_name("1"))).unwrap(), vec![2u8; 10]);
}
