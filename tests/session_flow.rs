use modqueue::cache::{DirStore, MemoryStore};
use modqueue::storage::collect_candidates;
use modqueue::{
    BackAction, HeaderProber, InvalidModule, LocalStorage, PlaybackSession, QueueMode,
    SessionSettings, ValidityCache,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn write_it(dir: &Path, file: &str, title: &str) -> PathBuf {
    let mut bytes = b"IMPM".to_vec();
    bytes.extend_from_slice(title.as_bytes());
    bytes.resize(192, 0);
    let path = dir.join(file);
    fs::write(&path, bytes).unwrap();
    path
}

fn write_mod(dir: &Path, file: &str, title: &str) -> PathBuf {
    let mut bytes = title.as_bytes().to_vec();
    bytes.resize(1080, 0);
    bytes.extend_from_slice(b"M.K.");
    bytes.resize(2048, 0);
    let path = dir.join(file);
    fs::write(&path, bytes).unwrap();
    path
}

fn settings(shuffle: bool, looping: bool, keep_first: bool) -> SessionSettings {
    SessionSettings {
        mode: QueueMode {
            shuffle,
            looping,
            keep_first,
        },
        probe_timeout: Duration::from_secs(5),
        probe_concurrency: 4,
        restart_threshold: Duration::from_secs(3),
    }
}

#[tokio::test]
async fn test_directory_session_plays_in_name_order() {
    let music = tempdir().unwrap();
    write_mod(music.path(), "01-intro.mod", "intro");
    fs::write(music.path().join("02-notes.txt"), "liner notes").unwrap();
    write_it(music.path(), "03-main.it", "main theme");
    write_mod(music.path(), "04-outro.mod", "outro");

    let cache = ValidityCache::new(MemoryStore::new(), HeaderProber::new(), LocalStorage);
    let cache = Arc::new(cache);
    let candidates = collect_candidates(&[music.path().to_path_buf()]);
    assert_eq!(candidates.len(), 4);

    let session = PlaybackSession::start(cache, candidates, 0, settings(false, false, false))
        .await
        .unwrap();

    let mut titles = vec![session.now_playing().await.unwrap().unwrap().entry.title()];
    while let Some(entry) = session.advance().await.unwrap() {
        titles.push(entry.title());
    }
    assert_eq!(titles, vec!["intro", "main theme", "outro"]);
}

#[tokio::test]
async fn test_looping_shuffle_covers_every_file_each_lap() {
    let music = tempdir().unwrap();
    for i in 0..7 {
        write_it(music.path(), &format!("{}.it", i), &format!("song {}", i));
    }

    let cache = ValidityCache::new(MemoryStore::new(), HeaderProber::new(), LocalStorage);
    let cache = Arc::new(cache);
    let candidates = collect_candidates(&[music.path().to_path_buf()]);
    let session = PlaybackSession::start(cache, candidates, 3, settings(true, true, true))
        .await
        .unwrap();

    let first = session.now_playing().await.unwrap().unwrap();
    assert_eq!(first.entry.title(), "song 3");
    assert_eq!(first.total, 7);

    let mut lap = vec![first.entry.title()];
    for _ in 1..7 {
        lap.push(session.advance().await.unwrap().unwrap().title());
    }
    lap.sort();
    lap.dedup();
    assert_eq!(lap.len(), 7);

    // wraps instead of stopping
    let wrapped = session.advance().await.unwrap();
    assert!(wrapped.is_some());
    assert_eq!(session.now_playing().await.unwrap().unwrap().position, 1);

    let back = session.go_back(Duration::ZERO).await.unwrap();
    assert!(matches!(back, BackAction::Previous(_)));
    assert_eq!(session.now_playing().await.unwrap().unwrap().position, 7);
}

#[tokio::test]
async fn test_verdicts_survive_a_restart_of_the_cache() {
    let music = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let song = write_mod(music.path(), "keep.mod", "keeper");
    let junk = music.path().join("junk.bin");
    fs::write(&junk, vec![0xffu8; 4096]).unwrap();

    {
        let store = DirStore::new(cache_dir.path()).unwrap();
        let cache = ValidityCache::new(store, HeaderProber::new(), LocalStorage);
        assert_eq!(cache.probe(&song).unwrap().name, "keeper");
        assert!(matches!(cache.probe(&junk), Err(InvalidModule::Rejected { .. })));
    }

    let store = DirStore::new(cache_dir.path()).unwrap();
    let cache = ValidityCache::new(store, HeaderProber::new(), LocalStorage);
    assert!(matches!(cache.probe(&junk), Err(InvalidModule::Skipped { .. })));
    assert!(!cache.is_valid(&junk));
    assert_eq!(cache.probe(&song).unwrap().module_type, "Protracker (M.K.)");

    // a rewritten file with a different length is probed afresh
    write_it(music.path(), "keep.mod", "now an it");
    assert_eq!(cache.probe(&song).unwrap().name, "now an it");

    assert!(cache.delete_file(&song));
    assert!(!song.exists());
    assert!(!cache.is_valid(&song));
}

#[tokio::test]
async fn test_enqueue_while_playing_keeps_history() {
    let music = tempdir().unwrap();
    let first = write_mod(music.path(), "a.mod", "a");
    let second = write_mod(music.path(), "b.mod", "b");

    let cache = ValidityCache::new(MemoryStore::new(), HeaderProber::new(), LocalStorage);
    let cache = Arc::new(cache);
    let session = PlaybackSession::start(cache, vec![first, second], 0, settings(true, false, true))
        .await
        .unwrap();
    session.advance().await.unwrap().unwrap();
    let before = session.now_playing().await.unwrap().unwrap();

    let more = vec![
        write_it(music.path(), "c.it", "c"),
        write_it(music.path(), "d.it", "d"),
        music.path().join("missing.it"),
    ];
    let report = session.enqueue(more).await.unwrap();
    assert_eq!(report.added, 2);
    assert_eq!(report.rejected.len(), 1);

    let now = session.now_playing().await.unwrap().unwrap();
    assert_eq!(now.entry, before.entry);
    assert_eq!(now.position, 2);
    assert_eq!(now.total, 4);

    let mut rest = Vec::new();
    while let Some(entry) = session.advance().await.unwrap() {
        rest.push(entry.title());
    }
    rest.sort();
    assert_eq!(rest, vec!["c", "d"]);
}
