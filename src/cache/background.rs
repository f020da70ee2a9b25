// Background probing - the prober can block for a long time on a bad file,
// so it never runs on the runtime's worker threads

use super::ValidityCache;
use crate::error::InvalidModule;
use crate::module::ModInfo;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::warn;

pub type ProbeOutcome = (PathBuf, Result<ModInfo, InvalidModule>);

/// Probe on the blocking pool, giving up after `timeout`.
///
/// A timed-out probe keeps running to completion and may still populate the
/// cache; the caller just stops waiting for it.
pub async fn probe_with_timeout(
    cache: Arc<ValidityCache>,
    path: PathBuf,
    timeout: Duration,
) -> Result<ModInfo, InvalidModule> {
    run_blocking(path, timeout, move |path| cache.probe(path)).await
}

/// [`ValidityCache::force_revalidate`] under the same timeout rules.
pub async fn force_with_timeout(
    cache: Arc<ValidityCache>,
    path: PathBuf,
    timeout: Duration,
) -> Result<ModInfo, InvalidModule> {
    run_blocking(path, timeout, move |path| cache.force_revalidate(path)).await
}

async fn run_blocking<F>(
    path: PathBuf,
    timeout: Duration,
    check: F,
) -> Result<ModInfo, InvalidModule>
where
    F: FnOnce(&Path) -> Result<ModInfo, InvalidModule> + Send + 'static,
{
    let worker_path = path.clone();
    let worker = task::spawn_blocking(move || check(&worker_path));

    match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            warn!("Probe worker for {} died: {}", path.display(), join_error);
            Err(InvalidModule::Aborted {
                path,
                reason: join_error.to_string(),
            })
        }
        Err(_) => {
            warn!("Probe of {} timed out after {:?}", path.display(), timeout);
            Err(InvalidModule::TimedOut { path, timeout })
        }
    }
}

/// Probe many files with bounded parallelism. Results come back in input order.
pub async fn probe_all(
    cache: Arc<ValidityCache>,
    paths: Vec<PathBuf>,
    timeout: Duration,
    concurrency: usize,
) -> Vec<ProbeOutcome> {
    check_all(cache, paths, timeout, concurrency, false).await
}

/// Like [`probe_all`], but previously rejected files get another try.
pub async fn revalidate_all(
    cache: Arc<ValidityCache>,
    paths: Vec<PathBuf>,
    timeout: Duration,
    concurrency: usize,
) -> Vec<ProbeOutcome> {
    check_all(cache, paths, timeout, concurrency, true).await
}

async fn check_all(
    cache: Arc<ValidityCache>,
    paths: Vec<PathBuf>,
    timeout: Duration,
    concurrency: usize,
    force: bool,
) -> Vec<ProbeOutcome> {
    stream::iter(paths)
        .map(|path| {
            let cache = Arc::clone(&cache);
            async move {
                let result = if force {
                    force_with_timeout(cache, path.clone(), timeout).await
                } else {
                    probe_with_timeout(cache, path.clone(), timeout).await
                };
                (path, result)
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{CountingProber, FakeStorage};
    use crate::cache::MemoryStore;
    use crate::module::{ModuleProber, ModuleSource};

    struct SlowProber(Duration);

    impl ModuleProber for SlowProber {
        fn test_module(&self, _source: &mut dyn ModuleSource) -> Option<ModInfo> {
            std::thread::sleep(self.0);
            Some(ModInfo::new("slow", "Test Tracker"))
        }
    }

    #[tokio::test]
    async fn test_slow_probe_times_out() {
        let storage = Arc::new(FakeStorage::default());
        storage.write("/m/slow.mod", b"MOD slow");
        let cache = Arc::new(ValidityCache::new(
            MemoryStore::new(),
            SlowProber(Duration::from_millis(500)),
            storage,
        ));

        let path = PathBuf::from("/m/slow.mod");
        let result = probe_with_timeout(cache, path, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(InvalidModule::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_forced_recheck_is_bounded_by_timeout() {
        let storage = Arc::new(FakeStorage::default());
        storage.write("/m/hang.mod", b"MOD hang");
        let cache = Arc::new(ValidityCache::new(
            MemoryStore::new(),
            SlowProber(Duration::from_millis(500)),
            storage,
        ));

        let path = PathBuf::from("/m/hang.mod");
        let result = force_with_timeout(cache, path, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(InvalidModule::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_forced_recheck_retries_rejected_file() {
        let storage = Arc::new(FakeStorage::default());
        let prober = Arc::new(CountingProber::default());
        storage.write("/m/late.mod", b"plain");
        let cache = ValidityCache::new(MemoryStore::new(), prober.clone(), storage.clone());
        let cache = Arc::new(cache);

        let path = PathBuf::from("/m/late.mod");
        let timeout = Duration::from_secs(5);
        assert!(probe_with_timeout(Arc::clone(&cache), path.clone(), timeout).await.is_err());

        storage.write("/m/late.mod", b"MOD late");
        let info = force_with_timeout(cache, path, timeout).await.unwrap();
        assert_eq!(info.name, "late");
        assert_eq!(prober.calls(), 2);
    }

    #[tokio::test]
    async fn test_timed_out_probe_caches_nothing_negative() {
        let storage = Arc::new(FakeStorage::default());
        storage.write("/m/slow.mod", b"MOD slow");
        let cache = Arc::new(ValidityCache::new(
            MemoryStore::new(),
            SlowProber(Duration::from_millis(100)),
            storage,
        ));

        let path = PathBuf::from("/m/slow.mod");
        let first =
            probe_with_timeout(Arc::clone(&cache), path.clone(), Duration::from_millis(5)).await;
        assert!(first.is_err());

        let second = probe_with_timeout(cache, path, Duration::from_secs(5)).await;
        assert_eq!(second.unwrap().name, "slow");
    }

    #[tokio::test]
    async fn test_probe_all_keeps_input_order() {
        let storage = Arc::new(FakeStorage::default());
        let prober = Arc::new(CountingProber::default());
        let mut paths = Vec::new();
        for i in 0..10 {
            let path = format!("/m/{:02}.mod", i);
            if i % 3 == 0 {
                storage.write(&path, b"not a module");
            } else {
                storage.write(&path, format!("MOD track {}", i).as_bytes());
            }
            paths.push(PathBuf::from(path));
        }
        let cache = Arc::new(ValidityCache::new(MemoryStore::new(), prober.clone(), storage));

        let outcomes = probe_all(cache, paths.clone(), Duration::from_secs(5), 4).await;

        let returned: Vec<&Path> = outcomes.iter().map(|(p, _)| p.as_path()).collect();
        let expected: Vec<&Path> = paths.iter().map(|p| p.as_path()).collect();
        assert_eq!(returned, expected);

        for (i, (_, result)) in outcomes.iter().enumerate() {
            if i % 3 == 0 {
                assert!(result.is_err());
            } else {
                assert_eq!(result.as_ref().unwrap().name, format!("track {}", i));
            }
        }
        assert_eq!(prober.calls(), 10);
    }
}
