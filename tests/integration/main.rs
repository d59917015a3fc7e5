//! Integration tests for ssg-cache

mod cache_tests {
    use serde::{Deserialize, Serialize};
    use ssg_cache::cache::{CacheStatus, MemoryStore, Record, StorageMode};
    use ssg_cache::config::{CacheConfig, Config, RetryConfig};
    use ssg_cache::{BoxError, CacheKey, GetOptions, SsgCache, SsgCacheError};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Post {
        title: String,
    }

    fn config(root: &Path) -> Config {
        Config {
            cache: CacheConfig {
                root: Some(root.to_path_buf()),
                max_wait_ms: 2_000,
                watch_interval_ms: 5,
                poll_interval_ms: 5,
                lock: false,
            },
            retry: RetryConfig {
                max_attempts: 3,
                delay_ms: 1,
            },
            ..Config::default()
        }
    }

    async fn cache_at(config: &Config) -> SsgCache {
        SsgCache::with_store(config, Arc::new(MemoryStore::new())).await
    }

    fn hello() -> Post {
        Post {
            title: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn cold_then_warm() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;
        assert_eq!(cache.mode(), StorageMode::Persistent);

        let first = &AtomicU32::new(0);
        let value = cache
            .get(
                "k",
                || async move {
                    first.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>("one".to_string())
                },
                GetOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, "one");
        assert_eq!(first.load(Ordering::SeqCst), 1);

        let second = &AtomicU32::new(0);
        let value = cache
            .get(
                "k",
                || async move {
                    second.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>("two".to_string())
                },
                GetOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, "one");
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn posts_scenario() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;
        let calls = &AtomicU32::new(0);
        let producer = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BoxError>(hello())
        };

        let post = cache
            .get(["posts", "123"], producer, GetOptions::default())
            .await
            .unwrap();
        assert_eq!(post, hello());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let post = cache
            .get(["posts", "123"], producer, GetOptions::default())
            .await
            .unwrap();
        assert_eq!(post, hello());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let key = CacheKey::new(["posts", "123"]).unwrap();
        let entry_path = cache.address(&key, Record::Entry);
        assert!(entry_path.ends_with("posts-123.cache"));
        let stored = std::fs::read_to_string(entry_path).unwrap();
        assert_eq!(stored, r#"{"data":{"title":"Hello"}}"#);
    }

    #[tokio::test]
    async fn ttl_expiry_triggers_refetch() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;
        let ttl = GetOptions::with_ttl(Duration::from_millis(10));

        let v: u32 = cache
            .get("k", || async { Ok::<_, BoxError>(1) }, ttl.clone())
            .await
            .unwrap();
        assert_eq!(v, 1);

        tokio::time::sleep(Duration::from_millis(15)).await;

        let calls = &AtomicU32::new(0);
        let v: u32 = cache
            .get(
                "k",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(2)
                },
                ttl,
            )
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_cache_always_produces_and_overwrites() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;

        let _: u32 = cache
            .get("k", || async { Ok::<_, BoxError>(1) }, GetOptions::default())
            .await
            .unwrap();

        let calls = &AtomicU32::new(0);
        let v: u32 = cache
            .get(
                "k",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(2)
                },
                GetOptions::skipping_cache(),
            )
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let v: u32 = cache
            .get("k", || async { Ok::<_, BoxError>(3) }, GetOptions::default())
            .await
            .unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_producer() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;
        let calls = &AtomicU32::new(0);
        let slow = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, BoxError>(hello())
        };

        let (a, b) = tokio::join!(
            cache.get("slow", slow, GetOptions::default()),
            cache.get("slow", slow, GetOptions::default()),
        );

        assert_eq!(a.unwrap(), hello());
        assert_eq!(b.unwrap(), hello());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn instances_in_one_process_share_one_producer() {
        let temp = TempDir::new().unwrap();
        let cfg = config(temp.path());
        let store = Arc::new(MemoryStore::new());
        let a = SsgCache::with_store(&cfg, store.clone()).await;
        let b = SsgCache::with_store(&cfg, store).await;
        assert_eq!(a.id(), b.id());

        let calls = &AtomicU32::new(0);
        let slow = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, BoxError>(42u32)
        };

        let (x, y) = tokio::join!(
            a.get("answer", slow, GetOptions::default()),
            b.get("answer", slow, GetOptions::default()),
        );
        assert_eq!(x.unwrap(), 42);
        assert_eq!(y.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_memory_when_disk_unavailable() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = SsgCache::with_store(&config(&blocker.join("root")), store.clone()).await;

        assert_eq!(cache.mode(), StorageMode::InMemory);
        assert!(!cache.is_persistent());

        let calls = &AtomicU32::new(0);
        let producer = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(hello())
        };
        let cold = cache.get("posts", producer, GetOptions::default()).await.unwrap();
        let warm = cache.get("posts", producer, GetOptions::default()).await.unwrap();

        assert_eq!(cold, hello());
        assert_eq!(warm, hello());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stuck_pending_times_out() {
        let temp = TempDir::new().unwrap();
        let mut cache = cache_at(&config(temp.path())).await;
        cache.set_max_wait(Duration::from_millis(50));
        let key = CacheKey::new(["posts", "crashed"]).unwrap();
        std::fs::write(cache.address(&key, Record::Status), "pending").unwrap();

        let calls = &AtomicU32::new(0);
        let err = cache
            .get(
                &key,
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(1)
                },
                GetOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SsgCacheError::Timeout { waited_ms: 50, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn skip_cache_repopulates_stuck_pending() {
        let temp = TempDir::new().unwrap();
        let mut cache = cache_at(&config(temp.path())).await;
        cache.set_max_wait(Duration::from_millis(30));
        let key = CacheKey::new(["posts", "crashed"]).unwrap();
        std::fs::write(cache.address(&key, Record::Status), "pending").unwrap();

        let err = cache
            .get(&key, || async { Ok::<_, BoxError>(1u32) }, GetOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SsgCacheError::Timeout { .. }));

        let v: u32 = cache
            .get(&key, || async { Ok::<_, BoxError>(2) }, GetOptions::skipping_cache())
            .await
            .unwrap();
        assert_eq!(v, 2);

        let calls = &AtomicU32::new(0);
        let v: u32 = cache
            .get(
                &key,
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(3)
                },
                GetOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flights_are_released_after_gets() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = SsgCache::with_store(&config(temp.path()), store.clone()).await;

        for n in 0..5u32 {
            let _: u32 = cache
                .get(
                    ["posts", n.to_string().as_str()],
                    || async move { Ok::<_, BoxError>(n) },
                    GetOptions::default(),
                )
                .await
                .unwrap();
        }
        assert_eq!(store.flights(), 0);
    }

    #[tokio::test]
    async fn lock_layer_reclaims_stale_pending() {
        let temp = TempDir::new().unwrap();
        let mut cfg = config(temp.path());
        cfg.cache.lock = true;
        let cache = cache_at(&cfg).await;
        let key = CacheKey::new(["posts", "crashed"]).unwrap();
        std::fs::write(cache.address(&key, Record::Status), "pending").unwrap();

        let v: u32 = cache
            .get(&key, || async { Ok::<_, BoxError>(9) }, GetOptions::default())
            .await
            .unwrap();

        assert_eq!(v, 9);
        assert_eq!(cache.status(&key).await.unwrap(), CacheStatus::Ready);
        assert!(cache.address(&key, Record::Lock).exists());
    }

    #[tokio::test]
    async fn lock_layer_excludes_independent_instances() {
        let temp = TempDir::new().unwrap();
        let mut cfg = config(temp.path());
        cfg.cache.lock = true;
        // Separate stores stand in for separate worker processes
        let a = cache_at(&cfg).await;
        let b = cache_at(&cfg).await;

        let calls = &AtomicU32::new(0);
        let slow = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok::<_, BoxError>("page".to_string())
        };

        let (x, y) = tokio::join!(
            a.get("render", slow, GetOptions::default()),
            b.get("render", slow, GetOptions::default()),
        );
        assert_eq!(x.unwrap(), "page");
        assert_eq!(y.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_producer_is_retried() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;
        let calls = &AtomicU32::new(0);

        let v: u32 = cache
            .get(
                "flaky",
                || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err::<u32, BoxError>("connection reset".into())
                    } else {
                        Ok(5)
                    }
                },
                GetOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(v, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.status("flaky").await.unwrap(), CacheStatus::Ready);
    }

    #[tokio::test]
    async fn exhausted_retries_carry_last_error() {
        let temp = TempDir::new().unwrap();
        let cache = cache_at(&config(temp.path())).await;
        let calls = &AtomicU32::new(0);

        let err = cache
            .get(
                "broken",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(std::io::Error::other("upstream 503"))
                },
                GetOptions::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            SsgCacheError::RetriesExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(source.to_string().contains("upstream 503"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cache.status("broken").await.unwrap(), CacheStatus::Absent);
    }

    #[tokio::test]
    async fn builds_are_isolated() {
        let temp = TempDir::new().unwrap();
        let cfg = config(temp.path());
        let paths = ssg_cache::config::CachePaths::new(temp.path());

        SsgCache::init(&paths).await.unwrap();
        let first = cache_at(&cfg).await;
        let _: u32 = first
            .get("k", || async { Ok::<_, BoxError>(1) }, GetOptions::default())
            .await
            .unwrap();

        SsgCache::init(&paths).await.unwrap();
        let second = cache_at(&cfg).await;
        assert_ne!(first.id(), second.id());
        let v: u32 = second
            .get("k", || async { Ok::<_, BoxError>(2) }, GetOptions::default())
            .await
            .unwrap();
        assert_eq!(v, 2);
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn ssg_cache(root: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("ssg-cache");
        cmd.arg("--root").arg(root).env_remove("SSG_CACHE_CONFIG");
        cmd
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("ssg-cache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("memoizing cache"));
    }

    #[test]
    fn init_writes_build_id() {
        let temp = TempDir::new().unwrap();

        ssg_cache(temp.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized build"));

        let id = std::fs::read_to_string(temp.path().join("BUILD_ID")).unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn path_before_init() {
        let temp = TempDir::new().unwrap();

        ssg_cache(temp.path())
            .arg("path")
            .assert()
            .success()
            .stdout(predicate::str::contains("BUILD_ID"))
            .stdout(predicate::str::contains("not initialized"));
    }

    #[test]
    fn status_of_unknown_key() {
        let temp = TempDir::new().unwrap();
        ssg_cache(temp.path()).arg("init").assert().success();

        ssg_cache(temp.path())
            .args(["status", "posts", "123", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""status": "absent""#))
            .stdout(predicate::str::contains("posts-123.cache"));
    }

    #[test]
    fn status_sees_library_writes() {
        let temp = TempDir::new().unwrap();
        ssg_cache(temp.path()).arg("init").assert().success();

        let id = std::fs::read_to_string(temp.path().join("BUILD_ID")).unwrap();
        let build = temp.path().join("cache").join(id.trim());
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("posts-1.cache"), r#"{"data":1}"#).unwrap();
        std::fs::write(build.join("posts-1.stat"), "ready").unwrap();

        ssg_cache(temp.path())
            .args(["status", "posts", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ready"))
            .stdout(predicate::str::contains("never"));
    }

    #[test]
    fn prune_removes_previous_builds() {
        let temp = TempDir::new().unwrap();
        ssg_cache(temp.path()).arg("init").assert().success();
        let old = std::fs::read_to_string(temp.path().join("BUILD_ID")).unwrap();
        std::fs::create_dir_all(temp.path().join("cache").join(&old)).unwrap();

        ssg_cache(temp.path()).arg("init").assert().success();
        let current = std::fs::read_to_string(temp.path().join("BUILD_ID")).unwrap();
        std::fs::create_dir_all(temp.path().join("cache").join(&current)).unwrap();

        ssg_cache(temp.path())
            .args(["prune", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would remove"));
        assert!(temp.path().join("cache").join(&old).exists());

        ssg_cache(temp.path())
            .arg("prune")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pruned 1 build(s)"));
        assert!(!temp.path().join("cache").join(&old).exists());
        assert!(temp.path().join("cache").join(&current).exists());
    }

    #[test]
    fn status_before_init_creates_nothing() {
        let temp = TempDir::new().unwrap();

        ssg_cache(temp.path())
            .args(["status", "posts", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No build initialized"));

        assert!(!temp.path().join("BUILD_ID").exists());
        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn status_does_not_create_build_dir() {
        let temp = TempDir::new().unwrap();
        ssg_cache(temp.path()).arg("init").assert().success();

        ssg_cache(temp.path())
            .args(["status", "posts", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("absent"));

        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn prune_requires_init() {
        let temp = TempDir::new().unwrap();

        ssg_cache(temp.path())
            .arg("prune")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No build initialized"));
    }
}
