//! Integration tests for TieredCache

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tiercache_core::{RemoteStore, StoreCommand};

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Profile {
        id: u64,
        name: String,
    }

    fn profile(id: u64) -> Profile {
        Profile {
            id,
            name: format!("user-{id}"),
        }
    }

    fn config() -> TieredCacheConfig {
        TieredCacheConfig::new(CacheConfig::default().prefix("test:"))
            .lock(LockConfig::default().retry(3, Duration::from_millis(5)))
    }

    fn tiered(store: &MemoryStore) -> TieredCache<MemoryStore> {
        TieredCache::new(store.clone(), config())
    }

    /// Remote store that is always down
    struct FailingStore;

    fn down<T>() -> Result<T> {
        Err(CacheError::Connection("connection refused".into()))
    }

    #[async_trait]
    impl RemoteStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            down()
        }
        async fn set_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            down()
        }
        async fn set_nx_ex(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<bool> {
            down()
        }
        async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
            down()
        }
        async fn del(&self, _keys: &[String]) -> Result<u64> {
            down()
        }
        async fn sadd(&self, _key: &str, _member: &str) -> Result<bool> {
            down()
        }
        async fn smembers(&self, _key: &str) -> Result<Vec<String>> {
            down()
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
            down()
        }
        async fn incr(&self, _key: &str) -> Result<i64> {
            down()
        }
        async fn compare_and_expire(&self, _key: &str, _token: &str, _ttl: Duration) -> Result<bool> {
            down()
        }
        async fn compare_and_delete(&self, _key: &str, _token: &str) -> Result<bool> {
            down()
        }
        async fn scan(&self, _pattern: &str, _count: usize, _limit: usize) -> Result<Vec<String>> {
            down()
        }
        async fn ping(&self) -> Result<()> {
            down()
        }
        async fn pipeline(&self, _commands: &[StoreCommand]) -> Result<()> {
            down()
        }
    }

    #[tokio::test]
    async fn test_set_then_get_from_each_tier() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let params = json!({"id": 1});

        assert!(cache.set("user_profile", &params, &profile(1), None).await);

        let local = cache.lookup::<Profile>("user_profile", &params).await;
        assert_eq!(local.tier(), Some(CacheTier::Local));
        assert_eq!(local.value(), Some(profile(1)));

        // A second process shares the store but not the local tier
        let other = tiered(&store);
        let remote = other.lookup::<Profile>("user_profile", &params).await;
        assert_eq!(remote.tier(), Some(CacheTier::Remote));
        assert_eq!(remote.value(), Some(profile(1)));

        let backfilled = other.lookup::<Profile>("user_profile", &params).await;
        assert_eq!(backfilled.tier(), Some(CacheTier::Local));
    }

    #[tokio::test]
    async fn test_miss() {
        let store = MemoryStore::new();
        let cache = tiered(&store);

        let result = cache.lookup::<Profile>("user_profile", &json!({"id": 9})).await;
        assert!(result.is_miss());
        assert_eq!(cache.get::<Profile>("user_profile", &json!({"id": 9})).await, None);
    }

    #[tokio::test]
    async fn test_page_parameter_collapses() {
        let store = MemoryStore::new();
        let cache = tiered(&store);

        cache
            .set("list_orders", &json!({"user": 3, "page": 1}), &vec![1, 2, 3], None)
            .await;

        let later_page: Option<Vec<i32>> =
            cache.get("list_orders", &json!({"user": 3, "page": 7})).await;
        assert_eq!(later_page, Some(vec![1, 2, 3]));
        assert_eq!(
            cache.derive_key("list_orders", &json!({"page": 2, "user": 3})),
            cache.derive_key("list_orders", &json!({"user": 3}))
        );
    }

    #[tokio::test]
    async fn test_delete_leaves_local_copy_to_expire() {
        let store = MemoryStore::new();
        let local = LocalCacheConfig::default().ttl(Duration::from_millis(50));
        let cache = TieredCache::new(store.clone(), config().local(local));
        let params = json!({"id": 4});

        cache.set("user_profile", &params, &profile(4), None).await;
        assert!(cache.delete("user_profile", &params).await);

        let key = cache.derive_key("user_profile", &params);
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert_eq!(tiered(&store).get::<Profile>("user_profile", &params).await, None);

        // This process keeps serving its copy until the local TTL passes
        let served = cache.lookup::<Profile>("user_profile", &params).await;
        assert_eq!(served.tier(), Some(CacheTier::Local));
        assert_eq!(cache.local().len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get::<Profile>("user_profile", &params).await, None);
        assert!(!cache.delete("user_profile", &params).await);
    }

    #[tokio::test]
    async fn test_oversized_value_is_refused() {
        let store = MemoryStore::new();
        let cache = tiered(&store).with_size_limit(128);
        let params = json!({"id": 5});

        let big = "x".repeat(256);
        assert!(!cache.set("blob", &params, &big, None).await);
        assert_eq!(cache.get::<String>("blob", &params).await, None);
        assert!(store.is_empty());

        assert!(cache.set("blob", &params, &"small", None).await);
    }

    #[tokio::test]
    async fn test_payloads_encrypted_at_rest() {
        let store = MemoryStore::new();
        let params = json!({"id": 6});
        let plain = serde_json::to_vec(&profile(6)).unwrap();

        let encrypted = tiered(&store);
        encrypted.set("user_profile", &params, &profile(6), None).await;
        let key = encrypted.derive_key("user_profile", &params);
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_ne!(stored, plain);

        // Readable from another process with the same secret
        let reader = tiered(&store);
        assert_eq!(reader.get("user_profile", &params).await, Some(profile(6)));

        let clear = tiered(&store).with_encryption(false);
        clear.set("user_profile", &params, &profile(6), None).await;
        assert_eq!(store.get(&key).await.unwrap().unwrap(), plain);
    }

    #[tokio::test]
    async fn test_remote_outage_degrades_to_local() {
        let local = LocalCacheConfig::default().ttl(Duration::from_millis(50));
        let cache = TieredCache::new(FailingStore, config().local(local));
        let params = json!({"id": 7});

        assert!(cache.set("user_profile", &params, &profile(7), None).await);
        assert_eq!(cache.get("user_profile", &params).await, Some(profile(7)));

        let unknown = cache.lookup::<Profile>("user_profile", &json!({"id": 8})).await;
        assert!(unknown.is_unavailable());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get::<Profile>("user_profile", &params).await, None);

        assert!(!cache.delete("user_profile", &params).await);
        assert!(!cache.clear_all(true).await);
        assert!(!cache.clear_by_tags(["users"]).await);
        assert!(!cache.health_check().await);
        assert_eq!(cache.key_count().await, 0);
        assert_eq!(cache.get_stats().await, HitStats::default());
    }

    #[tokio::test]
    async fn test_batches_degrade_to_local_during_outage() {
        let cache = TieredCache::new(FailingStore, config())
            .with_encryption(false)
            .with_size_limit(16);
        let long = "y".repeat(32);

        let results = cache
            .mset(&[
                SetItem::new("greeting", json!({"lang": "en"}), "hello"),
                SetItem::new("greeting", json!({"lang": "xx"}), long.as_str()),
                SetItem::new("greeting", json!({"lang": "fr"}), "bonjour"),
            ])
            .await;
        assert_eq!(results, vec![true, false, true]);

        // The refused item forces a remote MGET, which fails
        let items: Vec<(&str, Value)> = vec![
            ("greeting", json!({"lang": "en"})),
            ("greeting", json!({"lang": "xx"})),
            ("greeting", json!({"lang": "fr"})),
        ];
        let found = cache.mget::<String>(&items).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found.get(&0).map(String::as_str), Some("hello"));
        assert_eq!(found.get(&2).map(String::as_str), Some("bonjour"));
        assert!(!found.contains_key(&1));
    }

    #[tokio::test]
    async fn test_remember_fails_open_during_outage() {
        let cache = TieredCache::new(FailingStore, config());
        let params = json!({"user": 3});
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for expected in 1..=2 {
            let total: std::result::Result<u64, Infallible> = cache
                .remember(
                    "order_total",
                    &params,
                    || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(500)
                    },
                    None,
                )
                .await;
            assert_eq!(total, Ok(500));
            assert_eq!(calls.load(Ordering::SeqCst), expected);
        }
    }

    #[tokio::test]
    async fn test_remember_computes_once_then_hits() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let params = json!({"user": 1});

        for _ in 0..3 {
            let total: std::result::Result<u64, Infallible> = cache
                .remember(
                    "order_total",
                    &params,
                    || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(1250)
                    },
                    None,
                )
                .await;
            assert_eq!(total, Ok(1250));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_does_not_cache_errors() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let params = json!({"user": 2});

        let failed: std::result::Result<u64, String> = cache
            .remember("order_total", &params, || async { Err("db down".to_string()) }, None)
            .await;
        assert_eq!(failed, Err("db down".to_string()));
        assert_eq!(cache.get::<u64>("order_total", &params).await, None);

        let retried: std::result::Result<u64, String> = cache
            .remember("order_total", &params, || async { Ok(99) }, None)
            .await;
        assert_eq!(retried, Ok(99));
    }

    #[tokio::test]
    async fn test_concurrent_misses_compute_once() {
        let store = MemoryStore::new();
        let cache = Arc::new(TieredCache::new(
            store.clone(),
            config().lock(LockConfig::default().retry(10, Duration::from_millis(10))),
        ));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                let report: std::result::Result<String, Infallible> = cache
                    .remember(
                        "daily_report",
                        &json!({"day": "2024-01-01"}),
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok("report".to_string())
                        },
                        None,
                    )
                    .await;
                report
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok("report".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remember_fails_open_when_lock_is_held() {
        let store = MemoryStore::new();
        let cache = TieredCache::new(
            store.clone(),
            config().lock(LockConfig::default().retry(2, Duration::from_millis(1))),
        );
        let params = json!({"id": 10});
        let key = cache.derive_key("slow_query", &params);

        store
            .set_ex(&cache.lock().lock_key(&key), b"someone-else", Duration::from_secs(60))
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        for _ in 0..2 {
            let value: std::result::Result<i32, Infallible> = cache
                .remember(
                    "slow_query",
                    &params,
                    || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    },
                    None,
                )
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get::<i32>("slow_query", &params).await, None);
    }

    #[tokio::test]
    async fn test_warm_overwrites() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let params = json!({"id": 11});

        cache.set("user_profile", &params, &profile(1), None).await;
        let warmed: std::result::Result<Profile, Infallible> = cache
            .warm("user_profile", &params, || async { Ok(profile(11)) }, None)
            .await;

        assert_eq!(warmed, Ok(profile(11)));
        assert_eq!(cache.get("user_profile", &params).await, Some(profile(11)));
    }

    #[tokio::test]
    async fn test_clear_by_tags() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let tagged = cache.clone().with_tags(["users"]);

        tagged.set("user_profile", &json!({"id": 1}), &profile(1), None).await;
        tagged.set("user_profile", &json!({"id": 2}), &profile(2), None).await;
        cache.set("user_profile", &json!({"id": 3}), &profile(3), None).await;

        assert!(cache.clear_by_tags(["users"]).await);

        let reader = tiered(&store);
        assert_eq!(reader.get::<Profile>("user_profile", &json!({"id": 1})).await, None);
        assert_eq!(reader.get::<Profile>("user_profile", &json!({"id": 2})).await, None);
        assert_eq!(
            reader.get("user_profile", &json!({"id": 3})).await,
            Some(profile(3))
        );

        // Local copies are not touched
        assert_eq!(
            cache.get("user_profile", &json!({"id": 1})).await,
            Some(profile(1))
        );

        // Tag set is gone too
        assert!(cache.clear_by_tags(["users"]).await);
    }

    #[tokio::test]
    async fn test_clear_by_operation_respects_versions() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let next = cache.clone().with_version("2.0");

        cache.set("list_orders", &json!({"user": 1}), &1, None).await;
        cache.set("list_orders", &json!({"user": 2}), &2, None).await;
        cache.set("user_profile", &json!({"id": 1}), &profile(1), None).await;
        next.set("list_orders", &json!({"user": 1}), &10, None).await;

        assert!(cache.clear_by_operation("list_orders", false).await);
        let reader = tiered(&store);
        assert_eq!(reader.get::<i32>("list_orders", &json!({"user": 1})).await, None);
        assert_eq!(reader.get::<i32>("list_orders", &json!({"user": 2})).await, None);
        assert_eq!(
            reader.get("user_profile", &json!({"id": 1})).await,
            Some(profile(1))
        );
        let next_reader = tiered(&store).with_version("2.0");
        assert_eq!(next_reader.get("list_orders", &json!({"user": 1})).await, Some(10));

        assert!(cache.clear_by_operation("list_orders", true).await);
        let next_reader = tiered(&store).with_version("2.0");
        assert_eq!(next_reader.get::<i32>("list_orders", &json!({"user": 1})).await, None);

        // Nothing left to match
        assert!(cache.clear_by_operation("list_orders", true).await);
    }

    #[tokio::test]
    async fn test_clears_keep_held_leases() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let params = json!({"user": 1});
        let key = cache.derive_key("list_orders", &params);

        let lease = cache.lock().lock(&key).await.unwrap();
        cache.set("list_orders", &params, &1, None).await;

        assert!(cache.clear_by_operation("list_orders", true).await);
        assert!(cache.clear_all(true).await);

        let lock_key = cache.lock().lock_key(&key);
        assert_eq!(
            store.get(&lock_key).await.unwrap(),
            Some(lease.token().as_bytes().to_vec())
        );
        assert_eq!(tiered(&store).get::<i32>("list_orders", &params).await, None);
        assert!(lease.release().await);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_with_tags() {
        let store = MemoryStore::new();
        let cache = tiered(&store).with_tags(["forever"]);
        let params = json!({"id": 9});

        assert!(cache.set("user_profile", &params, &profile(9), Some(Duration::MAX)).await);
        assert_eq!(
            tiered(&store).get("user_profile", &params).await,
            Some(profile(9))
        );
        assert!(cache.clear_by_tags(["forever"]).await);
        assert_eq!(tiered(&store).get::<Profile>("user_profile", &params).await, None);
    }

    #[tokio::test]
    async fn test_clear_all_current_version() {
        let store = MemoryStore::new();
        let cache = tiered(&store);
        let next = cache.clone().with_version("2.0");

        cache.set("user_profile", &json!({"id": 1}), &profile(1), None).await;
        next.set("user_profile", &json!({"id": 1}), &profile(2), None).await;

        assert!(cache.clear_all(false).await);
        assert!(cache.local().is_empty());
        assert_eq!(cache.get::<Profile>("user_profile", &json!({"id": 1})).await, None);
        assert_eq!(
            next.get("user_profile", &json!({"id": 1})).await,
            Some(profile(2))
        );

        assert!(cache.clear_all(true).await);
        assert_eq!(next.get::<Profile>("user_profile", &json!({"id": 1})).await, None);
    }

    #[tokio::test]
    async fn test_mset_and_mget() {
        let store = MemoryStore::new();
        let cache = tiered(&store).with_encryption(false).with_size_limit(16);
        let long = "y".repeat(32);

        let results = cache
            .mset(&[
                SetItem::new("greeting", json!({"lang": "en"}), "hello"),
                SetItem::new("greeting", json!({"lang": "xx"}), long.as_str()),
                SetItem::new("greeting", json!({"lang": "fr"}), "bonjour").ttl(Duration::from_secs(60)),
            ])
            .await;
        assert_eq!(results, vec![true, false, true]);

        // Fresh local tier so the remote MGET path is taken
        let reader = tiered(&store).with_encryption(false);
        let items: Vec<(&str, Value)> = vec![
            ("greeting", json!({"lang": "en"})),
            ("greeting", json!({"lang": "xx"})),
            ("greeting", json!({"lang": "fr"})),
        ];
        let found = reader.mget::<String>(&items).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found.get(&0).map(String::as_str), Some("hello"));
        assert_eq!(found.get(&2).map(String::as_str), Some("bonjour"));
        assert!(!found.contains_key(&1));

        // Now served locally
        let again = reader.mget::<String>(&items).await;
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_count_remember_hits_and_misses() {
        let store = MemoryStore::new();
        let cache = tiered(&store).with_stats_enabled(true);
        let params = json!({"id": 12});

        for _ in 0..2 {
            let _: std::result::Result<i32, Infallible> = cache
                .remember("counter", &params, || async { Ok(1) }, None)
                .await;
        }

        let stats = cache.get_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.today_hits, 1);
        assert_eq!(stats.today_misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[tokio::test]
    async fn test_stats_disabled_by_default() {
        let store = MemoryStore::new();
        let cache = tiered(&store);

        let _: std::result::Result<i32, Infallible> = cache
            .remember("counter", &json!({}), || async { Ok(1) }, None)
            .await;
        assert_eq!(cache.get_stats().await.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_health_and_key_count() {
        let store = MemoryStore::new();
        let cache = tiered(&store);

        assert!(cache.health_check().await);
        cache.set("a", &json!({}), &1, None).await;
        cache.set("b", &json!({}), &2, None).await;
        assert_eq!(cache.key_count().await, 2);
    }

    #[tokio::test]
    async fn test_custom_sanitizer_changes_keys() {
        let store = MemoryStore::new();
        let strict = tiered(&store);
        let raw = tiered(&store).with_sanitizer(tiercache_core::PassthroughSanitizer);
        let params = json!({"q": "<script>alert(1)</script>"});

        assert_ne!(
            strict.derive_key("search", &params),
            raw.derive_key("search", &params)
        );
        assert_eq!(
            strict.derive_key("search", &json!({"q": "plain"})),
            raw.derive_key("search", &json!({"q": "plain"}))
        );
    }
}
