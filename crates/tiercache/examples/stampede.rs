//! Many concurrent callers, one computation

use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiercache::prelude::*;

#[tokio::main]
async fn main() {
    let config = TieredCacheConfig::default()
        .lock(LockConfig::default().retry(10, Duration::from_millis(20)));
    let cache = Arc::new(TieredCache::new(MemoryStore::new(), config).with_stats_enabled(true));
    let computations = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for caller in 0..16 {
        let cache = Arc::clone(&cache);
        let computations = Arc::clone(&computations);
        handles.push(tokio::spawn(async move {
            let report: std::result::Result<String, std::convert::Infallible> = cache
                .remember(
                    "daily_report",
                    &json!({"day": "2024-06-01"}),
                    || async move {
                        computations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok("42 orders".to_string())
                    },
                    None,
                )
                .await;
            (caller, report)
        }));
    }

    for handle in handles {
        if let Ok((caller, report)) = handle.await {
            println!("caller {caller:>2}: {report:?}");
        }
    }

    println!(
        "\nComputed {} time(s) for 16 callers",
        computations.load(Ordering::SeqCst)
    );

    let stats = cache.get_stats().await;
    println!(
        "Stats: {} hits, {} misses, hit rate {:.2}%",
        stats.hits, stats.misses, stats.hit_rate
    );
}
