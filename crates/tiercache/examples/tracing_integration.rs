use serde_json::json;
use tiercache::TracingMetrics; // Explicit import
use tiercache::prelude::*;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    // 1. Initialize tracing subscriber
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE) // Enable TRACE to see latency logs
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    println!("🔍 Initialized tracing...");

    // 2. Build the cache with TracingMetrics
    let metrics = TracingMetrics::new().with_service_name("example-service");

    let cache = TieredCache::with_serializer_and_metrics(
        MemoryStore::new(),
        JsonSerializer,
        metrics,
        TieredCacheConfig::default(),
    );

    println!("\n⚡ Setting value...");
    cache.set("user_profile", &json!({"id": 1}), "Alice", None).await;

    println!("\n⚡ Getting value (local hit)...");
    let val = cache.get::<String>("user_profile", &json!({"id": 1})).await;
    println!("   Got: {:?}", val);

    println!("\n⚡ Getting missing value (miss)...");
    let miss = cache.get::<String>("user_profile", &json!({"id": 99})).await;
    println!("   Got: {:?}", miss);

    println!("\n⚡ Computing through the lock...");
    let computed: std::result::Result<u32, std::convert::Infallible> = cache
        .remember("slow_count", &json!({}), || async { Ok(7) }, None)
        .await;
    println!("   Got: {:?}", computed);

    println!("\n✅ Check your console output for structured logs!");
}
