//! Basic example demonstrating tiercache with the in-process store

use serde_json::json;
use std::time::Duration;
use tiercache::prelude::*;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[tokio::main]
async fn main() {
    println!("=== tiercache Basic Example ===\n");

    let config = TieredCacheConfig::new(CacheConfig::for_app("Demo Shop", "dev"))
        .local(LocalCacheConfig::with_capacity(500).ttl(Duration::from_secs(60)));
    let cache = TieredCache::new(MemoryStore::new(), config);

    let user = User {
        id: 123,
        name: "Alice".to_string(),
        email: "alice@example.com".to_string(),
    };
    let params = json!({"id": 123});

    // Tagged writes go through a scoped handle
    println!("Storing user in cache...");
    let users = cache.clone().with_tags(["users"]);
    users
        .set("user_profile", &params, &user, Some(Duration::from_secs(300)))
        .await;

    println!("Key: {}", cache.derive_key("user_profile", &params));

    match cache.lookup::<User>("user_profile", &params).await {
        CacheResult::Hit { value, tier } => {
            println!("✅ Cache HIT from {tier:?}: {} <{}>", value.name, value.email);
        }
        CacheResult::Miss => println!("❌ Cache MISS"),
        CacheResult::Unavailable => println!("⚠️ Remote tier unavailable"),
    }

    // Pages past the first share the first page's entry
    cache
        .set("list_users", &json!({"active": true, "page": 1}), &vec![123], None)
        .await;
    let page_four: Option<Vec<u64>> = cache
        .get("list_users", &json!({"active": true, "page": 4}))
        .await;
    println!("\nPage 4 served from page 1 entry: {page_four:?}");

    // Compute on miss
    let total: std::result::Result<u64, std::convert::Infallible> = cache
        .remember(
            "order_total",
            &json!({"user": 123}),
            || async {
                println!("   computing order total...");
                Ok(1250)
            },
            None,
        )
        .await;
    println!("Order total: {total:?}");

    println!("\nInvalidating tag 'users'...");
    cache.clear_by_tags(["users"]).await;
    println!(
        "   User after invalidation: {:?}",
        cache.get::<User>("user_profile", &params).await
    );

    println!("\nRemote keys under prefix: {}", cache.key_count().await);
    println!("Remote healthy: {}", cache.health_check().await);

    println!("\n=== Example Complete ===");
}
