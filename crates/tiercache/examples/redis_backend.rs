use serde_json::json;
use std::time::Duration;
use tiercache::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    println!("Connecting to Redis at {}", redis_url);

    let config = RedisConfig::new(redis_url).pool(
        PoolConfig::default()
            .size(1, 5)
            .connection_timeout(Duration::from_secs(2)),
    );

    let store = match RedisStore::new(config).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to connect to Redis: {}", e);
            println!("Make sure Redis is running at 127.0.0.1:6379 or set REDIS_URL");
            return Ok(());
        }
    };

    let cache = TieredCache::new(
        store.clone(),
        TieredCacheConfig::new(CacheConfig::for_app("example", "dev").app_key("s3cret")),
    );

    let params = json!({"greeting": "hello"});
    cache
        .set("greet", &params, &"world", Some(Duration::from_secs(300)))
        .await;

    match cache.lookup::<String>("greet", &params).await {
        CacheResult::Hit { value, tier } => println!("Hit from {tier:?}: {value}"),
        CacheResult::Miss => println!("Miss"),
        CacheResult::Unavailable => println!("Redis unavailable"),
    }

    // Tag a couple of entries, then drop them together
    let admins = cache.clone().with_tags(["users", "admins"]);
    admins.set("user_profile", &json!({"id": 1}), &"sachin", None).await;
    admins.set("user_profile", &json!({"id": 2}), &"priya", None).await;
    println!("Cleared admins: {}", cache.clear_by_tags(["admins"]).await);

    let status = store.pool().status();
    println!(
        "Pool: {:?}, {} idle, {} checked out",
        status.state, status.idle, status.checked_out
    );

    cache.clear_all(false).await;
    store.close();
    Ok(())
}
