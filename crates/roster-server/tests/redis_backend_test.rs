//! Backend wiring against a live Redis
//!
//! Run with `REDIS_URL` pointing at a disposable server and `--ignored`.

use std::path::PathBuf;
use std::time::Duration;

use roster_cache::CacheProjector;
use roster_server::model::config::{Cli, Configuration};
use roster_server::startup::build_services;

fn memory_mode() -> Configuration {
    let shipped = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../conf/application.yml");
    Configuration::load(Cli {
        config: Some(shipped),
        mode: Some("memory".to_string()),
        redis_url: std::env::var("REDIS_URL").ok(),
        ..Cli::default()
    })
    .unwrap()
}

#[tokio::test]
#[ignore = "requires running redis"]
async fn test_build_services_in_memory_mode() {
    let configuration = memory_mode();

    let services = build_services(&configuration).await.unwrap();

    assert_eq!(
        services.coordination.keys().prefix(),
        configuration.redis_config().key_prefix
    );
}

#[tokio::test]
#[ignore = "requires running redis"]
async fn test_blocking_read_does_not_stall_projection_connection() {
    let services = build_services(&memory_mode()).await.unwrap();
    let coordination = services.coordination;

    let mut bus_conn = coordination.dedicated_connection().await.unwrap();
    let stream = format!("roster-test-idle-{}", std::process::id());
    let idle_read = tokio::spawn(async move {
        let _: redis::RedisResult<redis::Value> = redis::cmd("XREAD")
            .arg("BLOCK")
            .arg(3000)
            .arg("STREAMS")
            .arg(&stream)
            .arg("$")
            .query_async(&mut bus_conn)
            .await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(1), coordination.health_check())
        .await
        .expect("coordination connection waited behind a blocking read")
        .unwrap();

    idle_read.abort();
}
