use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_test::traced_test;

use super::*;
use crate::store::MockStoreClient;
use crate::Address;
use crate::HeartbeatConfig;
use crate::InstanceDescriptor;
use crate::MemoryStore;
use crate::StoreClient;
use crate::StoreError;

fn open_config(interval_ms: u64) -> HeartbeatConfig {
    HeartbeatConfig {
        interval_ms,
        service_ttl_secs: 30,
        open_on_start: true,
    }
}

async fn registered(
    store: &MemoryStore,
    host: &str,
) -> String {
    let address = Address::new(host, 9000, "g1", "io.lnk.AuthService");
    let descriptor = InstanceDescriptor::from_address(&address, Duration::from_secs(30)).unwrap();
    let id = descriptor.id.clone();
    store.register_instance(descriptor).await.unwrap();
    id
}

#[tokio::test]
async fn test_sweep_acknowledges_every_tracked_id() {
    let store = Arc::new(MemoryStore::new());
    let id1 = registered(&store, "10.0.0.1").await;
    let id2 = registered(&store, "10.0.0.2").await;

    let manager = HeartbeatManager::new(store.clone(), &open_config(1000));
    manager.add_instance_id(id1.clone());
    manager.add_instance_id(id2.clone());

    assert_eq!(manager.sweep().await, 2);
    assert_eq!(store.ack_count(&id1), 1);
    assert_eq!(store.ack_count(&id2), 1);
    assert!(store.is_passing(&id1));
}

#[tokio::test]
async fn test_closed_switch_keeps_ids_but_skips_acknowledgment() {
    let store = Arc::new(MemoryStore::new());
    let id = registered(&store, "10.0.0.1").await;

    let mut config = open_config(1000);
    config.open_on_start = false;
    let manager = HeartbeatManager::new(store.clone(), &config);
    manager.add_instance_id(id.clone());

    assert_eq!(manager.sweep().await, 0);
    assert_eq!(store.ack_count(&id), 0);
    assert!(manager.is_tracked(&id));

    manager.set_open(true);
    assert_eq!(manager.sweep().await, 1);
}

#[tokio::test]
#[traced_test]
async fn test_failed_acknowledgment_does_not_stop_sweep() {
    let mut store = MockStoreClient::new();
    store
        .expect_acknowledge_health()
        .withf(|id| id.to_string() == "bad")
        .times(1)
        .returning(|id| Err(StoreError::UnknownInstance(id.to_string()).into()));
    store
        .expect_acknowledge_health()
        .withf(|id| id.to_string() == "good")
        .times(1)
        .returning(|_| Ok(()));

    let manager = HeartbeatManager::new(Arc::new(store), &open_config(1000));
    manager.add_instance_id("bad");
    manager.add_instance_id("good");

    assert_eq!(manager.sweep().await, 1);
    assert!(manager.is_tracked("bad"));
    assert!(logs_contain("heartbeat acknowledgment failed"));
}

#[tokio::test]
async fn test_remove_instance_id() {
    let manager = HeartbeatManager::new(Arc::new(MemoryStore::new()), &open_config(1000));
    manager.add_instance_id("a");
    manager.add_instance_id("b");

    assert!(manager.remove_instance_id("a"));
    assert!(!manager.remove_instance_id("a"));
    assert_eq!(manager.tracked_ids(), vec!["b".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_run_sweeps_periodically_until_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let id = registered(&store, "10.0.0.1").await;

    let manager = Arc::new(HeartbeatManager::new(store.clone(), &open_config(100)));
    manager.add_instance_id(id.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = tokio::spawn(manager.clone().run(shutdown_rx));

    // First tick fires immediately, then one per 100ms
    tokio::time::sleep(Duration::from_millis(350)).await;
    let acks = store.ack_count(&id);
    assert!(acks >= 3, "expected at least 3 acknowledgments, got {}", acks);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let after_stop = store.ack_count(&id);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.ack_count(&id), after_stop);
}

#[tokio::test(start_paused = true)]
async fn test_reopening_switch_acknowledges_without_waiting_for_tick() {
    let store = Arc::new(MemoryStore::new());
    let id = registered(&store, "10.0.0.1").await;

    let mut config = open_config(10_000);
    config.open_on_start = false;
    let manager = Arc::new(HeartbeatManager::new(store.clone(), &config));
    manager.add_instance_id(id.clone());

    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(manager.clone().run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.ack_count(&id), 0);

    manager.set_open(true);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.ack_count(&id), 1);
}
