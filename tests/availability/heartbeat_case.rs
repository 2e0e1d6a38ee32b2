use std::sync::Arc;
use std::time::Duration;

use lnk_lookup::instance_id;
use lnk_lookup::Error;
use lnk_lookup::LookupRegistry;
use lnk_lookup::MemoryStore;

use crate::commons::config;
use crate::commons::eventually;
use crate::commons::provider;

/// Closing the heartbeat switch lets the instance lapse on its TTL;
/// reopening it acknowledges again without waiting for the next tick.
#[tokio::test]
async fn test_switch_controls_store_health() {
    let store = Arc::new(MemoryStore::new());
    let mut config = config();
    config.heartbeat.service_ttl_secs = 1;
    config.heartbeat.interval_ms = 200;
    let registry = LookupRegistry::new(store.clone(), config).unwrap();

    let p = provider("10.0.0.1", 9000);
    let id = instance_id(&p);
    registry.register(&p).await.unwrap();
    assert!(store.is_passing(&id));

    registry.set_unavailable(None).unwrap();
    // Let a sweep already past the switch check finish
    tokio::time::sleep(Duration::from_millis(50)).await;
    let acks = store.ack_count(&id);
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert!(!store.is_passing(&id));
    assert_eq!(store.ack_count(&id), acks);
    assert!(registry.heartbeat().is_tracked(&id));

    registry.set_available(None).unwrap();
    assert!(eventually(|| store.is_passing(&id)).await);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_single_address_availability_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let registry = LookupRegistry::new(store, config()).unwrap();

    let result = registry.set_unavailable(Some(&provider("10.0.0.1", 9000)));
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));

    registry.shutdown().await;
}
