use std::sync::Arc;

use lnk_lookup::instance_id;
use lnk_lookup::MemoryStore;

use crate::commons::consumer;
use crate::commons::provider;
use crate::commons::registry;

/// A provider registered through one registry is found by another one
/// sharing the same store.
#[tokio::test]
async fn test_registered_provider_is_discovered_by_consumer() {
    let store = Arc::new(MemoryStore::new());
    let provider_side = registry(&store);
    let consumer_side = registry(&store);

    let p = provider("10.0.0.1", 9000).with_metadata("weight", "3");
    provider_side.register(&p).await.unwrap();

    let found = consumer_side.discover_service(&consumer()).await.unwrap();
    assert_eq!(found, vec![p.clone()]);
    assert_eq!(found[0].metadata_value("weight"), Some("3"));
    assert!(!consumer_side.is_service_polling("g1"));

    provider_side.unregister(&p).await.unwrap();
    assert!(store.instance(&instance_id(&p)).is_none());

    provider_side.shutdown().await;
    consumer_side.shutdown().await;
}

#[tokio::test]
async fn test_discovery_of_empty_group_returns_nothing() {
    let store = Arc::new(MemoryStore::new());
    let consumer_side = registry(&store);

    assert!(consumer_side.discover_service(&consumer()).await.unwrap().is_empty());
    // Nothing cached, so the next lookup asks the store again
    assert!(consumer_side.discover_service(&consumer()).await.unwrap().is_empty());
    assert_eq!(store.instance_fetch_count("lnk_g1"), 2);

    consumer_side.shutdown().await;
}
