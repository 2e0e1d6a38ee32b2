use std::sync::Arc;

use lnk_lookup::MemoryStore;

use crate::commons::consumer;
use crate::commons::eventually;
use crate::commons::provider;
use crate::commons::registry;
use crate::commons::AddressLog;

#[tokio::test]
async fn test_subscriber_follows_provider_changes() {
    let store = Arc::new(MemoryStore::new());
    let provider_side = registry(&store);
    let consumer_side = registry(&store);

    let log = AddressLog::new();
    consumer_side.subscribe_service(&consumer(), log.clone()).unwrap();
    assert_eq!(consumer_side.service_poller_count(), 1);

    let p1 = provider("10.0.0.1", 9000);
    let p2 = provider("10.0.0.2", 9000);

    provider_side.register(&p1).await.unwrap();
    assert!(eventually(|| log.last() == Some(vec![p1.clone()])).await);

    provider_side.register(&p2).await.unwrap();
    assert!(eventually(|| log.last() == Some(vec![p1.clone(), p2.clone()])).await);

    provider_side.unregister(&p1).await.unwrap();
    assert!(eventually(|| log.last() == Some(vec![p2.clone()])).await);
    assert_eq!(log.len(), 3);

    provider_side.shutdown().await;
    consumer_side.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribed_listener_hears_nothing_more() {
    let store = Arc::new(MemoryStore::new());
    let provider_side = registry(&store);
    let consumer_side = registry(&store);

    let log = AddressLog::new();
    consumer_side.subscribe_service(&consumer(), log.clone()).unwrap();
    provider_side.register(&provider("10.0.0.1", 9000)).await.unwrap();
    assert!(eventually(|| log.len() == 1).await);

    assert!(consumer_side.unsubscribe_service(&consumer()));
    provider_side.register(&provider("10.0.0.2", 9000)).await.unwrap();

    // The poller keeps the cache current for lookups
    let key = consumer().cluster_key();
    assert!(eventually(|| consumer_side.cached_addresses(&key).map(|a| a.len()) == Some(2)).await);
    assert_eq!(log.len(), 1);

    provider_side.shutdown().await;
    consumer_side.shutdown().await;
}
