use std::sync::Arc;

use lnk_lookup::MemoryStore;

use crate::commons::consumer;
use crate::commons::eventually;
use crate::commons::registry;
use crate::commons::CommandLog;

#[tokio::test]
async fn test_published_command_reaches_subscribers() {
    let store = Arc::new(MemoryStore::new());
    let consumer_side = registry(&store);

    let log = CommandLog::new();
    consumer_side.subscribe_command(&consumer(), log.clone()).unwrap();
    assert!(eventually(|| log.commands() == vec![String::new()]).await);

    store.set_command("g1", "route:g1->g2");
    assert!(eventually(|| log.commands().len() == 2).await);
    assert_eq!(log.commands()[1], "route:g1->g2");

    assert_eq!(
        consumer_side.discover_command(&consumer()).await.unwrap(),
        "route:g1->g2"
    );
    assert_eq!(log.commands().len(), 2);

    consumer_side.shutdown().await;
}

#[tokio::test]
async fn test_command_lookup_without_subscription() {
    let store = Arc::new(MemoryStore::new());
    store.set_command("g1", "weight:10.0.0.1=0");
    let consumer_side = registry(&store);

    assert_eq!(
        consumer_side.discover_command(&consumer()).await.unwrap(),
        "weight:10.0.0.1=0"
    );
    assert_eq!(consumer_side.command_poller_count(), 0);
    assert_eq!(consumer_side.cached_command("g1"), Some("weight:10.0.0.1=0".to_string()));

    consumer_side.shutdown().await;
}
