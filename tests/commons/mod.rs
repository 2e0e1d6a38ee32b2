use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use lnk_lookup::Address;
use lnk_lookup::CommandListener;
use lnk_lookup::HeartbeatConfig;
use lnk_lookup::LookupConfig;
use lnk_lookup::LookupRegistry;
use lnk_lookup::MemoryStore;
use lnk_lookup::NotifyConfig;
use lnk_lookup::RegistryConfig;
use lnk_lookup::ServiceListener;

pub const AUTH: &str = "io.lnk.AuthService";

// Upper bound for anything driven by a poll cycle
pub const WAIT: Duration = Duration::from_secs(3);

pub fn config() -> RegistryConfig {
    RegistryConfig {
        lookup: LookupConfig {
            interval_ms: 25,
            error_backoff_ms: 50,
        },
        notify: NotifyConfig {
            min_workers: 2,
            max_workers: 4,
            queue_capacity: 128,
            keep_alive_ms: 500,
        },
        heartbeat: HeartbeatConfig {
            interval_ms: 100,
            service_ttl_secs: 30,
            open_on_start: true,
        },
    }
}

pub fn registry(store: &Arc<MemoryStore>) -> LookupRegistry<MemoryStore> {
    LookupRegistry::new(store.clone(), config()).expect("registry starts")
}

pub fn provider(
    host: &str,
    port: u16,
) -> Address {
    Address::new(host, port, "g1", AUTH)
}

pub fn consumer() -> Address {
    Address::new("10.1.0.1", 7000, "g1", AUTH)
}

pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[derive(Default)]
pub struct AddressLog {
    lists: Mutex<Vec<Vec<Address>>>,
}

impl AddressLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.lists.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<Address>> {
        self.lists.lock().unwrap().last().cloned()
    }
}

impl ServiceListener for AddressLog {
    fn notify_service(
        &self,
        _subscriber: &Address,
        addresses: &[Address],
    ) {
        let mut sorted = addresses.to_vec();
        sorted.sort_by_key(|a| a.to_string());
        self.lists.lock().unwrap().push(sorted);
    }
}

#[derive(Default)]
pub struct CommandLog {
    commands: Mutex<Vec<String>>,
}

impl CommandLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandListener for CommandLog {
    fn notify_command(
        &self,
        _subscriber: &Address,
        _group: &str,
        command: &str,
    ) {
        self.commands.lock().unwrap().push(command.to_string());
    }
}
