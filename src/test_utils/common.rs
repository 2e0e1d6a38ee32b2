use std::time::Duration;

use crate::Address;
use crate::HeartbeatConfig;
use crate::InstanceDescriptor;
use crate::LookupConfig;
use crate::NotifyConfig;
use crate::RegistryConfig;

pub(crate) const AUTH: &str = "io.lnk.AuthService";
pub(crate) const USER: &str = "io.lnk.UserService";

pub(crate) fn addr(
    host: &str,
    port: u16,
    group: &str,
    interface: &str,
) -> Address {
    Address::new(host, port, group, interface)
}

pub(crate) fn descriptor(address: &Address) -> InstanceDescriptor {
    InstanceDescriptor::from_address(address, Duration::from_secs(30)).expect("valid address")
}

/// Config with millisecond-scale loops so pollers cycle quickly in tests
pub(crate) fn fast_config() -> RegistryConfig {
    RegistryConfig {
        lookup: LookupConfig {
            interval_ms: 20,
            error_backoff_ms: 30,
        },
        notify: NotifyConfig {
            min_workers: 2,
            max_workers: 4,
            queue_capacity: 64,
            keep_alive_ms: 200,
        },
        heartbeat: HeartbeatConfig {
            interval_ms: 50,
            service_ttl_secs: 30,
            open_on_start: true,
        },
    }
}

/// Polls `condition` every 5ms until it holds or `timeout` elapses
pub(crate) async fn eventually<F>(
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
