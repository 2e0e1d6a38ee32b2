// -
// Store naming

/// Prefix turning a service group into the store's logical service name
pub const SERVICE_NAME_PREFIX: &str = "lnk_";

/// Tag prefix carrying the full address URI of an instance
pub const ADDRESS_TAG_PREFIX: &str = "address_";

/// URI scheme used when encoding an address into a tag
pub(crate) const ADDRESS_URI_SCHEME: &str = "lnk";

/// Query key holding the service group inside an address URI
pub(crate) const GROUP_QUERY_KEY: &str = "group";

// -
// Timing defaults

pub(crate) const DEFAULT_LOOKUP_INTERVAL_MS: u64 = 30_000;
pub(crate) const DEFAULT_ERROR_BACKOFF_MS: u64 = 2_000;

pub(crate) const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 3_000;
pub(crate) const DEFAULT_SERVICE_TTL_SECS: u64 = 30;

pub(crate) const DEFAULT_NOTIFY_MIN_WORKERS: usize = 10;
pub(crate) const DEFAULT_NOTIFY_MAX_WORKERS: usize = 30;
pub(crate) const DEFAULT_NOTIFY_QUEUE_CAPACITY: usize = 20_000;
pub(crate) const DEFAULT_NOTIFY_KEEP_ALIVE_MS: u64 = 30_000;
