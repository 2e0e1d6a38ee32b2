use std::time::Duration;

use ::config::ConfigError;

use super::*;

#[test]
fn test_unsupported_operation_message() {
    let err = Error::UnsupportedOperation("unavailable by address".to_string());
    assert_eq!(err.to_string(), "Unsupported operation: unavailable by address");
}

#[test]
fn test_store_error_timeout() {
    let err: Error = StoreError::Timeout(Duration::from_secs(5)).into();
    let msg = err.to_string();
    assert!(msg.contains("5s"));
    assert!(matches!(err, Error::Store(StoreError::Timeout(_))));
}

#[test]
fn test_store_error_rejected() {
    let err = StoreError::Rejected {
        id: "10.0.0.1:9000-Auth".to_string(),
        reason: "ttl too small".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("10.0.0.1:9000-Auth"));
    assert!(msg.contains("ttl too small"));
}

#[test]
fn test_convert_error_missing_tag() {
    let err = ConvertError::MissingAddressTag { id: "i-1".to_string() };
    assert_eq!(err.to_string(), "instance i-1 has no address tag");
}

#[test]
fn test_dispatch_error_queue_full() {
    let err: Error = DispatchError::QueueFull { capacity: 8 }.into();
    assert!(err.to_string().contains("capacity 8"));
}

#[test]
fn test_config_error_is_transparent() {
    let err: Error = ConfigError::Message("bad key".to_string()).into();
    assert_eq!(err.to_string(), "bad key");
}
