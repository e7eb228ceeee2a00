use std::path::PathBuf;
use std::time::Duration;

use hugin::{HuginError, Result};

#[test]
fn test_error_display() {
    let err = HuginError::ProjectNotFound("demo".to_string());
    assert!(err.to_string().contains("demo"));
}

#[test]
fn test_lock_timeout_display() {
    let err = HuginError::CacheLockTimeout {
        path: PathBuf::from("/cache/lockfile.lock"),
        timeout: Duration::from_secs(5),
    };
    let message = err.to_string();
    assert!(message.contains("lockfile.lock"));
    assert!(message.contains("5s"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HuginError::ChannelClosed)
    }
    assert!(returns_error().is_err());
}

#[test]
fn test_from_conversions() {
    let io: HuginError = std::io::Error::other("disk").into();
    assert!(matches!(io, HuginError::Io(_)));

    let json: HuginError = serde_json::from_str::<serde_json::Value>("{")
        .unwrap_err()
        .into();
    assert!(matches!(json, HuginError::Json(_)));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(HuginError::RateLimited.is_transient());
    assert!(HuginError::Http("connection reset".into()).is_transient());
    assert!(
        HuginError::Api {
            status: 500,
            message: "internal".into()
        }
        .is_transient()
    );
    assert!(
        HuginError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_transient()
    );
}

#[test]
fn permanent_errors() {
    assert!(!HuginError::AuthenticationFailed.is_transient());
    assert!(
        !HuginError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient()
    );
    assert!(!HuginError::EmptyResponse.is_transient());
    assert!(!HuginError::InvalidModelId("x".into()).is_transient());
    assert!(!HuginError::ChannelClosed.is_transient());
}
