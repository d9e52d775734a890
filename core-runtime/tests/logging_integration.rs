//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{redact_if_sensitive, redact_url, LogFormat, LoggingConfig};

#[test]
fn test_logging_config_chaining() {
    // Only one global subscriber per process, so exercise the builder only.
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}

#[test]
fn test_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("auth_token", "abc.def"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
}

#[test]
fn test_presigned_url_loses_query() {
    let url = "https://bucket.s3.amazonaws.com/uploads/a.mkv?X-Amz-Credential=x&X-Amz-Signature=y";
    let redacted = redact_if_sensitive("upload_url", url);

    assert_eq!(redacted, "https://bucket.s3.amazonaws.com/uploads/a.mkv?[REDACTED]");
    assert!(!redacted.contains("Signature"));
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(redact_if_sensitive("file_id", "42"), "42");
    assert_eq!(redact_if_sensitive("filename", "movie.mkv"), "movie.mkv");
    assert_eq!(redact_url("https://host/api/jobs/1/"), "https://host/api/jobs/1/");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_filter_configuration() {
    let config = LoggingConfig::default().with_filter("core_upload=debug,core_sync=trace");

    assert_eq!(
        config.filter.as_deref(),
        Some("core_upload=debug,core_sync=trace")
    );
}
