//! Configuration load/save tests
//!
//! Run with: cargo test --test config_test

use crabscan::config::{CrabScanConfig, DEFAULT_SUBJECT};
use crabscan::errors::ConfigError;
use crabscan::session::ScanController;
use crabscan::testing::{MockCamera, RecordingDispatcher, StaticDecoder};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("crabscan.toml");

        let mut config = CrabScanConfig::default();
        config.scanner.frames_per_second = 10;
        config.notification.default_recipient = "office@school.example".to_string();
        config.notification.auth_token_env = Some("CRABSCAN_TOKEN".to_string());
        config.feedback.enabled = false;

        config.save_to_file(&path).unwrap();
        let loaded = CrabScanConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crabscan.toml");
        fs::write(&path, "[scanner\nframes_per_second = ").unwrap();

        let err = CrabScanConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_layered_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crabscan.toml");
        fs::write(&path, "[feedback]\nvibrate_ms = 60000\n").unwrap();

        let err = CrabScanConfig::load_layered(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_layered_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crabscan.toml");
        fs::write(
            &path,
            r#"
[scanner]
frames_per_second = 5

[notification]
default_recipient = "office@school.example"
default_subject = "From file"
"#,
        )
        .unwrap();

        std::env::set_var("CRABSCAN_NOTIFICATION__DEFAULT_SUBJECT", "Arrived");
        let loaded = CrabScanConfig::load_layered(&path);
        std::env::remove_var("CRABSCAN_NOTIFICATION__DEFAULT_SUBJECT");
        let loaded = loaded.unwrap();

        assert_eq!(loaded.scanner.frames_per_second, 5);
        assert_eq!(loaded.notification.default_recipient, "office@school.example");
        assert_eq!(loaded.notification.default_subject, "Arrived");
        assert_eq!(loaded.feedback, CrabScanConfig::default().feedback);
    }

    #[test]
    fn test_layered_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let loaded = CrabScanConfig::load_layered(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.scanner, CrabScanConfig::default().scanner);
        assert_eq!(loaded.feedback, CrabScanConfig::default().feedback);
    }

    #[tokio::test]
    async fn test_controller_uses_configured_notification() {
        let mut config = CrabScanConfig::default();
        config.notification.default_recipient = "office@school.example".to_string();
        config.notification.body_template = "{payload} arrived at {timestamp}".to_string();

        let camera = Arc::new(MockCamera::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let controller = ScanController::from_config(
            &config,
            camera.clone(),
            Arc::new(StaticDecoder::new()),
            dispatcher.clone(),
        );

        controller
            .start("0", config.scanner.clone())
            .await
            .unwrap();
        camera.emit_decoded("STUDENT-5");
        assert!(dispatcher.wait_for(1, std::time::Duration::from_secs(2)).await);

        let request = &dispatcher.requests()[0];
        assert_eq!(request.recipient, "office@school.example");
        assert_eq!(request.subject, DEFAULT_SUBJECT);
        assert!(request.body.starts_with("STUDENT-5 arrived at "));
    }
}
