//! 配置模块集成测试
//!
//! 测试从配置文件加载熔断器配置

#![cfg(feature = "config-file")]

use breakeron::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
use std::io::Write;
use std::time::Duration;
use tempfile::Builder;

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_yaml_file() {
    let file = write_config(
        ".yaml",
        r#"
sleep_window: 15s
open:
  refresh_interval: 2m
  error_threshold_percent: 20
  request_volume_threshold: 1000
close:
  recovery_interval: 30s
  success_threshold_percent: 80
  success_volume_threshold: 50
"#,
    );

    let config = BreakerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.sleep_window, Duration::from_secs(15));
    assert_eq!(config.open.refresh_interval, Duration::from_secs(120));
    assert_eq!(config.close.recovery_interval, Duration::from_secs(30));

    let thresholds = config.thresholds();
    assert_eq!(thresholds.error_volume, 200);
    assert_eq!(thresholds.success_volume, 40);
}

#[test]
fn test_load_toml_file() {
    let file = write_config(
        ".toml",
        r#"
sleep_window = "1h"

[open]
error_threshold_percent = 50
request_volume_threshold = 40

[close]
recovery_interval = "1d"
"#,
    );

    let config = BreakerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.sleep_window, Duration::from_secs(3600));
    assert_eq!(config.close.recovery_interval, Duration::from_secs(86_400));
    assert_eq!(config.thresholds().error_volume, 20);
    // 未指定的字段使用默认值
    assert_eq!(config.close.success_volume_threshold, 100);
}

#[test]
fn test_load_json_file() {
    let file = write_config(
        ".json",
        r#"{"sleep_window": "250ms", "close": {"success_threshold_percent": 50}}"#,
    );

    let config = BreakerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.sleep_window, Duration::from_millis(250));
    assert_eq!(config.thresholds().success_volume, 50);
    assert_eq!(config.open.request_volume_threshold, 1000);
}

#[test]
fn test_unsupported_extension() {
    let file = write_config(".ini", "sleep_window=15s");
    let result = BreakerConfig::from_file(file.path());
    assert!(matches!(result, Err(BreakerError::ConfigError(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = BreakerConfig::from_file(dir.path().join("missing.yaml"));
    assert!(matches!(result, Err(BreakerError::IoError(_))));
}

#[test]
fn test_malformed_yaml_file() {
    let file = write_config(".yml", "open: [not, a, map]");
    let result = BreakerConfig::from_file(file.path());
    assert!(matches!(result, Err(BreakerError::YamlError(_))));
}

/// 测试超出范围的百分比在创建熔断器时被截断
#[tokio::test(start_paused = true)]
async fn test_breaker_from_file_clamps_percent() {
    let file = write_config(
        ".yaml",
        r#"
open:
  error_threshold_percent: 1
  request_volume_threshold: 100
close:
  success_threshold_percent: 200
  success_volume_threshold: 10
"#,
    );

    let config = BreakerConfig::from_file(file.path()).unwrap();
    let breaker = CircuitBreaker::new(config).unwrap();
    assert_eq!(breaker.config().open.error_threshold_percent, 5);
    assert_eq!(breaker.config().close.success_threshold_percent, 100);
    assert_eq!(breaker.thresholds().error_volume, 5);
    assert_eq!(breaker.thresholds().success_volume, 10);

    breaker.report_request(100).unwrap();
    breaker.report_error(5).unwrap();
    assert_eq!(breaker.current_status(), BreakerState::Open);
}

#[tokio::test]
async fn test_breaker_from_file_rejects_zero_window() {
    let file = write_config(".toml", "sleep_window = \"0s\"\n");
    let result = BreakerConfig::from_file(file.path());
    // 零时长在解析阶段或创建阶段被拒绝
    let rejected = match result {
        Err(_) => true,
        Ok(config) => matches!(
            CircuitBreaker::new(config),
            Err(BreakerError::ConfigError(_))
        ),
    };
    assert!(rejected);
}
