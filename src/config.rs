//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配置模块
//!
//! 定义熔断器的打开条件、关闭条件和休眠窗口配置，负责配置校验与阈值预计算。
//!
//! 时长字段在配置文件中使用可读字符串表示，例如 `500ms`、`15s`、`3m`、`2h`、`1d`。

use crate::constants::{
    DEFAULT_ERROR_THRESHOLD_PERCENT, DEFAULT_RECOVERY_INTERVAL_SECS,
    DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_REQUEST_VOLUME_THRESHOLD, DEFAULT_SLEEP_WINDOW_SECS,
    DEFAULT_SUCCESS_THRESHOLD_PERCENT, DEFAULT_SUCCESS_VOLUME_THRESHOLD, MAX_THRESHOLD_PERCENT,
    MIN_THRESHOLD_PERCENT,
};
use crate::error::{BreakerError, Transition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// 状态变更回调
///
/// 每个熔断器的回调在同一个后台任务中依次执行，不会阻塞触发状态变更的上报调用。
/// 执行顺序即状态变更的提交顺序；需要与其他事件对齐时以 [`Transition::at`] 为准。
pub type TransitionCallback = Arc<dyn Fn(Transition) + Send + Sync>;

/// 熔断器打开条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenConfig {
    /// 统计周期，关闭状态下每个周期重置一次计数
    #[serde(with = "duration_str")]
    pub refresh_interval: Duration,
    /// 错误百分比阈值，取值范围 [5, 100]
    pub error_threshold_percent: u8,
    /// 请求量下限，与错误百分比同时满足才会熔断
    pub request_volume_threshold: u64,
}

impl Default for OpenConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            error_threshold_percent: DEFAULT_ERROR_THRESHOLD_PERCENT,
            request_volume_threshold: DEFAULT_REQUEST_VOLUME_THRESHOLD,
        }
    }
}

/// 熔断器关闭条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloseConfig {
    /// 恢复周期，半开状态下整个周期内无错误即恢复
    #[serde(with = "duration_str")]
    pub recovery_interval: Duration,
    /// 成功百分比阈值，取值范围 [5, 100]
    pub success_threshold_percent: u8,
    /// 半开状态下的探测请求量下限
    pub success_volume_threshold: u64,
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            recovery_interval: Duration::from_secs(DEFAULT_RECOVERY_INTERVAL_SECS),
            success_threshold_percent: DEFAULT_SUCCESS_THRESHOLD_PERCENT,
            success_volume_threshold: DEFAULT_SUCCESS_VOLUME_THRESHOLD,
        }
    }
}

/// 熔断器配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// 打开条件
    pub open: OpenConfig,
    /// 关闭条件
    pub close: CloseConfig,
    /// 打开状态持续多久后进入半开状态
    #[serde(with = "duration_str")]
    pub sleep_window: Duration,
    /// 状态变更回调
    #[serde(skip)]
    pub on_transition: Option<TransitionCallback>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            open: OpenConfig::default(),
            close: CloseConfig::default(),
            sleep_window: Duration::from_secs(DEFAULT_SLEEP_WINDOW_SECS),
            on_transition: None,
        }
    }
}

impl fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("open", &self.open)
            .field("close", &self.close)
            .field("sleep_window", &self.sleep_window)
            .field("on_transition", &self.on_transition.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// 预计算阈值
///
/// 构造时计算一次，上报路径上直接与计数比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// 错误量阈值 = 请求量下限 × 错误百分比
    pub error_volume: u64,
    /// 成功量阈值 = 探测量下限 × 成功百分比
    pub success_volume: u64,
}

impl BreakerConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置统计周期
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.open.refresh_interval = interval;
        self
    }

    /// 设置错误百分比阈值
    pub fn error_threshold_percent(mut self, percent: u8) -> Self {
        self.open.error_threshold_percent = percent;
        self
    }

    /// 设置请求量下限
    pub fn request_volume_threshold(mut self, volume: u64) -> Self {
        self.open.request_volume_threshold = volume;
        self
    }

    /// 设置休眠窗口
    pub fn sleep_window(mut self, window: Duration) -> Self {
        self.sleep_window = window;
        self
    }

    /// 设置恢复周期
    pub fn recovery_interval(mut self, interval: Duration) -> Self {
        self.close.recovery_interval = interval;
        self
    }

    /// 设置成功百分比阈值
    pub fn success_threshold_percent(mut self, percent: u8) -> Self {
        self.close.success_threshold_percent = percent;
        self
    }

    /// 设置探测量下限
    pub fn success_volume_threshold(mut self, volume: u64) -> Self {
        self.close.success_volume_threshold = volume;
        self
    }

    /// 设置状态变更回调
    pub fn on_transition<F>(mut self, callback: F) -> Self
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(callback));
        self
    }

    /// 校验配置
    ///
    /// 百分比越界时截断到 [5, 100]，时长为零时返回错误。
    pub fn validated(mut self) -> Result<Self, BreakerError> {
        Self::ensure_positive("refresh_interval", self.open.refresh_interval)?;
        Self::ensure_positive("sleep_window", self.sleep_window)?;
        Self::ensure_positive("recovery_interval", self.close.recovery_interval)?;

        self.open.error_threshold_percent =
            clamp_percent("error_threshold_percent", self.open.error_threshold_percent);
        self.close.success_threshold_percent =
            clamp_percent("success_threshold_percent", self.close.success_threshold_percent);

        Ok(self)
    }

    /// 计算阈值
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            error_volume: percent_of(
                self.open.request_volume_threshold,
                self.open.error_threshold_percent,
            ),
            success_volume: percent_of(
                self.close.success_volume_threshold,
                self.close.success_threshold_percent,
            ),
        }
    }

    fn ensure_positive(name: &str, value: Duration) -> Result<(), BreakerError> {
        if value.is_zero() {
            return Err(BreakerError::ConfigError(format!("{} 必须大于0", name)));
        }
        Ok(())
    }
}

fn clamp_percent(name: &str, value: u8) -> u8 {
    let clamped = value.clamp(MIN_THRESHOLD_PERCENT, MAX_THRESHOLD_PERCENT);
    if clamped != value {
        warn!(
            "{} 超出范围 [{}, {}]: {} -> {}",
            name, MIN_THRESHOLD_PERCENT, MAX_THRESHOLD_PERCENT, value, clamped
        );
    }
    clamped
}

/// volume × percent / 100，至少为1
fn percent_of(volume: u64, percent: u8) -> u64 {
    let scaled = u128::from(volume) * u128::from(percent) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX).max(1)
}

#[cfg(feature = "config-file")]
impl BreakerConfig {
    /// 从YAML字符串加载配置
    pub fn from_yaml_str(content: &str) -> Result<Self, BreakerError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml_str(content: &str) -> Result<Self, BreakerError> {
        Ok(toml::from_str(content)?)
    }

    /// 从配置文件加载配置
    ///
    /// 根据扩展名选择格式：`yaml`/`yml`、`toml`、`json`。
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, BreakerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&content),
            "toml" => Self::from_toml_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(BreakerError::ConfigError(format!(
                "不支持的配置文件格式: {:?}。支持的格式: yaml, yml, toml, json",
                other
            ))),
        }
    }
}

impl BreakerConfig {
    /// 从JSON字符串加载配置
    pub fn from_json_str(content: &str) -> Result<Self, BreakerError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// 解析时长字符串
///
/// 支持的格式：
/// - `500ms` - 500毫秒
/// - `10s` - 10秒
/// - `5m` - 5分钟
/// - `2h` - 2小时
/// - `1d` - 1天
///
/// # 示例
///
/// ```rust
/// use breakeron::config::parse_duration;
/// use std::time::Duration;
///
/// let duration = parse_duration("5m").unwrap();
/// assert_eq!(duration, Duration::from_secs(300));
/// ```
pub fn parse_duration(value: &str) -> Result<Duration, BreakerError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BreakerError::ConfigError("时长不能为空".to_string()));
    }

    let (num_part, unit_part) =
        value.split_at(value.find(|c: char| c.is_alphabetic()).unwrap_or(value.len()));

    let num_str = num_part.trim();
    let unit = unit_part.trim().to_lowercase();

    if num_str.is_empty() {
        return Err(BreakerError::ConfigError(
            "时长格式错误：缺少数字部分".to_string(),
        ));
    }

    let num: u64 = num_str
        .parse()
        .map_err(|_| BreakerError::ConfigError(format!("无效的数字格式: {}", num_str)))?;

    if num == 0 {
        return Err(BreakerError::ConfigError("时长必须大于0".to_string()));
    }

    let secs = |factor: u64| {
        num.checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| BreakerError::ConfigError(format!("时长溢出: {}", value)))
    };

    match unit.as_str() {
        "ms" | "millis" | "milliseconds" => Ok(Duration::from_millis(num)),
        "" | "s" | "sec" | "second" | "seconds" => secs(1),
        "m" | "min" | "minute" | "minutes" => secs(60),
        "h" | "hr" | "hour" | "hours" => secs(3600),
        "d" | "day" | "days" => secs(86400),
        _ => Err(BreakerError::ConfigError(format!(
            "不支持的单位: {}。支持的单位: ms, s, m, h, d",
            unit
        ))),
    }
}

/// 将时长格式化为最大的整单位字符串
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let secs = duration.as_secs();
    match secs {
        0 => "0s".to_string(),
        s if s % 86400 == 0 => format!("{}d", s / 86400),
        s if s % 3600 == 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

mod duration_str {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
