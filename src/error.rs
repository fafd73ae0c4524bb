//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型，以及熔断器对外暴露的状态、状态变更和统计信息。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 熔断器错误类型
#[derive(Error, Debug)]
pub enum BreakerError {
    /// 熔断器处于打开状态，请求被拒绝
    ///
    /// 这是熔断器的主要产出，而非熔断器自身的故障。调用方应快速失败或走降级逻辑。
    #[error("熔断器已打开: 错误过多，请求被拒绝")]
    TooManyErrors,

    /// 熔断器已停止运行
    #[error("熔断器已停止运行，不再接受上报")]
    ShutDown,

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 没有可用的 Tokio 运行时
    #[error("配置错误: 创建熔断器需要在 Tokio 运行时中进行")]
    RuntimeUnavailable,

    /// IO错误
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[cfg(feature = "config-file")]
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[cfg(feature = "config-file")]
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl BreakerError {
    /// 是否为熔断拒绝
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::TooManyErrors)
    }

    /// 是否为熔断器已停止
    pub fn is_shutdown(&self) -> bool {
        matches!(self, BreakerError::ShutDown)
    }
}

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerState {
    /// 关闭状态（正常）
    Closed,
    /// 打开状态（熔断）
    Open,
    /// 半开状态（探测）
    HalfOpen,
}

impl BreakerState {
    pub(crate) const CLOSED_BITS: u64 = 1;
    pub(crate) const OPEN_BITS: u64 = 2;
    pub(crate) const HALF_OPEN_BITS: u64 = 3;

    pub(crate) fn to_bits(self) -> u64 {
        match self {
            BreakerState::Closed => Self::CLOSED_BITS,
            BreakerState::Open => Self::OPEN_BITS,
            BreakerState::HalfOpen => Self::HALF_OPEN_BITS,
        }
    }

    /// 从状态位还原状态
    ///
    /// 状态位只能由 [`BreakerState::to_bits`] 写入，其他值属于程序缺陷。
    pub(crate) fn from_bits(bits: u64) -> Self {
        match bits {
            Self::CLOSED_BITS => BreakerState::Closed,
            Self::OPEN_BITS => BreakerState::Open,
            Self::HALF_OPEN_BITS => BreakerState::HalfOpen,
            other => unreachable!("未知的熔断器状态: {}", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "Closed",
            BreakerState::Open => "Open",
            BreakerState::HalfOpen => "HalfOpen",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态变更事件，传递给状态变更回调
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// 变更前状态
    pub from: BreakerState,
    /// 变更后状态
    pub to: BreakerState,
    /// 变更时间
    pub at: DateTime<Utc>,
}

/// 熔断器统计信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStats {
    /// 当前状态
    pub state: BreakerState,
    /// 当前统计窗口内的请求数
    pub request_volume: u64,
    /// 当前统计窗口内的失败数
    pub error_volume: u64,
    /// 当前统计窗口内的成功数
    pub success_volume: u64,
    /// 当前统计窗口开始时间
    pub window_started_at: DateTime<Utc>,
    /// 最近一次进入打开状态的时间
    pub opened_at: Option<DateTime<Utc>>,
    /// 是否已停止运行
    pub shut_down: bool,
}
