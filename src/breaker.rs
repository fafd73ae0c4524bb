//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 熔断器实现
//!
//! 熔断器只负责判断一次调用能否发起，并记录调用方上报的结果，不执行下游调用本身。
//!
//! # 特性
//!
//! - **三状态**: Closed（关闭）、Open（打开）、HalfOpen（半开）
//! - **双重门槛**: 错误百分比与请求量下限同时满足才会熔断
//! - **自动探测**: 休眠窗口到期后自动进入半开状态
//! - **两种恢复方式**: 探测成功量达标，或整个恢复周期内无错误
//! - **无锁上报**: 上报路径只有原子操作，状态切换使用CAS保证同一次越过阈值只切换一次
//!
//! # 状态转换
//!
//! ```text
//! Closed ──[错误量与请求量均达标]──> Open
//!   ▲                                 │
//!   │                                 │ [休眠窗口到期]
//!   │                                 ▼
//!   └──[成功量达标 / 恢复周期无错误]── HalfOpen
//!              [任意一次失败] ────────> Open
//! ```

use crate::config::{BreakerConfig, Thresholds, TransitionCallback};
use crate::counter::{Counters, Window};
use crate::error::{BreakerError, BreakerState, BreakerStats, Transition};
use crate::state::{StatusCell, StatusWord};
use crate::timer::{TimerKind, TimerManager};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// 熔断器
///
/// 丢弃时自动停止运行。需要在多个调用方之间共享时使用 `Arc<CircuitBreaker>`。
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

struct Inner {
    config: BreakerConfig,
    thresholds: Thresholds,
    status: StatusCell,
    counters: Counters,
    timers: TimerManager,
    shut_down: AtomicBool,
    /// 创建时间，`opened_at` 以此为基准
    epoch: Instant,
    /// 距 `epoch` 的纳秒数加一，0 表示从未打开过
    opened_at: AtomicU64,
    notifier: Option<mpsc::UnboundedSender<Transition>>,
    #[cfg(test)]
    after_close_cas: parking_lot::Mutex<Option<Box<dyn FnOnce(&Inner) + Send>>>,
}

impl CircuitBreaker {
    /// 创建新的熔断器
    ///
    /// 必须在 Tokio 运行时中调用，后台定时任务运行在该运行时上。
    ///
    /// # 示例
    /// ```rust
    /// use breakeron::{BreakerConfig, CircuitBreaker};
    /// use std::time::Duration;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let config = BreakerConfig::new()
    ///     .request_volume_threshold(100)
    ///     .error_threshold_percent(50)
    ///     .sleep_window(Duration::from_secs(15));
    /// let breaker = CircuitBreaker::new(config).unwrap();
    ///
    /// if breaker.report_request(1).is_ok() {
    ///     // 调用下游，然后上报结果
    ///     breaker.report_success(1).unwrap();
    /// }
    /// # }
    /// ```
    pub fn new(config: BreakerConfig) -> Result<Self, BreakerError> {
        let config = config.validated()?;
        let runtime = Handle::try_current().map_err(|_| BreakerError::RuntimeUnavailable)?;
        let thresholds = config.thresholds();

        info!(
            "创建熔断器: refresh_interval={:?}, error_volume_threshold={}, request_volume_threshold={}, sleep_window={:?}, recovery_interval={:?}, success_volume_threshold={}",
            config.open.refresh_interval,
            thresholds.error_volume,
            config.open.request_volume_threshold,
            config.sleep_window,
            config.close.recovery_interval,
            thresholds.success_volume
        );

        let notifier = config
            .on_transition
            .clone()
            .map(|callback| spawn_notifier(&runtime, callback));

        let now = Instant::now();
        let inner = Arc::new(Inner {
            config,
            thresholds,
            status: StatusCell::new(),
            counters: Counters::new(now),
            timers: TimerManager::new(runtime),
            shut_down: AtomicBool::new(false),
            epoch: now,
            opened_at: AtomicU64::new(0),
            notifier,
            #[cfg(test)]
            after_close_cas: parking_lot::Mutex::new(None),
        });

        inner.arm_window_reset(inner.status.load());

        Ok(Self { inner })
    }

    /// 上报 `n` 次调用尝试
    ///
    /// # 返回
    /// - `Ok(())`: 允许发起调用
    /// - `Err(BreakerError::TooManyErrors)`: 熔断器打开，不得发起调用，计数不变
    /// - `Err(BreakerError::ShutDown)`: 熔断器已停止运行
    pub fn report_request(&self, n: u64) -> Result<(), BreakerError> {
        self.inner.report_request(n)
    }

    /// 上报 `n` 次失败
    ///
    /// 关闭状态下可能触发熔断，半开状态下任意一次失败都会重新熔断。
    pub fn report_error(&self, n: u64) -> Result<(), BreakerError> {
        self.inner.report_error(n)
    }

    /// 上报 `n` 次成功
    ///
    /// 半开状态下成功量达标时恢复为关闭状态。
    pub fn report_success(&self, n: u64) -> Result<(), BreakerError> {
        self.inner.report_success(n)
    }

    /// 获取当前状态
    pub fn current_status(&self) -> BreakerState {
        self.inner.status.load().state()
    }

    /// 检查熔断器是否关闭
    pub fn is_closed(&self) -> bool {
        self.current_status() == BreakerState::Closed
    }

    /// 检查熔断器是否打开
    pub fn is_open(&self) -> bool {
        self.current_status() == BreakerState::Open
    }

    /// 检查熔断器是否半开
    pub fn is_half_open(&self) -> bool {
        self.current_status() == BreakerState::HalfOpen
    }

    /// 停止运行
    ///
    /// 可重复调用。停止所有定时器，之后的上报均返回 [`BreakerError::ShutDown`]。
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// 是否已停止运行
    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    /// 获取统计信息
    pub fn stats(&self) -> BreakerStats {
        let state = self.current_status();
        let snapshot = self.inner.counters.snapshot();

        BreakerStats {
            state,
            request_volume: snapshot.requests,
            error_volume: snapshot.errors,
            success_volume: snapshot.successes,
            window_started_at: to_utc(snapshot.started_at),
            opened_at: self.inner.opened_at().map(to_utc),
            shut_down: self.is_shut_down(),
        }
    }

    /// 获取配置
    pub fn config(&self) -> &BreakerConfig {
        &self.inner.config
    }

    /// 获取预计算阈值
    pub fn thresholds(&self) -> Thresholds {
        self.inner.thresholds
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.current_status())
            .field("thresholds", &self.inner.thresholds)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Inner {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), BreakerError> {
        if self.is_shut_down() {
            return Err(BreakerError::ShutDown);
        }
        Ok(())
    }

    fn report_request(&self, n: u64) -> Result<(), BreakerError> {
        self.ensure_running()?;

        match self.status.load().state() {
            BreakerState::Open => Err(BreakerError::TooManyErrors),
            BreakerState::Closed | BreakerState::HalfOpen => {
                let requests = self.counters.window().add_requests(n);
                trace!("请求计数: {}", requests);
                Ok(())
            }
        }
    }

    fn report_error(self: &Arc<Self>, n: u64) -> Result<(), BreakerError> {
        self.ensure_running()?;
        if n == 0 {
            return Ok(());
        }

        let word = self.status.load();
        match word.state() {
            BreakerState::Open => {
                trace!("熔断器打开状态下收到失败上报，忽略");
            }
            BreakerState::HalfOpen => {
                self.counters.window().add_errors(n);
                self.trip(word);
            }
            BreakerState::Closed => {
                let (requests, errors) = {
                    let window = self.counters.window();
                    let errors = window.add_errors(n);
                    (window.requests(), errors)
                };

                if self.should_open(requests, errors) {
                    self.trip(word);
                } else {
                    trace!(
                        "失败计数（关闭状态）: {}/{} (requests={})",
                        errors,
                        self.thresholds.error_volume,
                        requests
                    );
                }
            }
        }

        Ok(())
    }

    fn report_success(self: &Arc<Self>, n: u64) -> Result<(), BreakerError> {
        self.ensure_running()?;
        if n == 0 {
            return Ok(());
        }

        let word = self.status.load();
        match word.state() {
            BreakerState::Open => {
                trace!("熔断器打开状态下收到成功上报，忽略");
            }
            BreakerState::Closed => {
                self.counters.window().add_successes(n);
            }
            BreakerState::HalfOpen => {
                let window = self.counters.window();
                let successes = window.add_successes(n);
                let requests = window.requests();

                if successes >= self.thresholds.success_volume
                    && requests >= self.config.close.success_volume_threshold
                {
                    self.close(word, &window, "探测成功量达标");
                } else {
                    trace!(
                        "成功计数（半开状态）: {}/{} (requests={})",
                        successes,
                        self.thresholds.success_volume,
                        requests
                    );
                }
            }
        }

        Ok(())
    }

    /// 关闭状态下是否应当熔断
    ///
    /// 错误量阈值、请求量下限、当前窗口错误比例三者同时满足。
    fn should_open(&self, requests: u64, errors: u64) -> bool {
        let open = &self.config.open;
        errors >= self.thresholds.error_volume
            && requests >= open.request_volume_threshold
            && errors.saturating_mul(100)
                >= requests.saturating_mul(u64::from(open.error_threshold_percent))
    }

    /// 切换到打开状态
    fn trip(self: &Arc<Self>, expected: StatusWord) {
        let Some(word) = self.status.transition(expected, BreakerState::Open) else {
            trace!("状态已被其他调用者切换，忽略");
            return;
        };
        let from = expected.state();

        self.opened_at
            .store(nanos_since(self.epoch).saturating_add(1), Ordering::Release);

        self.timers.cancel(TimerKind::WindowReset);
        self.timers.cancel(TimerKind::Recovery);
        self.arm_sleep_window(word);

        let snapshot = self.counters.snapshot();
        warn!(
            requests = snapshot.requests,
            errors = snapshot.errors,
            "熔断器状态变更: {} -> Open",
            from
        );

        self.notify(from, BreakerState::Open);
    }

    /// 休眠窗口到期，切换到半开状态
    fn enter_half_open(self: &Arc<Self>, expected: StatusWord) {
        if self.is_shut_down() {
            return;
        }

        // 先换窗口再切状态，读到半开状态的调用者一定看到的是新窗口
        self.counters
            .reset(Instant::now(), expected.next_generation());
        let Some(word) = self.status.transition(expected, BreakerState::HalfOpen) else {
            debug!("休眠窗口到期时状态已变更，忽略");
            return;
        };

        self.arm_recovery(word);
        info!("熔断器状态变更: Open -> HalfOpen");
    }

    /// 恢复周期到期
    fn recover(self: &Arc<Self>, expected: StatusWord) {
        if self.is_shut_down() || self.status.load() != expected {
            return;
        }
        let window = self.counters.window();
        if window.errors() > 0 {
            return;
        }
        self.close(expected, &window, "恢复周期内无错误");
    }

    /// 切换到关闭状态
    ///
    /// `seen` 是判定可以关闭时读到的窗口，必须属于 `expected` 所在的半开阶段。
    /// 先换窗口再切状态，读到关闭状态的调用者不会计入即将被丢弃的半开窗口；
    /// 窗口已被其他关闭者换掉时不再重置。
    fn close(self: &Arc<Self>, expected: StatusWord, seen: &Arc<Window>, reason: &str) {
        if seen.generation() != expected.generation() {
            trace!("判定所用窗口不属于当前半开阶段，忽略");
            return;
        }
        if !self.counters.reset_from(seen, Instant::now(), expected.next_generation()) {
            trace!("半开窗口已被替换");
        }
        let Some(word) = self.status.transition(expected, BreakerState::Closed) else {
            trace!("状态已被其他调用者切换，忽略");
            return;
        };

        #[cfg(test)]
        {
            let hook = self.after_close_cas.lock().take();
            if let Some(hook) = hook {
                hook(&**self);
            }
        }

        self.timers.cancel(TimerKind::Recovery);
        self.arm_window_reset(word);

        info!("熔断器状态变更: HalfOpen -> Closed ({})", reason);
        self.notify(BreakerState::HalfOpen, BreakerState::Closed);
    }

    /// 关闭状态期间按统计周期重置计数
    fn on_window_tick(&self, expected: StatusWord) -> bool {
        if self.status.load() != expected {
            return false;
        }
        self.counters.reset(Instant::now(), expected.generation());
        debug!("统计窗口已重置");
        true
    }

    fn arm_window_reset(self: &Arc<Self>, word: StatusWord) {
        let weak = Arc::downgrade(self);
        self.timers.arm_periodic(
            TimerKind::WindowReset,
            self.config.open.refresh_interval,
            move || with_inner(&weak, |inner| inner.on_window_tick(word)).unwrap_or(false),
        );
    }

    fn arm_sleep_window(self: &Arc<Self>, word: StatusWord) {
        let weak = Arc::downgrade(self);
        self.timers
            .arm_once(TimerKind::SleepWindow, self.config.sleep_window, move || {
                with_inner(&weak, |inner| inner.enter_half_open(word));
            });
    }

    fn arm_recovery(self: &Arc<Self>, word: StatusWord) {
        let weak = Arc::downgrade(self);
        self.timers.arm_once(
            TimerKind::Recovery,
            self.config.close.recovery_interval,
            move || {
                with_inner(&weak, |inner| inner.recover(word));
            },
        );
    }

    /// 将状态变更交给回调任务，不阻塞当前上报
    fn notify(&self, from: BreakerState, to: BreakerState) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let transition = Transition {
            from,
            to,
            at: Utc::now(),
        };
        if notifier.send(transition).is_err() {
            debug!("回调任务已退出，丢弃状态变更: {} -> {}", from, to);
        }
    }

    fn opened_at(&self) -> Option<Instant> {
        match self.opened_at.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(self.epoch + Duration::from_nanos(nanos - 1)),
        }
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("熔断器已经停止运行");
            return;
        }

        self.status.retire();
        self.timers.shutdown();
        info!("熔断器已停止运行");
    }
}

/// 启动回调任务
///
/// 所有回调在同一个任务中按发送顺序依次执行。熔断器释放后通道关闭，任务退出。
fn spawn_notifier(
    runtime: &Handle,
    callback: TransitionCallback,
) -> mpsc::UnboundedSender<Transition> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Transition>();
    runtime.spawn(async move {
        while let Some(transition) = receiver.recv().await {
            callback(transition);
        }
        trace!("回调任务退出");
    });
    sender
}

fn with_inner<R>(weak: &Weak<Inner>, f: impl FnOnce(&Arc<Inner>) -> R) -> Option<R> {
    weak.upgrade().map(|inner| f(&inner))
}

fn nanos_since(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX - 1)
}

fn to_utc(instant: Instant) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(instant.elapsed())
        .map(|elapsed| now - elapsed)
        .unwrap_or(now)
}
