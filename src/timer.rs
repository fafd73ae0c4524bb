//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 定时器管理
//!
//! 管理三个互斥的后台定时任务：
//!
//! - **窗口重置**：关闭状态下按统计周期重置计数
//! - **休眠窗口**：进入打开状态时启动，到期后进入半开状态
//! - **恢复周期**：进入半开状态时启动，周期内无错误则恢复为关闭状态
//!
//! 停止运行时通过 `watch` 通道广播给所有任务，并中止任务句柄。

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// 定时器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    WindowReset,
    SleepWindow,
    Recovery,
}

impl TimerKind {
    fn name(self) -> &'static str {
        match self {
            TimerKind::WindowReset => "window_reset",
            TimerKind::SleepWindow => "sleep_window",
            TimerKind::Recovery => "recovery",
        }
    }
}

/// 定时器管理器
#[derive(Debug)]
pub(crate) struct TimerManager {
    runtime: Handle,
    shutdown_tx: watch::Sender<bool>,
    window_reset: Mutex<Option<JoinHandle<()>>>,
    sleep_window: Mutex<Option<JoinHandle<()>>>,
    recovery: Mutex<Option<JoinHandle<()>>>,
}

impl TimerManager {
    pub(crate) fn new(runtime: Handle) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            runtime,
            shutdown_tx,
            window_reset: Mutex::new(None),
            sleep_window: Mutex::new(None),
            recovery: Mutex::new(None),
        }
    }

    /// 创建熔断器时捕获的运行时
    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// 启动周期定时器
    ///
    /// 首次触发在 `period` 之后。`on_tick` 返回 `false` 时任务退出。
    pub(crate) fn arm_periodic<F>(&self, kind: TimerKind, period: Duration, mut on_tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.is_shut_down() {
            return;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let start = Instant::now() + period;

        let handle = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                        debug!("定时器 {} 收到停止信号", kind.name());
                        break;
                    }
                    _ = interval.tick() => {
                        trace!("定时器 {} 触发", kind.name());
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
        });

        self.install(kind, handle);
        debug!("定时器 {} 已启动 (period: {:?})", kind.name(), period);
    }

    /// 启动一次性定时器
    ///
    /// 截止时间在调用时确定，而不是在任务首次被调度时。
    pub(crate) fn arm_once<F>(&self, kind: TimerKind, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_shut_down() {
            return;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let deadline = Instant::now() + delay;

        let handle = self.runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stopped| *stopped) => {
                    debug!("定时器 {} 收到停止信号", kind.name());
                }
                _ = tokio::time::sleep_until(deadline) => {
                    trace!("定时器 {} 触发", kind.name());
                    on_fire();
                }
            }
        });

        self.install(kind, handle);
        debug!("定时器 {} 已启动 (delay: {:?})", kind.name(), delay);
    }

    /// 取消定时器
    pub(crate) fn cancel(&self, kind: TimerKind) {
        if let Some(handle) = self.slot(kind).lock().take() {
            handle.abort();
            debug!("定时器 {} 已取消", kind.name());
        }
    }

    /// 定时器是否仍在运行
    #[cfg(test)]
    pub(crate) fn is_armed(&self, kind: TimerKind) -> bool {
        self.slot(kind)
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 停止所有定时器
    pub(crate) fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        for kind in [
            TimerKind::WindowReset,
            TimerKind::SleepWindow,
            TimerKind::Recovery,
        ] {
            self.cancel(kind);
        }
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn install(&self, kind: TimerKind, handle: JoinHandle<()>) {
        if let Some(previous) = self.slot(kind).lock().replace(handle) {
            previous.abort();
        }
    }

    fn slot(&self, kind: TimerKind) -> &Mutex<Option<JoinHandle<()>>> {
        match kind {
            TimerKind::WindowReset => &self.window_reset,
            TimerKind::SleepWindow => &self.sleep_window,
            TimerKind::Recovery => &self.recovery,
        }
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
