//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 计数引擎
//!
//! 一个统计窗口内的请求数、失败数、成功数保存在同一个 [`Window`] 中。
//! 重置时整体替换为新的窗口，三个计数作为一个整体归零，
//! 同一次上报不会被拆分到两个窗口中。
//!
//! 每个窗口记录它所服务的状态字代数，状态切换据此确认读到的窗口属于当前阶段。

use arc_swap::{ArcSwap, Guard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// 统计窗口
#[derive(Debug)]
pub(crate) struct Window {
    requests: AtomicU64,
    errors: AtomicU64,
    successes: AtomicU64,
    started_at: Instant,
    generation: u64,
}

impl Window {
    fn new(started_at: Instant, generation: u64) -> Self {
        Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            started_at,
            generation,
        }
    }

    /// 增加请求数，返回增加后的值
    pub(crate) fn add_requests(&self, n: u64) -> u64 {
        self.requests.fetch_add(n, Ordering::AcqRel).wrapping_add(n)
    }

    /// 增加失败数，返回增加后的值
    pub(crate) fn add_errors(&self, n: u64) -> u64 {
        self.errors.fetch_add(n, Ordering::AcqRel).wrapping_add(n)
    }

    /// 增加成功数，返回增加后的值
    pub(crate) fn add_successes(&self, n: u64) -> u64 {
        self.successes.fetch_add(n, Ordering::AcqRel).wrapping_add(n)
    }

    pub(crate) fn requests(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    pub(crate) fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub(crate) fn successes(&self) -> u64 {
        self.successes.load(Ordering::Acquire)
    }

    pub(crate) fn started_at(&self) -> Instant {
        self.started_at
    }

    /// 窗口所服务的状态字代数
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// 计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CounterSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub successes: u64,
    pub started_at: Instant,
}

/// 计数引擎
#[derive(Debug)]
pub(crate) struct Counters {
    current: ArcSwap<Window>,
}

impl Counters {
    /// 初始窗口服务于代数0的关闭状态
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            current: ArcSwap::from_pointee(Window::new(now, 0)),
        }
    }

    /// 当前窗口
    ///
    /// 无锁读取，不分配内存。
    pub(crate) fn window(&self) -> Guard<Arc<Window>> {
        self.current.load()
    }

    /// 开启服务于 `generation` 的新统计窗口
    pub(crate) fn reset(&self, now: Instant, generation: u64) {
        self.current.store(Arc::new(Window::new(now, generation)));
    }

    /// 仅当当前窗口仍是 `seen` 时开启新窗口
    ///
    /// 返回是否替换成功。窗口已被其他调用者替换时不做任何事。
    pub(crate) fn reset_from(&self, seen: &Arc<Window>, now: Instant, generation: u64) -> bool {
        let previous = self
            .current
            .compare_and_swap(seen, Arc::new(Window::new(now, generation)));
        Arc::ptr_eq(&previous, seen)
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        let window = self.window();
        CounterSnapshot {
            requests: window.requests(),
            errors: window.errors(),
            successes: window.successes(),
            started_at: window.started_at(),
        }
    }
}
