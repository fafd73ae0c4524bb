//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 熔断器状态字
//!
//! 状态与代数打包在同一个 `AtomicU64` 中：低2位为状态，其余位为代数。
//! 每次状态变更和停止运行都会使代数加一，定时任务据此判断自己所属的阶段是否已经结束。

use crate::error::BreakerState;
use std::sync::atomic::{AtomicU64, Ordering};

const STATE_BITS: u32 = 2;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

/// 状态字快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StatusWord(u64);

impl StatusWord {
    fn new(state: BreakerState, generation: u64) -> Self {
        Self((generation << STATE_BITS) | state.to_bits())
    }

    /// 当前状态
    pub(crate) fn state(self) -> BreakerState {
        BreakerState::from_bits(self.0 & STATE_MASK)
    }

    /// 当前代数
    pub(crate) fn generation(self) -> u64 {
        self.0 >> STATE_BITS
    }

    /// 从该状态字成功切换后的代数
    pub(crate) fn next_generation(self) -> u64 {
        self.generation().wrapping_add(1)
    }

    fn advance(self, to: BreakerState) -> Self {
        Self::new(to, self.next_generation())
    }
}

/// 原子状态字
#[derive(Debug)]
pub(crate) struct StatusCell {
    word: AtomicU64,
}

impl StatusCell {
    /// 初始为关闭状态，代数为0
    pub(crate) fn new() -> Self {
        Self {
            word: AtomicU64::new(StatusWord::new(BreakerState::Closed, 0).0),
        }
    }

    pub(crate) fn load(&self) -> StatusWord {
        StatusWord(self.word.load(Ordering::Acquire))
    }

    /// 从 `expected` 切换到 `to`
    ///
    /// 只有状态字与 `expected` 完全一致（状态和代数都相同）时才会成功，
    /// 成功时返回新的状态字。同一次阈值越过最多只会有一个调用者成功。
    pub(crate) fn transition(&self, expected: StatusWord, to: BreakerState) -> Option<StatusWord> {
        let next = expected.advance(to);
        self.word
            .compare_exchange(expected.0, next.0, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| next)
    }

    /// 状态不变，代数加一
    ///
    /// 停止运行时调用，使所有尚未完成的定时任务的状态切换失败。
    pub(crate) fn retire(&self) {
        self.word.fetch_add(1 << STATE_BITS, Ordering::AcqRel);
    }
}
