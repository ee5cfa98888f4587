//! 自适应调度器
//!
//! 状态：`Stopped` / `Scheduled`（定时器已挂起）/ `Running`（周期执行中）。
//! 同一时刻最多只有一个周期在执行；执行中收到的 `sync_now` 合并为一次紧随其后的重跑。
//! `stop` 只取消定时器，不中断已发出的远端请求，该周期结束后不再重新挂起。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::activity::ActivityTracker;
use super::idle::IdleDetector;
use super::poll_policy::PollPolicy;
use super::CycleOutcome;

/// 调度器驱动的一次轮询周期
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self) -> CycleOutcome;

    /// 因空闲被挂起时调用
    async fn on_suspended(&self, _idle_for: Duration) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Stopped,
    Scheduled,
    Running,
}

#[derive(Debug, Default)]
struct SchedulerState {
    /// 自动轮询是否开启
    auto: bool,
    running: bool,
    /// 执行中收到了 sync_now
    rerun: bool,
    timer: Option<CancellationToken>,
    deadline: Option<Instant>,
    generation: u64,
    previous_delay: Duration,
    /// 资源已删除，永久停止
    halted: bool,
}

impl SchedulerState {
    fn cancel_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
        self.deadline = None;
    }

    fn halt(&mut self) {
        self.halted = true;
        self.auto = false;
        self.rerun = false;
        self.cancel_timer();
    }
}

struct SchedulerInner {
    runner: Arc<dyn CycleRunner>,
    policy: PollPolicy,
    activity: Arc<ActivityTracker>,
    idle: IdleDetector,
    state: Mutex<SchedulerState>,
}

#[derive(Clone)]
pub struct AdaptiveScheduler {
    inner: Arc<SchedulerInner>,
}

impl AdaptiveScheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        policy: PollPolicy,
        activity: Arc<ActivityTracker>,
        idle: IdleDetector,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                runner,
                policy,
                activity,
                idle,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        let state = self.inner.state.lock();
        if state.running {
            SchedulerPhase::Running
        } else if state.timer.is_some() {
            SchedulerPhase::Scheduled
        } else {
            SchedulerPhase::Stopped
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.state.lock().running
    }

    pub fn is_auto(&self) -> bool {
        self.inner.state.lock().auto
    }

    pub fn is_halted(&self) -> bool {
        self.inner.state.lock().halted
    }

    /// 距下一次定时触发的时间
    pub fn next_fire_in(&self) -> Option<Duration> {
        self.inner
            .state
            .lock()
            .deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// 开启自动轮询并立即执行一次（延迟 0）
    pub fn start(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.halted {
            warn!("⚠️ 资源已删除，拒绝重新开启自动同步");
            return false;
        }
        state.auto = true;
        state.previous_delay = Duration::ZERO;
        if !state.running {
            self.inner.arm(&mut state, Duration::ZERO);
        }
        info!("🔄 自动同步已开启");
        true
    }

    /// 关闭自动轮询；执行中的周期允许完成
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.auto = false;
        state.rerun = false;
        state.cancel_timer();
        info!("自动同步已停止");
    }

    /// 周期之外发现资源已删除时调用；与周期返回 Gone 效果相同
    pub fn halt(&self) {
        let mut state = self.inner.state.lock();
        if !state.halted {
            state.halt();
            warn!("⚠️ 资源已删除，调度器永久停止");
        }
    }

    /// 立即同步
    ///
    /// - `Scheduled`：取消定时器，立即执行，结束后按新间隔重新挂起
    /// - `Running`：合并到正在执行的周期之后，立即返回
    /// - `Stopped`：执行一次，不开启自动轮询
    pub async fn sync_now(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.halted {
                debug!("调度器已永久停止，忽略 sync_now");
                return;
            }
            if state.running {
                state.rerun = true;
                return;
            }
            state.cancel_timer();
            state.running = true;
        }
        Arc::clone(&self.inner).run_loop().await;
    }

    /// 不等待结果的 `sync_now`
    pub fn request_sync(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.sync_now().await;
        });
    }

    /// 记录活跃度；本地输入时若当前定时过长则提前
    pub fn touch(&self, is_local: bool) {
        self.inner.activity.touch(is_local);
        if !is_local {
            return;
        }
        let ceiling = self.inner.policy.bounds(&self.inner.activity.snapshot()).ceiling;
        let mut state = self.inner.state.lock();
        if !state.auto || state.running {
            return;
        }
        let remaining = state
            .deadline
            .map(|at| at.saturating_duration_since(Instant::now()));
        if matches!(remaining, Some(r) if r > ceiling) {
            debug!("本地输入，提前下一次轮询到 {:?}", ceiling);
            state.previous_delay = ceiling;
            self.inner.arm(&mut state, ceiling);
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.inner.activity.set_visible(visible);
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.inner.activity
    }

    /// 从空闲挂起中恢复：记一次本地活跃，立即重新开始
    pub fn resume(&self) -> bool {
        self.inner.activity.touch(true);
        self.start()
    }
}

impl SchedulerInner {
    fn arm(self: &Arc<Self>, state: &mut SchedulerState, delay: Duration) {
        state.cancel_timer();
        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        state.timer = Some(token.clone());
        state.deadline = Some(Instant::now() + delay);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            inner.fire(generation).await;
        });
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        let idle_for = {
            let mut state = self.state.lock();
            if state.generation != generation || state.timer.is_none() || !state.auto || state.running {
                return;
            }
            state.timer = None;
            state.deadline = None;

            let since_local = self.activity.since_local();
            if self.idle.is_idle(since_local) {
                state.auto = false;
                Some(since_local)
            } else {
                state.running = true;
                None
            }
        };

        match idle_for {
            Some(idle_for) => {
                info!("长时间无操作 ({:?})，挂起自动同步", idle_for);
                self.runner.on_suspended(idle_for).await;
            }
            None => self.run_loop().await,
        }
    }

    /// 调用方已将 `running` 置为 true
    async fn run_loop(self: Arc<Self>) {
        loop {
            let outcome = self.runner.run_cycle().await;
            if self.finish_cycle(&outcome) {
                return;
            }
        }
    }

    /// 周期结束后的状态转换；返回 false 表示需要立即重跑
    fn finish_cycle(self: &Arc<Self>, outcome: &CycleOutcome) -> bool {
        let mut state = self.state.lock();
        if outcome.is_gone() {
            state.halt();
            state.running = false;
            return true;
        }
        if state.rerun {
            state.rerun = false;
            return false;
        }
        state.running = false;
        if state.auto {
            let delay = self
                .policy
                .next_delay(state.previous_delay, &self.activity.snapshot());
            state.previous_delay = delay;
            debug!("下一次轮询: {:?} ({:?})", delay, outcome);
            self.arm(&mut state, delay);
        }
        true
    }
}
