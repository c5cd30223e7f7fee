use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// A queued unit of work.
pub type Task = BoxFuture<'static, ()>;

struct DispatchState {
    active: usize,
    paused: bool,
    pending: VecDeque<Task>,
}

struct Inner {
    capacity: usize,
    state: Mutex<DispatchState>,
    wake: Notify,
}

/// Bounded-concurrency task dispatcher. Cheap to clone; clones share state.
///
/// All mutable scheduling state (`active`, `paused`, the pending queue) lives
/// in one structure behind a single lock; the only operations exposed are
/// `submit`, `wait_until_below`, `pause`, `resume` and `drain_to_idle`.
/// `active` never exceeds the capacity fixed at construction. Pausing gates
/// dispatch of new tasks only; tasks already running always run to completion.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                state: Mutex::new(DispatchState {
                    active: 0,
                    paused: false,
                    pending: VecDeque::new(),
                }),
                wake: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Queue a task. It starts as soon as a slot is free and dispatch is not
    /// paused; while paused it sits queued until `resume`.
    pub async fn submit(&self, task: Task) {
        let mut st = self.inner.state.lock().await;
        st.pending.push_back(task);
        self.pump(&mut st);
    }

    /// Start queued tasks while a slot is free. Caller holds the state lock.
    fn pump(&self, st: &mut DispatchState) {
        while !st.paused && st.active < self.inner.capacity {
            let Some(task) = st.pending.pop_front() else {
                break;
            };
            st.active += 1;
            let this = self.clone();
            tokio::spawn(async move {
                task.await;
                let mut st = this.inner.state.lock().await;
                st.active -= 1;
                this.pump(&mut st);
                drop(st);
                this.inner.wake.notify_waiters();
            });
        }
    }

    /// Suspend the caller until fewer than `n` tasks are running. Used by the
    /// ingestion loop to throttle how fast new tasks are created.
    pub async fn wait_until_below(&self, n: usize) {
        loop {
            let mut notified = pin!(self.inner.wake.notified());
            notified.as_mut().enable();
            {
                let st = self.inner.state.lock().await;
                if st.active < n {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Suspend until nothing is running and nothing is queued.
    pub async fn drain_to_idle(&self) {
        loop {
            let mut notified = pin!(self.inner.wake.notified());
            notified.as_mut().enable();
            {
                let st = self.inner.state.lock().await;
                if st.active == 0 && st.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Halt dispatch of new tasks. In-flight tasks are unaffected.
    pub async fn pause(&self) {
        let mut st = self.inner.state.lock().await;
        if !st.paused {
            debug!(active = st.active, queued = st.pending.len(), "dispatch paused");
        }
        st.paused = true;
    }

    /// Re-enable dispatch and start queued tasks up to capacity.
    pub async fn resume(&self) {
        let mut st = self.inner.state.lock().await;
        if st.paused {
            debug!(queued = st.pending.len(), "dispatch resumed");
        }
        st.paused = false;
        self.pump(&mut st);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn probe_task(
        running: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
        done: Arc<AtomicUsize>,
    ) -> Task {
        Box::pin(async move {
            let cur = running.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(cur, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn active_never_exceeds_capacity() {
        let dispatcher = Dispatcher::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            dispatcher.wait_until_below(dispatcher.capacity()).await;
            dispatcher
                .submit(probe_task(running.clone(), max_seen.clone(), done.clone()))
                .await;
        }
        dispatcher.drain_to_idle().await;

        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
        assert!(max_seen.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_capacity_is_clamped_to_one() {
        let dispatcher = Dispatcher::new(0);
        assert_eq!(dispatcher.capacity(), 1);
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        dispatcher
            .submit(Box::pin(async move {
                d.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        dispatcher.drain_to_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_dispatcher_holds_tasks_until_resume() {
        let dispatcher = Dispatcher::new(2);
        let started = Arc::new(AtomicUsize::new(0));

        dispatcher.pause().await;
        for _ in 0..4 {
            let s = started.clone();
            dispatcher
                .submit(Box::pin(async move {
                    s.fetch_add(1, Ordering::SeqCst);
                }))
                .await;
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(started.load(Ordering::SeqCst), 0);

        dispatcher.resume().await;
        dispatcher.drain_to_idle().await;
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_on_idle_dispatcher_returns_immediately() {
        let dispatcher = Dispatcher::new(4);
        dispatcher.drain_to_idle().await;
        dispatcher.wait_until_below(4).await;
    }
}
