//! Deterministic timer queue for the single-threaded event loop.
//!
//! Key properties:
//! - Virtual clock in milliseconds, advanced only by the host.
//! - Total ordering on `(due_ms, id)`; equal due times fire in arming order.
//! - Timers are popped one at a time so a handler can cancel or re-arm
//!   other timers before they fire.
//! - Cancellation does not perturb the order of remaining timers.

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub id: TimerId,
    pub due_ms: u64,
    pub payload: T,
}

#[derive(Debug)]
struct Timer<T> {
    id: TimerId,
    due_ms: u64,
    period_ms: Option<u64>,
    payload: T,
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    now_ms: u64,
    next_id: u64,
    timers: Vec<Timer<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            now_ms: 0,
            next_id: 0,
            timers: Vec::new(),
        }
    }
}

impl<T: Clone> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    /// One-shot timer firing `delay_ms` after the current clock.
    pub fn after(&mut self, delay_ms: u64, payload: T) -> TimerId {
        self.arm(self.now_ms.saturating_add(delay_ms), None, payload)
    }

    /// Repeating timer; a zero period is treated as 1ms so the loop always makes progress.
    pub fn every(&mut self, period_ms: u64, payload: T) -> TimerId {
        let period = period_ms.max(1);
        self.arm(self.now_ms.saturating_add(period), Some(period), payload)
    }

    /// Returns `true` if the timer was still armed.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        self.timers.iter().map(|t| t.due_ms).min()
    }

    /// Pops the earliest timer due at or before `until_ms` and moves the clock to it.
    ///
    /// When nothing is due the clock moves to `until_ms` and `None` is returned.
    /// Interval timers are re-armed one period after their due time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<Fired<T>> {
        let idx = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= until_ms)
            .min_by(|(_, a), (_, b)| a.due_ms.cmp(&b.due_ms).then_with(|| a.id.cmp(&b.id)))
            .map(|(i, _)| i);

        let Some(idx) = idx else {
            self.now_ms = self.now_ms.max(until_ms);
            return None;
        };

        let due_ms = self.timers[idx].due_ms;
        self.now_ms = self.now_ms.max(due_ms);

        let fired = match self.timers[idx].period_ms {
            Some(period) => {
                let timer = &mut self.timers[idx];
                timer.due_ms = due_ms.saturating_add(period);
                Fired {
                    id: timer.id,
                    due_ms,
                    payload: timer.payload.clone(),
                }
            }
            None => {
                let timer = self.timers.remove(idx);
                Fired {
                    id: timer.id,
                    due_ms,
                    payload: timer.payload,
                }
            }
        };
        Some(fired)
    }

    fn arm(&mut self, due_ms: u64, period_ms: Option<u64>, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.timers.push(Timer {
            id,
            due_ms,
            period_ms,
            payload,
        });
        id
    }
}

/// Holder for at most one armed timer; arming a new one cancels the previous.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimerSlot(Option<TimerId>);

impl TimerSlot {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn id(&self) -> Option<TimerId> {
        self.0
    }

    pub fn replace<T: Clone>(&mut self, queue: &mut TimerQueue<T>, id: TimerId) {
        if let Some(prev) = self.0.replace(id) {
            queue.cancel(prev);
        }
    }

    /// Cancels the held timer. Returns `true` if one was still armed.
    pub fn clear<T: Clone>(&mut self, queue: &mut TimerQueue<T>) -> bool {
        match self.0.take() {
            Some(id) => queue.cancel(id),
            None => false,
        }
    }

    pub fn is_armed<T: Clone>(&self, queue: &TimerQueue<T>) -> bool {
        self.0.is_some_and(|id| queue.is_armed(id))
    }

    /// Forgets the held id if it matches a fired one-shot timer.
    ///
    /// Returns `true` if `id` was the held timer; stale ids return `false`.
    pub fn settle(&mut self, id: TimerId) -> bool {
        if self.0 == Some(id) {
            self.0 = None;
            return true;
        }
        false
    }
}

/// Trailing-edge debounce on top of a [`TimerQueue`].
///
/// Each `trigger` replaces the pending timer, so a burst of triggers produces
/// exactly one firing `delay_ms` after the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debouncer {
    delay_ms: u64,
    slot: TimerSlot,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            slot: TimerSlot::new(),
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn trigger<T: Clone>(&mut self, queue: &mut TimerQueue<T>, payload: T) -> TimerId {
        let id = queue.after(self.delay_ms, payload);
        self.slot.replace(queue, id);
        id
    }

    pub fn cancel<T: Clone>(&mut self, queue: &mut TimerQueue<T>) -> bool {
        self.slot.clear(queue)
    }

    pub fn is_pending<T: Clone>(&self, queue: &TimerQueue<T>) -> bool {
        self.slot.is_armed(queue)
    }

    /// Call when a timer fires; `true` means this debouncer's pending timer completed.
    pub fn settle(&mut self, id: TimerId) -> bool {
        self.slot.settle(id)
    }
}

#[cfg(test)]
mod tests {
    use super::{Debouncer, TimerQueue, TimerSlot};

    fn drain(queue: &mut TimerQueue<&'static str>, until: u64) -> Vec<(u64, &'static str)> {
        let mut out = Vec::new();
        while let Some(f) = queue.pop_due(until) {
            out.push((f.due_ms, f.payload));
        }
        out
    }

    #[test]
    fn one_shots_fire_in_due_then_arming_order() {
        let mut q = TimerQueue::new();
        q.after(20, "b");
        q.after(10, "a");
        q.after(20, "c");
        assert_eq!(drain(&mut q, 100), vec![(10, "a"), (20, "b"), (20, "c")]);
        assert!(q.is_empty());
        assert_eq!(q.now_ms(), 100);
    }

    #[test]
    fn intervals_rearm_until_cancelled() {
        let mut q = TimerQueue::new();
        let id = q.every(180, "tick");
        assert_eq!(drain(&mut q, 540).len(), 3);
        assert!(q.cancel(id));
        assert!(drain(&mut q, 2_000).is_empty());
        assert!(!q.cancel(id));
    }

    #[test]
    fn nothing_fires_before_due() {
        let mut q = TimerQueue::new();
        q.after(1_000, "save");
        assert!(drain(&mut q, 999).is_empty());
        assert_eq!(drain(&mut q, 1_000), vec![(1_000, "save")]);
    }

    #[test]
    fn slot_replaces_previous_timer() {
        let mut q = TimerQueue::new();
        let mut slot = TimerSlot::new();
        let first = q.every(100, "old");
        slot.replace(&mut q, first);
        let second = q.every(50, "new");
        slot.replace(&mut q, second);
        assert!(!q.is_armed(first));
        assert_eq!(q.len(), 1);
        assert!(slot.clear(&mut q));
        assert!(q.is_empty());
    }

    #[test]
    fn debounce_coalesces_a_burst_into_one_trailing_fire() {
        let mut q = TimerQueue::new();
        let mut d = Debouncer::new(1_000);
        d.trigger(&mut q, "persist");
        drain(&mut q, 300);
        d.trigger(&mut q, "persist");
        drain(&mut q, 600);
        let last = d.trigger(&mut q, "persist");

        let fired: Vec<_> = std::iter::from_fn(|| q.pop_due(5_000)).collect();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, last);
        assert_eq!(fired[0].due_ms, 1_600);
        assert!(d.settle(fired[0].id));
        assert!(!d.is_pending(&q));
    }
}
