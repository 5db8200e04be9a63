//! Timeline player state machine: `Closed`, `Paused`, `Playing`.
//!
//! The player owns the bucket sequence and the cursor; the visible set at
//! cursor `i` is every entry whose bucket key is `<= buckets[i]`. Stepping is
//! driven by an interval timer on the host's [`TimerQueue`], held in a
//! [`TimerSlot`] so replacing or stopping it never leaks a timer.

use std::collections::BTreeSet;

use foundation::{BucketKey, Granularity};
use memories::RecordFacts;
use runtime::{TimerId, TimerQueue, TimerSlot};
use serde::Serialize;

use crate::TimelineConfig;

/// One filtered record as seen by the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Position in the record collection.
    pub index: usize,
    pub day: Option<BucketKey>,
    pub month: Option<BucketKey>,
}

impl TimelineEntry {
    pub fn key(&self, granularity: Granularity) -> Option<&BucketKey> {
        match granularity {
            Granularity::Day => self.day.as_ref(),
            Granularity::Month => self.month.as_ref(),
        }
    }
}

/// Entries for a filtered selection, keys taken from the collection facts.
pub fn entries_for(selection: &[usize], facts: &[RecordFacts]) -> Vec<TimelineEntry> {
    selection
        .iter()
        .map(|&index| {
            let f = facts.get(index);
            TimelineEntry {
                index,
                day: f.and_then(|f| f.day_key.clone()),
                month: f.and_then(|f| f.month_key.clone()),
            }
        })
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Closed,
    Paused,
    Playing,
}

/// Result of a playback step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Step {
    pub cursor: usize,
    /// Playback stopped on the last bucket.
    pub finished: bool,
}

#[derive(Debug)]
pub struct TimelinePlayer {
    config: TimelineConfig,
    granularity: Granularity,
    speed: u32,
    entries: Vec<TimelineEntry>,
    buckets: Vec<BucketKey>,
    cursor: usize,
    state: PlayState,
    /// `Some(was_playing)` while a modal hides the player.
    suspended: Option<bool>,
    timer: TimerSlot,
}

impl TimelinePlayer {
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            granularity: config.granularity,
            speed: config.initial_speed(),
            config,
            entries: Vec::new(),
            buckets: Vec::new(),
            cursor: 0,
            state: PlayState::Closed,
            suspended: None,
            timer: TimerSlot::new(),
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != PlayState::Closed
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn buckets(&self) -> &[BucketKey] {
        &self.buckets
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn period_ms(&self) -> u64 {
        self.config.period_ms(self.speed)
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        self.timer.id()
    }

    fn rebuild(&mut self) {
        let keys: BTreeSet<&BucketKey> = self
            .entries
            .iter()
            .filter_map(|e| e.key(self.granularity))
            .collect();
        self.buckets = keys.into_iter().cloned().collect();
        self.cursor = 0;
    }

    /// Opens (or reopens) paused on the given filtered entries, cursor at 0.
    /// Any running playback timer is cancelled.
    pub fn open<T: Clone>(&mut self, entries: Vec<TimelineEntry>, queue: &mut TimerQueue<T>) {
        self.timer.clear(queue);
        self.entries = entries;
        self.rebuild();
        self.state = PlayState::Paused;
        self.suspended = None;
        tracing::debug!(
            buckets = self.buckets.len(),
            granularity = ?self.granularity,
            "timeline opened"
        );
    }

    /// Stops playback and forgets the buckets.
    pub fn close<T: Clone>(&mut self, queue: &mut TimerQueue<T>) {
        self.timer.clear(queue);
        self.entries.clear();
        self.buckets.clear();
        self.cursor = 0;
        self.state = PlayState::Closed;
        self.suspended = None;
        tracing::debug!("timeline closed");
    }

    /// Collection indices visible at cursor `i` (clamped), in selection order.
    pub fn visible_at(&self, i: usize) -> Vec<usize> {
        let Some(cutoff) = self.cutoff(i) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|e| e.key(self.granularity).is_some_and(|k| k <= cutoff))
            .map(|e| e.index)
            .collect()
    }

    pub fn visible(&self) -> Vec<usize> {
        self.visible_at(self.cursor)
    }

    fn cutoff(&self, i: usize) -> Option<&BucketKey> {
        let last = self.buckets.len().checked_sub(1)?;
        self.buckets.get(i.min(last))
    }

    /// Moves the cursor (slider input). Returns the clamped cursor.
    pub fn seek(&mut self, i: usize) -> usize {
        if let Some(last) = self.buckets.len().checked_sub(1) {
            self.cursor = i.min(last);
        }
        self.cursor
    }

    fn arm<T: Clone>(&mut self, queue: &mut TimerQueue<T>, payload: T) {
        let id = queue.every(self.period_ms(), payload);
        self.timer.replace(queue, id);
    }

    /// Paused -> Playing. From the last bucket playback restarts at 0.
    pub fn play<T: Clone>(&mut self, queue: &mut TimerQueue<T>, payload: T) -> bool {
        if self.state != PlayState::Paused || self.suspended.is_some() || self.buckets.is_empty() {
            return false;
        }
        if self.cursor + 1 >= self.buckets.len() {
            self.cursor = 0;
        }
        self.arm(queue, payload);
        self.state = PlayState::Playing;
        true
    }

    pub fn pause<T: Clone>(&mut self, queue: &mut TimerQueue<T>) {
        self.timer.clear(queue);
        if self.state == PlayState::Playing {
            self.state = PlayState::Paused;
        }
    }

    pub fn toggle_play<T: Clone>(&mut self, queue: &mut TimerQueue<T>, payload: T) -> bool {
        if self.is_playing() {
            self.pause(queue);
            return false;
        }
        self.play(queue, payload)
    }

    /// Handles a fired timer. `None` if it is not this player's timer.
    pub fn on_timer<T: Clone>(&mut self, queue: &mut TimerQueue<T>, id: TimerId) -> Option<Step> {
        if self.timer.id() != Some(id) || !self.is_playing() {
            return None;
        }
        if self.cursor + 1 < self.buckets.len() {
            self.cursor += 1;
        }
        let finished = self.cursor + 1 >= self.buckets.len();
        if finished {
            self.pause(queue);
        }
        Some(Step {
            cursor: self.cursor,
            finished,
        })
    }

    /// Picks a speed from the configured list; a running timer is re-armed.
    pub fn set_speed<T: Clone>(&mut self, speed: u32, queue: &mut TimerQueue<T>, payload: T) -> bool {
        if !self.config.speeds.contains(&speed) {
            return false;
        }
        self.speed = speed;
        if self.is_playing() {
            self.arm(queue, payload);
        }
        true
    }

    /// Rebuilds buckets at the new granularity, cursor at 0, play state kept.
    pub fn set_granularity(&mut self, granularity: Granularity) -> bool {
        if granularity == self.granularity {
            return false;
        }
        self.granularity = granularity;
        if self.is_open() {
            self.rebuild();
        }
        true
    }

    /// New filtered entries: buckets rebuilt, cursor at 0, playback paused.
    pub fn on_filters_changed<T: Clone>(
        &mut self,
        entries: Vec<TimelineEntry>,
        queue: &mut TimerQueue<T>,
    ) {
        if !self.is_open() {
            return;
        }
        self.pause(queue);
        if self.suspended.is_some() {
            self.suspended = Some(false);
        }
        self.entries = entries;
        self.rebuild();
    }

    /// Hides the player for a modal; cursor and buckets are kept.
    pub fn suspend<T: Clone>(&mut self, queue: &mut TimerQueue<T>) -> bool {
        if !self.is_open() || self.suspended.is_some() {
            return false;
        }
        let was_playing = self.is_playing();
        self.pause(queue);
        self.suspended = Some(was_playing);
        true
    }

    /// Shows the player again and resumes playback if it was running.
    pub fn resume<T: Clone>(&mut self, queue: &mut TimerQueue<T>, payload: T) -> bool {
        let Some(was_playing) = self.suspended.take() else {
            return false;
        };
        if was_playing && self.is_open() && !self.buckets.is_empty() {
            self.arm(queue, payload);
            self.state = PlayState::Playing;
        }
        true
    }

    /// Current date label, e.g. `1 janvier 2024` or `janvier 2024`.
    pub fn label(&self) -> Option<String> {
        self.cutoff(self.cursor).map(BucketKey::label)
    }

    pub fn cumulative_count(&self) -> usize {
        self.visible().len()
    }

    /// `12 BeReals`, `1 BeReal`.
    pub fn count_label(&self) -> String {
        let n = self.cumulative_count();
        if n > 1 {
            format!("{n} BeReals")
        } else {
            format!("{n} BeReal")
        }
    }

    /// Slider fill in percent; a single bucket is full.
    pub fn progress_percent(&self) -> f64 {
        match self.buckets.len() {
            0 => 0.0,
            1 => 100.0,
            n => self.cursor as f64 / (n - 1) as f64 * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memories::{MemoryRecord, derive_facts};
    use pretty_assertions::assert_eq;

    const STEP: &str = "step";

    fn entries(times: &[&str]) -> Vec<TimelineEntry> {
        let records: Vec<MemoryRecord> = times
            .iter()
            .map(|t| serde_json::from_value(serde_json::json!({ "takenTime": t })).unwrap())
            .collect();
        let facts = derive_facts(&records);
        let selection: Vec<usize> = (0..records.len()).collect();
        entries_for(&selection, &facts)
    }

    fn sample() -> Vec<TimelineEntry> {
        entries(&[
            "2024-01-03T10:00:00Z",
            "2024-01-01T10:00:00Z",
            "",
            "2024-02-10T10:00:00Z",
            "2024-01-01T20:00:00Z",
        ])
    }

    fn opened() -> (TimelinePlayer, TimerQueue<&'static str>) {
        let mut p = TimelinePlayer::new(TimelineConfig::default());
        let mut q = TimerQueue::new();
        p.open(sample(), &mut q);
        (p, q)
    }

    fn run(p: &mut TimelinePlayer, q: &mut TimerQueue<&'static str>, until: u64) -> Vec<Step> {
        let mut steps = Vec::new();
        while let Some(fired) = q.pop_due(until) {
            if let Some(step) = p.on_timer(q, fired.id) {
                steps.push(step);
            }
        }
        steps
    }

    #[test]
    fn open_builds_sorted_distinct_buckets() {
        let (p, _) = opened();
        let keys: Vec<&str> = p.buckets().iter().map(BucketKey::as_str).collect();
        assert_eq!(keys, vec!["2024-01-01", "2024-01-03", "2024-02-10"]);
        assert_eq!(p.state(), PlayState::Paused);
        assert_eq!(p.visible(), vec![1, 4]);
        assert_eq!(p.label().as_deref(), Some("1 janvier 2024"));
        assert_eq!(p.count_label(), "2 BeReals");
    }

    #[test]
    fn reveal_is_monotonic_and_undated_never_shows() {
        let (p, _) = opened();
        let sets: Vec<BTreeSet<usize>> = (0..p.buckets().len())
            .map(|i| p.visible_at(i).into_iter().collect())
            .collect();
        for pair in sets.windows(2) {
            assert!(pair[0].is_subset(&pair[1]));
        }
        assert!(sets.iter().all(|s| !s.contains(&2)));
        assert_eq!(p.visible_at(99), p.visible_at(2));
        assert_eq!(p.visible_at(1), p.visible_at(1));
    }

    #[test]
    fn playback_steps_then_stops_on_last_bucket() {
        let (mut p, mut q) = opened();
        assert!(p.play(&mut q, STEP));
        let steps = run(&mut p, &mut q, 10_000);
        assert_eq!(
            steps,
            vec![
                Step { cursor: 1, finished: false },
                Step { cursor: 2, finished: true },
            ]
        );
        assert_eq!(p.state(), PlayState::Paused);
        assert!(q.is_empty());
        assert_eq!(p.progress_percent(), 100.0);
    }

    #[test]
    fn play_from_the_end_restarts_at_zero() {
        let (mut p, mut q) = opened();
        p.seek(2);
        assert!(p.play(&mut q, STEP));
        assert_eq!(p.cursor(), 0);
    }

    #[test]
    fn speed_change_rearms_the_running_timer() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        let first = p.timer_id();
        assert!(p.set_speed(4, &mut q, STEP));
        assert_ne!(p.timer_id(), first);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due_ms(), Some(45));
        assert!(!p.set_speed(3, &mut q, STEP));
    }

    #[test]
    fn suspend_and_resume_keep_cursor_and_playback() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        run(&mut p, &mut q, 180);
        assert_eq!(p.cursor(), 1);

        assert!(p.suspend(&mut q));
        assert!(q.is_empty());
        assert!(run(&mut p, &mut q, 5_000).is_empty());
        assert_eq!(p.cursor(), 1);
        assert!(!p.play(&mut q, STEP));

        assert!(p.resume(&mut q, STEP));
        assert!(p.is_playing());
        assert_eq!(p.buckets().len(), 3);
        assert_eq!(run(&mut p, &mut q, 10_000).len(), 1);
    }

    #[test]
    fn paused_player_resumes_paused() {
        let (mut p, mut q) = opened();
        p.suspend(&mut q);
        p.resume(&mut q, STEP);
        assert_eq!(p.state(), PlayState::Paused);
        assert!(q.is_empty());
    }

    #[test]
    fn filter_change_resets_cursor_and_pauses() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        run(&mut p, &mut q, 180);
        p.on_filters_changed(entries(&["2023-05-01T10:00:00Z", "2023-06-01T10:00:00Z"]), &mut q);
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.state(), PlayState::Paused);
        assert_eq!(p.buckets().len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn granularity_change_resets_cursor_and_keeps_playing() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        run(&mut p, &mut q, 180);
        assert!(p.set_granularity(Granularity::Month));
        let keys: Vec<&str> = p.buckets().iter().map(BucketKey::as_str).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02"]);
        assert_eq!(p.cursor(), 0);
        assert!(p.is_playing());
        assert_eq!(p.label().as_deref(), Some("janvier 2024"));
        assert_eq!(p.visible(), vec![0, 1, 4]);
    }

    #[test]
    fn close_clears_the_timer() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        p.close(&mut q);
        assert!(q.is_empty());
        assert_eq!(p.state(), PlayState::Closed);
        assert!(p.visible().is_empty());
        assert_eq!(p.label(), None);
    }

    #[test]
    fn reopening_while_playing_cancels_the_timer() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        run(&mut p, &mut q, 180);
        p.open(sample(), &mut q);
        assert_eq!(p.state(), PlayState::Paused);
        assert_eq!(p.cursor(), 0);
        assert_eq!(p.timer_id(), None);
        assert!(q.is_empty());

        assert!(p.play(&mut q, STEP));
        assert_eq!(q.len(), 1);
        assert_eq!(run(&mut p, &mut q, 10_000).len(), 2);
    }

    #[test]
    fn foreign_timers_are_ignored() {
        let (mut p, mut q) = opened();
        p.play(&mut q, STEP);
        let other = q.after(10, "persist");
        assert_eq!(p.on_timer(&mut q, other), None);
    }

    #[test]
    fn empty_timeline_cannot_play() {
        let mut p = TimelinePlayer::new(TimelineConfig::default());
        let mut q: TimerQueue<&str> = TimerQueue::new();
        p.open(entries(&["", ""]), &mut q);
        assert!(!p.play(&mut q, STEP));
        assert_eq!(p.progress_percent(), 0.0);
        assert_eq!(p.count_label(), "0 BeReal");
    }
}
