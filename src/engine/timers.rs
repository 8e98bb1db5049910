use std::collections::BTreeMap;

/// Milliseconds on the host clock. Every component in the core is driven by
/// `update(now)` calls carrying this value; nothing reads the wall clock.
pub type Millis = u64;

/// Fixed-deadline timers ordered by (deadline, insertion order).
///
/// Timers that share a deadline fire in the order they were scheduled.
#[derive(Debug)]
pub struct TimerQueue<E> {
    entries: BTreeMap<(Millis, u64), E>,
    next_seq: u64,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Millis, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((at, seq), event);
    }

    /// Removes every pending timer matching the predicate.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&E) -> bool) {
        self.entries.retain(|_, event| !predicate(event));
    }

    /// Pops the earliest timer whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<E> {
        let (&(at, _), _) = self.entries.first_key_value()?;
        if at > now {
            return None;
        }
        self.entries.pop_first().map(|(_, event)| event)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_then_insertion_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(200, "late");
        timers.schedule(100, "first");
        timers.schedule(100, "second");

        assert!(timers.pop_due(99).is_none());
        assert_eq!(timers.pop_due(150), Some("first"));
        assert_eq!(timers.pop_due(150), Some("second"));
        assert!(timers.pop_due(150).is_none());
        assert_eq!(timers.pop_due(500), Some("late"));
        assert!(timers.pop_due(u64::MAX).is_none());
    }

    #[test]
    fn cancel_where_filters_by_payload() {
        let mut timers = TimerQueue::new();
        timers.schedule(10, 1);
        timers.schedule(10, 2);
        timers.schedule(10, 3);
        timers.cancel_where(|e| *e % 2 == 1);

        assert_eq!(timers.pop_due(10), Some(2));
        assert!(timers.pop_due(10).is_none());
    }

    #[test]
    fn cleared_timers_never_fire() {
        let mut timers = TimerQueue::new();
        timers.schedule(10, "gone");
        timers.clear();

        assert!(timers.pop_due(1_000).is_none());
    }
}
