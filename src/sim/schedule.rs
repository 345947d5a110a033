//! Scheduled-event queue
//!
//! Timers (roulette steps, staggered stuck-peg removal, bomb fuses) are queued
//! here with a due tick and drained once per tick, before the physics step, so
//! they can never interleave with contact resolution. Ties on the same tick
//! fire in scheduling order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Deferred work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEvent {
    /// Remove one peg from a stuck ball's hit list
    RemoveStuckPeg { ball: u32, peg: u32 },
    /// Staggered removal finished; the ball may be judged again
    StuckCleanupDone { ball: u32 },
    /// Advance a roulette spin (stale spin ids are ignored)
    RouletteStep { spin: u32 },
    DetonateBomb { bomb: u32 },
}

#[derive(Debug, Clone)]
struct Entry {
    due: u64,
    seq: u64,
    event: ScheduledEvent,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    queue: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` to fire on or after tick `due`
    pub fn schedule_at(&mut self, due: u64, event: ScheduledEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Entry { due, seq, event }));
    }

    /// Pop every event due at or before `now`, in firing order
    pub fn drain_due(&mut self, now: u64) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due > now {
                break;
            }
            if let Some(Reverse(entry)) = self.queue.pop() {
                due.push(entry.event);
            }
        }
        due
    }

    /// Drop everything (hard restart)
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drains_in_due_then_insertion_order() {
        let mut schedule = Schedule::new();
        schedule.schedule_at(10, ScheduledEvent::DetonateBomb { bomb: 1 });
        schedule.schedule_at(5, ScheduledEvent::RouletteStep { spin: 1 });
        schedule.schedule_at(5, ScheduledEvent::RouletteStep { spin: 2 });

        assert!(schedule.drain_due(4).is_empty());
        assert_eq!(
            schedule.drain_due(5),
            vec![
                ScheduledEvent::RouletteStep { spin: 1 },
                ScheduledEvent::RouletteStep { spin: 2 },
            ]
        );
        assert_eq!(schedule.len(), 1);
        assert_eq!(
            schedule.drain_due(100),
            vec![ScheduledEvent::DetonateBomb { bomb: 1 }]
        );
        assert!(schedule.is_empty());
    }

    #[test]
    fn test_clear_abandons_pending_work() {
        let mut schedule = Schedule::new();
        for i in 0..4 {
            schedule.schedule_at(i, ScheduledEvent::StuckCleanupDone { ball: i as u32 });
        }
        schedule.clear();
        assert!(schedule.drain_due(u64::MAX).is_empty());
    }
}
