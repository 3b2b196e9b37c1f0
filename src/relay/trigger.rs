//! Flush Trigger Policy
//!
//! Decides, from the pending count returned by an append, whether a key
//! should flush now (size threshold) or arm a one-shot delay timer (first
//! row of a fresh accumulation cycle). The decision is evaluated outside
//! the buffer's lock; the trigger never re-enters the buffer, which
//! keeps the append path free of nested acquisition.
//!
//! Exactly one of {size flush, timer flush} wins per cycle: the engine
//! records the buffer's flush epoch when arming the timer, and a timer
//! that fires after the epoch has moved is a no-op.

use std::time::Duration;

/// What to do after an append returned the new pending count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Nothing to do; the row rides an already-armed cycle.
    None,
    /// Pending count reached the size threshold; flush on the calling task.
    Flush,
    /// First row of a fresh cycle; arm the one-shot delay timer so a
    /// low-traffic key still flushes within `max_delay`.
    ArmTimer,
}

/// Size/time flush policy shared by all keys.
#[derive(Debug, Clone, Copy)]
pub struct FlushTrigger {
    flush_threshold: usize,
    max_delay: Duration,
}

impl FlushTrigger {
    pub fn new(flush_threshold: usize, max_delay: Duration) -> Self {
        debug_assert!(
            flush_threshold > 0,
            "Precondition: flush_threshold must be positive"
        );
        FlushTrigger {
            flush_threshold,
            max_delay,
        }
    }

    /// Evaluate the trigger for the count returned by `KeyedBuffer::append`.
    pub fn after_append(&self, count_after: usize) -> FlushDecision {
        if count_after >= self.flush_threshold {
            FlushDecision::Flush
        } else if count_after == 1 {
            FlushDecision::ArmTimer
        } else {
            FlushDecision::None
        }
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_threshold_fires() {
        let trigger = FlushTrigger::new(3, Duration::from_millis(50));
        assert_eq!(trigger.after_append(2), FlushDecision::None);
        assert_eq!(trigger.after_append(3), FlushDecision::Flush);
        assert_eq!(trigger.after_append(7), FlushDecision::Flush);
    }

    #[test]
    fn test_first_row_arms_timer() {
        let trigger = FlushTrigger::new(100, Duration::from_millis(50));
        assert_eq!(trigger.after_append(1), FlushDecision::ArmTimer);
        assert_eq!(trigger.after_append(2), FlushDecision::None);
    }

    #[test]
    fn test_threshold_of_one_skips_timer() {
        // With a threshold of 1 every append flushes immediately; the
        // size trigger outranks timer arming.
        let trigger = FlushTrigger::new(1, Duration::from_millis(50));
        assert_eq!(trigger.after_append(1), FlushDecision::Flush);
    }
}
