//! Wrapping 16-bit tick counter and the staleness filter built on it.
//!
//! Every outbound update is stamped with the sender's tick. Receivers keep
//! the last accepted tick per stream and discard anything not newer.
//!
//! The default comparison is a plain `candidate > last_accepted`. It does not
//! understand rollover: once a stream has accepted 65535, a following tick of
//! 0 is discarded as stale. [`TickOrdering::Wrapping`] is the opt-in fix,
//! comparing by signed distance over the 16-bit space instead.

/// Number of distinct tick values.
pub const TICK_MODULUS: u32 = 1 << 16;

/// How a candidate tick is compared against the last accepted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickOrdering {
    /// Strictly greater, no rollover handling.
    #[default]
    Strict,
    /// Fresh when the forward distance from `last` is in `1..=32767`.
    Wrapping,
}

impl TickOrdering {
    /// Whether `candidate` should replace `last_accepted` under this ordering.
    pub fn is_fresh(self, candidate: u16, last_accepted: u16) -> bool {
        match self {
            TickOrdering::Strict => is_fresh(candidate, last_accepted),
            TickOrdering::Wrapping => (candidate.wrapping_sub(last_accepted) as i16) > 0,
        }
    }
}

/// Reference freshness rule: strictly greater, no wraparound correction.
pub fn is_fresh(candidate: u16, last_accepted: u16) -> bool {
    candidate > last_accepted
}

/// Produces the tick stamped on each outbound update.
#[derive(Debug, Clone)]
pub struct TickSequencer {
    current: u16,
}

impl TickSequencer {
    /// Starts at 1 so the first stamped tick is fresh for a receiver whose
    /// filter still holds its initial 0.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Sequencer whose next stamped tick is `current`.
    pub fn starting_at(current: u16) -> Self {
        Self { current }
    }

    /// Returns the current tick, then advances modulo 65536.
    pub fn next(&mut self) -> u16 {
        let tick = self.current;
        self.current = self.current.wrapping_add(1);
        tick
    }

    /// Tick the next call to `next` will return.
    pub fn peek(&self) -> u16 {
        self.current
    }
}

impl Default for TickSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Last accepted tick of one logical stream.
#[derive(Debug, Clone)]
pub struct StaleFilter {
    last_accepted: u16,
    ordering: TickOrdering,
}

impl StaleFilter {
    pub fn new(ordering: TickOrdering) -> Self {
        Self::with_last_accepted(0, ordering)
    }

    /// Filter resuming from a known last accepted tick.
    pub fn with_last_accepted(last_accepted: u16, ordering: TickOrdering) -> Self {
        Self {
            last_accepted,
            ordering,
        }
    }

    /// Accepts `candidate` and advances if it is fresh. Stale candidates leave
    /// the filter untouched.
    pub fn accept(&mut self, candidate: u16) -> bool {
        if !self.ordering.is_fresh(candidate, self.last_accepted) {
            return false;
        }
        self.last_accepted = candidate;
        true
    }

    pub fn last_accepted(&self) -> u16 {
        self.last_accepted
    }

    pub fn ordering(&self) -> TickOrdering {
        self.ordering
    }
}

impl Default for StaleFilter {
    fn default() -> Self {
        Self::new(TickOrdering::Strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencer_returns_then_advances() {
        let mut sequencer = TickSequencer::new();
        assert_eq!(sequencer.next(), 1);
        assert_eq!(sequencer.next(), 2);
        assert_eq!(sequencer.peek(), 3);
    }

    #[test]
    fn test_sequencer_wraps() {
        let mut sequencer = TickSequencer::starting_at(u16::MAX);
        assert_eq!(sequencer.next(), 65535);
        assert_eq!(sequencer.next(), 0);
        assert_eq!(sequencer.next(), 1);
    }

    #[test]
    fn test_sequencer_full_cycle() {
        let mut sequencer = TickSequencer::starting_at(0);
        for _ in 0..TICK_MODULUS {
            sequencer.next();
        }
        assert_eq!(sequencer.peek(), 0);
    }

    #[test]
    fn test_strict_freshness() {
        assert!(!is_fresh(10, 10));
        assert!(!is_fresh(9, 10));
        assert!(is_fresh(11, 10));
        assert!(is_fresh(65535, 65534));
    }

    #[test]
    fn test_strict_rollover_is_stale() {
        assert!(!is_fresh(0, 65535));
        assert!(!TickOrdering::Strict.is_fresh(0, 65535));
    }

    #[test]
    fn test_wrapping_rollover_is_fresh() {
        let ordering = TickOrdering::Wrapping;
        assert!(ordering.is_fresh(0, 65535));
        assert!(ordering.is_fresh(5, 65530));
        assert!(!ordering.is_fresh(65535, 0));
        assert!(!ordering.is_fresh(7, 7));
        assert!(ordering.is_fresh(32767, 0));
        assert!(!ordering.is_fresh(32768, 0));
    }

    #[test]
    fn test_filter_rejects_equal_and_older() {
        let mut filter = StaleFilter::with_last_accepted(100, TickOrdering::Strict);
        assert!(!filter.accept(100));
        assert!(!filter.accept(50));
        assert_eq!(filter.last_accepted(), 100);

        assert!(filter.accept(101));
        assert_eq!(filter.last_accepted(), 101);
    }

    #[test]
    fn test_filter_accepts_up_to_max_then_rejects_zero() {
        let mut filter = StaleFilter::with_last_accepted(65534, TickOrdering::Strict);
        assert!(filter.accept(65535));
        assert!(!filter.accept(0));
        assert_eq!(filter.last_accepted(), 65535);
    }

    #[test]
    fn test_filter_initial_state() {
        let mut filter = StaleFilter::default();
        assert_eq!(filter.ordering(), TickOrdering::Strict);
        assert!(!filter.accept(0));
        assert!(filter.accept(1));
    }
}
