//! Debug assertion macros for ring counter invariants.
//!
//! Active in debug builds only; violating one of these is a bug in the
//! channel itself, never a recoverable runtime condition.

/// Assert the triple-index accounting after a counter update:
/// `start_index < capacity` and `awaiting_ack ≤ length ≤ capacity`.
macro_rules! debug_assert_ring_counts {
    ($c:expr) => {
        debug_assert!(
            $c.start_index < $c.capacity,
            "start index {} out of bounds (capacity {})",
            $c.start_index,
            $c.capacity
        );
        debug_assert!(
            $c.awaiting_ack <= $c.length,
            "awaiting-ack {} exceeds length {}",
            $c.awaiting_ack,
            $c.length
        );
        debug_assert!(
            $c.length <= $c.capacity,
            "length {} exceeds capacity {}",
            $c.length,
            $c.capacity
        );
    };
}

/// Assert that the statistics counters stay ordered: a record cannot be
/// read before it was written.
macro_rules! debug_assert_stats_ordered {
    ($c:expr) => {
        debug_assert!(
            $c.items_written >= $c.items_read,
            "items read {} exceeds items written {}",
            $c.items_read,
            $c.items_written
        );
    };
}

pub(crate) use debug_assert_ring_counts;
pub(crate) use debug_assert_stats_ordered;
