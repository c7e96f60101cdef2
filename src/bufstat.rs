//! The per-slot state machine described in spec.md §3.

/// State of a single frame-index slot within one stack (primary or
/// secondary).
///
/// Transitions: `Empty -> Alloc -> Tx -> (Rcvd ->)? Complete -> Empty`.
/// See spec.md §3's state table for the full entered-by/left-by mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufStat {
    /// Free to allocate.
    Empty,
    /// Reserved for an outstanding frame, not yet transmitted.
    Alloc,
    /// Transmitted, awaiting a reply.
    Tx,
    /// A reply was observed early while the caller awaited a different
    /// index; parked for later pickup.
    Rcvd,
    /// The reply has been consumed by the caller (or delivered from
    /// `Rcvd`).
    Complete,
}

impl Default for BufStat {
    fn default() -> Self {
        BufStat::Empty
    }
}
