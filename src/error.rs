//! Registration errors.
//!
//! Sink failures are not listed here: they keep the sink's own
//! `embedded_io::Error` type and are returned from `Channel::poll`.

/// Failure to set up a channel, its terminators or the listener table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Fixed node, stack or table storage is exhausted
    #[error("fixed storage exhausted")]
    Capacity,
    /// Terminator patterns must contain at least one byte
    #[error("terminator pattern is empty")]
    EmptyPattern,
    /// Pattern is longer than the matcher's backtracking stack
    #[error("terminator pattern exceeds the maximum length")]
    PatternTooLong,
    /// The matcher is part-way through a match and cannot be extended
    #[error("matcher is not idle")]
    MatcherBusy,
}
