//! Shared constants.

/// Longest query or answer value (in bytes) accepted by the aggregator.
/// Records carrying anything longer are skipped wholesale.
pub const MAX_VALUE_LEN: usize = 1000;
