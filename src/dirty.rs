//! Dirty-flag handshake.
//!
//! The producer sets a frame's McV dirty word to -1 (all ones) whenever it
//! changes the frame. The reader observes it once and writes 0 back. A
//! switch to a different frame than the one last serviced always counts as
//! a change.
//!
//! Two revisions of the reader disagree on what is reported, so both are
//! kept as named strategies.

/// Value reported for a changed frame when no raw flag is passed through.
pub const DIRTY: i32 = -1;

/// Value reported for an unchanged frame.
pub const CLEAN: i32 = 0;

/// How a dirty determination is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DirtyStrategy {
    /// Dirty iff the frame switched or the raw word is nonzero; reports
    /// `-1` / `0`.
    Consume,
    /// `-1` on a frame switch, otherwise the raw word itself; reports that
    /// value and clears whenever it is nonzero.
    #[default]
    RawValue,
}

/// Outcome of one dirty-flag query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyResult {
    /// Frame the query resolved to
    pub frame: i32,
    /// Whether the frame counts as changed (and the word was cleared)
    pub changed: bool,
    /// Status value as reported by the chosen strategy
    pub value: i32,
}

impl DirtyResult {
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.changed
    }
}

impl DirtyStrategy {
    /// Decide the outcome from the raw McV word.
    ///
    /// `switched` is true when `frame` differs from the last serviced frame.
    pub fn evaluate(self, frame: i32, switched: bool, raw: i32) -> DirtyResult {
        match self {
            Self::Consume => {
                let changed = switched || raw != 0;
                DirtyResult {
                    frame,
                    changed,
                    value: if changed { DIRTY } else { CLEAN },
                }
            }
            Self::RawValue => {
                let value = if switched { DIRTY } else { raw };
                DirtyResult {
                    frame,
                    changed: value != 0,
                    value,
                }
            }
        }
    }
}
