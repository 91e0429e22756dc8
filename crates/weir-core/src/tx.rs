//! All-or-nothing state transitions
//!
//! A mutating operation runs against a draft copy of the component state.
//! The draft replaces the live state only if the whole operation, including
//! its final token transfers, succeeds.

use crate::error::Result;

/// Run `op` on a draft of `state`; commit the draft only on `Ok`.
///
/// `op` must do its accounting first and its external transfers last, so a
/// failed transfer discards the accounting with it.
pub fn atomically<S, T, F>(state: &mut S, op: F) -> Result<T>
where
    S: Clone,
    F: FnOnce(&mut S) -> Result<T>,
{
    let mut draft = state.clone();
    let out = op(&mut draft)?;
    *state = draft;
    Ok(out)
}
