//! Shared put/get queue machinery.
//!
//! Every resource keeps two queues of pending operation events. After any
//! state-changing operation the owning resource runs a *pass* over the
//! affected queue: each entry is attempted in policy order, a progressed
//! entry (its event was succeeded) is removed and the pass continues, a
//! stalled entry ends the pass. Stopping at the first stalled entry is
//! what prevents a later request from overtaking an earlier one that is
//! still blocked; filter stores opt out of it because each waiter has its
//! own enabling condition.
//!
//! Passes chain through the event loop rather than recursion: every put
//! event carries a callback that runs a get pass when it completes, and
//! vice versa, so everything that can be satisfied in one simulation
//! instant is satisfied in that instant.

/// Result of attempting one queued operation.
pub(crate) enum Attempt {
    /// The entry's event was triggered; remove it from the queue.
    Progressed,
    /// The entry cannot complete yet.
    Stalled,
}

/// Run one pass over a queue embedded in `state`.
///
/// `len` reports the queue length, `attempt` tries the entry at an index,
/// `remove` drops a progressed entry. With `full_scan`, stalled entries
/// are skipped instead of ending the pass.
pub(crate) fn walk<S>(
    state: &mut S,
    len: impl Fn(&S) -> usize,
    mut attempt: impl FnMut(&mut S, usize) -> Attempt,
    remove: impl Fn(&mut S, usize),
    full_scan: bool,
) {
    let mut idx = 0;
    while idx < len(state) {
        match attempt(state, idx) {
            Attempt::Progressed => remove(state, idx),
            Attempt::Stalled => {
                if full_scan {
                    idx += 1;
                } else {
                    break;
                }
            }
        }
    }
}
