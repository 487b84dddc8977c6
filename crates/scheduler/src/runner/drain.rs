use tokio::sync::oneshot;

use crate::handle::Drained;

use super::Scheduler;

impl Scheduler {
    /// Resolves once the backlog is empty; immediately if it already is.
    ///
    /// Tasks may still be running when this resolves. The waiter is
    /// registered when this is called, not when the signal is first polled.
    pub fn wait_for_empty(&self) -> Drained {
        let mut state = self.inner.state();
        if state.backlog.is_empty() {
            return Drained::ready();
        }
        // Signals dropped before firing leave closed senders behind.
        state.empty_waiters.retain(|tx| !tx.is_closed());
        let (tx, rx) = oneshot::channel();
        state.empty_waiters.push(tx);
        Drained::waiting(rx)
    }

    /// Resolves once no task is running; immediately if none is.
    ///
    /// After a task settles, idle waiters fire only when the backlog is also
    /// empty, so a paused scheduler with backlogged work does not count as
    /// idle until it is resumed or cleared.
    pub fn wait_for_idle(&self) -> Drained {
        let mut state = self.inner.state();
        if state.pending == 0 {
            return Drained::ready();
        }
        state.idle_waiters.retain(|tx| !tx.is_closed());
        let (tx, rx) = oneshot::channel();
        state.idle_waiters.push(tx);
        Drained::waiting(rx)
    }
}
