// ── Synchronization primitives ──
//
// Small single-slot cells shared between the state machine, the watch
// loop and the push-event handlers. None of them queue: each holds at
// most one value, and the newest write wins.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, oneshot, watch};

use crate::state::State;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── StateSignal ──────────────────────────────────────────────────────

/// Desired machine state plus a pending-change flag.
///
/// Change requests coalesce: only the latest state survives until the
/// machine next looks. `Exit` is sticky.
#[derive(Debug)]
pub struct StateSignal {
    inner: Mutex<(State, bool)>,
    notify: Notify,
}

impl StateSignal {
    pub fn new(initial: State) -> Self {
        Self {
            inner: Mutex::new((initial, false)),
            notify: Notify::new(),
        }
    }

    pub fn current(&self) -> State {
        lock(&self.inner).0
    }

    /// Request a transition and wake the machine.
    pub fn change(&self, state: State) {
        {
            let mut guard = lock(&self.inner);
            if guard.0 != State::Exit {
                guard.0 = state;
            }
            guard.1 = true;
        }
        self.notify.notify_one();
    }

    /// Drop the pending flag so the next `wait` suspends, unless a change
    /// to some other state arrived since `handled` was read.
    pub fn settle(&self, handled: State) {
        let mut guard = lock(&self.inner);
        if guard.0 == handled {
            guard.1 = false;
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.inner).1
    }

    /// Return once a change is pending. Returns immediately if one already is.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_pending() {
                return;
            }
            notified.await;
        }
    }
}

// ── AwaitableValue ───────────────────────────────────────────────────

/// A settable, clearable slot whose readers can wait until it is set.
#[derive(Debug)]
pub struct AwaitableValue<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> AwaitableValue<T> {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(None),
        }
    }

    pub fn set(&self, value: T) {
        self.tx.send_replace(Some(value));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Apply `f` to the held value, if any.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_if_modified(|slot| match slot {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        });
    }

    /// Wait until a value is present and return a copy of it.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl<T: Clone> Default for AwaitableValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── PendingSlot ──────────────────────────────────────────────────────

/// A single-use rendezvous: one side arms it and awaits the receiver, one
/// other side takes the sender and resolves it. Taking empties the slot,
/// so a value can resolve it at most once.
#[derive(Debug)]
pub struct PendingSlot<T> {
    slot: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> PendingSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Arm a fresh rendezvous, replacing any stale one.
    pub fn arm(&self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.slot) = Some(tx);
        rx
    }

    pub fn take(&self) -> Option<oneshot::Sender<T>> {
        lock(&self.slot).take()
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Drop an unresolved sender. Returns `false` when a resolver already
    /// took it.
    pub fn disarm(&self) -> bool {
        lock(&self.slot).take().is_some()
    }
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn exit_is_sticky() {
        let signal = StateSignal::new(State::Idle);
        signal.change(State::Exit);
        for state in [State::InventoryFetch, State::Idle, State::ChannelSwitch] {
            signal.change(state);
            assert_eq!(signal.current(), State::Exit);
        }
        assert!(signal.is_pending());
    }

    #[test]
    fn changes_coalesce_to_latest() {
        let signal = StateSignal::new(State::Idle);
        signal.change(State::InventoryFetch);
        signal.change(State::ChannelSwitch);
        assert_eq!(signal.current(), State::ChannelSwitch);
        signal.settle(State::ChannelSwitch);
        assert!(!signal.is_pending());
    }

    #[test]
    fn settle_keeps_a_newer_request_pending() {
        let signal = StateSignal::new(State::ChannelSwitch);
        signal.change(State::InventoryFetch);
        signal.settle(State::ChannelSwitch);
        assert!(signal.is_pending());
        assert_eq!(signal.current(), State::InventoryFetch);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_immediately_when_pending() {
        let signal = StateSignal::new(State::Idle);
        signal.change(State::GamesUpdate);
        tokio::time::timeout(Duration::from_millis(1), signal.wait())
            .await
            .expect("pending change should not block");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_suspends_until_changed() {
        let signal = Arc::new(StateSignal::new(State::Idle));
        let waiter = tokio::spawn({
            let signal = Arc::clone(&signal);
            async move { signal.wait().await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        signal.change(State::InventoryFetch);
        waiter.await.unwrap();
        assert_eq!(signal.current(), State::InventoryFetch);
    }

    #[tokio::test(start_paused = true)]
    async fn awaitable_value_blocks_until_set() {
        let cell = Arc::new(AwaitableValue::<u32>::new());
        let reader = tokio::spawn({
            let cell = Arc::clone(&cell);
            async move { cell.wait().await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!reader.is_finished());

        cell.set(7);
        assert_eq!(reader.await.unwrap(), 7);

        cell.clear();
        cell.clear();
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn update_only_touches_a_held_value() {
        let cell = AwaitableValue::<u32>::new();
        cell.update(|v| *v += 1);
        assert_eq!(cell.get(), None);
        cell.set(1);
        cell.update(|v| *v += 1);
        assert_eq!(cell.get(), Some(2));
    }

    #[tokio::test]
    async fn pending_slot_resolves_once() {
        let slot = PendingSlot::<bool>::new();
        let rx = slot.arm();
        assert!(slot.is_armed());

        let tx = slot.take().unwrap();
        assert!(slot.take().is_none(), "second resolver finds nothing");
        tx.send(true).unwrap();
        assert!(rx.await.unwrap());
    }

    #[tokio::test]
    async fn rearming_replaces_stale_rendezvous() {
        let slot = PendingSlot::<bool>::new();
        let stale = slot.arm();
        let fresh = slot.arm();
        assert!(stale.await.is_err());

        slot.take().unwrap().send(false).unwrap();
        assert!(!fresh.await.unwrap());
        assert!(!slot.disarm(), "sender was already taken");
        assert!(!slot.is_armed());

        let _rx = slot.arm();
        assert!(slot.disarm());
    }
}
