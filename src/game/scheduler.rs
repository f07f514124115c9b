//! Per-room timers and one-shot resolution guards
//!
//! Every pending timer is a task handle stored under a [`TimerKey`]. Firing
//! delivers a [`TimerFired`] token back to the room task; the token carries the
//! generation it was armed with so a timer that was cancelled or re-armed after
//! its sleep completed is recognised as stale and dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::duel::DuelKey;

/// Identity of a pending room timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    SpawnWindow,
    ShrinkWarning,
    Shrink,
    MoveWindow,
    AnswerWindow,
    Duel(DuelKey),
    Missile(u64),
}

/// Delivered to the room when a timer expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub key: TimerKey,
    pub generation: u64,
}

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Cancelable timers owned by one room
#[derive(Debug)]
pub struct Scheduler {
    tx: Option<mpsc::UnboundedSender<TimerFired>>,
    pending: HashMap<TimerKey, PendingTimer>,
    next_generation: u64,
}

impl Scheduler {
    /// Timers fire into `tx`. Must be used from within a tokio runtime.
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            tx: Some(tx),
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Bookkeeping only: nothing fires on its own, expiry is driven by the owner
    pub fn manual() -> Self {
        Self {
            tx: None,
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arm `key` to fire after `delay`, replacing any timer already under it
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(key);
        self.next_generation += 1;
        let generation = self.next_generation;

        let handle = self.tx.as_ref().map(|tx| {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(TimerFired { key, generation });
            })
        });

        trace!(?key, generation, ?delay, "Timer armed");
        self.pending.insert(key, PendingTimer { generation, handle });
    }

    pub fn cancel(&mut self, key: TimerKey) -> bool {
        match self.pending.remove(&key) {
            Some(timer) => {
                if let Some(handle) = timer.handle {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.pending.drain() {
            if let Some(handle) = timer.handle {
                handle.abort();
            }
        }
    }

    /// Consume a fired token. Returns false for stale or cancelled timers.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.pending.get(&fired.key) {
            Some(timer) if timer.generation == fired.generation => {
                self.pending.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    /// The token the pending timer under `key` would deliver
    pub fn token(&self, key: TimerKey) -> Option<TimerFired> {
        self.pending.get(&key).map(|timer| TimerFired {
            key,
            generation: timer.generation,
        })
    }

    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.pending.contains_key(&key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Guard making a resolution step run exactly once per window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShot {
    fired: bool,
}

impl OneShot {
    /// Compare-and-set: true only for the first caller since the last reset
    pub fn try_fire(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn reset(&mut self) {
        self.fired = false;
    }
}
