//! Lock/unlock transition signals.
//!
//! The UI redirects to an unlock screen on `Locked`; background features
//! (scheduled tasks and the like) pause until the next `Unlocked`.

use serde::Serialize;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Compartment {
    Main,
    Personal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LockReason {
    Explicit,
    Inactivity,
    Wiped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "reason")]
pub enum VaultEventKind {
    Unlocked,
    Locked(LockReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaultEvent {
    pub compartment: Compartment,
    pub kind: VaultEventKind,
}

#[derive(Debug)]
pub(crate) struct EventBus {
    compartment: Compartment,
    sender: broadcast::Sender<VaultEvent>,
}

impl EventBus {
    pub(crate) fn new(compartment: Compartment) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { compartment, sender }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn emit(&self, kind: VaultEventKind) {
        // No subscribers is fine.
        let _ = self.sender.send(VaultEvent {
            compartment: self.compartment,
            kind,
        });
    }
}

/// Lifecycle state of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VaultStatus {
    Uninitialized,
    Locked,
    Unlocked,
}
