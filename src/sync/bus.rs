// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cross-Tab Bus
//!
//! Same-origin broadcast channel between tabs. Each tab joins with its own
//! [`TabChannel`] and never receives its own messages. Delivery order per
//! sender is the channel's order; a receiver that falls behind skips the
//! oldest messages and keeps going.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::state::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabMessage {
    StateUpdate { state: SharedState },
}

#[derive(Debug, Clone)]
struct Envelope {
    from: TabId,
    message: TabMessage,
}

#[derive(Debug, Clone)]
pub struct CrossTabBus {
    tx: broadcast::Sender<Envelope>,
}

impl CrossTabBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attach a new tab.
    pub fn join(&self) -> TabChannel {
        TabChannel {
            id: TabId::new(),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn tab_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for CrossTabBus {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct TabChannel {
    id: TabId,
    tx: broadcast::Sender<Envelope>,
    rx: broadcast::Receiver<Envelope>,
}

impl TabChannel {
    pub fn id(&self) -> TabId {
        self.id
    }

    /// Send to every other tab. Returns how many tabs were reached.
    pub fn publish(&self, message: TabMessage) -> usize {
        let envelope = Envelope {
            from: self.id,
            message,
        };
        match self.tx.send(envelope) {
            Ok(receivers) => receivers.saturating_sub(1),
            Err(_) => 0,
        }
    }

    /// Next message from another tab. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<TabMessage> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.from == self.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(tab_id = %self.id, skipped, "Tab fell behind on the bus");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next pending message from another tab, without waiting.
    pub fn try_recv(&mut self) -> Option<TabMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(envelope) if envelope.from == self.id => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(tab_id = %self.id, skipped, "Tab fell behind on the bus");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for TabChannel {
    fn drop(&mut self) {
        debug!(tab_id = %self.id, "Tab left the bus");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::{AuthState, AuthTransition};

    fn update(authenticated: bool) -> TabMessage {
        TabMessage::StateUpdate {
            state: SharedState {
                auth: AuthState {
                    user: None,
                    is_authenticated: authenticated,
                },
                transition: Some(AuthTransition::Logout),
                ..SharedState::default()
            },
        }
    }

    #[tokio::test]
    async fn siblings_receive_but_sender_does_not() {
        let bus = CrossTabBus::default();
        let mut a = bus.join();
        let mut b = bus.join();
        let mut c = bus.join();

        assert_eq!(a.publish(update(false)), 2);

        assert_eq!(b.recv().await, Some(update(false)));
        assert_eq!(c.try_recv(), Some(update(false)));
        assert_eq!(a.try_recv(), None);
    }

    #[tokio::test]
    async fn per_sender_order_is_kept() {
        let bus = CrossTabBus::default();
        let a = bus.join();
        let mut b = bus.join();

        a.publish(update(true));
        a.publish(update(false));

        assert_eq!(b.recv().await, Some(update(true)));
        assert_eq!(b.recv().await, Some(update(false)));
    }

    #[test]
    fn lagging_tab_skips_to_recent_messages() {
        let bus = CrossTabBus::new(2);
        let a = bus.join();
        let mut b = bus.join();

        a.publish(update(true));
        a.publish(update(true));
        a.publish(update(false));

        // Oldest message was overwritten
        assert_eq!(b.try_recv(), Some(update(true)));
        assert_eq!(b.try_recv(), Some(update(false)));
        assert_eq!(b.try_recv(), None);
    }

    #[test]
    fn message_wire_format() {
        let value = serde_json::to_value(update(false)).unwrap();
        assert_eq!(value["type"], json!("STATE_UPDATE"));
        assert_eq!(value["state"]["auth"]["isAuthenticated"], json!(false));
    }

    #[test]
    fn tab_count_tracks_joins() {
        let bus = CrossTabBus::default();
        let a = bus.join();
        let b = bus.join();
        assert_eq!(bus.tab_count(), 2);
        drop(a);
        assert_eq!(bus.tab_count(), 1);
        drop(b);
    }
}
