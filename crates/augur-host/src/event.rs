//! Session status events.
//!
//! Replaces the listener-object pattern of older hosts with a tagged event
//! broadcast over plain mpsc channels: observers subscribe for a receiver
//! and senders whose receiver is gone are pruned on the next broadcast.

use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};

/// A session status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server process was launched and the session is usable.
    Started {
        /// Label of the session that started.
        label: String,
    },
    /// The session was torn down, explicitly or by stream closure.
    Stopped {
        /// Label of the session that stopped.
        label: String,
    },
}

/// Fan-out of [`SessionEvent`]s to any number of subscribers.
#[derive(Default)]
pub(crate) struct EventBroadcaster {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventBroadcaster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    pub(crate) fn subscribe(&self) -> Receiver<SessionEvent> {
        let (sender, receiver) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(sender);
        receiver
    }

    /// Delivers `event` to every live subscriber, dropping dead ones.
    pub(crate) fn broadcast(&self, event: &SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn started(label: &str) -> SessionEvent {
        SessionEvent::Started {
            label: label.to_owned(),
        }
    }

    #[rstest]
    fn delivers_to_every_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let first = broadcaster.subscribe();
        let second = broadcaster.subscribe();

        broadcaster.broadcast(&started("proj"));

        assert_eq!(first.try_recv(), Ok(started("proj")));
        assert_eq!(second.try_recv(), Ok(started("proj")));
    }

    #[rstest]
    fn prunes_dropped_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let kept = broadcaster.subscribe();
        drop(broadcaster.subscribe());

        broadcaster.broadcast(&started("proj"));
        broadcaster.broadcast(&started("proj"));

        assert_eq!(kept.iter().take(2).count(), 2);
    }

    #[rstest]
    fn broadcast_without_subscribers_is_fine() {
        let broadcaster = EventBroadcaster::new();

        broadcaster.broadcast(&started("proj"));
    }
}
