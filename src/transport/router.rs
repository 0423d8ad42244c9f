//! Fanout of inbound frames to subscription callbacks.

use dashmap::DashMap;
use uuid::Uuid;

use super::{InboundMessage, MessageHandler};

/// Routes inbound messages to the callbacks subscribed to their destination.
///
/// One destination may carry several subscriptions; each registered callback
/// is invoked once per message. The table is cleared whenever the socket
/// drops, so stale registrations never outlive a connection.
#[derive(Default)]
pub struct RouteTable {
    /// destination -> [(subscription id, handler)]
    routes: DashMap<String, Vec<(Uuid, MessageHandler)>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
        }
    }

    /// Register a callback under a destination.
    pub fn insert(&self, destination: &str, id: Uuid, handler: MessageHandler) {
        self.routes
            .entry(destination.to_string())
            .or_default()
            .push((id, handler));
    }

    /// Remove one registration. Returns whether anything was removed.
    pub fn remove(&self, destination: &str, id: Uuid) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.routes.get_mut(destination) {
            let before = entry.len();
            entry.retain(|(sub_id, _)| *sub_id != id);
            removed = entry.len() != before;
        }
        self.routes.retain(|_, handlers| !handlers.is_empty());
        removed
    }

    /// Invoke every callback registered for the message's destination.
    ///
    /// Handlers are cloned out before invocation so user callbacks never run
    /// under the map's shard lock.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let handlers: Vec<MessageHandler> = match self.routes.get(&message.destination) {
            Some(entry) => entry.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };

        for handler in &handlers {
            handler(message.clone());
        }
        handlers.len()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.routes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Destinations with at least one live registration.
    pub fn destinations(&self) -> Vec<String> {
        self.routes.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn counting_handler(counter: Arc<AtomicUsize>) -> MessageHandler {
        Arc::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn msg(destination: &str) -> InboundMessage {
        InboundMessage {
            destination: destination.to_string(),
            body: "{}".to_string(),
        }
    }

    #[test]
    fn test_dispatch_reaches_all_handlers_for_destination() {
        let table = RouteTable::new();
        let hits = Arc::new(AtomicUsize::new(0));

        table.insert("/topic/rooms/1", Uuid::new_v4(), counting_handler(hits.clone()));
        table.insert("/topic/rooms/1", Uuid::new_v4(), counting_handler(hits.clone()));
        table.insert("/topic/rooms/2", Uuid::new_v4(), counting_handler(hits.clone()));

        let delivered = table.dispatch(&msg("/topic/rooms/1"));

        assert_eq!(delivered, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispatch_unknown_destination_is_noop() {
        let table = RouteTable::new();
        assert_eq!(table.dispatch(&msg("/topic/nowhere")), 0);
    }

    #[test]
    fn test_remove_stops_delivery() {
        let table = RouteTable::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let id = Uuid::new_v4();

        table.insert("/topic/rooms/1", id, counting_handler(hits.clone()));
        assert!(table.remove("/topic/rooms/1", id));
        assert!(!table.remove("/topic/rooms/1", id));

        assert_eq!(table.dispatch(&msg("/topic/rooms/1")), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let table = RouteTable::new();
        let hits = Arc::new(AtomicUsize::new(0));

        table.insert("/topic/rooms/1", Uuid::new_v4(), counting_handler(hits.clone()));
        table.insert("/topic/rooms/2", Uuid::new_v4(), counting_handler(hits));
        table.clear();

        assert!(table.is_empty());
        assert!(table.destinations().is_empty());
    }
}
