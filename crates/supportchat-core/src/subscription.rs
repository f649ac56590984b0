//! Inbound message subscribers
//!
//! A transport owns one `Subscribers` registry and dispatches every inbound
//! message to all registered handlers, in registration order.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::message::ChatMessage;

/// Callback invoked once per inbound message
pub type InboundHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    handlers: Vec<(SubscriptionId, InboundHandler)>,
}

/// Shared registry of inbound handlers
///
/// Cloning yields another handle to the same registry, so a transport can hand
/// a copy to its reader task.
#[derive(Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<SubscriberList>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SubscriberList> {
        // A handler that panicked must not take delivery down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a handler
    pub fn subscribe(&self, handler: InboundHandler) -> SubscriptionId {
        let mut list = self.lock();
        let id = SubscriptionId(list.next_id);
        list.next_id += 1;
        list.handlers.push((id, handler));
        id
    }

    /// Remove a handler, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut list = self.lock();
        let before = list.handlers.len();
        list.handlers.retain(|(existing, _)| *existing != id);
        list.handlers.len() != before
    }

    /// Deliver a message to every handler, returning how many were invoked
    ///
    /// Handlers run outside the registry lock so they may subscribe or
    /// unsubscribe while being called.
    pub fn dispatch(&self, message: &ChatMessage) -> usize {
        let handlers: Vec<InboundHandler> = self
            .lock()
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscribers")
            .field("handlers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientId;

    fn message(content: &str) -> ChatMessage {
        ChatMessage::local(ClientId::new("C1").unwrap(), content).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> InboundHandler {
        let log = Arc::clone(log);
        Arc::new(move |msg: &ChatMessage| {
            log.lock().unwrap().push(format!("{}:{}", tag, msg.content()));
        })
    }

    #[test]
    fn test_all_handlers_called_in_registration_order() {
        let subscribers = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        subscribers.subscribe(recorder(&log, "a"));
        subscribers.subscribe(recorder(&log, "b"));

        assert_eq!(subscribers.dispatch(&message("one")), 2);
        assert_eq!(subscribers.dispatch(&message("two")), 2);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:one", "b:one", "a:two", "b:two"]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let subscribers = Subscribers::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = subscribers.subscribe(recorder(&log, "a"));
        subscribers.subscribe(recorder(&log, "b"));

        assert!(subscribers.unsubscribe(first));
        assert!(!subscribers.unsubscribe(first));
        subscribers.dispatch(&message("x"));

        assert_eq!(*log.lock().unwrap(), vec!["b:x"]);
        assert_eq!(subscribers.len(), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let subscribers = Subscribers::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let registry = subscribers.clone();
        let own_id = Arc::clone(&slot);
        let id = subscribers.subscribe(Arc::new(move |_msg: &ChatMessage| {
            if let Some(id) = *own_id.lock().unwrap() {
                registry.unsubscribe(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        assert_eq!(subscribers.dispatch(&message("x")), 1);
        assert!(subscribers.is_empty());
    }
}
