use std::collections::{hash_map::Entry, HashMap};

use relay_core::{MessageKey, RouteMessage};

/// Messages awaiting delivery, one entry per [`MessageKey`].
///
/// Not synchronized; every mutation goes through the owning
/// [`crate::ChainRuntime`]'s lock.
#[derive(Debug, Clone, Default)]
pub struct MessageCache {
    messages: HashMap<MessageKey, RouteMessage>,
}

impl MessageCache {
    /// Insert `message`, overwriting the entry with the same key
    pub fn add(&mut self, message: RouteMessage) {
        self.messages.insert(message.key(), message);
    }

    /// Insert `message` unless its key is already cached. Returns whether it
    /// was inserted.
    pub fn insert_if_absent(&mut self, message: RouteMessage) -> bool {
        match self.messages.entry(message.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(message);
                true
            }
        }
    }

    /// Remove the entry of `key`, if any
    pub fn remove(&mut self, key: &MessageKey) -> Option<RouteMessage> {
        self.messages.remove(key)
    }

    /// The entry of `key`
    pub fn get(&self, key: &MessageKey) -> Option<&RouteMessage> {
        self.messages.get(key)
    }

    /// Mutable access to the entry of `key`
    pub fn get_mut(&mut self, key: &MessageKey) -> Option<&mut RouteMessage> {
        self.messages.get_mut(key)
    }

    /// Number of cached messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Keys of all cached messages
    pub fn keys(&self) -> impl Iterator<Item = &MessageKey> {
        self.messages.keys()
    }

    /// All cached messages
    pub fn iter(&self) -> impl Iterator<Item = &RouteMessage> {
        self.messages.values()
    }
}

#[cfg(test)]
mod test {
    use relay_core::{EventType, Message};

    use super::*;

    fn route_message(sn: u64, data: &[u8]) -> RouteMessage {
        RouteMessage::new(Message {
            dst: "mock-2".into(),
            src: "mock-1".into(),
            sn,
            data: data.to_vec(),
            message_height: 15,
            event_type: EventType::EmitMessage,
            req_id: None,
        })
    }

    #[test]
    fn add_overwrites_same_key() {
        let mut cache = MessageCache::default();
        cache.add(route_message(1, b"first"));
        cache.add(route_message(1, b"second"));
        assert_eq!(cache.len(), 1);

        let key = MessageKey::new("mock-1".into(), 1);
        assert_eq!(cache.get(&key).unwrap().message.data, b"second");
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let mut cache = MessageCache::default();
        let mut existing = route_message(1, b"first");
        existing.set_processing();
        cache.add(existing);

        assert!(!cache.insert_if_absent(route_message(1, b"second")));
        assert!(cache.insert_if_absent(route_message(2, b"other")));
        assert_eq!(cache.len(), 2);

        let key = MessageKey::new("mock-1".into(), 1);
        let entry = cache.get(&key).unwrap();
        assert!(entry.processing);
        assert_eq!(entry.message.data, b"first");
    }

    #[test]
    fn remove() {
        let mut cache = MessageCache::default();
        cache.add(route_message(1, b""));
        cache.add(route_message(2, b""));

        let key = MessageKey::new("mock-1".into(), 1);
        assert!(cache.remove(&key).is_some());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key).is_none());

        assert!(cache.remove(&key).is_none());
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_empty());
    }
}
