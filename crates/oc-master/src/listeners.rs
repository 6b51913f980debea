//! Publish/subscribe registry for project events.

use oc_ir::{EventKind, ProjectEvent};

/// Handle returned by [`Listeners::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Callback = Box<dyn FnMut(&ProjectEvent) + Send>;

struct Entry {
    id: ListenerId,
    /// `None` receives every event
    kind: Option<EventKind>,
    callback: Callback,
}

#[derive(Default)]
pub struct Listeners {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every event of `kind`.
    pub fn subscribe(&mut self, kind: EventKind, callback: Callback) -> ListenerId {
        self.insert(Some(kind), callback)
    }

    pub fn subscribe_all(&mut self, callback: Callback) -> ListenerId {
        self.insert(None, callback)
    }

    fn insert(&mut self, kind: Option<EventKind>, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, kind, callback });
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Deliver `event` to matching listeners in subscription order.
    pub fn emit(&mut self, event: &ProjectEvent) {
        let kind = event.kind();
        for entry in &mut self.entries {
            if entry.kind.map_or(true, |k| k == kind) {
                (entry.callback)(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn filtered_and_global_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::new();
        let s = Arc::clone(&seen);
        listeners.subscribe(EventKind::Play, Box::new(move |e| s.lock().unwrap().push(e.kind())));
        let s = Arc::clone(&seen);
        let all = listeners.subscribe_all(Box::new(move |e| s.lock().unwrap().push(e.kind())));

        listeners.emit(&ProjectEvent::Play { position: 0.0 });
        listeners.emit(&ProjectEvent::BpmChange { bpm: 90.0 });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::Play, EventKind::Play, EventKind::BpmChange]
        );

        assert!(listeners.unsubscribe(all));
        assert!(!listeners.unsubscribe(all));
        listeners.emit(&ProjectEvent::BpmChange { bpm: 100.0 });
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(listeners.len(), 1);
    }
}
