//! Layered event dispatch
//!
//! Each of container, connection, sender, and receiver carries its own
//! [`ListenerSet`]; they are composed per dispatch call into an ordered
//! target list rather than sharing an emitter base. `dispatch` emits on
//! the first target with a listener for the event, falling back to the
//! last target unconditionally so no event is silently dropped.

use crate::events::{Event, EventType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Boxed event handler.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Listener registry for one dispatch target.
#[derive(Default)]
pub struct ListenerSet {
    map: Mutex<HashMap<EventType, Vec<Listener>>>,
}

impl ListenerSet {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event`.
    pub fn register(&self, event: EventType, listener: impl Fn(&Event) + Send + Sync + 'static) {
        let mut map = match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(event).or_default().push(Arc::new(listener));
    }

    /// True if at least one handler is registered for `event`.
    pub fn has_listeners(&self, event: EventType) -> bool {
        let map = match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(&event).is_some_and(|v| !v.is_empty())
    }

    /// Invoke every handler registered for the event's type.
    ///
    /// Handlers are cloned out before invocation so a handler may
    /// register further listeners without deadlocking.
    pub fn emit(&self, event: &Event) {
        let listeners: Vec<Listener> = {
            let map = match self.map.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.get(&event.event_type()).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet").finish_non_exhaustive()
    }
}

/// Walk `targets` in order and emit `event` on the first one with a
/// registered listener; if none has one, emit on the last target so the
/// container backstop always sees it. Exactly one target receives the
/// emission. Returns whether any listener existed (diagnostics only).
pub fn dispatch(targets: &[&ListenerSet], event: &Event) -> bool {
    let kind = event.event_type();
    for (i, target) in targets.iter().enumerate() {
        let last = i == targets.len() - 1;
        if target.has_listeners(kind) {
            target.emit(event);
            return true;
        }
        if last {
            target.emit(event);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_listener(count: Arc<AtomicUsize>) -> impl Fn(&Event) + Send + Sync {
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    // Events need a payload handle; tests that only exercise dispatch
    // order live in the integration suite where real handles exist. Here
    // we cover the registry mechanics that need no payload.
    #[test]
    fn has_listeners_reflects_registration() {
        let set = ListenerSet::new();
        assert!(!set.has_listeners(EventType::Sendable));
        let count = Arc::new(AtomicUsize::new(0));
        set.register(EventType::Sendable, counter_listener(count));
        assert!(set.has_listeners(EventType::Sendable));
        assert!(!set.has_listeners(EventType::Message));
    }
}
