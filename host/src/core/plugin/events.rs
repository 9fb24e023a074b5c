//! Named event bus
//!
//! Generic pub/sub between the host and extensions. Emission walks a snapshot
//! of the listener list, so listeners may subscribe or unsubscribe (including
//! themselves) while an event is being delivered. A listener that fails or
//! panics is logged, written to the activity log when one is attached, and
//! the remaining listeners still run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use super::api::Notifier;
use super::hooks::{guarded, HandlerResult};

/// Extensions finished loading; payload `{loaded, failed}`
pub const EXTENSIONS_LOADED: &str = "extensions:loaded";
/// Registry was cleared
pub const EXTENSIONS_RESET: &str = "extensions:reset";
/// A file was opened; payload `{path, ext, handledBy}`
pub const FILE_OPEN: &str = "file:open";
/// A file was saved; payload `{path}`
pub const FILE_SAVE: &str = "file:save";
/// The active file changed; payload `{path}`
pub const FILE_CHANGE: &str = "file:change";
/// Normal theme switched; payload `{theme}`
pub const THEME_CHANGED: &str = "theme:changed";
/// A project folder was opened; payload `{path}`
pub const PROJECT_OPEN: &str = "project:open";

pub type Listener = Rc<dyn Fn(&Value) -> HandlerResult<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Delivery summary of one `emit`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    by_event: HashMap<String, Vec<(ListenerId, Option<String>, Listener)>>,
}

/// Cloneable handle to the host's listener table
#[derive(Clone, Default)]
pub struct EventBus {
    table: Rc<RefCell<ListenerTable>>,
    activity: Option<Notifier>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus whose listener failures are also written to `notifier`'s log
    pub fn with_activity_log(notifier: Notifier) -> Self {
        Self {
            table: Rc::default(),
            activity: Some(notifier),
        }
    }

    pub fn on(&self, event: &str, listener: impl Fn(&Value) -> HandlerResult<()> + 'static) -> ListenerId {
        self.subscribe(event, None, Rc::new(listener))
    }

    /// Subscribes on behalf of an extension; its listeners go away on reset
    pub fn on_for(
        &self,
        owner: &str,
        event: &str,
        listener: impl Fn(&Value) -> HandlerResult<()> + 'static,
    ) -> ListenerId {
        self.subscribe(event, Some(owner.to_string()), Rc::new(listener))
    }

    fn subscribe(&self, event: &str, owner: Option<String>, listener: Listener) -> ListenerId {
        let mut table = self.table.borrow_mut();
        table.next_id += 1;
        let id = ListenerId(table.next_id);
        table
            .by_event
            .entry(event.to_string())
            .or_default()
            .push((id, owner, listener));
        id
    }

    /// Removes one listener; returns whether it was subscribed
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut table = self.table.borrow_mut();
        let Some(listeners) = table.by_event.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        before != listeners.len()
    }

    /// Drops every listener registered on behalf of extensions
    pub fn remove_extension_listeners(&self) {
        let mut table = self.table.borrow_mut();
        for listeners in table.by_event.values_mut() {
            listeners.retain(|(_, owner, _)| owner.is_none());
        }
    }

    /// Drops the listeners one extension registered
    pub fn remove_listeners_of(&self, extension_id: &str) {
        let mut table = self.table.borrow_mut();
        for listeners in table.by_event.values_mut() {
            listeners.retain(|(_, owner, _)| owner.as_deref() != Some(extension_id));
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.table
            .borrow()
            .by_event
            .get(event)
            .map_or(0, Vec::len)
    }

    pub fn emit(&self, event: &str, payload: &Value) -> EmitReport {
        let snapshot: Vec<(ListenerId, Option<String>, Listener)> = self
            .table
            .borrow()
            .by_event
            .get(event)
            .cloned()
            .unwrap_or_default();

        let mut report = EmitReport::default();
        for (_, owner, listener) in snapshot {
            let who = owner.as_deref().unwrap_or("host");
            match guarded(who, event, || listener(payload)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    if let Some(activity) = &self.activity {
                        activity.log_error(&e.to_string());
                    }
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("EventBus")
            .field("events", &table.by_event.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plugin::hooks::HandlerError;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn listener_failures_reach_the_activity_log() {
        let notifier = Notifier::new();
        let bus = EventBus::with_activity_log(notifier.clone());
        bus.on_for("linter", FILE_SAVE, |_| Err(HandlerError::failed("lint crashed")));
        bus.on(FILE_SAVE, |_| Ok(()));

        let report = bus.emit(FILE_SAVE, &json!({"path": "a.py"}));
        assert_eq!(report, EmitReport { delivered: 1, failed: 1 });
        let line = notifier.last_log_line().unwrap();
        assert!(line.contains("ERROR"));
        assert!(line.contains("linter"));
        assert!(line.contains("lint crashed"));

        let quiet = EventBus::new();
        quiet.on("x", |_| Err(HandlerError::failed("ignored")));
        assert_eq!(quiet.emit("x", &Value::Null).failed, 1);
    }

    #[test]
    fn emit_delivers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.on(FILE_SAVE, move |_| {
                order.borrow_mut().push(i);
                Ok(())
            });
        }

        let report = bus.emit(FILE_SAVE, &json!({"path": "a.py"}));
        assert_eq!(report.delivered, 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_and_panicking_listeners_do_not_stop_others() {
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));

        for i in 0..5 {
            let calls = calls.clone();
            bus.on("x", move |_| {
                calls.set(calls.get() + 1);
                match i {
                    1 => Err(HandlerError::failed("boom")),
                    3 => panic!("listener {i} panicked"),
                    _ => Ok(()),
                }
            });
        }

        let report = bus.emit("x", &Value::Null);
        assert_eq!(calls.get(), 5);
        assert_eq!(report, EmitReport { delivered: 3, failed: 2 });
    }

    #[test]
    fn listener_can_remove_itself_during_emit() {
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

        let id = {
            let bus = bus.clone();
            let calls = calls.clone();
            let own_id = own_id.clone();
            bus.clone().on("once", move |_| {
                calls.set(calls.get() + 1);
                if let Some(id) = own_id.get() {
                    bus.off("once", id);
                }
                Ok(())
            })
        };
        own_id.set(Some(id));

        let counter = calls.clone();
        bus.on("once", move |_| {
            counter.set(counter.get() + 10);
            Ok(())
        });

        bus.emit("once", &Value::Null);
        bus.emit("once", &Value::Null);
        assert_eq!(calls.get(), 1 + 10 + 10);
        assert_eq!(bus.listener_count("once"), 1);
    }

    #[test]
    fn off_and_extension_cleanup() {
        let bus = EventBus::new();
        let host_id = bus.on(THEME_CHANGED, |_| Ok(()));
        bus.on_for("img", THEME_CHANGED, |_| Ok(()));
        assert_eq!(bus.listener_count(THEME_CHANGED), 2);

        bus.remove_extension_listeners();
        assert_eq!(bus.listener_count(THEME_CHANGED), 1);

        assert!(bus.off(THEME_CHANGED, host_id));
        assert!(!bus.off(THEME_CHANGED, host_id));
        assert!(!bus.off("unknown", host_id));
    }
}
