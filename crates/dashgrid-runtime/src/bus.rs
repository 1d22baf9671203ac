#![forbid(unsafe_code)]

//! Typed publish/subscribe between widgets and the dashboard.
//!
//! Widgets never reach into the grid. They publish a [`DashboardEvent`]
//! (e.g. "remove me") and whoever owns the grid reacts. Handlers are held
//! weakly, so dropping the returned [`Subscription`] unsubscribes.
//!
//! # Invariants
//!
//! 1. Handlers run synchronously in registration order.
//! 2. No borrow is held while a handler runs; a handler may publish or
//!    subscribe re-entrantly. Handlers added during a publish see the next
//!    event, not the current one.
//! 3. A filtered handler only sees events of its [`EventKind`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::registry::Subscription;

type HandlerRc = Rc<dyn Fn(&DashboardEvent)>;
type HandlerWeak = Weak<dyn Fn(&DashboardEvent)>;

/// Which widget instances an event addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every instance.
    All,
    /// One instance id.
    Instance(String),
}

impl Scope {
    /// Whether an event with this scope concerns `instance_id`.
    #[must_use]
    pub fn includes(&self, instance_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Instance(id) => id == instance_id,
        }
    }
}

/// Events exchanged over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    /// A widget asks to be taken off the grid.
    WidgetRemovalRequested { id: String },
    /// An auxiliary collection (e.g. a custom list) changed.
    CollectionUpdated { collection_id: String, scope: Scope },
    /// The selected item `id` changed for the widgets in `scope`.
    SelectionChanged { id: String, scope: Scope },
}

impl DashboardEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::WidgetRemovalRequested { .. } => EventKind::WidgetRemovalRequested,
            Self::CollectionUpdated { .. } => EventKind::CollectionUpdated,
            Self::SelectionChanged { .. } => EventKind::SelectionChanged,
        }
    }
}

/// Discriminant of [`DashboardEvent`], used for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WidgetRemovalRequested,
    CollectionUpdated,
    SelectionChanged,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WidgetRemovalRequested => "widget_removal_requested",
            Self::CollectionUpdated => "collection_updated",
            Self::SelectionChanged => "selection_changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Handler {
    filter: Option<EventKind>,
    callback: HandlerWeak,
}

#[derive(Default)]
struct BusInner {
    handlers: Vec<Handler>,
    published: u64,
}

/// A single-threaded event bus. Clones share handlers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("handlers", &inner.handlers.len())
            .field("published", &inner.published)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event.
    pub fn subscribe(&self, handler: impl Fn(&DashboardEvent) + 'static) -> Subscription {
        self.register(None, handler)
    }

    /// Receive only events of `kind`.
    pub fn subscribe_kind(
        &self,
        kind: EventKind,
        handler: impl Fn(&DashboardEvent) + 'static,
    ) -> Subscription {
        self.register(Some(kind), handler)
    }

    fn register(
        &self,
        filter: Option<EventKind>,
        handler: impl Fn(&DashboardEvent) + 'static,
    ) -> Subscription {
        let strong: HandlerRc = Rc::new(handler);
        self.inner.borrow_mut().handlers.push(Handler {
            filter,
            callback: Rc::downgrade(&strong),
        });
        Subscription::new(strong)
    }

    /// Deliver `event` to matching handlers. Returns how many ran.
    pub fn publish(&self, event: DashboardEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<HandlerRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.published += 1;
            inner.handlers.retain(|h| h.callback.strong_count() > 0);
            inner
                .handlers
                .iter()
                .filter(|h| h.filter.is_none_or(|filter| filter == kind))
                .filter_map(|h| h.callback.upgrade())
                .collect()
        };
        trace!(kind = %kind, handlers = handlers.len(), "event published");
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Request removal of widget `id`.
    pub fn request_removal(&self, id: impl Into<String>) -> usize {
        self.publish(DashboardEvent::WidgetRemovalRequested { id: id.into() })
    }

    /// Live handler count.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner
            .borrow()
            .handlers
            .iter()
            .filter(|h| h.callback.strong_count() > 0)
            .count()
    }

    /// Events published since creation.
    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.inner.borrow().published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn handlers_receive_events_in_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::clone(&log);
        let second = Rc::clone(&log);
        let _a = bus.subscribe(move |_| first.borrow_mut().push("a"));
        let _b = bus.subscribe(move |_| second.borrow_mut().push("b"));
        assert_eq!(bus.request_removal("chart-1"), 2);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn kind_filter_skips_other_events() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let _sub = bus.subscribe_kind(EventKind::SelectionChanged, move |_| {
            seen.set(seen.get() + 1);
        });
        bus.request_removal("chart-1");
        bus.publish(DashboardEvent::SelectionChanged {
            id: "AAPL".into(),
            scope: Scope::Instance("chart-1".into()),
        });
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.published_count(), 2);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        let sub = bus.subscribe(move |_| seen.set(seen.get() + 1));
        bus.request_removal("a-1");
        drop(sub);
        assert_eq!(bus.request_removal("a-1"), 0);
        assert_eq!(hits.get(), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn handler_may_publish_reentrantly() {
        let bus = EventBus::new();
        let removals = Rc::new(RefCell::new(Vec::new()));
        let relay = bus.clone();
        let _relay = bus.subscribe_kind(EventKind::CollectionUpdated, move |event| {
            if let DashboardEvent::CollectionUpdated { collection_id, .. } = event {
                relay.request_removal(format!("list-{collection_id}"));
            }
        });
        let sink = Rc::clone(&removals);
        let _sink = bus.subscribe_kind(EventKind::WidgetRemovalRequested, move |event| {
            if let DashboardEvent::WidgetRemovalRequested { id } = event {
                sink.borrow_mut().push(id.clone());
            }
        });
        bus.publish(DashboardEvent::CollectionUpdated {
            collection_id: "7".into(),
            scope: Scope::All,
        });
        assert_eq!(*removals.borrow(), vec!["list-7".to_owned()]);
    }

    #[test]
    fn scope_matching() {
        assert!(Scope::All.includes("chart-1"));
        assert!(Scope::Instance("chart-1".into()).includes("chart-1"));
        assert!(!Scope::Instance("chart-1".into()).includes("chart-2"));
    }
}
