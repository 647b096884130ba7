//! Observable keyed containers for component state, props and stores.
//!
//! Every write goes through [`ReactiveState::set`]; there is no implicit
//! interception. A write that changes a value notifies the process-wide
//! [`ListenerSet`] synchronously, then asks the owner's
//! [`RenderScheduler`] (if any) for a render.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::runtime::RenderScheduler;
use crate::value::{Value, ValueMap};

pub type ListenerId = usize;

type Listener = Rc<dyn Fn(&str, &str) + 'static>;

struct ListenerSetInner {
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_id: Cell<ListenerId>,
}

/// Append-only set of `(owner, key)` callbacks shared by every container.
#[derive(Clone)]
pub struct ListenerSet {
    inner: Rc<ListenerSetInner>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ListenerSetInner {
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&str, &str) + 'static) -> ListenerId {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn len(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every listener in registration order.
    ///
    /// Listeners registered while notifying are not called for this write.
    pub fn notify(&self, owner: &str, key: &str) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(owner, key);
        }
    }

    /// Drops every listener. Only used when the root context is torn down.
    pub fn clear(&self) {
        self.inner.listeners.borrow_mut().clear();
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

struct ReactiveInner {
    owner: String,
    values: RefCell<ValueMap>,
    listeners: ListenerSet,
    scheduler: Option<RenderScheduler>,
}

/// Cloneable handle to an observed key/value container.
#[derive(Clone)]
pub struct ReactiveState {
    inner: Rc<ReactiveInner>,
}

impl ReactiveState {
    /// Component flavor: writes notify listeners and schedule `scheduler`.
    pub fn for_component(
        owner: impl Into<String>,
        initial: ValueMap,
        listeners: ListenerSet,
        scheduler: RenderScheduler,
    ) -> Self {
        Self::build(owner.into(), initial, listeners, Some(scheduler))
    }

    /// Store flavor: writes only notify listeners.
    pub fn for_store(owner: impl Into<String>, initial: ValueMap, listeners: ListenerSet) -> Self {
        Self::build(owner.into(), initial, listeners, None)
    }

    fn build(
        owner: String,
        initial: ValueMap,
        listeners: ListenerSet,
        scheduler: Option<RenderScheduler>,
    ) -> Self {
        Self {
            inner: Rc::new(ReactiveInner {
                owner,
                values: RefCell::new(initial),
                listeners,
                scheduler,
            }),
        }
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn get(&self, key: &str) -> Value {
        self.inner
            .values
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.values.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> ValueMap {
        self.inner.values.borrow().clone()
    }

    /// Writes `value` under `key`.
    ///
    /// Returns `false`, without notifying anyone, when the stored value is
    /// already equal to `value`.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut values = self.inner.values.borrow_mut();
            if values.get(key) == Some(&value) {
                return false;
            }
            values.insert(key.to_owned(), value);
        }
        self.inner.listeners.notify(&self.inner.owner, key);
        if let Some(scheduler) = &self.inner.scheduler {
            scheduler.schedule();
        }
        true
    }

    /// Read-modify-write of one key; goes through [`set`](Self::set).
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> bool {
        let next = f(&self.get(key));
        self.set(key, next)
    }

    /// Removes `key`; a removal counts as a change.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.inner.values.borrow_mut().shift_remove(key).is_some();
        if removed {
            self.inner.listeners.notify(&self.inner.owner, key);
            if let Some(scheduler) = &self.inner.scheduler {
                scheduler.schedule();
            }
        }
        removed
    }

    pub fn scheduler(&self) -> Option<&RenderScheduler> {
        self.inner.scheduler.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReactiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveState")
            .field("owner", &self.inner.owner)
            .field("values", &*self.inner.values.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, TestScheduler};
    use crate::value_map;

    fn recording_listeners() -> (ListenerSet, Rc<RefCell<Vec<(String, String)>>>) {
        let listeners = ListenerSet::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        listeners.subscribe(move |owner, key| {
            sink.borrow_mut().push((owner.to_owned(), key.to_owned()));
        });
        (listeners, seen)
    }

    #[test]
    fn equal_write_is_a_noop() {
        let runtime = Runtime::new(Rc::new(TestScheduler::default()));
        let scheduler = RenderScheduler::new(runtime.handle());
        let (listeners, seen) = recording_listeners();
        let state = ReactiveState::for_component(
            "counter#1",
            value_map! { "count" => 0 },
            listeners,
            scheduler.clone(),
        );

        assert!(!state.set("count", 0));
        assert!(seen.borrow().is_empty());
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn write_notifies_synchronously_then_schedules() {
        let runtime = Runtime::new(Rc::new(TestScheduler::default()));
        let scheduler = RenderScheduler::new(runtime.handle());
        let (listeners, seen) = recording_listeners();
        let state = ReactiveState::for_component(
            "counter#1",
            value_map! { "count" => 0 },
            listeners,
            scheduler.clone(),
        );

        assert!(state.set("count", 1));
        assert_eq!(
            *seen.borrow(),
            vec![("counter#1".to_owned(), "count".to_owned())]
        );
        assert!(scheduler.is_pending());
        assert_eq!(state.get("count"), Value::from(1));
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let listeners = ListenerSet::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            listeners.subscribe(move |_, _| order.borrow_mut().push(tag));
        }
        let store = ReactiveState::for_store("cart", value_map! {}, listeners);
        store.set("items", 3);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn store_flavor_has_no_scheduler() {
        let (listeners, seen) = recording_listeners();
        let store = ReactiveState::for_store("cart", value_map! { "total" => 0 }, listeners);
        assert!(store.scheduler().is_none());
        store.update("total", |v| Value::from(v.to_number() + 5.0));
        assert_eq!(store.get("total"), Value::from(5));
        assert_eq!(seen.borrow().len(), 1);
    }
}
