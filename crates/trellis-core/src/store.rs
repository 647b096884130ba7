//! Named reactive state bundles with actions and computed accessors.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::StoreError;
use crate::reactive::{ListenerSet, ReactiveState};
use crate::value::{Value, ValueMap};

/// Name of the store every component can reach without declaring it.
pub const DEFAULT_STORE: &str = "default";

pub type Action = Rc<dyn Fn(&StoreContext<'_>, &[Value]) -> Result<Value, StoreError> + 'static>;
pub type Computed = Rc<dyn Fn(&ReactiveState) -> Value + 'static>;

/// What an action sees: its own store's state and every registered store.
pub struct StoreContext<'a> {
    pub state: &'a ReactiveState,
    pub stores: &'a StoreRegistry,
}

#[derive(Clone, Default)]
pub struct StoreDefinition {
    pub name: String,
    pub state: ValueMap,
    pub actions: IndexMap<String, Action>,
    pub computed: IndexMap<String, Computed>,
}

impl StoreDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn state(mut self, state: ValueMap) -> Self {
        self.state = state;
        self
    }

    pub fn action(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&StoreContext<'_>, &[Value]) -> Result<Value, StoreError> + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Rc::new(action));
        self
    }

    pub fn computed(
        mut self,
        name: impl Into<String>,
        computed: impl Fn(&ReactiveState) -> Value + 'static,
    ) -> Self {
        self.computed.insert(name.into(), Rc::new(computed));
        self
    }
}

impl fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct StoreInner {
    name: String,
    state: ReactiveState,
    actions: IndexMap<String, Action>,
    computed: IndexMap<String, Computed>,
}

#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    pub fn new(definition: StoreDefinition, listeners: ListenerSet) -> Self {
        let state = ReactiveState::for_store(definition.name.clone(), definition.state, listeners);
        Self {
            inner: Rc::new(StoreInner {
                name: definition.name,
                state,
                actions: definition.actions,
                computed: definition.computed,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> &ReactiveState {
        &self.inner.state
    }

    /// Re-evaluated on every read; nothing is cached.
    pub fn computed(&self, name: &str) -> Option<Value> {
        self.inner
            .computed
            .get(name)
            .map(|computed| computed(&self.inner.state))
    }

    pub fn dispatch(
        &self,
        stores: &StoreRegistry,
        action: &str,
        args: &[Value],
    ) -> Result<Value, StoreError> {
        let handler = self
            .inner
            .actions
            .get(action)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAction {
                store: self.inner.name.clone(),
                action: action.to_owned(),
            })?;
        let context = StoreContext {
            state: &self.inner.state,
            stores,
        };
        handler(&context, args)
    }

    /// State entries followed by freshly computed accessors.
    pub fn to_value(&self) -> Value {
        let mut map = self.inner.state.snapshot();
        for (name, computed) in &self.inner.computed {
            map.insert(name.clone(), computed(&self.inner.state));
        }
        Value::Object(map)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state)
            .finish()
    }
}

/// Process-wide set of named stores, including the default store.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    stores: Rc<RefCell<IndexMap<String, Store>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, store: Store) -> Option<Store> {
        self.stores
            .borrow_mut()
            .insert(store.name().to_owned(), store)
    }

    pub fn get(&self, name: &str) -> Option<Store> {
        self.stores.borrow().get(name).cloned()
    }

    pub fn default_store(&self) -> Option<Store> {
        self.get(DEFAULT_STORE)
    }

    pub fn names(&self) -> Vec<String> {
        self.stores.borrow().keys().cloned().collect()
    }

    pub fn dispatch(&self, store: &str, action: &str, args: &[Value]) -> Result<Value, StoreError> {
        let target = self
            .get(store)
            .ok_or_else(|| StoreError::UnknownStore(store.to_owned()))?;
        target.dispatch(self, action, args)
    }

    /// Default store state (with computed values), used as the base layer
    /// when evaluating `:`-prefixed props.
    pub fn default_state(&self) -> ValueMap {
        match self.default_store().map(|store| store.to_value()) {
            Some(Value::Object(map)) => map,
            _ => ValueMap::new(),
        }
    }

    /// Every named store other than the default one, as `name -> value`.
    pub fn modules(&self) -> ValueMap {
        self.stores
            .borrow()
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_STORE)
            .map(|(name, store)| (name.clone(), store.to_value()))
            .collect()
    }

    pub fn clear(&self) {
        self.stores.borrow_mut().clear();
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("names", &self.names())
            .finish()
    }
}
