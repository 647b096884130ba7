//! Core runtime pieces for Trellis: values, expressions, reactive state,
//! render scheduling and tree reconciliation.

extern crate self as trellis_core;

pub mod collections;
pub mod diff;
pub mod dom;
pub mod error;
pub mod expr;
pub mod hash;
pub mod html;
pub mod platform;
pub mod reactive;
pub mod runtime;
pub mod store;
pub mod value;

pub use diff::{reconcile, reconcile_children, KEY_ATTRIBUTE};
pub use dom::{
    dispatch_event, Document, Event, EventHandler, EventKind, EventListenerId, MutationRecord,
    NodeData, NodeId,
};
pub use error::{EvalError, NodeError, StoreError};
pub use expr::{evaluate, try_evaluate, Scope};
pub use platform::RuntimeScheduler;
pub use reactive::{ListenerId, ListenerSet, ReactiveState};
pub use runtime::{DefaultScheduler, RenderScheduler, Runtime, RuntimeHandle, TurnReport};
pub use store::{Store, StoreContext, StoreDefinition, StoreRegistry, DEFAULT_STORE};
pub use value::{Value, ValueMap};

#[cfg(test)]
pub use runtime::TestScheduler;
