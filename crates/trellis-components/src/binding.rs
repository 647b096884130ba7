//! `@event="method"` attribute binding.

use indexmap::IndexMap;
use trellis_core::{Document, EventHandler, EventKind, EventListenerId, NodeId};
#[cfg(test)]
use trellis_core::Event;

use crate::config::is_component_tag;

/// Elements a component owns: everything under its host except the
/// content of nested component hosts. Nested hosts themselves are listed
/// in both vectors, since the parent template may bind events on them.
#[derive(Debug, Default)]
pub(crate) struct OwnedNodes {
    pub elements: Vec<NodeId>,
    pub hosts: Vec<NodeId>,
}

pub(crate) fn scan_owned(doc: &Document, root: NodeId) -> OwnedNodes {
    let mut owned = OwnedNodes::default();
    let mut stack: Vec<NodeId> = doc.children(root).iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        let Some(tag) = doc.tag(node) else {
            continue;
        };
        owned.elements.push(node);
        if is_component_tag(tag) {
            owned.hosts.push(node);
            continue;
        }
        stack.extend(doc.children(node).iter().rev().copied());
    }
    owned
}

pub(crate) type BindingKey = (NodeId, EventKind, String);

/// Every `@click` / `@input` / `@submit` declaration on `elements`.
pub(crate) fn declared_events(doc: &Document, elements: &[NodeId]) -> Vec<BindingKey> {
    let mut declared = Vec::new();
    for &node in elements {
        let Ok(attributes) = doc.attributes(node) else {
            continue;
        };
        for (name, method) in attributes {
            let Some(kind) = name.strip_prefix('@').and_then(EventKind::from_name) else {
                continue;
            };
            let method = method.trim();
            if !method.is_empty() {
                declared.push((node, kind, method.to_owned()));
            }
        }
    }
    declared
}

/// Listeners one component registered, keyed by node, event and method.
/// Declarations naming an unknown method are remembered without a
/// listener so they are reported once.
#[derive(Debug, Default)]
pub(crate) struct EventBindings {
    entries: IndexMap<BindingKey, Option<EventListenerId>>,
}

impl EventBindings {
    /// Brings the bindings in line with `declared`: new declarations get a
    /// listener, vanished ones lose theirs.
    pub fn sync(
        &mut self,
        doc: &mut Document,
        declared: Vec<BindingKey>,
        is_known: impl Fn(&str) -> bool,
        mut make_handler: impl FnMut(&str) -> EventHandler,
    ) {
        let stale: Vec<BindingKey> = self
            .entries
            .keys()
            .filter(|key| !declared.contains(key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(Some(listener)) = self.entries.shift_remove(&key) {
                doc.remove_event_listener(listener);
            }
        }

        for key in declared {
            if self.entries.contains_key(&key) {
                continue;
            }
            let (node, kind, method) = &key;
            let listener = if is_known(method) {
                match doc.add_event_listener(*node, *kind, make_handler(method)) {
                    Ok(listener) => Some(listener),
                    Err(err) => {
                        log::warn!("cannot bind @{}=\"{method}\": {err}", kind.name());
                        None
                    }
                }
            } else {
                log::warn!("@{}=\"{method}\" names no method", kind.name());
                None
            };
            self.entries.insert(key, listener);
        }
    }

    pub fn clear(&mut self, doc: &mut Document) {
        for (_, listener) in self.entries.drain(..) {
            if let Some(listener) = listener {
                doc.remove_event_listener(listener);
            }
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|listener| listener.is_some()).count()
    }
}
