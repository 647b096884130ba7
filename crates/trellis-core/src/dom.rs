//! In-memory document tree the framework mounts into.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Freed slots are
//! recycled; an id carries the generation of its slot, so an id that no
//! longer resolves always means "removed", even after its slot was reused.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::collections::map::HashMap;
use crate::error::NodeError;

/// Arena index plus the generation of the slot at that index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "{}", self.index)
        } else {
            write!(f, "{}v{}", self.index, self.generation)
        }
    }
}

pub type EventListenerId = usize;
pub type EventHandler = Rc<dyn Fn(&Event) + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Click,
    Input,
    Submit,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Click, EventKind::Input, EventKind::Submit];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "click" => Some(EventKind::Click),
            "input" => Some(EventKind::Input),
            "submit" => Some(EventKind::Submit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Input => "input",
            EventKind::Submit => "submit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub target: NodeId,
    /// Current value of the target for `input` events.
    pub value: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
    },
    Text(String),
}

/// Attribute change on an observed element, delivered once per turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub attribute: String,
}

struct NodeSlot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    component_host: bool,
    observed: bool,
}

impl NodeSlot {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            component_host: false,
            observed: false,
        }
    }
}

struct ArenaEntry {
    generation: u32,
    slot: Option<NodeSlot>,
}

fn resolve(nodes: &[ArenaEntry], id: NodeId) -> Option<&ArenaEntry> {
    nodes
        .get(id.index())
        .filter(|entry| entry.generation == id.generation && entry.slot.is_some())
}

struct ListenerEntry {
    node: NodeId,
    kind: EventKind,
    handler: EventHandler,
}

pub struct Document {
    nodes: Vec<ArenaEntry>,
    vacant: Vec<u32>,
    live: usize,
    root: NodeId,
    head: NodeId,
    body: NodeId,
    listeners: HashMap<EventListenerId, ListenerEntry>,
    next_listener: EventListenerId,
    records: Vec<MutationRecord>,
    mutations: u64,
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            vacant: Vec::new(),
            live: 0,
            root: NodeId::default(),
            head: NodeId::default(),
            body: NodeId::default(),
            listeners: HashMap::new(),
            next_listener: 1,
            records: Vec::new(),
            mutations: 0,
        };
        doc.root = doc.create_element("html");
        doc.head = doc.create_element("head");
        doc.body = doc.create_element("body");
        doc.attach(doc.root, doc.head, None);
        doc.attach(doc.root, doc.body, None);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Number of live nodes in the arena.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Arena slots allocated so far, live or vacant. Grows only when a
    /// node is created while no freed slot is waiting for reuse.
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of mutations applied to nodes connected to the root.
    /// Building detached trees does not count.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.into().to_ascii_lowercase(),
            attributes: IndexMap::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        let slot = Some(NodeSlot::new(data));
        if let Some(index) = self.vacant.pop() {
            let entry = &mut self.nodes[index as usize];
            entry.slot = slot;
            return NodeId {
                index,
                generation: entry.generation,
            };
        }
        let index = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.push(ArenaEntry {
            generation: 0,
            slot,
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot, NodeError> {
        resolve(&self.nodes, id)
            .and_then(|entry| entry.slot.as_ref())
            .ok_or(NodeError::Missing { id })
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot, NodeError> {
        self.nodes
            .get_mut(id.index())
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_mut())
            .ok_or(NodeError::Missing { id })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_ok()
    }

    pub fn data(&self, id: NodeId) -> Result<&NodeData, NodeError> {
        Ok(&self.slot(id)?.data)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Ok(NodeData::Element { tag, .. }) => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag(id).is_some()
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Ok(NodeData::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) -> Result<(), NodeError> {
        if let NodeData::Text(text) = &mut self.slot_mut(id)?.data {
            *text = value.into();
            self.touch(id);
            return Ok(());
        }
        let children = self.children(id).to_vec();
        for child in children {
            self.detach(child);
            self.free(child);
        }
        let text = self.create_text(value);
        self.attach(id, text, None);
        self.touch(id);
        Ok(())
    }

    pub fn attributes(&self, id: NodeId) -> Result<&IndexMap<String, String>, NodeError> {
        match &self.slot(id)?.data {
            NodeData::Element { attributes, .. } => Ok(attributes),
            NodeData::Text(_) => Err(NodeError::NotElement { id }),
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .ok()
            .and_then(|attributes| attributes.get(name))
            .map(String::as_str)
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), NodeError> {
        let value = value.into();
        let slot = self.slot_mut(id)?;
        let NodeData::Element { attributes, .. } = &mut slot.data else {
            return Err(NodeError::NotElement { id });
        };
        if attributes.get(name) == Some(&value) {
            return Ok(());
        }
        attributes.insert(name.to_owned(), value);
        let observed = slot.observed;
        self.record(id, name, observed);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool, NodeError> {
        let slot = self.slot_mut(id)?;
        let NodeData::Element { attributes, .. } = &mut slot.data else {
            return Err(NodeError::NotElement { id });
        };
        if attributes.shift_remove(name).is_none() {
            return Ok(false);
        }
        let observed = slot.observed;
        self.record(id, name, observed);
        Ok(true)
    }

    fn record(&mut self, id: NodeId, name: &str, observed: bool) {
        if observed {
            self.records.push(MutationRecord {
                target: id,
                attribute: name.to_owned(),
            });
        }
        self.touch(id);
    }

    /// Starts or stops queuing [`MutationRecord`]s for `id`.
    pub fn observe_attributes(&mut self, id: NodeId, observed: bool) {
        if let Ok(slot) = self.slot_mut(id) {
            slot.observed = observed;
        }
    }

    pub fn take_mutation_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn has_mutation_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn set_component_host(&mut self, id: NodeId, host: bool) {
        if let Ok(slot) = self.slot_mut(id) {
            slot.component_host = host;
        }
    }

    pub fn is_component_host(&self, id: NodeId) -> bool {
        self.slot(id).map(|slot| slot.component_host).unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).ok().and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id)
            .map(|slot| slot.children.as_slice())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn touch(&mut self, id: NodeId) {
        if self.is_connected(id) {
            self.mutations += 1;
        }
    }

    /// Links `child` under `parent` at `index` (or last). `child` must be
    /// detached.
    fn attach(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if let Ok(slot) = self.slot_mut(parent) {
            let index = index.unwrap_or(slot.children.len()).min(slot.children.len());
            slot.children.insert(index, child);
        }
        if let Ok(slot) = self.slot_mut(child) {
            slot.parent = Some(parent);
        }
    }

    fn detach(&mut self, child: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(child)?;
        let slot = self.slot_mut(parent).ok()?;
        let index = slot.children.iter().position(|&c| c == child)?;
        slot.children.remove(index);
        if let Ok(slot) = self.slot_mut(child) {
            slot.parent = None;
        }
        Some((parent, index))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        self.insert_before(parent, child, None)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), NodeError> {
        self.slot(parent)?;
        self.slot(child)?;
        if let Some((old_parent, _)) = self.detach(child) {
            self.touch(old_parent);
        }
        let index = match reference {
            Some(reference) => Some(
                self.children(parent)
                    .iter()
                    .position(|&c| c == reference)
                    .ok_or(NodeError::NotChild {
                        parent,
                        child: reference,
                    })?,
            ),
            None => None,
        };
        self.attach(parent, child, index);
        self.touch(parent);
        Ok(())
    }

    /// Unlinks `child` from `parent` without freeing it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        if self.parent(child) != Some(parent) {
            return Err(NodeError::NotChild { parent, child });
        }
        self.touch(parent);
        self.detach(child);
        Ok(())
    }

    /// Puts `new` where `old` was; `old` ends up detached.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new: NodeId,
        old: NodeId,
    ) -> Result<(), NodeError> {
        if self.parent(old) != Some(parent) {
            return Err(NodeError::NotChild { parent, child: old });
        }
        self.slot(new)?;
        self.detach(new);
        let (_, index) = self
            .detach(old)
            .ok_or(NodeError::NotChild { parent, child: old })?;
        self.attach(parent, new, Some(index));
        self.touch(parent);
        Ok(())
    }

    /// Sets the exact child list of `parent`. Previous children missing
    /// from `ordered` are detached (not freed).
    pub fn set_children(&mut self, parent: NodeId, ordered: &[NodeId]) -> Result<(), NodeError> {
        self.slot(parent)?;
        if self.children(parent) == ordered {
            return Ok(());
        }
        for &child in ordered {
            self.slot(child)?;
        }
        let previous = self.children(parent).to_vec();
        for child in previous {
            self.detach(child);
        }
        for &child in ordered {
            self.detach(child);
            self.attach(parent, child, None);
        }
        self.touch(parent);
        Ok(())
    }

    /// Detaches `id` and frees its whole subtree, including listeners.
    pub fn remove(&mut self, id: NodeId) -> Result<(), NodeError> {
        self.slot(id)?;
        if let Some(parent) = self.parent(id) {
            self.touch(parent);
        }
        self.detach(id);
        self.free(id);
        Ok(())
    }

    /// Frees `id` if nothing adopted it.
    pub fn release_detached(&mut self, id: NodeId) {
        if id != self.root && self.contains(id) && self.parent(id).is_none() {
            self.free(id);
        }
    }

    /// Frees the subtree of `id`; each freed slot moves to the next
    /// generation and waits for reuse.
    fn free(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(entry) = self
                .nodes
                .get_mut(current.index())
                .filter(|entry| entry.generation == current.generation)
            else {
                continue;
            };
            let Some(slot) = entry.slot.take() else {
                continue;
            };
            entry.generation = entry.generation.wrapping_add(1);
            self.vacant.push(current.index);
            self.live -= 1;
            stack.extend(slot.children);
        }
        let nodes = &self.nodes;
        self.listeners
            .retain(|_, entry| resolve(nodes, entry.node).is_some());
    }

    /// Preorder walk of `root`'s subtree, `root` included.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn find_all(
        &self,
        root: NodeId,
        mut predicate: impl FnMut(&Self, NodeId) -> bool,
    ) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| predicate(self, id))
            .collect()
    }

    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.find_all(root, |doc, id| doc.tag(id) == Some(tag))
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|node| self.text(node))
            .collect()
    }

    pub fn add_event_listener(
        &mut self,
        node: NodeId,
        kind: EventKind,
        handler: EventHandler,
    ) -> Result<EventListenerId, NodeError> {
        self.slot(node)?;
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, ListenerEntry { node, kind, handler });
        Ok(id)
    }

    pub fn remove_event_listener(&mut self, id: EventListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn listener_count_for(&self, node: NodeId) -> usize {
        self.listeners
            .values()
            .filter(|entry| entry.node == node)
            .count()
    }

    /// Handlers an event on `target` reaches, target first, then each
    /// ancestor. Registration order is kept per node.
    pub fn handlers_for(&self, kind: EventKind, target: NodeId) -> Vec<EventHandler> {
        let mut ids: Vec<(usize, EventListenerId)> = self
            .listeners
            .iter()
            .filter(|(_, entry)| entry.kind == kind)
            .filter_map(|(&id, entry)| {
                let depth = if entry.node == target {
                    Some(0)
                } else if self.is_ancestor(entry.node, target) {
                    Some(self.depth_between(entry.node, target))
                } else {
                    None
                };
                depth.map(|depth| (depth, id))
            })
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|(_, id)| self.listeners.get(&id))
            .map(|entry| Rc::clone(&entry.handler))
            .collect()
    }

    fn depth_between(&self, ancestor: NodeId, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                break;
            }
            depth += 1;
            cursor = self.parent(current);
        }
        depth
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.len())
            .field("listeners", &self.listeners.len())
            .field("mutations", &self.mutations)
            .finish()
    }
}

/// Delivers `event` to its handlers without holding the document borrow,
/// so handlers are free to read or mutate the document.
pub fn dispatch_event(document: &RefCell<Document>, event: &Event) -> usize {
    let handlers = document.borrow().handlers_for(event.kind, event.target);
    let count = handlers.len();
    for handler in handlers {
        handler(event);
    }
    count
}
