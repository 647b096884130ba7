//! Process-wide cache of linked resources (css, js and html).
//!
//! Loads are keyed by `type:address`. The first request for a key starts
//! the fetch; every later request, from any component, awaits the same
//! shared future. Each request holds one reference on the entry and the
//! entry (with anything injected for it) goes away when the last holder
//! releases it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use indexmap::IndexMap;
use trellis_core::collections::map::HashMap;
use trellis_core::NodeId;

use crate::error::ResourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Css,
    Js,
    Html,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Css => "css",
            LinkKind::Js => "js",
            LinkKind::Html => "html",
        }
    }

    /// Element injected into `head` for a loaded resource of this kind.
    pub fn element(self) -> &'static str {
        match self {
            LinkKind::Css => "style",
            LinkKind::Js => "script",
            LinkKind::Html => "template",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkSpec {
    pub kind: LinkKind,
    pub address: String,
    /// Extra attributes for the injected element.
    pub attributes: IndexMap<String, String>,
    /// Lazy links are skipped while mounting.
    pub lazy: bool,
}

impl LinkSpec {
    pub fn new(kind: LinkKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
            attributes: IndexMap::new(),
            lazy: false,
        }
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn cache_key(&self) -> String {
        cache_key(self.kind, &self.address)
    }
}

pub fn cache_key(kind: LinkKind, address: &str) -> String {
    format!("{}:{}", kind.as_str(), address)
}

/// Network collaborator.
pub trait Fetcher {
    fn fetch(
        &self,
        kind: LinkKind,
        address: &str,
    ) -> LocalBoxFuture<'static, Result<String, ResourceError>>;
}

/// Fetcher for hosts without network access; every fetch fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn fetch(
        &self,
        kind: LinkKind,
        address: &str,
    ) -> LocalBoxFuture<'static, Result<String, ResourceError>> {
        let err = ResourceError::fetch(address, format!("offline, cannot load {kind}"));
        futures::future::ready(Err(err)).boxed_local()
    }
}

pub type SharedLoad = Shared<LocalBoxFuture<'static, Result<String, ResourceError>>>;

struct CacheEntry {
    load: SharedLoad,
    refs: usize,
    injected: Option<NodeId>,
}

#[derive(Clone, Default)]
pub struct ResourceCache {
    entries: Rc<RefCell<HashMap<String, CacheEntry>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared load for `link`, starting it through `fetcher`
    /// only when no entry exists. Takes one reference on the entry.
    pub fn acquire(&self, fetcher: &dyn Fetcher, link: &LinkSpec) -> SharedLoad {
        let key = link.cache_key();
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(&key) {
            entry.refs += 1;
            return entry.load.clone();
        }
        log::debug!("fetching {key}");
        let load = fetcher.fetch(link.kind, &link.address).shared();
        entries.insert(
            key,
            CacheEntry {
                load: load.clone(),
                refs: 1,
                injected: None,
            },
        );
        load
    }

    /// Records the node injected for `key`. Returns `false` when one is
    /// already recorded, in which case the caller should not inject.
    pub fn mark_injected(&self, key: &str, node: NodeId) -> bool {
        match self.entries.borrow_mut().get_mut(key) {
            Some(entry) if entry.injected.is_none() => {
                entry.injected = Some(node);
                true
            }
            _ => false,
        }
    }

    pub fn is_injected(&self, key: &str) -> bool {
        self.entries
            .borrow()
            .get(key)
            .is_some_and(|entry| entry.injected.is_some())
    }

    /// Drops one reference. When it was the last, the entry is evicted and
    /// its injected node (if any) is returned for removal.
    pub fn release(&self, key: &str) -> Option<NodeId> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(key)?;
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs > 0 {
            return None;
        }
        log::debug!("evicting {key}");
        entries.remove(key).and_then(|entry| entry.injected)
    }

    /// Evicts everything; returns every injected node.
    pub fn clear(&self) -> Vec<NodeId> {
        self.entries
            .borrow_mut()
            .drain()
            .filter_map(|(_, entry)| entry.injected)
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn ref_count(&self, key: &str) -> usize {
        self.entries.borrow().get(key).map_or(0, |entry| entry.refs)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.borrow();
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        f.debug_struct("ResourceCache").field("keys", &keys).finish()
    }
}
