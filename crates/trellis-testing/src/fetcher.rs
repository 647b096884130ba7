//! In-memory collaborators for resource loading.

use std::cell::RefCell;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use indexmap::IndexMap;
use trellis_components::sfc::split_sfc;
use trellis_components::{Fetcher, LinkKind, ResourceError, SfcLoader, SfcParts};
use trellis_core::collections::map::{HashMap, HashSet};

#[derive(Default)]
struct FetcherState {
    bodies: HashMap<String, String>,
    calls: IndexMap<String, usize>,
    held: HashSet<String>,
    waiting: Vec<(String, oneshot::Sender<()>)>,
}

/// Fetcher serving bodies from a map. Counts requests per address and can
/// hold an address so its loads stay pending until released.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    state: Rc<RefCell<FetcherState>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, address: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(address, body);
        self
    }

    pub fn insert(&self, address: impl Into<String>, body: impl Into<String>) {
        self.state
            .borrow_mut()
            .bodies
            .insert(address.into(), body.into());
    }

    pub fn fetch_count(&self, address: &str) -> usize {
        self.state.borrow().calls.get(address).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.state.borrow().calls.values().sum()
    }

    /// Loads of `address` started from now on stay pending until
    /// [`release`](Self::release).
    pub fn hold(&self, address: impl Into<String>) {
        self.state.borrow_mut().held.insert(address.into());
    }

    /// Lets every pending load of `address` finish. Returns how many were
    /// waiting.
    pub fn release(&self, address: &str) -> usize {
        let ready: Vec<oneshot::Sender<()>> = {
            let mut state = self.state.borrow_mut();
            state.held.remove(address);
            let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.waiting)
                .into_iter()
                .partition(|(held, _)| held == address);
            state.waiting = waiting;
            ready.into_iter().map(|(_, sender)| sender).collect()
        };
        let count = ready.len();
        for sender in ready {
            let _ = sender.send(());
        }
        count
    }

    pub fn pending(&self, address: &str) -> usize {
        self.state
            .borrow()
            .waiting
            .iter()
            .filter(|(held, _)| held == address)
            .count()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(
        &self,
        kind: LinkKind,
        address: &str,
    ) -> LocalBoxFuture<'static, Result<String, ResourceError>> {
        let address = address.to_owned();
        let gate = {
            let mut state = self.state.borrow_mut();
            *state.calls.entry(address.clone()).or_insert(0) += 1;
            if state.held.contains(&address) {
                let (sender, receiver) = oneshot::channel();
                state.waiting.push((address.clone(), sender));
                Some(receiver)
            } else {
                None
            }
        };
        log::trace!("memory fetch of {kind} {address}");
        let state = Rc::clone(&self.state);
        async move {
            if let Some(gate) = gate {
                gate.await
                    .map_err(|_| ResourceError::Abandoned(address.clone()))?;
            }
            let body = state.borrow().bodies.get(&address).cloned();
            body.ok_or_else(|| ResourceError::fetch(&address, "not found"))
        }
        .boxed_local()
    }
}

/// Single-file component loader over a map of prepared parts.
#[derive(Clone, Default)]
pub struct MemorySfcLoader {
    parts: Rc<RefCell<HashMap<String, SfcParts>>>,
    loads: Rc<RefCell<IndexMap<String, usize>>>,
}

impl MemorySfcLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, address: impl Into<String>, parts: SfcParts) -> &Self {
        self.parts.borrow_mut().insert(address.into(), parts);
        self
    }

    /// Registers markup split the same way a fetched file would be.
    pub fn source(&self, address: impl Into<String>, source: &str) -> &Self {
        let address = address.into();
        let parts = split_sfc(source, &address);
        self.define(address, parts)
    }

    pub fn load_count(&self, address: &str) -> usize {
        self.loads.borrow().get(address).copied().unwrap_or(0)
    }
}

impl SfcLoader for MemorySfcLoader {
    fn load(&self, address: &str) -> LocalBoxFuture<'static, Result<SfcParts, ResourceError>> {
        *self
            .loads
            .borrow_mut()
            .entry(address.to_owned())
            .or_insert(0) += 1;
        let parts = self.parts.borrow().get(address).cloned();
        let result = parts.ok_or_else(|| ResourceError::fetch(address, "no such component file"));
        futures::future::ready(result).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn held_loads_wait_for_release() {
        let fetcher = MemoryFetcher::new().with("/a.css", "a {}");
        fetcher.hold("/a.css");
        let load = fetcher.fetch(LinkKind::Css, "/a.css");
        assert_eq!(fetcher.pending("/a.css"), 1);
        assert_eq!(fetcher.release("/a.css"), 1);
        assert_eq!(block_on(load), Ok("a {}".to_owned()));
        assert_eq!(fetcher.fetch_count("/a.css"), 1);
    }

    #[test]
    fn unknown_addresses_fail() {
        let fetcher = MemoryFetcher::new();
        let result = block_on(fetcher.fetch(LinkKind::Js, "/missing.js"));
        assert!(matches!(result, Err(ResourceError::Fetch { .. })));
    }
}
