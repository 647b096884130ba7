use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::config::ComponentConfig;

/// Source of component configurations, looked up by tag.
pub trait ComponentRegistry {
    fn get(&self, id: &str) -> Option<ComponentConfig>;

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// Registry backed by an in-memory map. Redefining an id replaces the
/// previous configuration for instances created afterwards.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    configs: Rc<RefCell<IndexMap<String, ComponentConfig>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&self, config: ComponentConfig) -> &Self {
        log::debug!("defining component '{}'", config.id);
        self.configs
            .borrow_mut()
            .insert(config.id.to_ascii_lowercase(), config);
        self
    }

    pub fn remove(&self, id: &str) -> Option<ComponentConfig> {
        self.configs.borrow_mut().shift_remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.configs.borrow().keys().cloned().collect()
    }
}

impl ComponentRegistry for MemoryRegistry {
    fn get(&self, id: &str) -> Option<ComponentConfig> {
        self.configs.borrow().get(id).cloned()
    }

    fn contains(&self, id: &str) -> bool {
        self.configs.borrow().contains_key(id)
    }
}
