//! Component declaration surface.
//!
//! A [`ComponentConfig`] is registered once per component tag. Every
//! instance works on its own clone, which single-file sources and plugins
//! may rewrite without touching the registered original.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use trellis_core::{Event, StoreDefinition, Value, ValueMap};

use crate::controller::ComponentInstance;
use crate::error::ComponentError;
use crate::resources::{LinkKind, LinkSpec};
use crate::template::RenderContext;

pub type Hook = Rc<dyn Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static>;
pub type UpdateHook =
    Rc<dyn Fn(&ComponentInstance, &[String]) -> Result<(), ComponentError> + 'static>;
pub type Method =
    Rc<dyn Fn(&ComponentInstance, &Event) -> Result<(), ComponentError> + 'static>;
pub type RenderFn = Rc<dyn Fn(&RenderContext<'_>) -> Result<String, ComponentError> + 'static>;
pub type ErrorBoundary = Rc<dyn Fn(&str) -> String + 'static>;
pub type Plugin =
    Rc<dyn Fn(&ComponentInstance, &mut ComponentConfig) -> Result<(), ComponentError> + 'static>;

#[derive(Clone)]
pub enum RenderSource {
    /// Literal template with `{{ }}` interpolation.
    Template(String),
    /// Function returning markup; its output is interpolated as well.
    Function(RenderFn),
    /// Template fetched from an address while resources load.
    File(String),
}

impl fmt::Debug for RenderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderSource::Template(template) => f.debug_tuple("Template").field(template).finish(),
            RenderSource::Function(_) => f.write_str("Function(..)"),
            RenderSource::File(address) => f.debug_tuple("File").field(address).finish(),
        }
    }
}

#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub before_load: Option<Hook>,
    pub after_load: Option<Hook>,
    pub on_mount: Option<Hook>,
    pub on_update: Option<UpdateHook>,
    pub before_render: Option<Hook>,
    pub after_render: Option<Hook>,
    pub on_destroy: Option<Hook>,
}

impl LifecycleHooks {
    fn names(&self) -> Vec<&'static str> {
        [
            ("before_load", self.before_load.is_some()),
            ("after_load", self.after_load.is_some()),
            ("on_mount", self.on_mount.is_some()),
            ("on_update", self.on_update.is_some()),
            ("before_render", self.before_render.is_some()),
            ("after_render", self.after_render.is_some()),
            ("on_destroy", self.on_destroy.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

#[derive(Clone, Default)]
pub struct ComponentConfig {
    pub id: String,
    pub state: ValueMap,
    pub methods: IndexMap<String, Method>,
    pub render: Option<RenderSource>,
    pub store: Option<StoreDefinition>,
    pub sfc: Option<String>,
    pub links: Vec<LinkSpec>,
    pub error_boundary: Option<ErrorBoundary>,
    pub hooks: LifecycleHooks,
    /// Values descendants can look up with `inject`.
    pub provide: ValueMap,
    /// Scoped style applied by a single-file source.
    pub style: Option<String>,
}

impl ComponentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn state(mut self, state: ValueMap) -> Self {
        self.state = state;
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&ComponentInstance, &Event) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.render = Some(RenderSource::Template(template.into()));
        self
    }

    pub fn render_fn(
        mut self,
        render: impl Fn(&RenderContext<'_>) -> Result<String, ComponentError> + 'static,
    ) -> Self {
        self.render = Some(RenderSource::Function(Rc::new(render)));
        self
    }

    pub fn template_file(mut self, address: impl Into<String>) -> Self {
        self.render = Some(RenderSource::File(address.into()));
        self
    }

    pub fn store(mut self, store: StoreDefinition) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sfc(mut self, address: impl Into<String>) -> Self {
        self.sfc = Some(address.into());
        self
    }

    pub fn link(mut self, kind: LinkKind, address: impl Into<String>) -> Self {
        self.links.push(LinkSpec::new(kind, address));
        self
    }

    pub fn link_spec(mut self, link: LinkSpec) -> Self {
        self.links.push(link);
        self
    }

    pub fn error_boundary(mut self, boundary: impl Fn(&str) -> String + 'static) -> Self {
        self.error_boundary = Some(Rc::new(boundary));
        self
    }

    pub fn provide(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provide.insert(key.into(), value.into());
        self
    }

    pub fn before_load(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.before_load = Some(Rc::new(hook));
        self
    }

    pub fn after_load(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.after_load = Some(Rc::new(hook));
        self
    }

    pub fn on_mount(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.on_mount = Some(Rc::new(hook));
        self
    }

    pub fn on_update(
        mut self,
        hook: impl Fn(&ComponentInstance, &[String]) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.on_update = Some(Rc::new(hook));
        self
    }

    pub fn before_render(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.before_render = Some(Rc::new(hook));
        self
    }

    pub fn after_render(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.after_render = Some(Rc::new(hook));
        self
    }

    pub fn on_destroy(
        mut self,
        hook: impl Fn(&ComponentInstance) -> Result<(), ComponentError> + 'static,
    ) -> Self {
        self.hooks.on_destroy = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for ComponentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentConfig")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("render", &self.render)
            .field("store", &self.store.as_ref().map(|store| &store.name))
            .field("sfc", &self.sfc)
            .field("links", &self.links)
            .field("error_boundary", &self.error_boundary.is_some())
            .field("hooks", &self.hooks.names())
            .finish()
    }
}

/// Component tags are custom element names: they contain a hyphen.
pub fn is_component_tag(tag: &str) -> bool {
    tag.contains('-') && tag.starts_with(|c: char| c.is_ascii_alphabetic())
}
