//! Component lifecycle controller and the root [`Framework`] context.
//!
//! A component moves through
//! `Constructed → Initializing → ResourcesLoading → Mounted → Destroyed`,
//! with `Errored` reachable from any step. Asynchronous steps run as tasks
//! on the runtime's local pool; after every await the instance checks it
//! is still alive before touching anything.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use indexmap::IndexMap;
use trellis_core::collections::map::HashMap;
use trellis_core::html::{escape_text, parse_fragment};
use trellis_core::{
    evaluate, reconcile_children, Document, Event, EventHandler, ListenerSet, NodeError, NodeId,
    ReactiveState, RenderScheduler, Runtime, RuntimeHandle, Scope, Store, StoreDefinition,
    StoreRegistry, TurnReport, Value, ValueMap, DEFAULT_STORE,
};

use crate::binding::{declared_events, scan_owned, EventBindings};
use crate::config::{ComponentConfig, Hook, LifecycleHooks, Plugin, RenderSource};
use crate::error::{ComponentError, ResourceError};
use crate::registry::ComponentRegistry;
use crate::resources::{Fetcher, LinkKind, LinkSpec, OfflineFetcher, ResourceCache, SharedLoad};
use crate::sanitize::{DefaultSanitizer, Sanitizer};
use crate::sfc::{self, SfcLoader};
use crate::template::{collect_slots, render_template, RenderContext, TemplateInput};

static NEXT_INSTANCE: AtomicUsize = AtomicUsize::new(1);

/// Class of the default inline error box.
pub const DEFAULT_ERROR_CLASS: &str = "trellis-error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Initializing,
    ResourcesLoading,
    Mounted,
    Errored,
    Destroyed,
}

pub struct FrameworkConfig {
    pub registry: Rc<dyn ComponentRegistry>,
    pub fetcher: Rc<dyn Fetcher>,
    pub sfc_loader: Option<Rc<dyn SfcLoader>>,
    pub sanitizer: Rc<dyn Sanitizer>,
    pub plugins: Vec<Plugin>,
    pub default_store: Option<StoreDefinition>,
    pub stores: Vec<StoreDefinition>,
    pub error_class: String,
}

impl FrameworkConfig {
    pub fn new(registry: Rc<dyn ComponentRegistry>) -> Self {
        Self {
            registry,
            fetcher: Rc::new(OfflineFetcher),
            sfc_loader: None,
            sanitizer: Rc::new(DefaultSanitizer),
            plugins: Vec::new(),
            default_store: None,
            stores: Vec::new(),
            error_class: DEFAULT_ERROR_CLASS.to_owned(),
        }
    }

    pub fn fetcher(mut self, fetcher: Rc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn sfc_loader(mut self, loader: Rc<dyn SfcLoader>) -> Self {
        self.sfc_loader = Some(loader);
        self
    }

    pub fn sanitizer(mut self, sanitizer: Rc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn plugin(
        mut self,
        plugin: impl Fn(&ComponentInstance, &mut ComponentConfig) -> Result<(), ComponentError>
            + 'static,
    ) -> Self {
        self.plugins.push(Rc::new(plugin));
        self
    }

    pub fn default_store(mut self, state: ValueMap) -> Self {
        self.default_store = Some(StoreDefinition::new(DEFAULT_STORE).state(state));
        self
    }

    pub fn default_store_definition(mut self, definition: StoreDefinition) -> Self {
        self.default_store = Some(StoreDefinition {
            name: DEFAULT_STORE.to_owned(),
            ..definition
        });
        self
    }

    pub fn store(mut self, definition: StoreDefinition) -> Self {
        self.stores.push(definition);
        self
    }

    pub fn error_class(mut self, class: impl Into<String>) -> Self {
        self.error_class = class.into();
        self
    }
}

struct FrameworkInner {
    document: Rc<RefCell<Document>>,
    runtime: RuntimeHandle,
    registry: Rc<dyn ComponentRegistry>,
    fetcher: Rc<dyn Fetcher>,
    sfc_loader: Option<Rc<dyn SfcLoader>>,
    sanitizer: Rc<dyn Sanitizer>,
    plugins: Vec<Plugin>,
    stores: StoreRegistry,
    listeners: ListenerSet,
    resources: ResourceCache,
    hosts: RefCell<HashMap<NodeId, Weak<InstanceInner>>>,
    roots: RefCell<IndexMap<NodeId, ComponentInstance>>,
    styles: RefCell<HashMap<String, NodeId>>,
    error_class: String,
}

/// Root context shared by every component of one application: registry,
/// stores, listener set, resource cache and collaborators.
#[derive(Clone)]
pub struct Framework {
    inner: Rc<FrameworkInner>,
}

impl Framework {
    pub fn new(
        document: Rc<RefCell<Document>>,
        runtime: RuntimeHandle,
        config: FrameworkConfig,
    ) -> Self {
        let listeners = ListenerSet::new();
        let stores = StoreRegistry::new();
        let default = config
            .default_store
            .unwrap_or_else(|| StoreDefinition::new(DEFAULT_STORE));
        stores.register(Store::new(default, listeners.clone()));
        for definition in config.stores {
            stores.register(Store::new(definition, listeners.clone()));
        }
        Self {
            inner: Rc::new(FrameworkInner {
                document,
                runtime,
                registry: config.registry,
                fetcher: config.fetcher,
                sfc_loader: config.sfc_loader,
                sanitizer: config.sanitizer,
                plugins: config.plugins,
                stores,
                listeners,
                resources: ResourceCache::new(),
                hosts: RefCell::new(HashMap::new()),
                roots: RefCell::new(IndexMap::new()),
                styles: RefCell::new(HashMap::new()),
                error_class: config.error_class,
            }),
        }
    }

    fn downgrade(&self) -> Weak<FrameworkInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.inner.document)
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.inner.runtime
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.inner.stores
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.inner.listeners
    }

    pub fn resources(&self) -> &ResourceCache {
        &self.inner.resources
    }

    pub fn registry(&self) -> &Rc<dyn ComponentRegistry> {
        &self.inner.registry
    }

    /// Mounts a root component on `host`, or returns the one already there.
    pub fn mount(&self, host: NodeId) -> ComponentInstance {
        if let Some(existing) = self.instance(host) {
            return existing;
        }
        let instance = ComponentInstance::create(self, host, None);
        self.inner
            .roots
            .borrow_mut()
            .insert(host, instance.clone());
        instance
    }

    /// Mounts every outermost component element under `root` that has no
    /// instance yet.
    pub fn mount_all(&self, root: NodeId) -> Vec<ComponentInstance> {
        let hosts = {
            let doc = self.inner.document.borrow();
            scan_owned(&doc, root).hosts
        };
        hosts
            .into_iter()
            .filter(|host| self.instance(*host).is_none())
            .map(|host| self.mount(host))
            .collect()
    }

    /// Like [`mount_all`](Self::mount_all), restricted to tags the registry
    /// knows.
    pub fn mount_registered(&self, root: NodeId) -> Vec<ComponentInstance> {
        let hosts = {
            let doc = self.inner.document.borrow();
            scan_owned(&doc, root)
                .hosts
                .into_iter()
                .filter(|host| {
                    doc.tag(*host)
                        .is_some_and(|tag| self.inner.registry.contains(tag))
                })
                .collect::<Vec<_>>()
        };
        hosts
            .into_iter()
            .filter(|host| self.instance(*host).is_none())
            .map(|host| self.mount(host))
            .collect()
    }

    /// Destroys the root component on `host`.
    pub fn unmount(&self, host: NodeId) -> bool {
        let root = self.inner.roots.borrow_mut().shift_remove(&host);
        match root {
            Some(root) => {
                root.destroy();
                true
            }
            None => false,
        }
    }

    pub fn instance(&self, host: NodeId) -> Option<ComponentInstance> {
        self.inner
            .hosts
            .borrow()
            .get(&host)
            .and_then(Weak::upgrade)
            .map(|inner| ComponentInstance { inner })
    }

    pub fn roots(&self) -> Vec<ComponentInstance> {
        self.inner.roots.borrow().values().cloned().collect()
    }

    /// Number of live component instances, roots and descendants.
    pub fn instance_count(&self) -> usize {
        self.inner
            .hosts
            .borrow()
            .values()
            .filter(|inner| inner.strong_count() > 0)
            .count()
    }

    /// Re-extracts props of every component whose host attributes changed
    /// since the last call. Returns how many components saw a change.
    pub fn deliver_mutations(&self) -> usize {
        let records = self.inner.document.borrow_mut().take_mutation_records();
        let mut targets: Vec<NodeId> = Vec::new();
        for record in records {
            if !targets.contains(&record.target) {
                targets.push(record.target);
            }
        }
        targets
            .into_iter()
            .filter_map(|host| self.instance(host))
            .filter(|instance| !instance.refresh_props().is_empty())
            .count()
    }

    /// One turn: poll tasks, deliver attribute mutations, drain renders.
    pub fn run_turn(&self, runtime: &Runtime) -> TurnReport {
        let tasks_completed = runtime.poll_tasks();
        self.deliver_mutations();
        let renders = runtime.drain_renders();
        TurnReport {
            tasks_completed,
            renders,
        }
    }

    pub fn has_pending_mutations(&self) -> bool {
        self.inner.document.borrow().has_mutation_records()
    }

    /// Destroys every root, evicts the resource cache and removes injected
    /// styles. Listeners are dropped last.
    pub fn shutdown(&self) {
        let roots: Vec<ComponentInstance> = self
            .inner
            .roots
            .borrow_mut()
            .drain(..)
            .map(|(_, root)| root)
            .collect();
        for root in roots {
            root.destroy();
        }
        let mut injected = self.inner.resources.clear();
        injected.extend(self.inner.styles.borrow_mut().drain().map(|(_, node)| node));
        {
            let mut doc = self.inner.document.borrow_mut();
            for node in injected {
                if doc.contains(node) {
                    let _ = doc.remove(node);
                }
            }
        }
        self.inner.listeners.clear();
        log::debug!("framework shut down");
    }

    fn inject_resource(&self, link: &LinkSpec, body: &str) -> Result<(), NodeError> {
        let key = link.cache_key();
        let resources = &self.inner.resources;
        if !resources.contains(&key) || resources.is_injected(&key) {
            return Ok(());
        }
        let mut doc = self.inner.document.borrow_mut();
        let node = doc.create_element(link.kind.element());
        doc.set_attribute(node, "data-href", link.address.as_str())?;
        for (name, value) in &link.attributes {
            doc.set_attribute(node, name, value.as_str())?;
        }
        let text = doc.create_text(body);
        doc.append_child(node, text)?;
        let head = doc.head();
        doc.append_child(head, node)?;
        resources.mark_injected(&key, node);
        Ok(())
    }

    fn inject_scoped_style(&self, token: &str, css: &str) -> Result<(), NodeError> {
        if self.inner.styles.borrow().contains_key(token) {
            return Ok(());
        }
        let mut doc = self.inner.document.borrow_mut();
        let node = doc.create_element("style");
        doc.set_attribute(node, "data-scope", token)?;
        let text = doc.create_text(css);
        doc.append_child(node, text)?;
        let head = doc.head();
        doc.append_child(head, node)?;
        self.inner.styles.borrow_mut().insert(token.to_owned(), node);
        Ok(())
    }

    /// Scope for `:`-prefixed props: default store state, then modules.
    fn prop_scope(&self) -> Scope {
        Scope::merged(&self.inner.stores.default_state(), &self.inner.stores.modules())
    }
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("roots", &self.inner.roots.borrow().len())
            .field("instances", &self.instance_count())
            .field("stores", &self.inner.stores)
            .field("resources", &self.inner.resources)
            .finish()
    }
}

struct InstanceInner {
    uid: String,
    tag: String,
    host: NodeId,
    framework: Weak<FrameworkInner>,
    parent: Option<Weak<InstanceInner>>,
    phase: Cell<Phase>,
    alive: Cell<bool>,
    config: RefCell<ComponentConfig>,
    state: RefCell<ReactiveState>,
    props: ReactiveState,
    store: RefCell<Option<Store>>,
    scheduler: RenderScheduler,
    slots: IndexMap<String, String>,
    file_template: RefCell<Option<String>>,
    children: RefCell<IndexMap<NodeId, ComponentInstance>>,
    bindings: RefCell<EventBindings>,
    held_resources: RefCell<Vec<String>>,
    error: RefCell<Option<String>>,
    renders: Cell<usize>,
}

/// Handle to one mounted component. Cloning shares the instance.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Rc<InstanceInner>,
}

impl ComponentInstance {
    /// Constructs an instance for `host` and queues its lifecycle.
    pub fn create(framework: &Framework, host: NodeId, parent: Option<&ComponentInstance>) -> Self {
        let document = framework.document();
        let (tag, slots, initial_props) = {
            let doc = document.borrow();
            let tag = doc.tag(host).unwrap_or_default().to_owned();
            let slots = collect_slots(&doc, host, framework.inner.sanitizer.as_ref());
            let props = extract_props(framework, &doc, host);
            (tag, slots, props)
        };
        let uid = format!("{tag}#{}", NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed));
        let listeners = framework.inner.listeners.clone();
        let scheduler = RenderScheduler::new(framework.inner.runtime.clone());
        let props = ReactiveState::for_component(
            format!("{uid}:props"),
            initial_props,
            listeners.clone(),
            scheduler.clone(),
        );
        let state = ReactiveState::for_component(
            uid.clone(),
            ValueMap::new(),
            listeners,
            scheduler.clone(),
        );
        {
            let mut doc = document.borrow_mut();
            doc.set_component_host(host, true);
            doc.observe_attributes(host, true);
        }

        let inner = Rc::new(InstanceInner {
            uid,
            tag: tag.clone(),
            host,
            framework: framework.downgrade(),
            parent: parent.map(|parent| Rc::downgrade(&parent.inner)),
            phase: Cell::new(Phase::Constructed),
            alive: Cell::new(true),
            config: RefCell::new(ComponentConfig::new(tag)),
            state: RefCell::new(state),
            props,
            store: RefCell::new(None),
            scheduler,
            slots,
            file_template: RefCell::new(None),
            children: RefCell::new(IndexMap::new()),
            bindings: RefCell::new(EventBindings::default()),
            held_resources: RefCell::new(Vec::new()),
            error: RefCell::new(None),
            renders: Cell::new(0),
        });
        let weak = Rc::downgrade(&inner);
        inner.scheduler.set_render(move || {
            if let Some(inner) = weak.upgrade() {
                ComponentInstance { inner }.scheduled_render();
            }
        });
        framework
            .inner
            .hosts
            .borrow_mut()
            .insert(host, Rc::downgrade(&inner));

        let instance = Self { inner };
        log::debug!("{}: constructed on node {host}", instance.id());
        let task = instance.clone();
        if !framework
            .inner
            .runtime
            .spawn_local(async move { task.run_lifecycle().await })
        {
            log::error!("{}: runtime is gone, lifecycle not started", instance.id());
        }
        instance
    }

    /// Namespace-qualified identity, e.g. `todo-item#12`.
    pub fn id(&self) -> &str {
        &self.inner.uid
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn host(&self) -> NodeId {
        self.inner.host
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase.get()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.phase() == Phase::Mounted
    }

    pub fn state(&self) -> ReactiveState {
        self.inner.state.borrow().clone()
    }

    pub fn props(&self) -> ReactiveState {
        self.inner.props.clone()
    }

    pub fn prop(&self, key: &str) -> Value {
        self.inner.props.get(key)
    }

    /// The component's local store, if its configuration declares one.
    pub fn store(&self) -> Option<Store> {
        self.inner.store.borrow().clone()
    }

    pub fn framework(&self) -> Option<Framework> {
        self.inner
            .framework
            .upgrade()
            .map(|inner| Framework { inner })
    }

    pub fn document(&self) -> Option<Rc<RefCell<Document>>> {
        self.framework().map(|framework| framework.document())
    }

    pub fn parent(&self) -> Option<ComponentInstance> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| ComponentInstance { inner })
    }

    pub fn children(&self) -> Vec<ComponentInstance> {
        self.inner.children.borrow().values().cloned().collect()
    }

    pub fn render_count(&self) -> usize {
        self.inner.renders.get()
    }

    /// Message shown by the error display, while errored.
    pub fn error(&self) -> Option<String> {
        self.inner.error.borrow().clone()
    }

    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    pub fn request_render(&self) {
        self.inner.scheduler.schedule();
    }

    pub fn is_render_pending(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    /// Runs `action` on the local store when it carries `store`'s name,
    /// otherwise on the registered store of that name.
    pub fn dispatch(
        &self,
        store: &str,
        action: &str,
        args: &[Value],
    ) -> Result<Value, ComponentError> {
        let framework = self.require_framework()?;
        let stores = framework.stores();
        let local = self.store().filter(|local| local.name() == store);
        let result = match local {
            Some(local) => local.dispatch(stores, action, args),
            None => stores.dispatch(store, action, args),
        };
        Ok(result?)
    }

    /// Nearest value provided under `key` by this component or an ancestor.
    pub fn inject(&self, key: &str) -> Value {
        let mut cursor = Some(self.clone());
        while let Some(instance) = cursor {
            if let Some(value) = instance.inner.config.borrow().provide.get(key) {
                return value.clone();
            }
            cursor = instance.parent();
        }
        Value::Undefined
    }

    /// Calls the method `name` as an event handler would.
    pub fn invoke(&self, name: &str, event: &Event) -> Result<(), ComponentError> {
        let method = self
            .inner
            .config
            .borrow()
            .methods
            .get(name)
            .cloned()
            .ok_or_else(|| ComponentError::UnknownMethod(name.to_owned()))?;
        method(self, event)
    }

    /// Starts loading the links declared lazy. Returns `false` when the
    /// runtime is gone.
    pub fn load_lazy(&self) -> bool {
        let Some(framework) = self.framework() else {
            return false;
        };
        let instance = self.clone();
        framework.inner.runtime.spawn_local(async move {
            if let Err(err) = instance.load_links(true).await {
                log::error!("{}: lazy resources failed: {err}", instance.id());
            }
        })
    }

    fn require_framework(&self) -> Result<Framework, ComponentError> {
        self.framework()
            .ok_or_else(|| ComponentError::msg("framework has been dropped"))
    }

    /// `Destroyed` is final.
    fn set_phase(&self, phase: Phase) {
        let previous = self.inner.phase.get();
        if previous == phase || previous == Phase::Destroyed {
            return;
        }
        self.inner.phase.set(phase);
        log::debug!("{}: {previous:?} -> {phase:?}", self.id());
    }

    /// Destroyed or showing the error display; lifecycle work stops here.
    fn is_halted(&self) -> bool {
        !self.is_alive() || self.phase() == Phase::Errored
    }

    async fn run_lifecycle(self) {
        if let Err(err) = self.lifecycle().await {
            if !self.is_halted() {
                self.fail(err);
            }
        }
    }

    async fn lifecycle(&self) -> Result<(), ComponentError> {
        if self.is_halted() {
            log::debug!("{}: lifecycle skipped while {:?}", self.id(), self.phase());
            return Ok(());
        }
        let framework = self.require_framework()?;
        self.set_phase(Phase::Initializing);
        let mut config = framework
            .inner
            .registry
            .get(&self.inner.tag)
            .ok_or_else(|| ComponentError::ConfigurationMissing(self.inner.tag.clone()))?;

        if let Some(address) = config.sfc.clone() {
            let loader = framework
                .inner
                .sfc_loader
                .clone()
                .ok_or_else(|| ResourceError::NoSfcLoader(address.clone()))?;
            let parts = loader.load(&address).await?;
            if self.is_halted() {
                return Ok(());
            }
            let token = parts.scope_token.clone();
            sfc::merge(&mut config, parts);
            if let Some(css) = config.style.clone() {
                framework.inject_scoped_style(&token, &css)?;
                self.add_host_class(&framework, &token)?;
            }
        }

        for plugin in &framework.inner.plugins {
            plugin(self, &mut config)?;
        }
        self.refresh_props();

        let listeners = framework.inner.listeners.clone();
        if let Some(definition) = config.store.clone() {
            *self.inner.store.borrow_mut() = Some(Store::new(definition, listeners.clone()));
        }
        *self.inner.state.borrow_mut() = ReactiveState::for_component(
            self.inner.uid.clone(),
            config.state.clone(),
            listeners,
            self.inner.scheduler.clone(),
        );
        *self.inner.config.borrow_mut() = config;

        self.set_phase(Phase::ResourcesLoading);
        self.run_hook("before_load", |hooks| hooks.before_load.clone())?;
        self.load_links(false).await?;
        if self.is_halted() {
            return Ok(());
        }
        self.run_hook("after_load", |hooks| hooks.after_load.clone())?;
        if self.is_halted() {
            return Ok(());
        }

        self.render_now(&framework)?;
        if self.is_halted() {
            return Ok(());
        }
        self.set_phase(Phase::Mounted);
        self.run_hook("on_mount", |hooks| hooks.on_mount.clone())?;
        Ok(())
    }

    fn run_hook(
        &self,
        name: &'static str,
        select: impl Fn(&LifecycleHooks) -> Option<Hook>,
    ) -> Result<(), ComponentError> {
        let hook = select(&self.inner.config.borrow().hooks);
        match hook {
            Some(hook) => hook(self).map_err(|err| ComponentError::in_hook(name, err)),
            None => Ok(()),
        }
    }

    /// Loads the eager (or lazy) links concurrently through the shared
    /// cache, plus the file template on the eager pass.
    async fn load_links(&self, lazy: bool) -> Result<(), ComponentError> {
        if self.is_halted() {
            return Ok(());
        }
        let framework = self.require_framework()?;
        let (links, file) = {
            let config = self.inner.config.borrow();
            let links: Vec<LinkSpec> = config
                .links
                .iter()
                .filter(|link| link.lazy == lazy)
                .cloned()
                .collect();
            let file = match &config.render {
                Some(RenderSource::File(address)) if !lazy => {
                    Some(LinkSpec::new(LinkKind::Html, address.clone()))
                }
                _ => None,
            };
            (links, file)
        };

        let mut pending: Vec<(LinkSpec, bool, SharedLoad)> = Vec::new();
        for (link, is_template) in links
            .into_iter()
            .map(|link| (link, false))
            .chain(file.map(|link| (link, true)))
        {
            let load = framework
                .inner
                .resources
                .acquire(framework.inner.fetcher.as_ref(), &link);
            self.inner
                .held_resources
                .borrow_mut()
                .push(link.cache_key());
            pending.push((link, is_template, load));
        }
        if pending.is_empty() {
            return Ok(());
        }

        let results = join_all(pending.iter().map(|(_, _, load)| load.clone())).await;
        if self.is_halted() {
            return Ok(());
        }
        for ((link, is_template, _), result) in pending.iter().zip(results) {
            let body = result?;
            if *is_template {
                *self.inner.file_template.borrow_mut() = Some(body);
            } else {
                framework.inject_resource(link, &body)?;
            }
        }
        Ok(())
    }

    fn add_host_class(&self, framework: &Framework, class: &str) -> Result<(), NodeError> {
        let mut doc = framework.inner.document.borrow_mut();
        let current = doc
            .attribute(self.inner.host, "class")
            .unwrap_or_default()
            .to_owned();
        if current.split_whitespace().any(|existing| existing == class) {
            return Ok(());
        }
        let next = if current.is_empty() {
            class.to_owned()
        } else {
            format!("{current} {class}")
        };
        doc.set_attribute(self.inner.host, "class", next)
    }

    fn scheduled_render(&self) {
        match self.phase() {
            Phase::Mounted => {
                if let Some(framework) = self.framework() {
                    if let Err(err) = self.render_now(&framework) {
                        self.fail(err);
                    }
                }
            }
            phase => log::debug!("{}: render skipped while {phase:?}", self.id()),
        }
    }

    /// Render pass: template, reconcile, bind events, reconcile children.
    fn render_now(&self, framework: &Framework) -> Result<(), ComponentError> {
        self.run_hook("before_render", |hooks| hooks.before_render.clone())?;
        self.inner.scheduler.clear_pending();
        let markup = self.render_markup(framework)?;
        {
            let mut doc = framework.inner.document.borrow_mut();
            let nodes = parse_fragment(&mut doc, &markup);
            reconcile_children(&mut doc, self.inner.host, &nodes)?;
        }
        self.bind_events(framework);
        self.discover_children(framework);
        self.inner.renders.set(self.inner.renders.get() + 1);
        self.run_hook("after_render", |hooks| hooks.after_render.clone())?;
        Ok(())
    }

    fn render_markup(&self, framework: &Framework) -> Result<String, ComponentError> {
        let source = self.inner.config.borrow().render.clone();
        let file_template = self.inner.file_template.borrow().clone();
        let state = self.state();
        let props = self.props();
        let store = self.store();
        let scope = self.template_scope(framework, &state, &props, store.as_ref());
        let context = RenderContext::new(self, &state, &props, store.as_ref());
        render_template(&TemplateInput {
            source: source.as_ref(),
            file_template: file_template.as_deref(),
            context: &context,
            scope: &scope,
            slots: &self.inner.slots,
            sanitizer: framework.inner.sanitizer.as_ref(),
        })
    }

    /// State, then `props`, then stores by name: the default store, the
    /// local store and every named module.
    fn template_scope(
        &self,
        framework: &Framework,
        state: &ReactiveState,
        props: &ReactiveState,
        store: Option<&Store>,
    ) -> Scope {
        let stores = framework.stores();
        let mut scope = Scope::new();
        scope.layer(&state.snapshot());
        scope.insert("props", props.snapshot());
        if let Some(default) = stores.default_store() {
            scope.insert(DEFAULT_STORE, default.to_value());
        }
        if let Some(store) = store {
            scope.insert(store.name(), store.to_value());
        }
        scope.layer(&stores.modules());
        scope
    }

    fn bind_events(&self, framework: &Framework) {
        let document = framework.document();
        let mut doc = document.borrow_mut();
        let owned = scan_owned(&doc, self.inner.host);
        let declared = declared_events(&doc, &owned.elements);
        let config = self.inner.config.borrow();
        let weak = Rc::downgrade(&self.inner);
        self.inner.bindings.borrow_mut().sync(
            &mut doc,
            declared,
            |method| config.methods.contains_key(method),
            |method| event_handler(weak.clone(), method.to_owned()),
        );
    }

    fn unbind_all(&self, framework: &Framework) {
        let mut doc = framework.inner.document.borrow_mut();
        self.inner.bindings.borrow_mut().clear(&mut doc);
    }

    /// Creates instances for new nested hosts and destroys those whose host
    /// is gone from this component's output.
    fn discover_children(&self, framework: &Framework) {
        let found = {
            let doc = framework.inner.document.borrow();
            scan_owned(&doc, self.inner.host).hosts
        };
        let stale: Vec<ComponentInstance> = {
            let mut children = self.inner.children.borrow_mut();
            let gone: Vec<NodeId> = children
                .keys()
                .filter(|host| !found.contains(host))
                .copied()
                .collect();
            gone.iter()
                .filter_map(|host| children.shift_remove(host))
                .collect()
        };
        for child in stale {
            child.destroy();
        }
        for host in found {
            if self.inner.children.borrow().contains_key(&host) {
                continue;
            }
            let child = ComponentInstance::create(framework, host, Some(self));
            self.inner.children.borrow_mut().insert(host, child);
        }
    }

    fn destroy_children(&self) {
        let children: Vec<ComponentInstance> = self
            .inner
            .children
            .borrow_mut()
            .drain(..)
            .map(|(_, child)| child)
            .collect();
        for child in children {
            child.destroy();
        }
    }

    /// Re-extracts props from the host's attributes and writes the ones
    /// that changed, then hands their names to `on_update`.
    pub(crate) fn refresh_props(&self) -> Vec<String> {
        if !self.is_alive() {
            return Vec::new();
        }
        let Some(framework) = self.framework() else {
            return Vec::new();
        };
        let next = {
            let doc = framework.inner.document.borrow();
            if !doc.contains(self.inner.host) {
                return Vec::new();
            }
            extract_props(&framework, &doc, self.inner.host)
        };
        let props = &self.inner.props;
        let mut changed = Vec::new();
        for key in props.keys() {
            if !next.contains_key(&key) && props.remove(&key) {
                changed.push(key);
            }
        }
        for (key, value) in next {
            if props.set(&key, value) {
                changed.push(key);
            }
        }
        if !changed.is_empty() {
            log::debug!("{}: props changed {changed:?}", self.id());
            let hook = self.inner.config.borrow().hooks.on_update.clone();
            if let Some(hook) = hook {
                if let Err(err) = hook(self, &changed) {
                    self.fail(ComponentError::in_hook("on_update", err));
                }
            }
        }
        changed
    }

    /// Switches to the error display: children are torn down, listeners
    /// unbound and the host shows the error boundary (or a default box).
    fn fail(&self, err: ComponentError) {
        log::error!("{}: {err}", self.id());
        let message = err.to_string();
        *self.inner.error.borrow_mut() = Some(message.clone());
        self.set_phase(Phase::Errored);
        let Some(framework) = self.framework() else {
            return;
        };
        self.destroy_children();
        self.unbind_all(&framework);

        let boundary = self.inner.config.borrow().error_boundary.clone();
        let markup = match boundary {
            Some(boundary) => boundary(&message),
            None => format!(
                r#"<div class="{}" role="alert">{}</div>"#,
                framework.inner.error_class,
                escape_text(&message)
            ),
        };
        let markup = framework.inner.sanitizer.sanitize(&markup);

        let mut doc = framework.inner.document.borrow_mut();
        let host = self.inner.host;
        for child in doc.children(host).to_vec() {
            let _ = doc.remove(child);
        }
        for node in parse_fragment(&mut doc, &markup) {
            if let Err(err) = doc.append_child(host, node) {
                log::error!("{}: cannot show error display: {err}", self.inner.uid);
            }
        }
    }

    /// Runs `on_destroy`, destroys every owned child, unbinds listeners,
    /// cancels pending renders and releases held resources. Idempotent.
    pub fn destroy(&self) {
        if !self.inner.alive.replace(false) {
            return;
        }
        if let Err(err) = self.run_hook("on_destroy", |hooks| hooks.on_destroy.clone()) {
            log::error!("{}: {err}", self.id());
        }
        self.destroy_children();
        self.inner.scheduler.cancel();

        if let Some(framework) = self.framework() {
            self.unbind_all(&framework);
            let host = self.inner.host;
            {
                let mut hosts = framework.inner.hosts.borrow_mut();
                let owned = hosts
                    .get(&host)
                    .is_some_and(|weak| weak.as_ptr() == Rc::as_ptr(&self.inner));
                if owned {
                    hosts.remove(&host);
                }
            }
            let held: Vec<String> = self.inner.held_resources.borrow_mut().drain(..).collect();
            let mut doc = framework.inner.document.borrow_mut();
            doc.set_component_host(host, false);
            doc.observe_attributes(host, false);
            for key in held {
                if let Some(node) = framework.inner.resources.release(&key) {
                    if doc.contains(node) {
                        let _ = doc.remove(node);
                    }
                }
            }
        }
        self.set_phase(Phase::Destroyed);
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.inner.uid)
            .field("host", &self.inner.host)
            .field("phase", &self.inner.phase.get())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

fn event_handler(weak: Weak<InstanceInner>, method: String) -> EventHandler {
    Rc::new(move |event: &Event| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let instance = ComponentInstance { inner };
        if !instance.is_alive() {
            return;
        }
        if let Err(err) = instance.invoke(&method, event) {
            log::error!("{}: method '{method}' failed: {err}", instance.id());
        }
    })
}

/// Props from the host's attributes: `:name` is evaluated against the
/// default store state and named modules, anything else is a literal
/// string. Event bindings, `class` and `slot` are not props.
fn extract_props(framework: &Framework, doc: &Document, host: NodeId) -> ValueMap {
    let mut props = ValueMap::new();
    let Ok(attributes) = doc.attributes(host) else {
        return props;
    };
    let mut scope: Option<Scope> = None;
    for (name, value) in attributes {
        if name.starts_with('@') || name == "class" || name == "slot" {
            continue;
        }
        match name.strip_prefix(':') {
            Some(prop) => {
                let scope = scope.get_or_insert_with(|| framework.prop_scope());
                props.insert(prop.to_owned(), evaluate(value, scope));
            }
            None => {
                props.insert(name.clone(), Value::from(value.as_str()));
            }
        }
    }
    props
}
