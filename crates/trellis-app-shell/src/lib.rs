//! Application shell: owns the document, the runtime and the component
//! framework, and drives them turn by turn.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use trellis_components::{
    is_component_tag, ComponentInstance, Framework, FrameworkConfig,
};
use trellis_core::{dispatch_event, Document, Event, EventKind, NodeError, NodeId, TurnReport};
use trellis_runtime_std::StdRuntime;

/// Turns [`App::run_until_idle`] runs before giving up.
pub const DEFAULT_TURN_BUDGET: usize = 256;

pub const PARAM_PREFIX: &str = "data-param-";
pub const QUERY_PREFIX: &str = "data-query-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("'{0}' is not a component tag")]
    NotAComponent(String),
    #[error("no component is registered under '{0}'")]
    UnknownComponent(String),
    #[error("still busy after {0} turns")]
    Busy(usize),
    #[error(transparent)]
    Node(#[from] NodeError),
}

pub struct AppConfig {
    pub framework: FrameworkConfig,
    pub turn_budget: usize,
}

impl AppConfig {
    pub fn new(framework: FrameworkConfig) -> Self {
        Self {
            framework,
            turn_budget: DEFAULT_TURN_BUDGET,
        }
    }

    pub fn turn_budget(mut self, turns: usize) -> Self {
        self.turn_budget = turns.max(1);
        self
    }
}

impl From<FrameworkConfig> for AppConfig {
    fn from(framework: FrameworkConfig) -> Self {
        Self::new(framework)
    }
}

pub struct App {
    runtime: StdRuntime,
    document: Rc<RefCell<Document>>,
    framework: Framework,
    turn_budget: usize,
}

impl App {
    pub fn new(config: impl Into<AppConfig>) -> Self {
        Self::with_document(Document::new(), config)
    }

    /// Wraps an existing document, e.g. one already holding page markup.
    pub fn with_document(document: Document, config: impl Into<AppConfig>) -> Self {
        let config = config.into();
        let runtime = StdRuntime::new();
        let document = Rc::new(RefCell::new(document));
        let framework = Framework::new(
            Rc::clone(&document),
            runtime.runtime_handle(),
            config.framework,
        );
        Self {
            runtime,
            document,
            framework,
            turn_budget: config.turn_budget,
        }
    }

    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.document)
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn runtime(&self) -> &StdRuntime {
        &self.runtime
    }

    /// Mounts every registered component element under `body` that is not
    /// mounted yet.
    pub fn scan(&self) -> Vec<ComponentInstance> {
        let body = self.document.borrow().body();
        let mounted = self.framework.mount_registered(body);
        log::debug!("scan mounted {} root components", mounted.len());
        mounted
    }

    /// Replaces whatever `outlet` shows by a fresh `id` component carrying
    /// `params` and `query` as `data-param-*` / `data-query-*` attributes.
    pub fn attach_route(
        &self,
        outlet: NodeId,
        id: &str,
        params: &[(&str, &str)],
        query: &[(&str, &str)],
    ) -> Result<ComponentInstance, AppError> {
        let tag = id.to_ascii_lowercase();
        if !is_component_tag(&tag) {
            return Err(AppError::NotAComponent(id.to_owned()));
        }
        if !self.framework.registry().contains(&tag) {
            return Err(AppError::UnknownComponent(tag));
        }

        let previous = self.document.borrow().children(outlet).to_vec();
        for node in &previous {
            self.framework.unmount(*node);
        }
        let host = {
            let mut doc = self.document.borrow_mut();
            for node in previous {
                doc.remove(node)?;
            }
            let host = doc.create_element(tag.as_str());
            for (name, value) in params {
                doc.set_attribute(host, &format!("{PARAM_PREFIX}{name}"), *value)?;
            }
            for (name, value) in query {
                doc.set_attribute(host, &format!("{QUERY_PREFIX}{name}"), *value)?;
            }
            doc.append_child(outlet, host)?;
            host
        };
        log::debug!("route {tag} attached to node {outlet}");
        Ok(self.framework.mount(host))
    }

    /// Whether a turn has work: a frame was requested, renders are queued
    /// or observed attributes changed.
    pub fn should_render(&self) -> bool {
        self.runtime.take_frame_request()
            || self.runtime.runtime().has_pending_renders()
            || self.framework.has_pending_mutations()
    }

    pub fn update(&self) -> TurnReport {
        self.framework.run_turn(&self.runtime.runtime())
    }

    /// Runs turns until one does nothing. Errors with [`AppError::Busy`]
    /// when the turn budget runs out first.
    pub fn run_until_idle(&self) -> Result<usize, AppError> {
        for turn in 0..self.turn_budget {
            let report = self.update();
            let idle = report.is_idle()
                && !self.runtime.runtime().has_pending_renders()
                && !self.framework.has_pending_mutations();
            if idle {
                self.runtime.take_frame_request();
                return Ok(turn);
            }
        }
        log::error!("application still busy after {} turns", self.turn_budget);
        Err(AppError::Busy(self.turn_budget))
    }

    /// Dispatches a click on `target`; returns the number of handlers run.
    pub fn click(&self, target: NodeId) -> usize {
        dispatch_event(&self.document, &Event::new(EventKind::Click, target))
    }

    pub fn input(&self, target: NodeId, value: &str) -> usize {
        let event = Event::new(EventKind::Input, target).with_value(value);
        dispatch_event(&self.document, &event)
    }

    pub fn submit(&self, target: NodeId) -> usize {
        dispatch_event(&self.document, &Event::new(EventKind::Submit, target))
    }

    /// Destroys every mounted component and releases shared resources.
    pub fn shutdown(&self) {
        self.framework.shutdown();
        if let Err(err) = self.run_until_idle() {
            log::error!("shutdown left work behind: {err}");
        }
    }
}
