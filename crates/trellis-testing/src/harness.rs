//! Headless application harness: one document, one runtime, one framework.

use std::cell::RefCell;
use std::rc::Rc;

use trellis_components::{ComponentInstance, Framework, FrameworkConfig, MemoryRegistry};
use trellis_core::html::{inner_html, parse_fragment};
use trellis_core::{
    dispatch_event, DefaultScheduler, Document, Event, EventKind, NodeId, Runtime, TurnReport,
};

use crate::logger;

/// Upper bound on turns per [`TestApp::settle`]; reaching it means
/// something keeps re-scheduling itself.
pub const SETTLE_LIMIT: usize = 64;

pub struct TestApp {
    runtime: Runtime,
    document: Rc<RefCell<Document>>,
    framework: Framework,
}

impl TestApp {
    pub fn new(config: FrameworkConfig) -> Self {
        logger::install();
        let runtime = Runtime::new(Rc::new(DefaultScheduler));
        let document = Rc::new(RefCell::new(Document::new()));
        let framework = Framework::new(Rc::clone(&document), runtime.handle(), config);
        Self {
            runtime,
            document,
            framework,
        }
    }

    pub fn with_registry(registry: &MemoryRegistry) -> Self {
        Self::new(FrameworkConfig::new(Rc::new(registry.clone())))
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn document(&self) -> Rc<RefCell<Document>> {
        Rc::clone(&self.document)
    }

    /// Appends `html` to the body, mounts the component hosts in it and
    /// settles.
    pub fn load(&self, html: &str) -> Vec<ComponentInstance> {
        let mounted = self.mount(html);
        self.settle();
        mounted
    }

    /// Like [`load`](Self::load) without running any turn: lifecycles are
    /// queued but nothing has been polled yet.
    pub fn mount(&self, html: &str) -> Vec<ComponentInstance> {
        let body = {
            let mut doc = self.document.borrow_mut();
            let body = doc.body();
            for node in parse_fragment(&mut doc, html) {
                if let Err(err) = doc.append_child(body, node) {
                    panic!("cannot append test markup: {err}");
                }
            }
            body
        };
        self.framework.mount_all(body)
    }

    pub fn turn(&self) -> TurnReport {
        self.framework.run_turn(&self.runtime)
    }

    /// Runs turns until nothing is left to do. Returns the number of turns
    /// that did work.
    pub fn settle(&self) -> usize {
        let mut busy = 0;
        for _ in 0..SETTLE_LIMIT {
            let report = self.turn();
            let quiet = report.is_idle()
                && !self.runtime.has_pending_renders()
                && !self.framework.has_pending_mutations();
            if quiet {
                return busy;
            }
            busy += 1;
        }
        panic!("application did not settle within {SETTLE_LIMIT} turns");
    }

    /// First element with `tag` in document order.
    pub fn find(&self, tag: &str) -> Option<NodeId> {
        self.find_all(tag).into_iter().next()
    }

    pub fn find_all(&self, tag: &str) -> Vec<NodeId> {
        let doc = self.document.borrow();
        doc.elements_by_tag(doc.root(), tag)
    }

    /// First element whose attribute `name` equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        let doc = self.document.borrow();
        doc.find_all(doc.root(), |doc, node| doc.attribute(node, name) == Some(value))
            .into_iter()
            .next()
    }

    /// Dispatches a click on `target` and settles. Returns how many
    /// handlers ran.
    pub fn click(&self, target: NodeId) -> usize {
        let handled = dispatch_event(&self.document, &Event::new(EventKind::Click, target));
        self.settle();
        handled
    }

    pub fn input(&self, target: NodeId, value: &str) -> usize {
        let event = Event::new(EventKind::Input, target).with_value(value);
        let handled = dispatch_event(&self.document, &event);
        self.settle();
        handled
    }

    pub fn submit(&self, target: NodeId) -> usize {
        let handled = dispatch_event(&self.document, &Event::new(EventKind::Submit, target));
        self.settle();
        handled
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Err(err) = self.document.borrow_mut().set_attribute(node, name, value) {
            panic!("cannot set {name} on node {node}: {err}");
        }
    }

    pub fn text(&self, node: NodeId) -> String {
        self.document.borrow().text_content(node)
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        inner_html(&self.document.borrow(), node)
    }

    pub fn instance(&self, host: NodeId) -> Option<ComponentInstance> {
        self.framework.instance(host)
    }

    pub fn listener_count(&self) -> usize {
        self.document.borrow().listener_count()
    }

    pub fn head_html(&self) -> String {
        let doc = self.document.borrow();
        inner_html(&doc, doc.head())
    }
}
