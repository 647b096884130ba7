use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

use crate::platform::RuntimeScheduler;

pub type ScopeId = usize;

static NEXT_SCOPE_ID: AtomicUsize = AtomicUsize::new(1);

fn next_scope_id() -> ScopeId {
    NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed)
}

type RenderCallback = Rc<dyn Fn() + 'static>;

struct RuntimeInner {
    scheduler: Rc<dyn RuntimeScheduler>,
    needs_frame: Cell<bool>,
    render_queue: RefCell<Vec<(ScopeId, Weak<RenderScopeInner>)>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    live_tasks: Rc<Cell<usize>>,
    completed_tasks: Rc<Cell<usize>>,
}

impl RuntimeInner {
    fn new(scheduler: Rc<dyn RuntimeScheduler>) -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            scheduler,
            needs_frame: Cell::new(false),
            render_queue: RefCell::new(Vec::new()),
            pool: RefCell::new(pool),
            spawner,
            live_tasks: Rc::new(Cell::new(0)),
            completed_tasks: Rc::new(Cell::new(0)),
        }
    }

    fn schedule(&self) {
        self.needs_frame.set(true);
        self.scheduler.schedule_frame();
    }

    fn enqueue_render(&self, id: ScopeId, scope: Weak<RenderScopeInner>) {
        self.render_queue.borrow_mut().push((id, scope));
        self.schedule();
    }

    fn take_render_queue(&self) -> Vec<(ScopeId, Weak<RenderScopeInner>)> {
        self.render_queue.borrow_mut().drain(..).collect()
    }

    fn has_pending_renders(&self) -> bool {
        !self.render_queue.borrow().is_empty()
    }

    fn spawn_local(&self, task: impl Future<Output = ()> + 'static) -> bool {
        let live = Rc::clone(&self.live_tasks);
        let completed = Rc::clone(&self.completed_tasks);
        live.set(live.get() + 1);
        let wrapped = async move {
            task.await;
            live.set(live.get() - 1);
            completed.set(completed.get() + 1);
        };
        match self.spawner.spawn_local(wrapped) {
            Ok(()) => {
                self.schedule();
                true
            }
            Err(err) => {
                self.live_tasks.set(self.live_tasks.get() - 1);
                log::warn!("failed to spawn runtime task: {err}");
                false
            }
        }
    }

    fn poll_tasks(&self) -> usize {
        let before = self.completed_tasks.get();
        self.pool.borrow_mut().run_until_stalled();
        self.completed_tasks.get() - before
    }

    fn settle_frame(&self) {
        if !self.has_pending_renders() {
            self.needs_frame.set(false);
        }
    }
}

/// Outcome of one cooperative turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub tasks_completed: usize,
    pub renders: usize,
}

impl TurnReport {
    pub fn is_idle(&self) -> bool {
        self.tasks_completed == 0 && self.renders == 0
    }
}

/// Owner of the render queue and the local task pool.
///
/// Everything reachable from a runtime is single-threaded; it holds `Rc`
/// state and must stay on the thread that created it.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(scheduler: Rc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.needs_frame.get()
    }

    pub fn live_tasks(&self) -> usize {
        self.inner.live_tasks.get()
    }

    pub fn has_pending_renders(&self) -> bool {
        self.inner.has_pending_renders()
    }

    /// Polls every spawned task until none can make progress.
    pub fn poll_tasks(&self) -> usize {
        self.inner.poll_tasks()
    }

    /// Runs each component render requested since the last drain, once.
    pub fn drain_renders(&self) -> usize {
        let mut renders = 0;
        for (_, scope) in self.inner.take_render_queue() {
            let Some(inner) = scope.upgrade() else {
                continue;
            };
            if (RenderScheduler { inner }).run_if_dirty() {
                renders += 1;
            }
        }
        self.inner.settle_frame();
        renders
    }

    /// One cooperative turn: tasks first, then the renders they requested.
    pub fn run_turn(&self) -> TurnReport {
        let tasks_completed = self.poll_tasks();
        let renders = self.drain_renders();
        TurnReport {
            tasks_completed,
            renders,
        }
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_frame(&self) {}
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler {
    pub frames: Cell<usize>,
}

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule_frame(&self) {
        self.frames.set(self.frames.get() + 1);
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn schedule(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.schedule();
        }
    }

    /// Queues `task` on the runtime's local pool.
    ///
    /// Returns `false` when the runtime is gone; the task is dropped.
    pub fn spawn_local(&self, task: impl Future<Output = ()> + 'static) -> bool {
        match self.0.upgrade() {
            Some(inner) => inner.spawn_local(task),
            None => false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn has_pending_renders(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_pending_renders())
            .unwrap_or(false)
    }

    fn enqueue_render(&self, id: ScopeId, scope: Weak<RenderScopeInner>) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_render(id, scope);
        }
    }
}

struct RenderScopeInner {
    id: ScopeId,
    runtime: RuntimeHandle,
    dirty: Cell<bool>,
    active: Cell<bool>,
    renders: Cell<usize>,
    render: RefCell<Option<RenderCallback>>,
}

/// Per-component render scheduler.
///
/// Any number of [`schedule`](Self::schedule) calls within one turn
/// collapse into a single queued render. Schedulers are independent: one
/// component's pending render never absorbs another's.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Rc<RenderScopeInner>,
}

impl RenderScheduler {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            inner: Rc::new(RenderScopeInner {
                id: next_scope_id(),
                runtime,
                dirty: Cell::new(false),
                active: Cell::new(true),
                renders: Cell::new(0),
                render: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Installs the render callback. It should hold only weak references
    /// to its owner; the scheduler is usually owned by that same owner.
    pub fn set_render(&self, render: impl Fn() + 'static) {
        *self.inner.render.borrow_mut() = Some(Rc::new(render));
    }

    pub fn schedule(&self) {
        if !self.inner.active.get() {
            return;
        }
        if !self.inner.dirty.replace(true) {
            self.inner
                .runtime
                .enqueue_render(self.inner.id, Rc::downgrade(&self.inner));
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Forgets a pending render without deactivating the scheduler; for
    /// callers about to render anyway.
    pub fn clear_pending(&self) {
        self.inner.dirty.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Drops any pending render and ignores future requests.
    pub fn cancel(&self) {
        self.inner.active.set(false);
        self.inner.dirty.set(false);
    }

    pub fn render_count(&self) -> usize {
        self.inner.renders.get()
    }

    fn run_if_dirty(&self) -> bool {
        if !self.inner.dirty.replace(false) || !self.inner.active.get() {
            return false;
        }
        let callback = self.inner.render.borrow().clone();
        match callback {
            Some(render) => {
                self.inner.renders.set(self.inner.renders.get() + 1);
                render();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("id", &self.inner.id)
            .field("dirty", &self.inner.dirty.get())
            .field("active", &self.inner.active.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> (Runtime, Rc<TestScheduler>) {
        let scheduler = Rc::new(TestScheduler::default());
        (Runtime::new(scheduler.clone()), scheduler)
    }

    #[test]
    fn repeated_schedules_coalesce_into_one_render() {
        let (runtime, host) = runtime();
        let scheduler = RenderScheduler::new(runtime.handle());
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        scheduler.set_render(move || counter.set(counter.get() + 1));

        for _ in 0..5 {
            scheduler.schedule();
        }
        assert!(scheduler.is_pending());
        assert_eq!(host.frames.get(), 1);
        assert_eq!(runs.get(), 0, "render is deferred to the turn");

        assert_eq!(runtime.drain_renders(), 1);
        assert_eq!(runs.get(), 1);
        assert!(!scheduler.is_pending());
        assert_eq!(runtime.drain_renders(), 0);
        assert!(!runtime.needs_frame());
    }

    #[test]
    fn schedulers_are_independent() {
        let (runtime, _) = runtime();
        let first = RenderScheduler::new(runtime.handle());
        let second = RenderScheduler::new(runtime.handle());
        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, scheduler) in [("first", &first), ("second", &second)] {
            let log = Rc::clone(&log);
            scheduler.set_render(move || log.borrow_mut().push(name));
        }

        first.schedule();
        second.schedule();
        first.schedule();
        assert_eq!(runtime.drain_renders(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn render_that_reschedules_runs_next_turn() {
        let (runtime, _) = runtime();
        let scheduler = RenderScheduler::new(runtime.handle());
        let weak = Rc::downgrade(&scheduler.inner);
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        scheduler.set_render(move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                if let Some(inner) = weak.upgrade() {
                    RenderScheduler { inner }.schedule();
                }
            }
        });

        scheduler.schedule();
        assert_eq!(runtime.drain_renders(), 1);
        assert!(scheduler.is_pending());
        assert_eq!(runtime.drain_renders(), 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn cancelled_scheduler_never_renders() {
        let (runtime, _) = runtime();
        let scheduler = RenderScheduler::new(runtime.handle());
        scheduler.set_render(|| panic!("cancelled scheduler rendered"));
        scheduler.schedule();
        scheduler.cancel();
        scheduler.schedule();
        assert_eq!(runtime.drain_renders(), 0);
    }

    #[test]
    fn spawned_tasks_run_on_poll() {
        let (runtime, _) = runtime();
        let done = Rc::new(Cell::new(false));
        let flag = Rc::clone(&done);
        assert!(runtime.handle().spawn_local(async move { flag.set(true) }));
        assert_eq!(runtime.live_tasks(), 1);
        let report = runtime.run_turn();
        assert_eq!(report.tasks_completed, 1);
        assert!(done.get());
        assert_eq!(runtime.live_tasks(), 0);
        assert!(runtime.run_turn().is_idle());
    }
}
