//! Shared fixtures for unit tests: an in-memory host, a queueing scheduler,
//! and a pass-through text formatter.
//!
//! The host never delivers events on its own; tests feed `handle_click`,
//! `handle_drag`, and `handle_close` directly, playing the role of the raw
//! event feed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::content::{Stack, Storage, VecStorage};
use crate::host::{Container, ContainerSpec, Host, Scheduler, Task, TextFormat, ViewerId};
use crate::registry::UiRegistry;
use crate::runtime::{GridConfig, GridUi};

pub(crate) fn stack(kind: &str, quantity: u32) -> Stack {
    Stack::new(kind).with_quantity(quantity)
}

/// Container backed by a plain vector, counting writes so tests can assert
/// redundant-write suppression.
pub(crate) struct MemContainer {
    cells: Mutex<Vec<Option<Stack>>>,
    writes: Mutex<usize>,
}

impl MemContainer {
    pub fn new(len: usize) -> Self {
        Self {
            cells: Mutex::new(vec![None; len]),
            writes: Mutex::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl Container for MemContainer {
    fn len(&self) -> usize {
        self.cells.lock().unwrap().len()
    }

    fn get(&self, slot: usize) -> Option<Stack> {
        self.cells.lock().unwrap().get(slot).cloned().flatten()
    }

    fn set(&self, slot: usize, stack: Option<Stack>) {
        let mut cells = self.cells.lock().unwrap();
        if let Some(cell) = cells.get_mut(slot) {
            *cell = stack.filter(|s| s.quantity > 0);
            *self.writes.lock().unwrap() += 1;
        }
    }

    fn clear(&self) {
        self.cells.lock().unwrap().fill(None);
    }

    fn viewers(&self) -> Vec<ViewerId> {
        Vec::new()
    }
}

pub(crate) struct TestHost {
    containers: Mutex<HashMap<ViewerId, Arc<MemContainer>>>,
    titles: Mutex<HashMap<ViewerId, String>>,
    personal: Mutex<HashMap<ViewerId, Arc<VecStorage>>>,
    open: Mutex<HashSet<ViewerId>>,
    dropped: Mutex<Vec<(ViewerId, Stack)>>,
    feedback: Mutex<Vec<(ViewerId, String)>>,
}

impl TestHost {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            titles: Mutex::new(HashMap::new()),
            personal: Mutex::new(HashMap::new()),
            open: Mutex::new(HashSet::new()),
            dropped: Mutex::new(Vec::new()),
            feedback: Mutex::new(Vec::new()),
        }
    }

    pub fn container(&self, viewer: ViewerId) -> Option<Arc<MemContainer>> {
        self.containers.lock().unwrap().get(&viewer).cloned()
    }

    pub fn last_title(&self, viewer: ViewerId) -> Option<String> {
        self.titles.lock().unwrap().get(&viewer).cloned()
    }

    pub fn personal(&self, viewer: ViewerId) -> Arc<VecStorage> {
        self.personal
            .lock()
            .unwrap()
            .entry(viewer)
            .or_insert_with(|| Arc::new(VecStorage::new(36)))
            .clone()
    }

    pub fn dropped(&self) -> Vec<(ViewerId, Stack)> {
        self.dropped.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn feedback(&self) -> Vec<(ViewerId, String)> {
        self.feedback.lock().unwrap().clone()
    }

    pub fn is_open(&self, viewer: ViewerId) -> bool {
        self.open.lock().unwrap().contains(&viewer)
    }
}

impl Host for TestHost {
    fn create_container(&self, viewer: ViewerId, spec: &ContainerSpec) -> Arc<dyn Container> {
        let container = Arc::new(MemContainer::new(spec.len));
        self.containers.lock().unwrap().insert(viewer, container.clone());
        self.titles
            .lock()
            .unwrap()
            .insert(viewer, spec.title.clone());
        container
    }

    fn open_container(&self, viewer: ViewerId, _container: &Arc<dyn Container>) {
        self.open.lock().unwrap().insert(viewer);
    }

    fn close_container(&self, viewer: ViewerId) {
        self.open.lock().unwrap().remove(&viewer);
    }

    fn is_container_open(&self, viewer: ViewerId) -> bool {
        self.is_open(viewer)
    }

    fn personal_storage(&self, viewer: ViewerId) -> Arc<dyn Storage> {
        self.personal(viewer)
    }

    fn drop_at(&self, viewer: ViewerId, stack: Stack) {
        self.dropped.lock().unwrap().push((viewer, stack));
    }

    fn play_feedback(&self, viewer: ViewerId, key: &str) {
        self.feedback.lock().unwrap().push((viewer, key.to_string()));
    }
}

/// `defer` queues; `run_or_defer` executes inline, treating the test thread
/// as every viewer's context.
pub(crate) struct QueueScheduler {
    queue: Mutex<VecDeque<(ViewerId, Task)>>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Viewer ids of queued tasks, in order.
    pub fn pending(&self) -> Vec<ViewerId> {
        self.queue
            .lock()
            .unwrap()
            .iter()
            .map(|(viewer, _)| *viewer)
            .collect()
    }

    /// Run queued tasks (including ones they enqueue) and return how many
    /// ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.queue.lock().unwrap().pop_front();
            let Some((_, task)) = next else {
                break;
            };
            task();
            ran += 1;
            assert!(ran < 1000, "scheduler drain did not settle");
        }
        ran
    }
}

impl Scheduler for QueueScheduler {
    fn defer(&self, viewer: ViewerId, task: Task) {
        self.queue.lock().unwrap().push_back((viewer, task));
    }

    fn run_or_defer(&self, _viewer: ViewerId, task: Task) {
        task();
    }
}

pub(crate) struct PlainText;

impl TextFormat for PlainText {
    fn format(&self, _viewer: Option<ViewerId>, raw: &str) -> String {
        raw.to_string()
    }
}

pub(crate) struct TestEnv {
    pub host: Arc<TestHost>,
    pub scheduler: Arc<QueueScheduler>,
    pub text: Arc<PlainText>,
    pub registry: Arc<UiRegistry>,
}

pub(crate) fn env() -> TestEnv {
    TestEnv {
        host: Arc::new(TestHost::new()),
        scheduler: Arc::new(QueueScheduler::new()),
        text: Arc::new(PlainText),
        registry: Arc::new(UiRegistry::new()),
    }
}

pub(crate) fn grid(env: &TestEnv, rows: &[&str]) -> Arc<GridUi> {
    GridUi::new(
        env.host.clone(),
        env.scheduler.clone(),
        env.text.clone(),
        env.registry.clone(),
        "Test Grid",
        rows,
        GridConfig::default(),
    )
    .expect("test grid")
}
