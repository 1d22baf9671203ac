#![forbid(unsafe_code)]

//! In-process collaborators for tests, the CLI, and headless hosts.
//!
//! [`HeadlessEngine`] implements [`GridEngine`] over a plain node list with
//! scripted fault injection. [`RecordingSurface`] and [`RecordingFactory`]
//! record what the adapter and reconciler asked of them; clones share the
//! same log so a test can keep one handle after boxing the other.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use dashgrid_core::GridRect;

use crate::bridge::{MountError, WidgetFactory};
use crate::engine::{
    DirectPlacement, EngineError, FallbackSurface, GridEngine, GridNode, GridOptions, Placement,
};
use crate::record::LayoutRecord;

/// Engine operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineOp {
    Add,
    Update,
    Remove,
    Commit,
    SetColumns,
}

/// A grid engine with no rendering.
///
/// Nodes keep exactly the rect they were given; the engine applies no
/// gravity of its own. Adds that would overflow the column count are
/// rejected, like a real engine refusing an impossible placement.
#[derive(Debug, Clone)]
pub struct HeadlessEngine {
    nodes: Vec<GridNode>,
    options: GridOptions,
    initialized: bool,
    ready: bool,
    init_fails: bool,
    faults: BTreeMap<EngineOp, u32>,
    in_batch: bool,
    commits: u64,
    ops: BTreeMap<EngineOp, u64>,
    drag: bool,
    resize: bool,
    float_mode: bool,
    animate: bool,
    interactive_updates: u64,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEngine {
    /// An engine that becomes ready as soon as it is initialized.
    #[must_use]
    pub fn new() -> Self {
        let options = GridOptions::default();
        Self {
            nodes: Vec::new(),
            drag: options.drag_enabled,
            resize: options.resize_enabled,
            float_mode: options.float_mode,
            animate: options.animate,
            options,
            initialized: false,
            ready: true,
            init_fails: false,
            faults: BTreeMap::new(),
            in_batch: false,
            commits: 0,
            ops: BTreeMap::new(),
            interactive_updates: 0,
        }
    }

    /// An engine whose `init` fails until [`set_init_fails(false)`].
    ///
    /// [`set_init_fails(false)`]: Self::set_init_fails
    #[must_use]
    pub fn failing_init() -> Self {
        Self {
            init_fails: true,
            ..Self::new()
        }
    }

    pub fn set_init_fails(&mut self, fails: bool) {
        self.init_fails = fails;
    }

    /// Toggle readiness (independent of `init`).
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Make the next `count` calls of `op` fail.
    pub fn fail_next(&mut self, op: EngineOp, count: u32) {
        *self.faults.entry(op).or_default() += count;
    }

    /// Move a node as if the user dragged or resized it.
    pub fn simulate_gesture(&mut self, id: &str, rect: GridRect) -> bool {
        match self.nodes.iter_mut().find(|node| node.id == id) {
            Some(node) => {
                node.rect = rect;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Successful calls of `op`.
    #[must_use]
    pub fn op_count(&self, op: EngineOp) -> u64 {
        self.ops.get(&op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn in_batch(&self) -> bool {
        self.in_batch
    }

    #[must_use]
    pub fn float_mode(&self) -> bool {
        self.float_mode
    }

    #[must_use]
    pub fn animate(&self) -> bool {
        self.animate
    }

    /// Updates applied while drag or resize was enabled.
    #[must_use]
    pub fn interactive_update_count(&self) -> u64 {
        self.interactive_updates
    }

    #[must_use]
    pub fn interaction(&self) -> (bool, bool) {
        (self.drag, self.resize)
    }

    #[must_use]
    pub fn columns(&self) -> u32 {
        self.options.columns
    }

    fn take_fault(&mut self, op: EngineOp) -> bool {
        match self.faults.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn count(&mut self, op: EngineOp) {
        *self.ops.entry(op).or_default() += 1;
    }

    fn check_ready(&self) -> Result<(), EngineError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(EngineError::NotReady)
        }
    }
}

impl GridEngine for HeadlessEngine {
    fn init(&mut self, options: &GridOptions) -> Result<(), EngineError> {
        if self.init_fails {
            return Err(EngineError::InitFailed {
                reason: "scripted init failure".into(),
            });
        }
        self.options = options.clone();
        self.drag = options.drag_enabled;
        self.resize = options.resize_enabled;
        self.float_mode = options.float_mode;
        self.animate = options.animate;
        self.nodes.clear();
        self.initialized = true;
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.ready
    }

    fn add_node(&mut self, node: &GridNode) -> Result<(), EngineError> {
        self.check_ready()?;
        if self.take_fault(EngineOp::Add) {
            return Err(EngineError::Rejected {
                id: node.id.clone(),
                reason: "scripted add failure".into(),
            });
        }
        if self.nodes.iter().any(|existing| existing.id == node.id) {
            return Err(EngineError::Rejected {
                id: node.id.clone(),
                reason: "duplicate id".into(),
            });
        }
        if node.rect.right() > self.options.columns {
            return Err(EngineError::Rejected {
                id: node.id.clone(),
                reason: format!(
                    "right edge {} exceeds {} columns",
                    node.rect.right(),
                    self.options.columns
                ),
            });
        }
        self.nodes.push(GridNode {
            placement: Placement::Managed,
            ..node.clone()
        });
        self.count(EngineOp::Add);
        Ok(())
    }

    fn update_node(&mut self, id: &str, rect: GridRect) -> Result<(), EngineError> {
        self.check_ready()?;
        if self.take_fault(EngineOp::Update) {
            return Err(EngineError::Rejected {
                id: id.to_owned(),
                reason: "scripted update failure".into(),
            });
        }
        let node = self
            .nodes
            .iter_mut()
            .find(|node| node.id == id)
            .ok_or_else(|| EngineError::UnknownNode { id: id.to_owned() })?;
        node.rect = rect;
        if self.drag || self.resize {
            self.interactive_updates += 1;
        }
        self.count(EngineOp::Update);
        Ok(())
    }

    fn remove_node(&mut self, id: &str) -> Result<(), EngineError> {
        self.check_ready()?;
        if self.take_fault(EngineOp::Remove) {
            return Err(EngineError::Rejected {
                id: id.to_owned(),
                reason: "scripted remove failure".into(),
            });
        }
        let index = self
            .nodes
            .iter()
            .position(|node| node.id == id)
            .ok_or_else(|| EngineError::UnknownNode { id: id.to_owned() })?;
        self.nodes.remove(index);
        self.count(EngineOp::Remove);
        Ok(())
    }

    fn nodes(&self) -> Vec<GridNode> {
        self.nodes.clone()
    }

    fn set_float(&mut self, enabled: bool) {
        self.float_mode = enabled;
    }

    fn set_interaction(&mut self, drag: bool, resize: bool) {
        self.drag = drag;
        self.resize = resize;
    }

    fn set_columns(&mut self, columns: u32) -> Result<(), EngineError> {
        if self.take_fault(EngineOp::SetColumns) {
            return Err(EngineError::Rejected {
                id: String::new(),
                reason: "scripted column change failure".into(),
            });
        }
        self.options.columns = columns;
        self.count(EngineOp::SetColumns);
        Ok(())
    }

    fn begin_batch(&mut self) {
        self.in_batch = true;
    }

    fn commit(&mut self) -> Result<(), EngineError> {
        self.in_batch = false;
        self.commits += 1;
        if self.take_fault(EngineOp::Commit) {
            return Err(EngineError::CommitFailed {
                reason: "scripted commit failure".into(),
            });
        }
        self.count(EngineOp::Commit);
        Ok(())
    }

    fn set_animate(&mut self, enabled: bool) {
        self.animate = enabled;
    }
}

/// A fallback surface that remembers where it placed each widget.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    placed: Rc<RefCell<BTreeMap<String, DirectPlacement>>>,
}

impl RecordingSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn placement(&self, id: &str) -> Option<DirectPlacement> {
        self.placed.borrow().get(id).copied()
    }

    #[must_use]
    pub fn placed_ids(&self) -> Vec<String> {
        self.placed.borrow().keys().cloned().collect()
    }
}

impl FallbackSurface for RecordingSurface {
    fn place(&mut self, id: &str, placement: DirectPlacement) {
        self.placed.borrow_mut().insert(id.to_owned(), placement);
    }

    fn detach(&mut self, id: &str) {
        self.placed.borrow_mut().remove(id);
    }
}

/// What a [`RecordingFactory`] has seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryEvent {
    Mounted(String),
    Unmounted(String),
    MountFailed(String),
}

#[derive(Debug, Default)]
struct FactoryLog {
    mounted: BTreeSet<String>,
    events: Vec<FactoryEvent>,
    refuse: BTreeSet<String>,
}

/// A widget factory that records mounts and can refuse chosen ids.
#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    log: Rc<RefCell<FactoryLog>>,
}

impl RecordingFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make mounting `id` fail.
    pub fn refuse(&self, id: impl Into<String>) {
        self.log.borrow_mut().refuse.insert(id.into());
    }

    #[must_use]
    pub fn is_mounted(&self, id: &str) -> bool {
        self.log.borrow().mounted.contains(id)
    }

    #[must_use]
    pub fn mounted(&self) -> Vec<String> {
        self.log.borrow().mounted.iter().cloned().collect()
    }

    #[must_use]
    pub fn events(&self) -> Vec<FactoryEvent> {
        self.log.borrow().events.clone()
    }
}

impl WidgetFactory for RecordingFactory {
    fn mount(&mut self, record: &LayoutRecord) -> Result<(), MountError> {
        let mut log = self.log.borrow_mut();
        if log.refuse.contains(&record.id) {
            log.events.push(FactoryEvent::MountFailed(record.id.clone()));
            return Err(MountError {
                id: record.id.clone(),
                reason: "refused by test factory".into(),
            });
        }
        log.mounted.insert(record.id.clone());
        log.events.push(FactoryEvent::Mounted(record.id.clone()));
        Ok(())
    }

    fn unmount(&mut self, id: &str) {
        let mut log = self.log.borrow_mut();
        if log.mounted.remove(id) {
            log.events.push(FactoryEvent::Unmounted(id.to_owned()));
        }
    }
}
