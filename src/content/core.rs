use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::{Result, UiError};
use crate::host::{TextFormat, ViewerId};

use super::dynamic::DynamicNode;
use super::group::GroupNode;
use super::storage::StorageNode;
use crate::runtime::ClickAction;

/// Identity of a grid instance, used to detect rebinding across grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridId(u64);

impl GridId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Abstract displayable content: what a resolved slot shows. Quantity is the
/// only field ignored by similarity checks; everything else identifies the
/// content kind for stacking purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stack {
    pub kind: String,
    pub quantity: u32,
    pub max_stack: u32,
    pub name: Option<String>,
    pub lines: Vec<String>,
}

impl Stack {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            quantity: 1,
            max_stack: 64,
            name: None,
            lines: Vec::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_lines(mut self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Whether two stacks hold the same content kind, ignoring quantity.
    pub fn is_similar(&self, other: &Stack) -> bool {
        self.kind == other.kind
            && self.max_stack == other.max_stack
            && self.name == other.name
            && self.lines == other.lines
    }
}

/// Where a node is attached: owning grid, grid width, and the slots assigned
/// to it in grid order. Set exactly once when the node is added.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub grid: GridId,
    pub width: usize,
    pub slots: Vec<usize>,
}

impl Binding {
    /// Position of `slot` within the bound slot list, offset by one full
    /// slot-list length per page.
    pub fn slot_index(&self, slot: usize, page: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|&s| s == slot)
            .map(|i| i + self.slots.len() * page)
    }

    /// How many bound slots share `slot`'s row.
    pub fn line_width(&self, slot: usize) -> usize {
        let row = slot / self.width;
        self.slots.iter().filter(|&&s| s / self.width == row).count()
    }

    /// Rank of `slot` among the bound slots of its row.
    pub fn line_position(&self, slot: usize) -> usize {
        let row = slot / self.width;
        let mut position = 0;
        for &s in &self.slots {
            if s / self.width == row {
                if s == slot {
                    return position;
                }
                position += 1;
            }
        }
        position
    }
}

/// One-shot binding holder shared by every node variant.
#[derive(Debug, Default)]
pub(crate) struct NodeBase {
    binding: OnceLock<Binding>,
}

impl NodeBase {
    pub fn bind(&self, binding: Binding) -> Result<()> {
        self.binding
            .set(binding)
            .map_err(|_| UiError::BindingConflict)
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.get()
    }
}

/// Per-draw resolution context: the viewer, their current page, and the text
/// substitution pipeline.
pub struct DrawCtx<'a> {
    pub(crate) viewer: ViewerId,
    pub(crate) page: usize,
    pub(crate) vars: &'a [(String, String)],
    pub(crate) text: &'a dyn TextFormat,
}

impl<'a> DrawCtx<'a> {
    pub(crate) fn new(
        viewer: ViewerId,
        page: usize,
        vars: &'a [(String, String)],
        text: &'a dyn TextFormat,
    ) -> Self {
        Self {
            viewer,
            page,
            vars,
            text,
        }
    }

    pub fn viewer(&self) -> ViewerId {
        self.viewer
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Substitute the engine's `%var%` placeholders, then delegate to the
    /// host formatter.
    pub(crate) fn render(&self, raw: &str) -> String {
        let mut out = raw.to_string();
        for (key, value) in self.vars {
            let placeholder = format!("%{key}%");
            if out.contains(&placeholder) {
                out = out.replace(&placeholder, value);
            }
        }
        self.text.format(Some(self.viewer), &out)
    }
}

/// The polymorphic content hierarchy. Every operation over nodes matches
/// exhaustively on this enum.
pub enum ContentNode {
    Static(StaticNode),
    Group(GroupNode),
    Storage(StorageNode),
    Dynamic(DynamicNode),
}

impl ContentNode {
    pub(crate) fn base(&self) -> &NodeBase {
        match self {
            ContentNode::Static(n) => &n.base,
            ContentNode::Group(n) => &n.base,
            ContentNode::Storage(n) => &n.base,
            ContentNode::Dynamic(n) => &n.base,
        }
    }

    /// Attach the node (and, for groups, its children and filler) to a grid.
    /// A node that is already attached anywhere reports a binding conflict.
    pub(crate) fn bind(&self, binding: Binding) -> Result<()> {
        match self {
            ContentNode::Group(group) => {
                group.base.bind(binding.clone())?;
                for child in &group.children {
                    child.bind(binding.clone())?;
                }
                if let Some(filler) = &group.filler {
                    filler.bind(binding)?;
                }
                Ok(())
            }
            other => other.base().bind(binding),
        }
    }

    /// Resolve the content shown at `slot` for the context's viewer.
    pub(crate) fn resolve(&self, ctx: &DrawCtx<'_>, slot: usize) -> Option<Stack> {
        match self {
            ContentNode::Static(n) => n.resolve(ctx),
            ContentNode::Group(n) => n
                .child_for(slot, ctx.page)
                .and_then(|child| child.resolve(ctx, slot)),
            ContentNode::Storage(n) => n.stack_at(ctx.page, slot),
            ContentNode::Dynamic(n) => n
                .cached(ctx.viewer)
                .and_then(|node| node.resolve(ctx, slot)),
        }
    }

    /// How many logical entries this node wants to show, the driver of page
    /// counting.
    pub(crate) fn content_size(&self, viewer: ViewerId) -> usize {
        match self {
            ContentNode::Static(_) => 0,
            ContentNode::Group(n) => n.children.len(),
            ContentNode::Storage(n) => n.storage().len(),
            ContentNode::Dynamic(n) => n
                .cached(viewer)
                .map(|node| node.content_size(viewer))
                .unwrap_or(0),
        }
    }

    /// Re-run every reachable dynamic query for `viewer`.
    pub(crate) fn refresh_dynamic(&self, viewer: ViewerId) {
        match self {
            ContentNode::Dynamic(n) => {
                n.update(viewer);
            }
            ContentNode::Group(n) => {
                for child in &n.children {
                    child.refresh_dynamic(viewer);
                }
            }
            _ => {}
        }
    }

    /// Drop every cached resolution for `viewer` so nothing leaks past the
    /// viewer's session.
    pub(crate) fn evict_viewer(&self, viewer: ViewerId) {
        match self {
            ContentNode::Dynamic(n) => n.evict(viewer),
            ContentNode::Group(n) => {
                for child in &n.children {
                    child.evict_viewer(viewer);
                }
                if let Some(filler) = &n.filler {
                    filler.evict_viewer(viewer);
                }
            }
            _ => {}
        }
    }
}

impl From<StaticNode> for ContentNode {
    fn from(node: StaticNode) -> Self {
        ContentNode::Static(node)
    }
}

impl From<GroupNode> for ContentNode {
    fn from(node: GroupNode) -> Self {
        ContentNode::Group(node)
    }
}

impl From<StorageNode> for ContentNode {
    fn from(node: StorageNode) -> Self {
        ContentNode::Storage(node)
    }
}

impl From<DynamicNode> for ContentNode {
    fn from(node: DynamicNode) -> Self {
        ContentNode::Dynamic(node)
    }
}

/// Fixed content with optional display text and a display quantity.
pub struct StaticNode {
    pub(crate) base: NodeBase,
    stack: Option<Stack>,
    quantity: u32,
    text: Vec<String>,
    pub(crate) action: Option<ClickAction>,
}

impl StaticNode {
    /// The display quantity starts from the stack's own quantity, run through
    /// the same range check as [`StaticNode::set_display_quantity`].
    pub fn new(stack: Stack) -> Self {
        let initial = stack.quantity;
        let mut node = Self {
            base: NodeBase::default(),
            stack: Some(stack),
            quantity: 1,
            text: Vec::new(),
            action: None,
        };
        node.set_display_quantity(initial);
        node
    }

    /// A node that renders nothing. Still clickable when given an action.
    pub fn empty() -> Self {
        Self {
            base: NodeBase::default(),
            stack: None,
            quantity: 1,
            text: Vec::new(),
            action: None,
        }
    }

    /// Display text lines. Placeholders are substituted at resolve time; the
    /// first line becomes the content name, the rest its description.
    /// Empty strings are filtered out; use a single space for a blank line.
    pub fn with_text(mut self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.text = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_action(
        mut self,
        action: impl Fn(&mut crate::runtime::Click<'_>) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.action = Some(std::sync::Arc::new(action));
        self
    }

    pub fn with_display_quantity(mut self, quantity: u32) -> Self {
        self.set_display_quantity(quantity);
        self
    }

    /// Set the displayed quantity. Values outside `[1, 64]` are rejected and
    /// the quantity falls back to 1.
    pub fn set_display_quantity(&mut self, quantity: u32) -> bool {
        if !(1..=64).contains(&quantity) {
            self.quantity = 1;
            return false;
        }
        self.quantity = quantity;
        true
    }

    pub fn display_quantity(&self) -> u32 {
        self.quantity
    }

    fn resolve(&self, ctx: &DrawCtx<'_>) -> Option<Stack> {
        let mut stack = self.stack.clone()?;
        if !self.text.is_empty() {
            let combined = self
                .text
                .iter()
                .filter(|line| !line.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            let rendered = ctx.render(&combined);
            let mut lines = rendered.split('\n');
            if let Some(first) = lines.next() {
                stack.name = Some(first.to_string());
            }
            stack.lines = lines.map(str::to_string).collect();
        }
        if (1..=64).contains(&self.quantity) {
            stack.quantity = self.quantity;
        }
        Some(stack)
    }
}
