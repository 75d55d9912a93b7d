use std::sync::{Arc, Mutex};

use super::core::{NodeBase, Stack};

/// External indexed storage a grid slot can be bound to. Implementations own
/// their synchronization; all access goes through `&self`.
///
/// A cell holding a zero-quantity stack is expected to read back as `None`.
pub trait Storage: Send + Sync {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Option<Stack>;
    fn set(&self, index: usize, stack: Option<Stack>);

    fn first_empty(&self) -> Option<usize> {
        (0..self.len()).find(|&i| self.get(i).is_none())
    }

    /// Merge a stack into the storage, topping up similar stacks before
    /// claiming empty cells. Returns whatever could not fit.
    fn insert(&self, stack: Stack) -> Option<Stack> {
        let mut remaining = stack;
        for i in 0..self.len() {
            if remaining.quantity == 0 {
                return None;
            }
            if let Some(mut present) = self.get(i) {
                if present.is_similar(&remaining) && present.quantity < present.max_stack {
                    let moved = (present.max_stack - present.quantity).min(remaining.quantity);
                    present.quantity += moved;
                    remaining.quantity -= moved;
                    self.set(i, Some(present));
                }
            }
        }
        while remaining.quantity > 0 {
            let Some(empty) = self.first_empty() else {
                return Some(remaining);
            };
            let moved = remaining.max_stack.min(remaining.quantity);
            self.set(empty, Some(remaining.clone().with_quantity(moved)));
            remaining.quantity -= moved;
        }
        None
    }
}

/// Plain in-memory storage. Stands in wherever no host-backed storage
/// exists, e.g. scratch inventories assembled by the embedder.
pub struct VecStorage {
    cells: Mutex<Vec<Option<Stack>>>,
}

impl VecStorage {
    pub fn new(len: usize) -> Self {
        Self {
            cells: Mutex::new(vec![None; len]),
        }
    }

    pub fn from_stacks(stacks: impl IntoIterator<Item = Option<Stack>>) -> Self {
        Self {
            cells: Mutex::new(stacks.into_iter().collect()),
        }
    }
}

impl Storage for VecStorage {
    fn len(&self) -> usize {
        self.cells.lock().expect("storage mutex poisoned").len()
    }

    fn get(&self, index: usize) -> Option<Stack> {
        self.cells
            .lock()
            .expect("storage mutex poisoned")
            .get(index)
            .cloned()
            .flatten()
    }

    fn set(&self, index: usize, stack: Option<Stack>) {
        let mut cells = self.cells.lock().expect("storage mutex poisoned");
        if let Some(cell) = cells.get_mut(index) {
            *cell = stack.filter(|s| s.quantity > 0);
        }
    }
}

/// Everything a validator gets to see about an attempted commit.
pub struct ValidatorInfo<'a> {
    pub slot: usize,
    pub stack: Option<&'a Stack>,
}

/// Declines content that does not belong in a slot.
pub type Validator = Arc<dyn Fn(&ValidatorInfo<'_>) -> bool + Send + Sync>;

/// Side effect run after a successful storage commit, for storages that are
/// not directly backed by the real thing.
pub type ApplyStorage = Arc<dyn Fn() + Send + Sync>;

/// A slot region backed by an external [`Storage`].
///
/// The storage index is either fixed, or derived from the slot's position in
/// the node's bound slots offset by the viewer's page. All writes pass the
/// validator gate and then the apply callback.
pub struct StorageNode {
    pub(crate) base: NodeBase,
    storage: Arc<dyn Storage>,
    fixed_index: Option<usize>,
    validator: Option<Validator>,
    apply: Option<ApplyStorage>,
}

impl StorageNode {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            base: NodeBase::default(),
            storage,
            fixed_index: None,
            validator: None,
            apply: None,
        }
    }

    /// Bind every slot of this node to one fixed storage index.
    pub fn at_index(storage: Arc<dyn Storage>, index: usize) -> Self {
        Self {
            fixed_index: Some(index),
            ..Self::new(storage)
        }
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&ValidatorInfo<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_apply(mut self, apply: impl Fn() + Send + Sync + 'static) -> Self {
        self.apply = Some(Arc::new(apply));
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Map a grid slot to a storage index; out of range maps to nothing.
    pub(crate) fn storage_slot(&self, page: usize, slot: usize) -> Option<usize> {
        let index = match self.fixed_index {
            Some(index) => index,
            None => self.base.binding()?.slot_index(slot, page)?,
        };
        (index < self.storage.len()).then_some(index)
    }

    pub(crate) fn stack_at(&self, page: usize, slot: usize) -> Option<Stack> {
        self.storage_slot(page, slot).and_then(|i| self.storage.get(i))
    }

    pub fn validate(&self, slot: usize, stack: Option<&Stack>) -> bool {
        match &self.validator {
            Some(validator) => validator(&ValidatorInfo { slot, stack }),
            None => true,
        }
    }

    /// Commit `stack` to the storage index behind `slot`. Returns `false`
    /// when the slot maps outside the storage or the validator declines.
    pub fn set_stack_at(&self, page: usize, slot: usize, stack: Option<Stack>) -> bool {
        let Some(index) = self.storage_slot(page, slot) else {
            return false;
        };
        if !self.validate(slot, stack.as_ref()) {
            return false;
        }
        self.storage.set(index, stack);
        if let Some(apply) = &self.apply {
            apply();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::core::{Binding, GridId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bound(node: &StorageNode, slots: Vec<usize>) {
        node.base
            .bind(Binding {
                grid: GridId::next(),
                width: 9,
                slots,
            })
            .unwrap();
    }

    #[test]
    fn positional_index_follows_page() {
        let storage = Arc::new(VecStorage::from_stacks(
            (0..23).map(|i| Some(Stack::new(format!("entry{i}")))),
        ));
        let node = StorageNode::new(storage);
        bound(&node, (0..9).collect());

        assert_eq!(node.stack_at(0, 4).unwrap().kind, "entry4");
        assert_eq!(node.stack_at(2, 4).unwrap().kind, "entry22");
        // Page 2, slot 5 maps to index 23: outside the storage.
        assert!(node.stack_at(2, 5).is_none());
    }

    #[test]
    fn fixed_index_ignores_slot_position() {
        let storage = Arc::new(VecStorage::from_stacks([
            None,
            Some(Stack::new("pinned")),
        ]));
        let node = StorageNode::at_index(storage, 1);
        bound(&node, vec![3, 4, 5]);
        assert_eq!(node.stack_at(0, 3).unwrap().kind, "pinned");
        assert_eq!(node.stack_at(0, 5).unwrap().kind, "pinned");
    }

    #[test]
    fn validator_gates_commits() {
        let storage = Arc::new(VecStorage::new(9));
        let node = StorageNode::new(storage.clone())
            .with_validator(|info| info.stack.is_none_or(|s| s.kind == "allowed"));
        bound(&node, (0..9).collect());

        assert!(!node.set_stack_at(0, 2, Some(Stack::new("denied"))));
        assert!(storage.get(2).is_none());
        assert!(node.set_stack_at(0, 2, Some(Stack::new("allowed"))));
        assert_eq!(storage.get(2).unwrap().kind, "allowed");
    }

    #[test]
    fn apply_runs_after_successful_commit_only() {
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = applied.clone();
        let storage = Arc::new(VecStorage::new(4));
        let node = StorageNode::new(storage)
            .with_validator(|info| info.stack.is_none_or(|s| s.kind != "denied"))
            .with_apply(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        bound(&node, (0..4).collect());

        assert!(!node.set_stack_at(0, 0, Some(Stack::new("denied"))));
        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert!(node.set_stack_at(0, 0, Some(Stack::new("ore"))));
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn insert_tops_up_similar_before_claiming_empty_cells() {
        let storage = VecStorage::from_stacks([
            Some(Stack::new("ore").with_quantity(60)),
            None,
        ]);
        let leftover = storage.insert(Stack::new("ore").with_quantity(70)).unwrap();
        assert_eq!(storage.get(0).unwrap().quantity, 64);
        assert_eq!(storage.get(1).unwrap().quantity, 64);
        assert_eq!(leftover.quantity, 2);
    }

    #[test]
    fn insert_reports_overflow() {
        let storage = VecStorage::from_stacks([Some(Stack::new("other"))]);
        let leftover = storage.insert(Stack::new("ore").with_quantity(10)).unwrap();
        assert_eq!(leftover.quantity, 10);
    }
}
