use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::host::ViewerId;

use super::core::{ContentNode, NodeBase};

/// Per-viewer query producing a fresh content node on demand.
pub type DynamicQuery = Arc<dyn Fn(ViewerId) -> Option<ContentNode> + Send + Sync>;

/// Monotonic stamp sequence shared by all dynamic caches: a refreshed entry
/// always carries a strictly larger stamp than the one it replaces.
static STAMP: AtomicU64 = AtomicU64::new(0);

fn next_stamp() -> u64 {
    STAMP.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Clone)]
struct CacheEntry {
    node: Option<Arc<ContentNode>>,
    stamp: u64,
}

/// Content resolved per viewer at draw time.
///
/// The query runs synchronously on the drawing viewer's context; it is
/// expected to be fast. A slow query delays that viewer's draw and nobody
/// else's. Results are cached per viewer and served until [`update`] is
/// called or the viewer's session ends.
///
/// [`update`]: DynamicNode::update
pub struct DynamicNode {
    pub(crate) base: NodeBase,
    query: DynamicQuery,
    cache: RwLock<HashMap<ViewerId, CacheEntry>>,
}

impl DynamicNode {
    pub fn new(query: impl Fn(ViewerId) -> Option<ContentNode> + Send + Sync + 'static) -> Self {
        Self {
            base: NodeBase::default(),
            query: Arc::new(query),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The cached resolution for `viewer`, querying (and caching) when none
    /// exists yet.
    pub(crate) fn cached(&self, viewer: ViewerId) -> Option<Arc<ContentNode>> {
        if let Some(entry) = self
            .cache
            .read()
            .expect("dynamic cache poisoned")
            .get(&viewer)
        {
            return entry.node.clone();
        }
        self.update(viewer)
    }

    /// Re-run the query for `viewer` and replace the cached entry. Nested
    /// dynamic results are refreshed recursively.
    pub fn update(&self, viewer: ViewerId) -> Option<Arc<ContentNode>> {
        let node = (self.query)(viewer).map(|fresh| {
            if let Some(binding) = self.base.binding() {
                // The query may hand back a node it keeps reusing; a node
                // bound on a previous refresh keeps its original binding.
                let _ = fresh.bind(binding.clone());
            }
            Arc::new(fresh)
        });
        if let Some(resolved) = &node {
            resolved.refresh_dynamic(viewer);
        }
        self.cache
            .write()
            .expect("dynamic cache poisoned")
            .insert(
                viewer,
                CacheEntry {
                    node: node.clone(),
                    stamp: next_stamp(),
                },
            );
        node
    }

    /// The stamp of the viewer's cache entry, if one exists.
    pub fn stamp(&self, viewer: ViewerId) -> Option<u64> {
        self.cache
            .read()
            .expect("dynamic cache poisoned")
            .get(&viewer)
            .map(|entry| entry.stamp)
    }

    /// Drop the viewer's cache entry, e.g. when their session ends.
    pub(crate) fn evict(&self, viewer: ViewerId) {
        self.cache
            .write()
            .expect("dynamic cache poisoned")
            .remove(&viewer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::core::{Binding, GridId, Stack, StaticNode};
    use std::sync::atomic::AtomicUsize;

    fn counting_node() -> (DynamicNode, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let node = DynamicNode::new(move |_viewer| {
            seen.fetch_add(1, Ordering::SeqCst);
            Some(StaticNode::new(Stack::new("fresh")).into())
        });
        (node, calls)
    }

    #[test]
    fn cached_resolution_is_referentially_stable() {
        let (node, calls) = counting_node();
        let viewer = ViewerId(7);
        let first = node.cached(viewer).unwrap();
        let second = node.cached(viewer).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_replaces_the_entry_and_advances_the_stamp() {
        let (node, calls) = counting_node();
        let viewer = ViewerId(7);
        let first = node.cached(viewer).unwrap();
        let stamp_before = node.stamp(viewer).unwrap();

        let refreshed = node.update(viewer).unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert!(node.stamp(viewer).unwrap() > stamp_before);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn caches_are_per_viewer_and_evictable() {
        let (node, calls) = counting_node();
        node.cached(ViewerId(1));
        node.cached(ViewerId(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        node.evict(ViewerId(1));
        assert!(node.stamp(ViewerId(1)).is_none());
        assert!(node.stamp(ViewerId(2)).is_some());
        node.cached(ViewerId(1));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn query_results_inherit_the_binding() {
        let node = DynamicNode::new(|_| Some(StaticNode::new(Stack::new("inner")).into()));
        node.base
            .bind(Binding {
                grid: GridId::next(),
                width: 9,
                slots: vec![4],
            })
            .unwrap();
        let resolved = node.cached(ViewerId(1)).unwrap();
        let binding = resolved.base().binding().unwrap();
        assert_eq!(binding.slots, vec![4]);
    }
}
