use std::sync::Arc;

use super::core::{ContentNode, NodeBase};

/// Row-local packing policy for a group's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

/// An ordered list of child nodes spread across the group's bound slots.
///
/// With more children than bound slots the group paginates; the viewer's page
/// selects which window of children is visible. Unfilled positions show the
/// group's filler, placed according to the alignment.
pub struct GroupNode {
    pub(crate) base: NodeBase,
    pub(crate) children: Vec<Arc<ContentNode>>,
    pub(crate) filler: Option<Arc<ContentNode>>,
    alignment: Alignment,
}

impl GroupNode {
    pub fn new(children: impl IntoIterator<Item = ContentNode>) -> Self {
        Self {
            base: NodeBase::default(),
            children: children.into_iter().map(Arc::new).collect(),
            filler: None,
            alignment: Alignment::Left,
        }
    }

    pub fn with_filler(mut self, filler: ContentNode) -> Self {
        self.filler = Some(Arc::new(filler));
        self
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The child effectively occupying `slot` on `page`, or the filler for
    /// blank positions. Pagination only applies when the group has fewer
    /// bound slots than children.
    pub(crate) fn child_for(&self, slot: usize, page: usize) -> Option<&Arc<ContentNode>> {
        if self.children.is_empty() {
            return None;
        }
        let binding = self.base.binding()?;
        let page = if binding.slots.len() < self.children.len() {
            page
        } else {
            0
        };
        let Some(index) = binding.slot_index(slot, page) else {
            return self.filler.as_ref();
        };

        match self.alignment {
            Alignment::Left => {
                if index < self.children.len() {
                    self.children.get(index)
                } else {
                    self.filler.as_ref()
                }
            }
            Alignment::Center | Alignment::Right => {
                let len = self.children.len() as i64;
                let index = index as i64;
                let line_width = binding.line_width(slot) as i64;
                let line_position = binding.line_position(slot) as i64;
                if len - index > line_width - line_position {
                    // The row is fully occupied by real children.
                    return self.children.get(index as usize);
                }
                let rest = len - (index - line_position);
                let blank_before = match self.alignment {
                    Alignment::Center => (line_width - rest) / 2,
                    _ => line_width - rest,
                };
                if line_position < blank_before || index - blank_before >= len {
                    return self.filler.as_ref();
                }
                self.children.get((index - blank_before) as usize)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::core::{Binding, GridId, Stack, StaticNode};

    fn child(kind: &str) -> ContentNode {
        StaticNode::new(Stack::new(kind)).into()
    }

    fn bound_group(children: usize, alignment: Alignment, slots: Vec<usize>) -> GroupNode {
        let group = GroupNode::new((0..children).map(|i| child(&format!("c{i}"))))
            .with_alignment(alignment)
            .with_filler(child("filler"));
        group
            .base
            .bind(Binding {
                grid: GridId::next(),
                width: 9,
                slots,
            })
            .unwrap();
        group
    }

    fn resolved_kinds(group: &GroupNode, slots: &[usize], page: usize) -> Vec<String> {
        slots
            .iter()
            .map(|&slot| {
                group
                    .child_for(slot, page)
                    .map(|node| match &**node {
                        ContentNode::Static(_) => {
                            // Identify children by pointer order instead of
                            // peeking into private stack state.
                            group
                                .children
                                .iter()
                                .position(|c| Arc::ptr_eq(c, node))
                                .map(|i| format!("c{i}"))
                                .unwrap_or_else(|| "filler".to_string())
                        }
                        _ => "other".to_string(),
                    })
                    .unwrap_or_else(|| "none".to_string())
            })
            .collect()
    }

    #[test]
    fn left_alignment_packs_from_the_start() {
        let slots: Vec<usize> = (0..9).collect();
        let group = bound_group(3, Alignment::Left, slots.clone());
        let kinds = resolved_kinds(&group, &slots, 0);
        assert_eq!(
            kinds,
            vec!["c0", "c1", "c2", "filler", "filler", "filler", "filler", "filler", "filler"]
        );
    }

    #[test]
    fn center_alignment_pads_two_on_each_side() {
        // 9-wide row, 5 children: blank_before = (9 - 5) / 2 = 2.
        let slots: Vec<usize> = (0..9).collect();
        let group = bound_group(5, Alignment::Center, slots.clone());
        let kinds = resolved_kinds(&group, &slots, 0);
        assert_eq!(
            kinds,
            vec!["filler", "filler", "c0", "c1", "c2", "c3", "c4", "filler", "filler"]
        );
    }

    #[test]
    fn right_alignment_pads_four_before() {
        // 9-wide row, 5 children: blank_before = 9 - 5 = 4.
        let slots: Vec<usize> = (0..9).collect();
        let group = bound_group(5, Alignment::Right, slots.clone());
        let kinds = resolved_kinds(&group, &slots, 0);
        assert_eq!(
            kinds,
            vec!["filler", "filler", "filler", "filler", "c0", "c1", "c2", "c3", "c4"]
        );
    }

    #[test]
    fn full_rows_stay_packed_under_center_alignment() {
        // Two 9-wide rows, 13 children: the first row is fully occupied, the
        // second centers the remaining 4.
        let slots: Vec<usize> = (0..18).collect();
        let group = bound_group(13, Alignment::Center, slots.clone());
        let kinds = resolved_kinds(&group, &slots, 0);
        let first_row: Vec<_> = kinds[..9].to_vec();
        assert_eq!(
            first_row,
            vec!["c0", "c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8"]
        );
        // rest = 13 - 9 = 4, blank_before = (9 - 4) / 2 = 2.
        let second_row: Vec<_> = kinds[9..].to_vec();
        assert_eq!(
            second_row,
            vec!["filler", "filler", "c9", "c10", "c11", "c12", "filler", "filler", "filler"]
        );
    }

    #[test]
    fn pagination_windows_children_when_slots_are_scarce() {
        let slots: Vec<usize> = (0..3).collect();
        let group = bound_group(7, Alignment::Left, slots.clone());
        assert_eq!(resolved_kinds(&group, &slots, 0), vec!["c0", "c1", "c2"]);
        assert_eq!(resolved_kinds(&group, &slots, 1), vec!["c3", "c4", "c5"]);
        assert_eq!(
            resolved_kinds(&group, &slots, 2),
            vec!["c6", "filler", "filler"]
        );
    }

    #[test]
    fn page_is_ignored_when_all_children_fit() {
        let slots: Vec<usize> = (0..4).collect();
        let group = bound_group(2, Alignment::Left, slots.clone());
        assert_eq!(
            resolved_kinds(&group, &slots, 3),
            vec!["c0", "c1", "filler", "filler"]
        );
    }

    #[test]
    fn empty_group_resolves_nothing() {
        let group = bound_group(0, Alignment::Left, (0..3).collect());
        assert!(group.child_for(0, 0).is_none());
    }
}
