//! Flat, identity-indexed view of an AST.
//!
//! Nodes live in a `Vec`; parents refer to children by index. Looking a node up by
//! identity is a single hash probe instead of a tree walk. `into_tree` restores the
//! nested form exactly.

use std::collections::HashMap;

use crate::validate::AstNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdx(usize);

#[derive(Debug, Clone)]
struct Slot {
    /// The node with its `children` emptied; structure lives in `children` below.
    node: AstNode,
    children: Vec<NodeIdx>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    roots: Vec<NodeIdx>,
    by_id: HashMap<String, NodeIdx>,
}

impl NodeArena {
    pub fn from_tree(tree: &[AstNode]) -> Self {
        let mut arena = NodeArena::default();
        let roots = tree.iter().map(|node| arena.insert(node)).collect();
        arena.roots = roots;
        arena
    }

    fn insert(&mut self, node: &AstNode) -> NodeIdx {
        let idx = NodeIdx(self.slots.len());
        let mut shallow = node.clone();
        shallow.children = Vec::new();
        if let Some(id) = &shallow.id {
            self.by_id.entry(id.clone()).or_insert(idx);
        }
        self.slots.push(Slot {
            node: shallow,
            children: Vec::new(),
        });

        let children = node.children.iter().map(|child| self.insert(child)).collect();
        self.slots[idx.0].children = children;
        idx
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn roots(&self) -> &[NodeIdx] {
        &self.roots
    }

    pub fn find(&self, id: &str) -> Option<NodeIdx> {
        self.by_id.get(id).copied()
    }

    /// The node at `idx`, without its children.
    pub fn get(&self, idx: NodeIdx) -> &AstNode {
        &self.slots[idx.0].node
    }

    pub fn get_mut(&mut self, idx: NodeIdx) -> &mut AstNode {
        &mut self.slots[idx.0].node
    }

    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.slots[idx.0].children
    }

    pub fn into_tree(self) -> Vec<AstNode> {
        let mut nodes: Vec<Option<AstNode>> = Vec::with_capacity(self.slots.len());
        let mut structure = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            nodes.push(Some(slot.node));
            structure.push(slot.children);
        }
        self.roots
            .iter()
            .filter_map(|idx| assemble(*idx, &mut nodes, &structure))
            .collect()
    }
}

fn assemble(
    idx: NodeIdx,
    nodes: &mut Vec<Option<AstNode>>,
    structure: &[Vec<NodeIdx>],
) -> Option<AstNode> {
    let mut node = nodes[idx.0].take()?;
    node.children = structure[idx.0]
        .iter()
        .filter_map(|child| assemble(*child, nodes, structure))
        .collect();
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<AstNode> {
        let mut p = AstNode::element("p");
        p.id = Some("p1".to_string());
        p.children.push(AstNode::text("Hello", Some("t1".to_string())));

        let mut img = AstNode::element("img");
        img.id = Some("i1".to_string());

        let mut div = AstNode::element("div");
        div.children.push(p);
        div.children.push(img);
        vec![div, AstNode::text("tail", None)]
    }

    #[test]
    fn test_round_trip_is_exact() {
        let tree = sample();
        let arena = NodeArena::from_tree(&tree);
        assert_eq!(arena.len(), 5);
        assert_eq!(arena.roots().len(), 2);
        assert_eq!(arena.into_tree(), tree);
    }

    #[test]
    fn test_find_and_mutate_by_identity() {
        let mut arena = NodeArena::from_tree(&sample());
        let idx = arena.find("i1").unwrap();
        arena
            .get_mut(idx)
            .attrs
            .insert("src".to_string(), "/b.png".to_string());

        let tree = arena.into_tree();
        assert_eq!(
            tree[0].children[1].attrs.get("src").map(String::as_str),
            Some("/b.png")
        );
    }

    #[test]
    fn test_children_indices() {
        let arena = NodeArena::from_tree(&sample());
        let p = arena.find("p1").unwrap();
        let kids = arena.children(p);
        assert_eq!(kids.len(), 1);
        assert_eq!(arena.get(kids[0]).text.as_deref(), Some("Hello"));
        assert!(arena.find("missing").is_none());
    }
}
