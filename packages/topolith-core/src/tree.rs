use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::grammar::ParsedNode;
use crate::item::Item;

/// The containment hierarchy over item ids.
///
/// An arena of nodes indexed by `usize`. Slot 0 is the root sentinel and
/// carries no item id. Every live item id maps to exactly one slot; moving a
/// subtree touches one parent index and two child sets. Freed slots are
/// recycled through a free list.
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    free: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
struct Node {
    item_id: Option<String>,
    parent: Option<usize>,
    children: BTreeSet<usize>,
    vacant: bool,
}

pub const ROOT: usize = 0;

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node::default()],
            index: HashMap::new(),
            free: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All live item ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Idempotent placement: attach `id` under `parent_id` (`None` = root).
    /// A node already elsewhere in the tree is detached and reattached with
    /// its whole subtree; an unknown id gets a fresh slot.
    pub fn add_or_move(&mut self, id: &str, parent_id: Option<&str>) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid("id cannot be empty"));
        }
        let parent_idx = match parent_id {
            None => ROOT,
            Some(pid) => *self.index.get(pid).ok_or_else(|| {
                Error::not_found("parent not found in tree").with_data("parentId", pid)
            })?,
        };
        match self.index.get(id).copied() {
            Some(idx) => {
                if self.nodes[idx].parent == Some(parent_idx) {
                    return Ok(());
                }
                self.detach(idx);
                self.attach(idx, parent_idx);
            }
            None => {
                let idx = self.alloc(id);
                self.attach(idx, parent_idx);
            }
        }
        Ok(())
    }

    /// Remove the node with `id`; its children reattach to its former parent.
    /// Unknown ids are a no-op.
    pub fn delete(&mut self, id: &str) {
        let Some(idx) = self.index.remove(id) else {
            return;
        };
        let parent_idx = self.nodes[idx].parent.unwrap_or(ROOT);
        let children: Vec<usize> = self.nodes[idx].children.iter().copied().collect();
        self.detach(idx);
        for child in children {
            self.nodes[idx].children.remove(&child);
            self.attach(child, parent_idx);
        }
        self.nodes[idx] = Node {
            vacant: true,
            ..Node::default()
        };
        self.free.push(idx);
    }

    /// Pre-order ids of the subtree rooted at `id`, excluding `id` itself.
    /// Empty when the id is unknown.
    pub fn descendant_ids(&self, id: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        self.collect_descendants(idx, &mut out);
        out
    }

    fn collect_descendants(&self, idx: usize, out: &mut Vec<String>) {
        for &child in &self.nodes[idx].children {
            if let Some(child_id) = &self.nodes[child].item_id {
                out.push(child_id.clone());
            }
            self.collect_descendants(child, out);
        }
    }

    /// Parent id of `id`: `None` for an unknown id, `Some(None)` for a direct
    /// root child.
    pub fn parent_of(&self, id: &str) -> Option<Option<String>> {
        let &idx = self.index.get(id)?;
        let parent_idx = self.nodes[idx].parent?;
        Some(self.nodes[parent_idx].item_id.clone())
    }

    /// Direct child ids of `id`, sorted. `None` when the id is unknown.
    pub fn children_of(&self, id: &str) -> Option<Vec<String>> {
        let &idx = self.index.get(id)?;
        Some(self.child_ids(idx))
    }

    /// Direct child ids of the root sentinel, sorted.
    pub fn root_children(&self) -> Vec<String> {
        self.child_ids(ROOT)
    }

    fn child_ids(&self, idx: usize) -> Vec<String> {
        let mut out: Vec<String> = self.nodes[idx]
            .children
            .iter()
            .filter_map(|&c| self.nodes[c].item_id.clone())
            .collect();
        out.sort();
        out
    }

    /// Containment test. Strict requires direct parentage; non-strict accepts
    /// the id itself or any transitive descendant.
    pub fn is_under(&self, child_id: &str, parent_id: &str, strict: bool) -> bool {
        let Some(&child_idx) = self.index.get(child_id) else {
            return false;
        };
        let Some(&parent_idx) = self.index.get(parent_id) else {
            return false;
        };
        if strict {
            return self.nodes[child_idx].parent == Some(parent_idx);
        }
        let mut current = Some(child_idx);
        while let Some(idx) = current {
            if idx == parent_idx {
                return true;
            }
            current = self.nodes[idx].parent;
        }
        false
    }

    /// Arena invariant check: index agreement and parent/child back-pointer
    /// symmetry. Violations indicate internal corruption.
    pub fn validate(&self) -> Result<()> {
        for (id, &idx) in &self.index {
            let node = &self.nodes[idx];
            if node.vacant || node.item_id.as_deref() != Some(id.as_str()) {
                return Err(Error::bad_sync_state("tree index points at wrong slot")
                    .with_data("id", id.clone()));
            }
            let Some(parent_idx) = node.parent else {
                return Err(Error::bad_sync_state("live node detached from tree")
                    .with_data("id", id.clone()));
            };
            if !self.nodes[parent_idx].children.contains(&idx) {
                return Err(Error::bad_sync_state("parent does not list child")
                    .with_data("id", id.clone()));
            }
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                if self.nodes[child].parent != Some(idx) {
                    return Err(Error::bad_sync_state("child parent mismatch"));
                }
            }
        }
        Ok(())
    }

    /// Serialize with item reprs drawn from `items`; children render sorted by
    /// id so the output is deterministic.
    pub fn render(&self, items: &HashMap<String, Item>) -> String {
        self.render_node(ROOT, items)
    }

    fn render_node(&self, idx: usize, items: &HashMap<String, Item>) -> String {
        let node = &self.nodes[idx];
        let label = match &node.item_id {
            None => "nil".to_string(),
            Some(id) => match items.get(id) {
                Some(item) => item.to_string(),
                None => format!("item \"{id}\""),
            },
        };
        let mut children: Vec<usize> = node.children.iter().copied().collect();
        children.sort_by(|&a, &b| self.nodes[a].item_id.cmp(&self.nodes[b].item_id));
        let rendered: Vec<String> = children
            .into_iter()
            .map(|c| self.render_node(c, items))
            .collect();
        format!("tree{{{label}::[{}]}}", rendered.join(" "))
    }

    /// Rebuild a tree (and the items it names) from a parsed tree statement.
    pub fn from_parsed(node: &ParsedNode) -> Result<(Tree, HashMap<String, Item>)> {
        let mut tree = Tree::new();
        let mut items = HashMap::new();
        for child in &node.children {
            Self::build_from(child, None, &mut tree, &mut items)?;
        }
        Ok((tree, items))
    }

    fn build_from(
        node: &ParsedNode,
        parent: Option<&str>,
        tree: &mut Tree,
        items: &mut HashMap<String, Item>,
    ) -> Result<()> {
        let id = node
            .id
            .clone()
            .ok_or_else(|| Error::invalid("nil node below tree root"))?;
        if tree.contains(&id) {
            return Err(Error::conflict("duplicate id in tree").with_data("id", id));
        }
        let item = match &node.item_repr {
            Some(repr) => Item::from_repr(repr)?,
            None => Item::new(id.clone()),
        };
        items.insert(id.clone(), item);
        tree.add_or_move(&id, parent)?;
        for child in &node.children {
            Self::build_from(child, Some(&id), tree, items)?;
        }
        Ok(())
    }

    fn alloc(&mut self, id: &str) -> usize {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.nodes.push(Node::default());
                self.nodes.len() - 1
            }
        };
        self.nodes[idx] = Node {
            item_id: Some(id.to_string()),
            parent: None,
            children: BTreeSet::new(),
            vacant: false,
        };
        self.index.insert(id.to_string(), idx);
        idx
    }

    fn detach(&mut self, idx: usize) {
        if let Some(parent) = self.nodes[idx].parent.take() {
            self.nodes[parent].children.remove(&idx);
        }
    }

    fn attach(&mut self, idx: usize, parent_idx: usize) {
        self.nodes[idx].parent = Some(parent_idx);
        self.nodes[parent_idx].children.insert(idx);
    }
}
