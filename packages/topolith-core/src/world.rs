use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Error, Result};
use crate::grammar::{self, Statement};
use crate::item::{Item, ItemParams};
use crate::rel::{rel_id, Rel, RelParams};
use crate::tree::Tree;

pub const CURRENT_VERSION: i64 = 1;

/// The complete state under management: descriptive metadata, the items map,
/// the rels map, and the containment tree. Serializes as a single text block
/// bracketed by `$$world` / `endworld$$`.
#[derive(Clone, Debug)]
pub struct World {
    version: i64,
    id: String,
    name: String,
    expanded: String,
    items: HashMap<String, Item>,
    rels: HashMap<String, Rel>,
    tree: Tree,
}

impl World {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        World {
            version: CURRENT_VERSION,
            id: name.clone(),
            name,
            expanded: String::new(),
            items: HashMap::new(),
            rels: HashMap::new(),
            tree: Tree::new(),
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expanded(&self) -> &str {
        &self.expanded
    }

    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_expanded(&mut self, expanded: impl Into<String>) {
        self.expanded = expanded.into();
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    // --- item operations -------------------------------------------------

    /// Create an item, or fetch it when one with matching attributes already
    /// exists. Mismatched attributes on an existing item are a Conflict; the
    /// existing item is left unchanged.
    pub fn item_create(&mut self, id: &str, params: ItemParams) -> Result<Item> {
        if id.is_empty() {
            return Err(Error::invalid("id cannot be empty"));
        }
        if let Some(existing) = self.items.get(id) {
            params.check_against(existing)?;
            return Ok(existing.clone());
        }
        let mut item = Item::new(id);
        let applied = params.apply(&mut item);
        self.items.insert(id.to_string(), item.clone());
        self.tree.add_or_move(id, None)?;
        debug!(id, "item created");
        applied.map(|_| item)
    }

    /// Delete an item, every rel touching it, and its tree node (children
    /// re-parent to the deleted node's former parent). Missing ids are a
    /// no-op.
    pub fn item_delete(&mut self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid("id cannot be empty"));
        }
        self.items.remove(id);
        self.tree.delete(id);
        self.rels.retain(|_, rel| rel.from != id && rel.to != id);
        debug!(id, "item deleted");
        Ok(())
    }

    pub fn item_fetch(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Up to `limit` items, sorted by id. 0 means no limit.
    pub fn item_list(&self, limit: usize) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        if limit > 0 {
            items.truncate(limit);
        }
        items
    }

    /// Apply every set field of `params` to an existing item.
    pub fn item_set(&mut self, id: &str, params: ItemParams) -> Result<Item> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| Error::not_found("item not found").with_data("id", id))?;
        let applied = params.apply(item);
        let item = item.clone();
        debug!(id, "item updated");
        applied.map(|_| item)
    }

    /// Reset the named attributes of an existing item to their defaults.
    pub fn item_clear(&mut self, id: &str, keys: &[String]) -> Result<Item> {
        self.item_set(id, ItemParams::clearing(keys)?)
    }

    // --- containment -----------------------------------------------------

    /// Move `child_id` (with its subtree) to be a direct child of
    /// `parent_id`. No-op when the child already sits under the parent.
    /// Nesting an item under itself or its own descendant is a Conflict.
    pub fn nest(&mut self, child_id: &str, parent_id: &str) -> Result<Item> {
        let child = self
            .items
            .get(child_id)
            .cloned()
            .ok_or_else(|| {
                Error::not_found("childId for nest not found").with_data("childId", child_id)
            })?;
        if !self.items.contains_key(parent_id) {
            return Err(
                Error::not_found("parentId for nest not found").with_data("parentId", parent_id)
            );
        }
        if !self.tree.contains(parent_id) {
            // The parent item exists but its tree node is gone. The maps are
            // out of sync; surface it rather than papering over.
            return Err(Error::bad_sync_state("parentId for nest not found in tree")
                .with_data("parentId", parent_id));
        }
        if child_id == parent_id || self.tree.is_under(parent_id, child_id, false) {
            return Err(Error::conflict("cannot nest an item under itself or its descendant")
                .with_data("childId", child_id)
                .with_data("parentId", parent_id));
        }
        if self.tree.is_under(child_id, parent_id, false) {
            return Ok(child);
        }
        self.tree.add_or_move(child_id, Some(parent_id))?;
        debug!(child_id, parent_id, "item nested");
        Ok(child)
    }

    /// Move `child_id` (with its subtree) to the root.
    pub fn free(&mut self, child_id: &str) -> Result<Item> {
        let child = self
            .items
            .get(child_id)
            .cloned()
            .ok_or_else(|| {
                Error::not_found("childId for free not found").with_data("childId", child_id)
            })?;
        self.tree.add_or_move(child_id, None)?;
        debug!(child_id, "item freed");
        Ok(child)
    }

    /// True iff `child_id` sits under `parent_id`. Strict requires direct
    /// containment; non-strict accepts any transitive descendant.
    pub fn is_in(&self, child_id: &str, parent_id: &str, strict: bool) -> bool {
        self.tree.is_under(child_id, parent_id, strict)
    }

    /// Parent id of `child_id`: `Ok(None)` for a direct root child.
    pub fn parent(&self, child_id: &str) -> Result<Option<String>> {
        self.tree
            .parent_of(child_id)
            .ok_or_else(|| Error::not_found("item not found in tree").with_data("id", child_id))
    }

    /// Direct child ids of `id`, sorted.
    pub fn components(&self, id: &str) -> Result<Vec<String>> {
        self.tree
            .children_of(id)
            .ok_or_else(|| Error::not_found("item not found in tree").with_data("id", id))
    }

    /// Direct children of `id` as items.
    pub fn item_components(&self, id: &str) -> Result<Vec<Item>> {
        Ok(self
            .components(id)?
            .into_iter()
            .filter_map(|cid| self.items.get(&cid).cloned())
            .collect())
    }

    // --- rel operations --------------------------------------------------

    /// Create a rel, or fetch it when one with matching attributes already
    /// exists. Both endpoints must exist.
    pub fn rel_create(&mut self, from: &str, to: &str, params: RelParams) -> Result<Rel> {
        if !self.items.contains_key(from) {
            return Err(Error::not_found("fromId for rel not found").with_data("fromId", from));
        }
        if !self.items.contains_key(to) {
            return Err(Error::not_found("toId for rel not found").with_data("toId", to));
        }
        if let Some(existing) = self.rels.get(&rel_id(from, to)) {
            params.check_against(existing)?;
            return Ok(existing.clone());
        }
        let mut rel = Rel::new(from, to);
        params.apply(&mut rel);
        self.rels.insert(rel.id(), rel.clone());
        debug!(from, to, "rel created");
        Ok(rel)
    }

    /// Delete a rel. Missing rels are a no-op.
    pub fn rel_delete(&mut self, from: &str, to: &str) -> Result<()> {
        self.rels.remove(&rel_id(from, to));
        debug!(from, to, "rel deleted");
        Ok(())
    }

    /// Strict: lookup by composite id. Non-strict: every rel whose source is
    /// in {from} ∪ descendants(from) and destination in {to} ∪
    /// descendants(to). Sorted by composite id.
    pub fn rel_fetch(&self, from: &str, to: &str, strict: bool) -> Vec<Rel> {
        if strict {
            return self
                .rels
                .get(&rel_id(from, to))
                .cloned()
                .into_iter()
                .collect();
        }
        let mut from_ids = self.tree.descendant_ids(from);
        from_ids.push(from.to_string());
        let mut to_ids = self.tree.descendant_ids(to);
        to_ids.push(to.to_string());
        let mut rels: Vec<Rel> = self
            .rels
            .values()
            .filter(|rel| from_ids.contains(&rel.from) && to_ids.contains(&rel.to))
            .cloned()
            .collect();
        rels.sort_by_key(Rel::id);
        rels
    }

    /// Rels whose destination is `to`. The strict flag is inverted relative
    /// to the other queries: strict expands the id set with descendants.
    pub fn rel_to(&self, to: &str, strict: bool) -> Vec<Rel> {
        let mut to_ids = vec![to.to_string()];
        if strict {
            to_ids.extend(self.tree.descendant_ids(to));
        }
        let mut rels: Vec<Rel> = self
            .rels
            .values()
            .filter(|rel| to_ids.contains(&rel.to))
            .cloned()
            .collect();
        rels.sort_by_key(Rel::id);
        rels
    }

    /// Rels whose source is `from`. Strict inversion as in [`World::rel_to`].
    pub fn rel_from(&self, from: &str, strict: bool) -> Vec<Rel> {
        let mut from_ids = vec![from.to_string()];
        if strict {
            from_ids.extend(self.tree.descendant_ids(from));
        }
        let mut rels: Vec<Rel> = self
            .rels
            .values()
            .filter(|rel| from_ids.contains(&rel.from))
            .cloned()
            .collect();
        rels.sort_by_key(Rel::id);
        rels
    }

    /// Up to `limit` rels, sorted by composite id. 0 means no limit.
    pub fn rel_list(&self, limit: usize) -> Vec<Rel> {
        let mut rels: Vec<Rel> = self.rels.values().cloned().collect();
        rels.sort_by_key(Rel::id);
        if limit > 0 {
            rels.truncate(limit);
        }
        rels
    }

    /// Apply every set field of `params` to an existing rel.
    pub fn rel_set(&mut self, from: &str, to: &str, params: RelParams) -> Result<Rel> {
        let rel = self.rels.get_mut(&rel_id(from, to)).ok_or_else(|| {
            Error::not_found("rel not found")
                .with_data("fromId", from)
                .with_data("toId", to)
        })?;
        params.apply(rel);
        debug!(from, to, "rel updated");
        Ok(rel.clone())
    }

    /// Reset the named attributes of an existing rel to their defaults.
    pub fn rel_clear(&mut self, from: &str, to: &str, keys: &[String]) -> Result<Rel> {
        self.rel_set(from, to, RelParams::clearing(keys)?)
    }

    // --- integrity -------------------------------------------------------

    /// Items-map/Tree agreement plus arena invariants. A violation is a fatal
    /// sync-state error.
    pub fn validate_sync(&self) -> Result<()> {
        self.tree.validate()?;
        if self.items.len() != self.tree.len() {
            return Err(Error::bad_sync_state("items map and tree disagree")
                .with_data("items", self.items.len().to_string())
                .with_data("tree", self.tree.len().to_string()));
        }
        for id in self.items.keys() {
            if !self.tree.contains(id) {
                return Err(
                    Error::bad_sync_state("item missing from tree").with_data("id", id.clone())
                );
            }
        }
        for rel in self.rels.values() {
            if !self.items.contains_key(&rel.from) || !self.items.contains_key(&rel.to) {
                return Err(Error::bad_sync_state("rel endpoint missing from items")
                    .with_data("rel", rel.id()));
            }
        }
        Ok(())
    }

    /// World equality: version/id/name/expanded, the item set, the
    /// parent/children relation for every item, and the rel set.
    pub fn semantic_eq(&self, other: &World) -> bool {
        if self.version != other.version
            || self.id != other.id
            || self.name != other.name
            || self.expanded != other.expanded
        {
            return false;
        }
        if self.items != other.items || self.rels != other.rels {
            return false;
        }
        self.items.keys().all(|id| {
            self.tree.parent_of(id) == other.tree.parent_of(id)
                && self.tree.children_of(id) == other.tree.children_of(id)
        })
    }
}

impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        self.semantic_eq(other)
    }
}

fn world_param_repr(value: &str) -> String {
    let ident_safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if value.is_empty() || ident_safe {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "$$world")?;
        writeln!(f, "version={}", self.version)?;
        writeln!(f, "id={}", world_param_repr(&self.id))?;
        writeln!(f, "name={}", world_param_repr(&self.name))?;
        writeln!(f, "expanded={}", world_param_repr(&self.expanded))?;
        writeln!(f, "{}", self.tree.render(&self.items))?;
        for rel in self.rel_list(0) {
            writeln!(f, "{rel}")?;
        }
        write!(f, "endworld$$")
    }
}

impl FromStr for World {
    type Err = Error;

    fn from_str(s: &str) -> Result<World> {
        let parsed = match grammar::parse(s)? {
            Statement::World(parsed) => parsed,
            _ => {
                return Err(Error::invalid("not a world blob"));
            }
        };
        let mut world = World::new(parsed.params.get("name").cloned().unwrap_or_default());
        if let Some(version) = parsed.params.get("version") {
            if let Ok(version) = version.parse::<i64>() {
                if version != 0 {
                    world.set_version(version);
                }
            }
        }
        if let Some(id) = parsed.params.get("id") {
            if !id.is_empty() {
                world.set_id(id.clone());
            }
        }
        if let Some(expanded) = parsed.params.get("expanded") {
            if !expanded.is_empty() {
                world.set_expanded(expanded.clone());
            }
        }

        let (tree, items) = Tree::from_parsed(&parsed.tree)?;
        world.tree = tree;
        world.items = items;

        for repr in &parsed.rel_reprs {
            let rel = Rel::from_repr(repr)?;
            world.rel_create(&rel.from, &rel.to, RelParams::capture(&rel))?;
        }
        world.validate_sync()?;
        Ok(world)
    }
}
