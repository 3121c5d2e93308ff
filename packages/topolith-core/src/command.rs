use std::fmt;

use crate::error::{combine, Error, Result};
use crate::grammar::{InputAttributes, ResourceKind, Verb};
use crate::item::{Item, ItemParams};
use crate::rel::{rel_id, Rel, RelParams};
use crate::world::World;

/// Value produced by executing a command. Every variant has a canonical
/// string form the grammar parses back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    None,
    Bool(bool),
    Item(Item),
    Rel(Rel),
    Rels(Vec<Rel>),
    Ids(Vec<String>),
    World(String),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::None => Ok(()),
            Output::Bool(b) => write!(f, "{b}"),
            Output::Item(item) => write!(f, "{item}"),
            Output::Rel(rel) => write!(f, "{rel}"),
            Output::Rels(rels) => {
                let lines: Vec<String> = rels.iter().map(Rel::to_string).collect();
                write!(f, "{}", lines.join("\n"))
            }
            Output::Ids(ids) => {
                let quoted: Vec<String> = ids.iter().map(|id| format!("\"{id}\"")).collect();
                write!(f, "{}", quoted.join(" "))
            }
            Output::World(block) => write!(f, "{block}"),
        }
    }
}

/// One executed (or executable) user intent. Mutating variants capture enough
/// pre-image state during `execute` to produce an exact inverse in `undo`;
/// query variants undo as a no-op.
///
/// Every variant documents its failure mode: a variant whose execute fails
/// leaves its captured state empty, which makes the undo a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    WorldFetch,
    ItemCreate {
        id: String,
        params: ItemParams,
        created: bool,
    },
    ItemFetch {
        id: String,
    },
    ItemList {
        limit: usize,
    },
    ItemSet {
        id: String,
        params: ItemParams,
        old: Option<ItemParams>,
    },
    ItemClear {
        id: String,
        keys: Vec<String>,
        old: Option<ItemParams>,
    },
    ItemDelete {
        id: String,
        old: Option<ItemParams>,
        old_parent: Option<String>,
        children: Vec<String>,
        rels: Vec<Rel>,
    },
    ItemNest {
        ids: Vec<String>,
        parent_id: String,
        moved: Vec<(String, Option<String>)>,
    },
    ItemFree {
        ids: Vec<String>,
        moved: Vec<(String, Option<String>)>,
    },
    ItemExists {
        id: String,
    },
    ItemInQuery {
        child_id: String,
        parent_id: String,
        strict: bool,
    },
    ItemComponentsList {
        id: String,
    },
    ItemCreateOrFetch {
        id: String,
        created: bool,
    },
    ItemCreateOrSet {
        id: String,
        params: ItemParams,
        created: bool,
        old: Option<ItemParams>,
    },
    RelCreate {
        from: String,
        to: String,
        params: RelParams,
        created: bool,
    },
    RelFetch {
        from: String,
        to: String,
        strict: bool,
        ids_only: bool,
    },
    RelSet {
        from: String,
        to: String,
        params: RelParams,
        old: Option<RelParams>,
    },
    RelClear {
        from: String,
        to: String,
        keys: Vec<String>,
        old: Option<RelParams>,
    },
    RelDelete {
        from: String,
        to: String,
        old: Option<RelParams>,
    },
    RelList {
        limit: usize,
        ids_only: bool,
    },
    RelExists {
        from: String,
        to: String,
    },
    RelToQuery {
        id: String,
        strict: bool,
        ids_only: bool,
    },
    RelFromQuery {
        id: String,
        strict: bool,
        ids_only: bool,
    },
    RelCreateOrFetch {
        from: String,
        to: String,
        created: bool,
    },
    RelCreateOrSet {
        from: String,
        to: String,
        params: RelParams,
        created: bool,
        old: Option<RelParams>,
    },
}

impl Command {
    /// Build a command from parsed input. Dispatch is exhaustive over the
    /// closed resource × verb table; anything else is Invalid.
    pub fn from_input(attrs: &InputAttributes) -> Result<Command> {
        let limit = attrs
            .params
            .get("limit")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        match (attrs.resource, attrs.verb) {
            (ResourceKind::World, Verb::Fetch) => Ok(Command::WorldFetch),
            (ResourceKind::Item, Verb::Create) => Ok(Command::ItemCreate {
                id: attrs.resource_id.clone(),
                params: ItemParams::from_map(&attrs.params)?,
                created: false,
            }),
            (ResourceKind::Item, Verb::Fetch) => Ok(Command::ItemFetch {
                id: attrs.resource_id.clone(),
            }),
            (ResourceKind::Item, Verb::List) => {
                if attrs.resource_id.is_empty() {
                    Ok(Command::ItemList { limit })
                } else {
                    Ok(Command::ItemComponentsList {
                        id: attrs.resource_id.clone(),
                    })
                }
            }
            (ResourceKind::Item, Verb::Set) => Ok(Command::ItemSet {
                id: attrs.resource_id.clone(),
                params: ItemParams::from_map(&attrs.params)?,
                old: None,
            }),
            (ResourceKind::Item, Verb::Clear) => Ok(Command::ItemClear {
                id: attrs.resource_id.clone(),
                keys: attrs.params.keys().cloned().collect(),
                old: None,
            }),
            (ResourceKind::Item, Verb::Delete) => Ok(Command::ItemDelete {
                id: attrs.resource_id.clone(),
                old: None,
                old_parent: None,
                children: Vec::new(),
                rels: Vec::new(),
            }),
            (ResourceKind::Item, Verb::Nest) => Ok(Command::ItemNest {
                ids: attrs.resource_ids.clone(),
                parent_id: secondary(attrs)?,
                moved: Vec::new(),
            }),
            (ResourceKind::Item, Verb::Free) => Ok(Command::ItemFree {
                ids: attrs.resource_ids.clone(),
                moved: Vec::new(),
            }),
            (ResourceKind::Item, Verb::Exists) => Ok(Command::ItemExists {
                id: attrs.resource_id.clone(),
            }),
            (ResourceKind::Item, Verb::InQuery) => Ok(Command::ItemInQuery {
                child_id: attrs.resource_id.clone(),
                parent_id: attrs.secondary_ids.first().cloned().unwrap_or_default(),
                strict: attrs.strict(),
            }),
            (ResourceKind::Item, Verb::CreateOrFetch) => Ok(Command::ItemCreateOrFetch {
                id: attrs.resource_id.clone(),
                created: false,
            }),
            (ResourceKind::Item, Verb::CreateOrSet) => Ok(Command::ItemCreateOrSet {
                id: attrs.resource_id.clone(),
                params: ItemParams::from_map(&attrs.params)?,
                created: false,
                old: None,
            }),
            (ResourceKind::Rel, Verb::Create) => Ok(Command::RelCreate {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                params: RelParams::from_map(&attrs.params)?,
                created: false,
            }),
            (ResourceKind::Rel, Verb::Fetch) => Ok(Command::RelFetch {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                strict: attrs.strict(),
                ids_only: attrs.ids_only(),
            }),
            (ResourceKind::Rel, Verb::Set) => Ok(Command::RelSet {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                params: RelParams::from_map(&attrs.params)?,
                old: None,
            }),
            (ResourceKind::Rel, Verb::Clear) => Ok(Command::RelClear {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                keys: attrs.params.keys().cloned().collect(),
                old: None,
            }),
            (ResourceKind::Rel, Verb::Delete) => Ok(Command::RelDelete {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                old: None,
            }),
            (ResourceKind::Rel, Verb::List) => Ok(Command::RelList {
                limit,
                ids_only: attrs.ids_only(),
            }),
            (ResourceKind::Rel, Verb::Exists) => Ok(Command::RelExists {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
            }),
            (ResourceKind::Rel, Verb::ToQuery) => Ok(Command::RelToQuery {
                id: attrs.resource_id.clone(),
                strict: attrs.strict(),
                ids_only: attrs.ids_only(),
            }),
            (ResourceKind::Rel, Verb::FromQuery) => Ok(Command::RelFromQuery {
                id: attrs.resource_id.clone(),
                strict: attrs.strict(),
                ids_only: attrs.ids_only(),
            }),
            (ResourceKind::Rel, Verb::CreateOrFetch) => Ok(Command::RelCreateOrFetch {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                created: false,
            }),
            (ResourceKind::Rel, Verb::CreateOrSet) => Ok(Command::RelCreateOrSet {
                from: attrs.resource_id.clone(),
                to: secondary(attrs)?,
                params: RelParams::from_map(&attrs.params)?,
                created: false,
                old: None,
            }),
            (resource, verb) => Err(Error::invalid("unknown command")
                .with_data("resourceType", resource.to_string())
                .with_data("verb", verb.to_string())),
        }
    }

    /// Run the command against the world, capturing inverse state.
    pub fn execute(&mut self, w: &mut World) -> Result<Output> {
        match self {
            Command::WorldFetch => Ok(Output::World(w.to_string())),

            Command::ItemCreate {
                id,
                params,
                created,
            } => {
                let existed = w.item_fetch(id).is_some();
                let result = w.item_create(id, params.clone());
                // A partially-applied create still created the item; the flag
                // tracks post-state so undo stays exact.
                *created = !existed && w.item_fetch(id).is_some();
                result.map(Output::Item)
            }

            Command::ItemFetch { id } => match w.item_fetch(id) {
                Some(item) => Ok(Output::Item(item.clone())),
                None => Err(Error::not_found("item not found").with_data("id", id.clone())),
            },

            Command::ItemList { limit } => Ok(Output::Ids(
                w.item_list(*limit).into_iter().map(|i| i.id).collect(),
            )),

            Command::ItemSet { id, params, old } => {
                let item = w
                    .item_fetch(id)
                    .ok_or_else(|| Error::not_found("item not found").with_data("id", id.clone()))?;
                *old = Some(ItemParams::capture(item));
                Ok(Output::Item(w.item_set(id, params.clone())?))
            }

            Command::ItemClear { id, keys, old } => {
                let item = w
                    .item_fetch(id)
                    .ok_or_else(|| Error::not_found("item not found").with_data("id", id.clone()))?;
                *old = Some(ItemParams::capture(item));
                Ok(Output::Item(w.item_clear(id, keys)?))
            }

            Command::ItemDelete {
                id,
                old,
                old_parent,
                children,
                rels,
            } => {
                let Some(item) = w.item_fetch(id) else {
                    return Ok(Output::None);
                };
                *old = Some(ItemParams::capture(item));
                *old_parent = w.parent(id)?;
                *children = w.components(id)?;
                *rels = w
                    .rel_list(0)
                    .into_iter()
                    .filter(|rel| rel.from == *id || rel.to == *id)
                    .collect();
                w.item_delete(id)?;
                Ok(Output::None)
            }

            Command::ItemNest {
                ids,
                parent_id,
                moved,
            } => {
                let mut errs = Vec::new();
                let mut nested = Vec::new();
                for id in ids.iter() {
                    let old_parent = match w.parent(id) {
                        Ok(parent) => parent,
                        Err(e) => {
                            errs.push(e);
                            continue;
                        }
                    };
                    match w.nest(id, parent_id) {
                        Ok(_) => {
                            moved.push((id.clone(), old_parent));
                            nested.push(id.clone());
                        }
                        Err(e) => errs.push(e),
                    }
                }
                match combine(errs) {
                    Some(err) => Err(err),
                    None => Ok(Output::Ids(nested)),
                }
            }

            Command::ItemFree { ids, moved } => {
                let mut errs = Vec::new();
                let mut freed = Vec::new();
                for id in ids.iter() {
                    let old_parent = match w.parent(id) {
                        Ok(parent) => parent,
                        Err(e) => {
                            errs.push(e);
                            continue;
                        }
                    };
                    match w.free(id) {
                        Ok(_) => {
                            moved.push((id.clone(), old_parent));
                            freed.push(id.clone());
                        }
                        Err(e) => errs.push(e),
                    }
                }
                match combine(errs) {
                    Some(err) => Err(err),
                    None => Ok(Output::Ids(freed)),
                }
            }

            Command::ItemExists { id } => Ok(Output::Bool(w.item_fetch(id).is_some())),

            Command::ItemInQuery {
                child_id,
                parent_id,
                strict,
            } => Ok(Output::Bool(w.is_in(child_id, parent_id, *strict))),

            Command::ItemComponentsList { id } => Ok(Output::Ids(w.components(id)?)),

            Command::ItemCreateOrFetch { id, created } => {
                if let Some(item) = w.item_fetch(id) {
                    return Ok(Output::Item(item.clone()));
                }
                let item = w.item_create(id, ItemParams::default())?;
                *created = true;
                Ok(Output::Item(item))
            }

            Command::ItemCreateOrSet {
                id,
                params,
                created,
                old,
            } => {
                if let Some(item) = w.item_fetch(id) {
                    *old = Some(ItemParams::capture(item));
                    return Ok(Output::Item(w.item_set(id, params.clone())?));
                }
                let result = w.item_create(id, params.clone());
                *created = w.item_fetch(id).is_some();
                result.map(Output::Item)
            }

            Command::RelCreate {
                from,
                to,
                params,
                created,
            } => {
                let existed = !w.rel_fetch(from, to, true).is_empty();
                let rel = w.rel_create(from, to, params.clone())?;
                *created = !existed;
                Ok(Output::Rel(rel))
            }

            Command::RelFetch {
                from,
                to,
                strict,
                ids_only,
            } => Ok(rel_output(w.rel_fetch(from, to, *strict), *ids_only)),

            Command::RelSet {
                from,
                to,
                params,
                old,
            } => {
                let existing = w.rel_fetch(from, to, true);
                let rel = existing.first().ok_or_else(|| {
                    Error::not_found("rel not found")
                        .with_data("fromId", from.clone())
                        .with_data("toId", to.clone())
                })?;
                *old = Some(RelParams::capture(rel));
                Ok(Output::Rel(w.rel_set(from, to, params.clone())?))
            }

            Command::RelClear {
                from,
                to,
                keys,
                old,
            } => {
                let existing = w.rel_fetch(from, to, true);
                let rel = existing.first().ok_or_else(|| {
                    Error::not_found("rel not found")
                        .with_data("fromId", from.clone())
                        .with_data("toId", to.clone())
                })?;
                *old = Some(RelParams::capture(rel));
                Ok(Output::Rel(w.rel_clear(from, to, keys)?))
            }

            Command::RelDelete { from, to, old } => {
                let existing = w.rel_fetch(from, to, true);
                let Some(rel) = existing.first() else {
                    return Ok(Output::None);
                };
                *old = Some(RelParams::capture(rel));
                w.rel_delete(from, to)?;
                Ok(Output::None)
            }

            Command::RelList { limit, ids_only } => Ok(rel_output(w.rel_list(*limit), *ids_only)),

            Command::RelExists { from, to } => {
                Ok(Output::Bool(!w.rel_fetch(from, to, true).is_empty()))
            }

            Command::RelToQuery {
                id,
                strict,
                ids_only,
            } => Ok(rel_output(w.rel_to(id, *strict), *ids_only)),

            Command::RelFromQuery {
                id,
                strict,
                ids_only,
            } => Ok(rel_output(w.rel_from(id, *strict), *ids_only)),

            Command::RelCreateOrFetch { from, to, created } => {
                if let Some(rel) = w.rel_fetch(from, to, true).into_iter().next() {
                    return Ok(Output::Rel(rel));
                }
                let rel = w.rel_create(from, to, RelParams::default())?;
                *created = true;
                Ok(Output::Rel(rel))
            }

            Command::RelCreateOrSet {
                from,
                to,
                params,
                created,
                old,
            } => {
                if let Some(rel) = w.rel_fetch(from, to, true).into_iter().next() {
                    *old = Some(RelParams::capture(&rel));
                    return Ok(Output::Rel(w.rel_set(from, to, params.clone())?));
                }
                let rel = w.rel_create(from, to, params.clone())?;
                *created = true;
                Ok(Output::Rel(rel))
            }
        }
    }

    /// Apply the exact inverse of a prior `execute`. Commands whose execute
    /// did nothing (or failed) undo as a no-op.
    pub fn undo(&self, w: &mut World) -> Result<()> {
        match self {
            Command::WorldFetch
            | Command::ItemFetch { .. }
            | Command::ItemList { .. }
            | Command::ItemExists { .. }
            | Command::ItemInQuery { .. }
            | Command::ItemComponentsList { .. }
            | Command::RelFetch { .. }
            | Command::RelList { .. }
            | Command::RelExists { .. }
            | Command::RelToQuery { .. }
            | Command::RelFromQuery { .. } => Ok(()),

            Command::ItemCreate { id, created, .. }
            | Command::ItemCreateOrFetch { id, created } => {
                if *created {
                    w.item_delete(id)?;
                }
                Ok(())
            }

            Command::ItemSet { id, old, .. } | Command::ItemClear { id, old, .. } => {
                if let Some(old) = old {
                    w.item_set(id, old.clone())?;
                }
                Ok(())
            }

            Command::ItemDelete {
                id,
                old,
                old_parent,
                children,
                rels,
            } => {
                let Some(old) = old else {
                    return Ok(());
                };
                w.item_create(id, old.clone())?;
                if let Some(parent) = old_parent {
                    w.nest(id, parent)?;
                }
                for child in children {
                    w.nest(child, id)?;
                }
                for rel in rels {
                    w.rel_create(&rel.from, &rel.to, RelParams::capture(rel))?;
                }
                Ok(())
            }

            Command::ItemNest { moved, .. } | Command::ItemFree { moved, .. } => {
                for (id, old_parent) in moved.iter().rev() {
                    match old_parent {
                        Some(parent) => w.nest(id, parent)?,
                        None => w.free(id)?,
                    };
                }
                Ok(())
            }

            Command::ItemCreateOrSet {
                id, created, old, ..
            } => {
                if *created {
                    w.item_delete(id)?;
                } else if let Some(old) = old {
                    w.item_set(id, old.clone())?;
                }
                Ok(())
            }

            Command::RelCreate {
                from, to, created, ..
            }
            | Command::RelCreateOrFetch { from, to, created } => {
                if *created {
                    w.rel_delete(from, to)?;
                }
                Ok(())
            }

            Command::RelSet { from, to, old, .. } | Command::RelClear { from, to, old, .. } => {
                if let Some(old) = old {
                    w.rel_set(from, to, old.clone())?;
                }
                Ok(())
            }

            Command::RelDelete { from, to, old } => {
                if let Some(old) = old {
                    w.rel_create(from, to, old.clone())?;
                }
                Ok(())
            }

            Command::RelCreateOrSet {
                from,
                to,
                created,
                old,
                ..
            } => {
                if *created {
                    w.rel_delete(from, to)?;
                } else if let Some(old) = old {
                    w.rel_set(from, to, old.clone())?;
                }
                Ok(())
            }
        }
    }
}

fn secondary(attrs: &InputAttributes) -> Result<String> {
    attrs
        .secondary_ids
        .first()
        .cloned()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            Error::invalid("command requires a second id").with_data("input", attrs.raw.clone())
        })
}

fn rel_output(rels: Vec<Rel>, ids_only: bool) -> Output {
    if ids_only {
        Output::Ids(rels.iter().map(|r| rel_id(&r.from, &r.to)).collect())
    } else {
        Output::Rels(rels)
    }
}

fn quoted(id: &str) -> String {
    format!("\"{id}\"")
}

impl fmt::Display for Command {
    /// Canonical command text, parseable by the grammar.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::WorldFetch => write!(f, "world"),
            Command::ItemCreate { id, params, .. } => {
                write!(f, "item create {}", quoted(id))?;
                write_fragment(f, &params.fragment())
            }
            Command::ItemFetch { id } => write!(f, "item fetch {}", quoted(id)),
            Command::ItemList { limit } => {
                write!(f, "item list")?;
                if *limit > 0 {
                    write!(f, " {limit}")?;
                }
                Ok(())
            }
            Command::ItemSet { id, params, .. } => {
                write!(f, "item set {}", quoted(id))?;
                write_fragment(f, &params.fragment())
            }
            Command::ItemClear { id, keys, .. } => {
                write!(f, "item clear {}", quoted(id))?;
                for key in keys {
                    write!(f, " {key}")?;
                }
                Ok(())
            }
            Command::ItemDelete { id, .. } => write!(f, "item delete {}", quoted(id)),
            Command::ItemNest { ids, parent_id, .. } => {
                write!(f, "nest")?;
                for id in ids {
                    write!(f, " {}", quoted(id))?;
                }
                write!(f, " in {}", quoted(parent_id))
            }
            Command::ItemFree { ids, .. } => {
                write!(f, "free")?;
                for id in ids {
                    write!(f, " {}", quoted(id))?;
                }
                Ok(())
            }
            Command::ItemExists { id } => write!(f, "item? {}", quoted(id)),
            Command::ItemInQuery {
                child_id,
                parent_id,
                strict,
            } => {
                write!(f, "in? {} {}", quoted(child_id), quoted(parent_id))?;
                if *strict {
                    write!(f, " --strict")?;
                }
                Ok(())
            }
            Command::ItemComponentsList { id } => write!(f, "items in {}", quoted(id)),
            Command::ItemCreateOrFetch { id, .. } => write!(f, "item {}", quoted(id)),
            Command::ItemCreateOrSet { id, params, .. } => {
                write!(f, "item {}", quoted(id))?;
                write_fragment(f, &params.fragment())
            }
            Command::RelCreate {
                from, to, params, ..
            } => {
                write!(f, "rel create {} {}", quoted(from), quoted(to))?;
                write_fragment(f, &params.fragment())
            }
            Command::RelFetch {
                from, to, strict, ..
            } => {
                write!(f, "rel fetch {} {}", quoted(from), quoted(to))?;
                if *strict {
                    write!(f, " --strict")?;
                }
                Ok(())
            }
            Command::RelSet {
                from, to, params, ..
            } => {
                write!(f, "rel set {} {}", quoted(from), quoted(to))?;
                write_fragment(f, &params.fragment())
            }
            Command::RelClear { from, to, keys, .. } => {
                write!(f, "rel clear {} {}", quoted(from), quoted(to))?;
                for key in keys {
                    write!(f, " {key}")?;
                }
                Ok(())
            }
            Command::RelDelete { from, to, .. } => {
                write!(f, "rel delete {} {}", quoted(from), quoted(to))
            }
            Command::RelList { limit, .. } => {
                write!(f, "rel list")?;
                if *limit > 0 {
                    write!(f, " {limit}")?;
                }
                Ok(())
            }
            Command::RelExists { from, to } => {
                write!(f, "rel? {} {}", quoted(from), quoted(to))
            }
            Command::RelToQuery { id, strict, .. } => {
                write!(f, "to? {}", quoted(id))?;
                if *strict {
                    write!(f, " --strict")?;
                }
                Ok(())
            }
            Command::RelFromQuery { id, strict, .. } => {
                write!(f, "from? {}", quoted(id))?;
                if *strict {
                    write!(f, " --strict")?;
                }
                Ok(())
            }
            Command::RelCreateOrFetch { from, to, .. } => {
                write!(f, "rel {} {}", quoted(from), quoted(to))
            }
            Command::RelCreateOrSet {
                from, to, params, ..
            } => {
                write!(f, "rel {} {}", quoted(from), quoted(to))?;
                write_fragment(f, &params.fragment())
            }
        }
    }
}

fn write_fragment(f: &mut fmt::Formatter<'_>, fragment: &str) -> fmt::Result {
    if fragment.is_empty() {
        Ok(())
    } else {
        write!(f, " {fragment}")
    }
}
