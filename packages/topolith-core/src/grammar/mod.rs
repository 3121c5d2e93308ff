//! Parser for the topolith command language.
//!
//! The grammar lives in `topolith.pest`. It recognizes commands, response
//! blocks, world blobs, bare trees, and status lines, with first-match-wins
//! ordered choice. Symmetry invariant: every response the system produces is
//! itself valid input.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

use crate::error::{Error, Result};

#[derive(PestParser)]
#[grammar = "grammar/topolith.pest"]
struct TopolithParser;

/// Resource a command addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    World,
    Item,
    Rel,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::World => write!(f, "world"),
            ResourceKind::Item => write!(f, "item"),
            ResourceKind::Rel => write!(f, "rel"),
        }
    }
}

/// Closed verb set of the command language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Create,
    Fetch,
    Set,
    Clear,
    Delete,
    List,
    Nest,
    Free,
    Exists,
    ToQuery,
    FromQuery,
    InQuery,
    CreateOrFetch,
    CreateOrSet,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Create => "create",
            Verb::Fetch => "fetch",
            Verb::Set => "set",
            Verb::Clear => "clear",
            Verb::Delete => "delete",
            Verb::List => "list",
            Verb::Nest => "nest",
            Verb::Free => "free",
            Verb::Exists => "exists",
            Verb::ToQuery => "to?",
            Verb::FromQuery => "from?",
            Verb::InQuery => "in?",
            Verb::CreateOrFetch => "create-or-fetch",
            Verb::CreateOrSet => "create-or-set",
        };
        write!(f, "{s}")
    }
}

/// Trailing command flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Flag {
    Strict,
    Verbose,
    Ids,
}

/// Structured result of parsing a command statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputAttributes {
    pub resource: ResourceKind,
    pub resource_id: String,
    /// Subject ids of plural tree mutations (`nest`, `free`).
    pub resource_ids: Vec<String>,
    /// The second id of rel operations, or the parent id of `nest`.
    pub secondary_ids: Vec<String>,
    pub verb: Verb,
    pub params: BTreeMap<String, String>,
    pub flags: BTreeSet<Flag>,
    pub raw: String,
}

impl InputAttributes {
    fn new(resource: ResourceKind, verb: Verb, raw: &str) -> Self {
        InputAttributes {
            resource,
            resource_id: String::new(),
            resource_ids: Vec::new(),
            secondary_ids: Vec::new(),
            verb,
            params: BTreeMap::new(),
            flags: BTreeSet::new(),
            raw: raw.to_string(),
        }
    }

    pub fn strict(&self) -> bool {
        self.flags.contains(&Flag::Strict)
    }

    pub fn ids_only(&self) -> bool {
        self.flags.contains(&Flag::Ids)
    }
}

/// Kind of the object embedded in a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Item,
    Rel,
    Rels,
    World,
    Tree,
    Ids,
    Bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseObject {
    pub kind: ObjectKind,
    /// Canonical text of the object. For id lists this is a JSON array of the
    /// ids; for worlds it is the body between the `$$world`/`endworld$$`
    /// markers.
    pub repr: String,
}

/// Trailing status of a response, or a standalone status line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub ok: bool,
    pub message: String,
    /// Further quoted tokens (structured error data).
    pub extras: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedResponse {
    pub object: Option<ResponseObject>,
    pub status: Status,
}

/// A node of a parsed tree statement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedNode {
    /// `None` for the `nil` sentinel.
    pub id: Option<String>,
    /// The embedded item repr, when the node carries one.
    pub item_repr: Option<String>,
    pub children: Vec<ParsedNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedWorld {
    pub params: BTreeMap<String, String>,
    pub tree: ParsedNode,
    /// Item reprs gathered from the tree, in pre-order.
    pub item_reprs: Vec<String>,
    pub rel_reprs: Vec<String>,
}

/// A parsed top-level statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Command(InputAttributes),
    Response(ParsedResponse),
    World(ParsedWorld),
    Tree(ParsedNode),
    Status(Status),
}

/// Parse any input accepted by the grammar into a typed statement.
pub fn parse(input: &str) -> Result<Statement> {
    let mut pairs = TopolithParser::parse(Rule::input, input).map_err(from_pest_error)?;
    let root = pairs
        .next()
        .ok_or_else(|| Error::invalid("empty input"))?;
    let stmt = first_inner(root)?;
    match stmt.as_rule() {
        Rule::command_stmt => Ok(Statement::Command(build_command(stmt, input)?)),
        Rule::response => Ok(Statement::Response(build_response(stmt)?)),
        Rule::world_stmt => {
            let world_obj = first_inner(stmt)?;
            Ok(Statement::World(build_world(world_obj)?))
        }
        Rule::tree_stmt => {
            let tree = first_inner(stmt)?;
            let mut reprs = Vec::new();
            Ok(Statement::Tree(build_tree_node(tree, &mut reprs)?))
        }
        Rule::status_stmt => {
            let status = first_inner(stmt)?;
            Ok(Statement::Status(build_status(status)))
        }
        other => Err(Error::internal("unexpected parse root").with_data("rule", format!("{other:?}"))),
    }
}

fn from_pest_error(err: pest::error::Error<Rule>) -> Error {
    let (line, col) = match err.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
    };
    Error::invalid("invalid input")
        .with_data("line", line.to_string())
        .with_data("col", col.to_string())
        .with_data("detail", err.variant.message())
}

fn first_inner(pair: Pair<Rule>) -> Result<Pair<Rule>> {
    pair.into_inner()
        .next()
        .ok_or_else(|| Error::internal("empty parse node"))
}

/// Unwrap `sl`/`string_like`/`world_param_value` wrappers down to the token
/// text, stripping quotes.
fn string_value(pair: Pair<Rule>) -> String {
    let mut current = pair;
    loop {
        match current.as_rule() {
            Rule::sl | Rule::string_like | Rule::world_param_value => {
                match current.clone().into_inner().next() {
                    Some(inner) => current = inner,
                    None => return String::new(),
                }
            }
            Rule::quoted => {
                let text = current.as_str();
                return text[1..text.len() - 1].to_string();
            }
            _ => return current.as_str().to_string(),
        }
    }
}

fn param_key_value(pair: Pair<Rule>) -> (String, String) {
    // pair is external_param / type_param / name_param / mechanism_param /
    // expanded_param / verb_param / async_param.
    let key = match pair.as_rule() {
        Rule::external_param => "external",
        Rule::type_param => "type",
        Rule::name_param => "name",
        Rule::mechanism_param => "mechanism",
        Rule::expanded_param => "expanded",
        Rule::verb_param => "verb",
        Rule::async_param => "async",
        _ => "",
    };
    let value = pair
        .into_inner()
        .next()
        .map(string_value)
        .unwrap_or_default();
    (key.to_string(), value)
}

fn collect_params(attrs: &mut InputAttributes, pair: Pair<Rule>) {
    // pair is item_param or rel_param; descend to the concrete param.
    if let Some(inner) = pair.into_inner().next() {
        let (key, value) = param_key_value(inner);
        attrs.params.insert(key, value);
    }
}

fn build_command(stmt: Pair<Rule>, raw: &str) -> Result<InputAttributes> {
    let mut attrs: Option<InputAttributes> = None;
    let mut flags = BTreeSet::new();
    for part in stmt.into_inner() {
        match part.as_rule() {
            Rule::command => {
                let cmd = first_inner(part)?;
                attrs = Some(build_command_body(cmd, raw)?);
            }
            Rule::flag => {
                let name = part.as_str().trim_start_matches('-');
                let flag = match name {
                    "strict" => Flag::Strict,
                    "verbose" => Flag::Verbose,
                    "ids" => Flag::Ids,
                    _ => continue,
                };
                flags.insert(flag);
            }
            _ => {}
        }
    }
    let mut attrs = attrs.ok_or_else(|| Error::internal("command without body"))?;
    attrs.flags = flags;
    Ok(attrs)
}

fn build_command_body(cmd: Pair<Rule>, raw: &str) -> Result<InputAttributes> {
    let rule = cmd.as_rule();
    let mut ids: Vec<String> = Vec::new();
    let mut nest_ids: Vec<String> = Vec::new();
    let mut clear_keys: Vec<String> = Vec::new();
    let mut limit: Option<String> = None;
    let mut attrs = match rule {
        Rule::cmd_item_exists => InputAttributes::new(ResourceKind::Item, Verb::Exists, raw),
        Rule::cmd_rel_exists => InputAttributes::new(ResourceKind::Rel, Verb::Exists, raw),
        Rule::cmd_in_query => InputAttributes::new(ResourceKind::Item, Verb::InQuery, raw),
        Rule::cmd_to_query => InputAttributes::new(ResourceKind::Rel, Verb::ToQuery, raw),
        Rule::cmd_from_query => InputAttributes::new(ResourceKind::Rel, Verb::FromQuery, raw),
        Rule::cmd_nest => InputAttributes::new(ResourceKind::Item, Verb::Nest, raw),
        Rule::cmd_free => InputAttributes::new(ResourceKind::Item, Verb::Free, raw),
        Rule::cmd_item_list => InputAttributes::new(ResourceKind::Item, Verb::List, raw),
        Rule::cmd_item_children => InputAttributes::new(ResourceKind::Item, Verb::List, raw),
        Rule::cmd_item_create => InputAttributes::new(ResourceKind::Item, Verb::Create, raw),
        Rule::cmd_item_fetch => InputAttributes::new(ResourceKind::Item, Verb::Fetch, raw),
        Rule::cmd_item_set => InputAttributes::new(ResourceKind::Item, Verb::Set, raw),
        Rule::cmd_item_clear => InputAttributes::new(ResourceKind::Item, Verb::Clear, raw),
        Rule::cmd_item_delete => InputAttributes::new(ResourceKind::Item, Verb::Delete, raw),
        Rule::cmd_item_short => InputAttributes::new(ResourceKind::Item, Verb::CreateOrFetch, raw),
        Rule::cmd_rel_list => InputAttributes::new(ResourceKind::Rel, Verb::List, raw),
        Rule::cmd_rel_create => InputAttributes::new(ResourceKind::Rel, Verb::Create, raw),
        Rule::cmd_rel_fetch => InputAttributes::new(ResourceKind::Rel, Verb::Fetch, raw),
        Rule::cmd_rel_set => InputAttributes::new(ResourceKind::Rel, Verb::Set, raw),
        Rule::cmd_rel_clear => InputAttributes::new(ResourceKind::Rel, Verb::Clear, raw),
        Rule::cmd_rel_delete => InputAttributes::new(ResourceKind::Rel, Verb::Delete, raw),
        Rule::cmd_rel_short => InputAttributes::new(ResourceKind::Rel, Verb::CreateOrFetch, raw),
        Rule::cmd_world => InputAttributes::new(ResourceKind::World, Verb::Fetch, raw),
        other => {
            return Err(
                Error::internal("unexpected command rule").with_data("rule", format!("{other:?}"))
            );
        }
    };
    for part in cmd.into_inner() {
        match part.as_rule() {
            Rule::sl => ids.push(string_value(part)),
            Rule::nest_id => nest_ids.push(string_value(part)),
            Rule::item_param | Rule::rel_param => collect_params(&mut attrs, part),
            Rule::item_clear_key | Rule::rel_clear_key => {
                clear_keys.push(part.as_str().to_string());
            }
            Rule::number => limit = Some(part.as_str().to_string()),
            _ => {}
        }
    }
    match rule {
        Rule::cmd_nest => {
            attrs.resource_ids = nest_ids;
            attrs.secondary_ids = ids; // the trailing parent id
        }
        Rule::cmd_free => {
            attrs.resource_ids = ids;
        }
        Rule::cmd_rel_exists
        | Rule::cmd_rel_create
        | Rule::cmd_rel_fetch
        | Rule::cmd_rel_set
        | Rule::cmd_rel_clear
        | Rule::cmd_rel_delete
        | Rule::cmd_rel_short
        | Rule::cmd_in_query => {
            let mut ids = ids.into_iter();
            attrs.resource_id = ids.next().unwrap_or_default();
            attrs.secondary_ids = ids.collect();
        }
        _ => {
            attrs.resource_id = ids.into_iter().next().unwrap_or_default();
        }
    }
    if let Some(limit) = limit {
        attrs.params.insert("limit".to_string(), limit);
    }
    for key in clear_keys {
        attrs.params.insert(key, String::new());
    }
    // Shortcut forms with parameters are create-or-set.
    if matches!(rule, Rule::cmd_item_short | Rule::cmd_rel_short) && !attrs.params.is_empty() {
        attrs.verb = Verb::CreateOrSet;
    }
    Ok(attrs)
}

fn build_status(pair: Pair<Rule>) -> Status {
    let mut code = 0u16;
    let mut ok = false;
    let mut message = String::new();
    let mut extras = Vec::new();
    let mut saw_message = false;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::number => code = part.as_str().parse().unwrap_or(0),
            Rule::status_word => ok = part.as_str() == "ok",
            Rule::string_like => {
                let value = string_value(part);
                if saw_message {
                    extras.push(value);
                } else {
                    message = value;
                    saw_message = true;
                }
            }
            _ => {}
        }
    }
    Status {
        code,
        ok,
        message,
        extras,
    }
}

fn build_response(pair: Pair<Rule>) -> Result<ParsedResponse> {
    let mut object = None;
    let mut status = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::resp_object => object = Some(build_object(part)?),
            Rule::status => status = Some(build_status(part)),
            _ => {}
        }
    }
    Ok(ParsedResponse {
        object,
        status: status.ok_or_else(|| Error::internal("response without status"))?,
    })
}

fn build_object(pair: Pair<Rule>) -> Result<ResponseObject> {
    let inner = first_inner(pair)?;
    let repr = inner.as_str().to_string();
    let object = match inner.as_rule() {
        Rule::world_object => ResponseObject {
            kind: ObjectKind::World,
            repr: world_body(&repr),
        },
        Rule::tree => ResponseObject {
            kind: ObjectKind::Tree,
            repr,
        },
        Rule::item_obj => ResponseObject {
            kind: ObjectKind::Item,
            repr,
        },
        Rule::rel_seq => {
            let rels: Vec<_> = inner
                .into_inner()
                .filter(|p| p.as_rule() == Rule::rel_obj)
                .collect();
            if rels.len() == 1 {
                ResponseObject {
                    kind: ObjectKind::Rel,
                    repr: rels[0].as_str().to_string(),
                }
            } else {
                ResponseObject {
                    kind: ObjectKind::Rels,
                    repr,
                }
            }
        }
        Rule::bool_obj => ResponseObject {
            kind: ObjectKind::Bool,
            repr,
        },
        Rule::id_list => {
            let ids: Vec<String> = inner
                .into_inner()
                .filter(|p| p.as_rule() == Rule::string_like)
                .map(string_value)
                .collect();
            ResponseObject {
                kind: ObjectKind::Ids,
                repr: serde_json::to_string(&ids).unwrap_or_default(),
            }
        }
        other => {
            return Err(
                Error::internal("unexpected response object").with_data("rule", format!("{other:?}"))
            );
        }
    };
    Ok(object)
}

/// Body of a world blob: the text between the `$$world` and `endworld$$`
/// markers.
fn world_body(text: &str) -> String {
    text.trim_start_matches("$$world")
        .trim_end_matches("endworld$$")
        .trim_matches('\n')
        .to_string()
}

fn build_world(pair: Pair<Rule>) -> Result<ParsedWorld> {
    let mut params = BTreeMap::new();
    let mut tree = ParsedNode::default();
    let mut item_reprs = Vec::new();
    let mut rel_reprs = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::world_param => {
                let mut key = String::new();
                let mut value = String::new();
                for piece in part.into_inner() {
                    match piece.as_rule() {
                        Rule::world_param_key => key = piece.as_str().to_string(),
                        Rule::world_param_value => value = string_value(piece),
                        _ => {}
                    }
                }
                params.insert(key, value);
            }
            Rule::tree => tree = build_tree_node(part, &mut item_reprs)?,
            Rule::rel_obj => rel_reprs.push(part.as_str().to_string()),
            _ => {}
        }
    }
    Ok(ParsedWorld {
        params,
        tree,
        item_reprs,
        rel_reprs,
    })
}

fn build_tree_node(pair: Pair<Rule>, item_reprs: &mut Vec<String>) -> Result<ParsedNode> {
    let mut node = ParsedNode::default();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::kw_nil => {}
            Rule::item_obj => {
                let repr = part.as_str().to_string();
                let id = part
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::string_like)
                    .map(string_value)
                    .unwrap_or_default();
                item_reprs.push(repr.clone());
                node.id = Some(id);
                node.item_repr = Some(repr);
            }
            Rule::tree => node.children.push(build_tree_node(part, item_reprs)?),
            _ => {}
        }
    }
    Ok(node)
}
