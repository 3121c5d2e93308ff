use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grammar::{self, Statement};

/// The kind of an [`Item`]. `Unset` is the default for items created without
/// an explicit type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Unset,
    Person,
    Database,
    Queue,
    Blobstore,
    Browser,
    Mobile,
    Server,
    Device,
    Code,
}

impl ItemType {
    pub const NAMES: [&'static str; 9] = [
        "person",
        "database",
        "queue",
        "blobstore",
        "browser",
        "mobile",
        "server",
        "device",
        "code",
    ];

    /// Lowercase name, or the empty string for `Unset`.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Unset => "",
            ItemType::Person => "person",
            ItemType::Database => "database",
            ItemType::Queue => "queue",
            ItemType::Blobstore => "blobstore",
            ItemType::Browser => "browser",
            ItemType::Mobile => "mobile",
            ItemType::Server => "server",
            ItemType::Device => "device",
            ItemType::Code => "code",
        }
    }

    /// Integer encoding (0 = unset, 1..=9 the named kinds).
    pub fn code(self) -> i64 {
        match self {
            ItemType::Unset => 0,
            ItemType::Person => 1,
            ItemType::Database => 2,
            ItemType::Queue => 3,
            ItemType::Blobstore => 4,
            ItemType::Browser => 5,
            ItemType::Mobile => 6,
            ItemType::Server => 7,
            ItemType::Device => 8,
            ItemType::Code => 9,
        }
    }

    pub fn from_name(name: &str) -> Option<ItemType> {
        match name {
            "person" => Some(ItemType::Person),
            "database" => Some(ItemType::Database),
            "queue" => Some(ItemType::Queue),
            "blobstore" => Some(ItemType::Blobstore),
            "browser" => Some(ItemType::Browser),
            "mobile" => Some(ItemType::Mobile),
            "server" => Some(ItemType::Server),
            "device" => Some(ItemType::Device),
            "code" => Some(ItemType::Code),
            _ => None,
        }
    }

    pub fn from_code(code: i64) -> Option<ItemType> {
        match code {
            0 => Some(ItemType::Unset),
            1 => Some(ItemType::Person),
            2 => Some(ItemType::Database),
            3 => Some(ItemType::Queue),
            4 => Some(ItemType::Blobstore),
            5 => Some(ItemType::Browser),
            6 => Some(ItemType::Mobile),
            7 => Some(ItemType::Server),
            8 => Some(ItemType::Device),
            9 => Some(ItemType::Code),
            _ => None,
        }
    }

    /// Resolve a textual type value: either a lowercase name or the integer
    /// encoding of the variant.
    pub fn resolve(value: &str) -> Result<ItemType> {
        if let Some(t) = ItemType::from_name(value) {
            return Ok(t);
        }
        value
            .parse::<i64>()
            .ok()
            .and_then(ItemType::from_code)
            .ok_or_else(|| {
                Error::conflict("invalid item type").with_data("type", value)
            })
    }
}

/// A single entity in the world: a node of the containment tree and an
/// endpoint for relationships.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub external: bool,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub name: String,
    pub mechanism: String,
    pub expanded: String,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Item {
            id: id.into(),
            ..Item::default()
        }
    }

    /// Parse the canonical repr (`item "<id>" key=value…`) back into an Item.
    pub fn from_repr(s: &str) -> Result<Item> {
        let attrs = match grammar::parse(s)? {
            Statement::Command(attrs) if attrs.resource == grammar::ResourceKind::Item => attrs,
            _ => {
                return Err(Error::invalid("not an item repr").with_data("input", s));
            }
        };
        let mut item = Item::new(attrs.resource_id.clone());
        let params = ItemParams::from_map(&attrs.params)?;
        params.apply(&mut item)?;
        Ok(item)
    }
}

impl fmt::Display for Item {
    /// Canonical repr. Defaulted attributes are omitted so the repr
    /// round-trips through the grammar byte-for-byte.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item \"{}\"", self.id)?;
        if self.external {
            write!(f, " external=true")?;
        }
        if self.item_type != ItemType::Unset {
            write!(f, " type={}", self.item_type.as_str())?;
        }
        if !self.name.is_empty() {
            write!(f, " name=\"{}\"", self.name)?;
        }
        if !self.mechanism.is_empty() {
            write!(f, " mechanism=\"{}\"", self.mechanism)?;
        }
        if !self.expanded.is_empty() {
            write!(f, " expanded=\"{}\"", self.expanded)?;
        }
        Ok(())
    }
}

/// Optional attribute updates for an [`Item`]. `None` fields are untouched.
/// The type is carried as text (name or integer encoding) and resolved when
/// applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemParams {
    pub external: Option<bool>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub name: Option<String>,
    pub mechanism: Option<String>,
    pub expanded: Option<String>,
}

impl ItemParams {
    pub fn from_map(params: &BTreeMap<String, String>) -> Result<ItemParams> {
        let mut out = ItemParams::default();
        for (key, value) in params {
            match key.as_str() {
                "external" => out.external = Some(value == "true"),
                "type" => out.item_type = Some(value.clone()),
                "name" => out.name = Some(value.clone()),
                "mechanism" => out.mechanism = Some(value.clone()),
                "expanded" => out.expanded = Some(value.clone()),
                "limit" => {}
                _ => {
                    return Err(Error::invalid("unknown item parameter")
                        .with_data("key", key.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Full pre-image of an item, for undo capture.
    pub fn capture(item: &Item) -> ItemParams {
        ItemParams {
            external: Some(item.external),
            item_type: Some(item.item_type.as_str().to_string()),
            name: Some(item.name.clone()),
            mechanism: Some(item.mechanism.clone()),
            expanded: Some(item.expanded.clone()),
        }
    }

    /// Params that reset the named keys to their defaults; unknown keys error.
    pub fn clearing(keys: &[String]) -> Result<ItemParams> {
        let mut out = ItemParams::default();
        for key in keys {
            match key.as_str() {
                "external" => out.external = Some(false),
                "type" => out.item_type = Some(String::new()),
                "name" => out.name = Some(String::new()),
                "mechanism" => out.mechanism = Some(String::new()),
                "expanded" => out.expanded = Some(String::new()),
                _ => {
                    return Err(Error::invalid("unknown item parameter")
                        .with_data("key", key.clone()));
                }
            }
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.external.is_none()
            && self.item_type.is_none()
            && self.name.is_none()
            && self.mechanism.is_none()
            && self.expanded.is_none()
    }

    /// Apply every set field to `item`. An unresolvable type records the error
    /// but the remaining fields still land.
    pub fn apply(&self, item: &mut Item) -> Result<()> {
        let mut type_err = None;
        if let Some(external) = self.external {
            item.external = external;
        }
        if let Some(raw) = &self.item_type {
            if raw.is_empty() {
                item.item_type = ItemType::Unset;
            } else {
                match ItemType::resolve(raw) {
                    Ok(t) => item.item_type = t,
                    Err(e) => type_err = Some(e),
                }
            }
        }
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(mechanism) = &self.mechanism {
            item.mechanism = mechanism.clone();
        }
        if let Some(expanded) = &self.expanded {
            item.expanded = expanded.clone();
        }
        match type_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Check the set fields against an existing item; any mismatch is a
    /// Conflict carrying both sides as JSON.
    pub fn check_against(&self, existing: &Item) -> Result<()> {
        let type_matches = match &self.item_type {
            None => true,
            Some(raw) if raw.is_empty() => existing.item_type == ItemType::Unset,
            Some(raw) => ItemType::resolve(raw)
                .map(|t| t == existing.item_type)
                .unwrap_or(false),
        };
        let matches = self.external.map_or(true, |v| v == existing.external)
            && type_matches
            && self.name.as_ref().map_or(true, |v| *v == existing.name)
            && self
                .mechanism
                .as_ref()
                .map_or(true, |v| *v == existing.mechanism)
            && self
                .expanded
                .as_ref()
                .map_or(true, |v| *v == existing.expanded);
        if matches {
            return Ok(());
        }
        Err(Error::conflict("parameter mismatch")
            .with_data("object", "Item")
            .with_data(
                "existing",
                serde_json::to_string(existing).unwrap_or_default(),
            )
            .with_data("params", serde_json::to_string(self).unwrap_or_default()))
    }

    /// Command-text fragment (`external=true name="x" …`) for set fields.
    pub fn fragment(&self) -> String {
        let mut parts = Vec::new();
        if let Some(external) = self.external {
            parts.push(format!("external={external}"));
        }
        if let Some(t) = &self.item_type {
            if !t.is_empty() {
                parts.push(format!("type={t}"));
            }
        }
        if let Some(name) = &self.name {
            parts.push(format!("name=\"{name}\""));
        }
        if let Some(mechanism) = &self.mechanism {
            parts.push(format!("mechanism=\"{mechanism}\""));
        }
        if let Some(expanded) = &self.expanded {
            parts.push(format!("expanded=\"{expanded}\""));
        }
        parts.join(" ")
    }
}
