use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grammar::{self, Statement};

pub const REL_ID_SEPARATOR: &str = "::";

/// A directed, labeled edge between two items, held by endpoint id.
/// At most one rel exists per ordered `(from, to)` pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rel {
    pub from: String,
    pub to: String,
    pub verb: String,
    pub mechanism: String,
    #[serde(rename = "async")]
    pub async_: bool,
    pub expanded: String,
}

impl Rel {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Rel {
            from: from.into(),
            to: to.into(),
            ..Rel::default()
        }
    }

    /// Composite id: `from::to`.
    pub fn id(&self) -> String {
        rel_id(&self.from, &self.to)
    }

    /// Parse the canonical repr (`rel "<from>" "<to>" key=value…`).
    pub fn from_repr(s: &str) -> Result<Rel> {
        let attrs = match grammar::parse(s)? {
            Statement::Command(attrs) if attrs.resource == grammar::ResourceKind::Rel => attrs,
            _ => {
                return Err(Error::invalid("not a rel repr").with_data("input", s));
            }
        };
        let to = attrs
            .secondary_ids
            .first()
            .cloned()
            .ok_or_else(|| Error::invalid("rel repr missing destination id").with_data("input", s))?;
        let mut rel = Rel::new(attrs.resource_id.clone(), to);
        RelParams::from_map(&attrs.params)?.apply(&mut rel);
        Ok(rel)
    }
}

impl fmt::Display for Rel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel \"{}\" \"{}\"", self.from, self.to)?;
        if !self.verb.is_empty() {
            write!(f, " verb=\"{}\"", self.verb)?;
        }
        if !self.mechanism.is_empty() {
            write!(f, " mechanism=\"{}\"", self.mechanism)?;
        }
        if self.async_ {
            write!(f, " async=true")?;
        }
        if !self.expanded.is_empty() {
            write!(f, " expanded=\"{}\"", self.expanded)?;
        }
        Ok(())
    }
}

pub fn rel_id(from: &str, to: &str) -> String {
    format!("{from}{REL_ID_SEPARATOR}{to}")
}

/// Optional attribute updates for a [`Rel`]. `None` fields are untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelParams {
    pub verb: Option<String>,
    pub mechanism: Option<String>,
    #[serde(rename = "async")]
    pub async_: Option<bool>,
    pub expanded: Option<String>,
}

impl RelParams {
    pub fn from_map(params: &BTreeMap<String, String>) -> Result<RelParams> {
        let mut out = RelParams::default();
        for (key, value) in params {
            match key.as_str() {
                "verb" => out.verb = Some(value.clone()),
                "mechanism" => out.mechanism = Some(value.clone()),
                "async" => out.async_ = Some(value == "true"),
                "expanded" => out.expanded = Some(value.clone()),
                "limit" => {}
                _ => {
                    return Err(Error::invalid("unknown rel parameter")
                        .with_data("key", key.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Full pre-image of a rel, for undo capture.
    pub fn capture(rel: &Rel) -> RelParams {
        RelParams {
            verb: Some(rel.verb.clone()),
            mechanism: Some(rel.mechanism.clone()),
            async_: Some(rel.async_),
            expanded: Some(rel.expanded.clone()),
        }
    }

    /// Params that reset the named keys to their defaults; unknown keys error.
    pub fn clearing(keys: &[String]) -> Result<RelParams> {
        let mut out = RelParams::default();
        for key in keys {
            match key.as_str() {
                "verb" => out.verb = Some(String::new()),
                "mechanism" => out.mechanism = Some(String::new()),
                "async" => out.async_ = Some(false),
                "expanded" => out.expanded = Some(String::new()),
                _ => {
                    return Err(Error::invalid("unknown rel parameter")
                        .with_data("key", key.clone()));
                }
            }
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.verb.is_none()
            && self.mechanism.is_none()
            && self.async_.is_none()
            && self.expanded.is_none()
    }

    pub fn apply(&self, rel: &mut Rel) {
        if let Some(verb) = &self.verb {
            rel.verb = verb.clone();
        }
        if let Some(mechanism) = &self.mechanism {
            rel.mechanism = mechanism.clone();
        }
        if let Some(async_) = self.async_ {
            rel.async_ = async_;
        }
        if let Some(expanded) = &self.expanded {
            rel.expanded = expanded.clone();
        }
    }

    /// Check the set fields against an existing rel; any mismatch is a
    /// Conflict carrying both sides as JSON.
    pub fn check_against(&self, existing: &Rel) -> Result<()> {
        let matches = self.verb.as_ref().map_or(true, |v| *v == existing.verb)
            && self
                .mechanism
                .as_ref()
                .map_or(true, |v| *v == existing.mechanism)
            && self.async_.map_or(true, |v| v == existing.async_)
            && self
                .expanded
                .as_ref()
                .map_or(true, |v| *v == existing.expanded);
        if matches {
            return Ok(());
        }
        Err(Error::conflict("parameter mismatch")
            .with_data("object", "Rel")
            .with_data(
                "existing",
                serde_json::to_string(existing).unwrap_or_default(),
            )
            .with_data("params", serde_json::to_string(self).unwrap_or_default()))
    }

    /// Command-text fragment (`verb="x" async=true …`) for set fields.
    pub fn fragment(&self) -> String {
        let mut parts = Vec::new();
        if let Some(verb) = &self.verb {
            parts.push(format!("verb=\"{verb}\""));
        }
        if let Some(mechanism) = &self.mechanism {
            parts.push(format!("mechanism=\"{mechanism}\""));
        }
        if let Some(async_) = self.async_ {
            parts.push(format!("async={async_}"));
        }
        if let Some(expanded) = &self.expanded {
            parts.push(format!("expanded=\"{expanded}\""));
        }
        parts.join(" ")
    }
}
