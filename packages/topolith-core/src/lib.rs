#![forbid(unsafe_code)]
//! Core primitives for topolith: a textual command language, a world of items
//! and directed rels grouped by a single-parent containment tree, and an
//! invertible command engine with undo/redo.
//!
//! Every output of the system re-parses as valid input; the grammar is the
//! wire format and the persisted format alike. Frontends (terminal, browser)
//! stay outside this crate and drive it through [`app::App`].

pub mod app;
pub mod command;
pub mod error;
pub mod grammar;
pub mod item;
pub mod persist;
pub mod rel;
pub mod tree;
pub mod world;

pub use app::App;
pub use command::{Command, Output};
pub use error::{Error, ErrorCode, Result};
pub use grammar::{
    Flag, InputAttributes, ObjectKind, ParsedNode, ParsedResponse, ParsedWorld, ResourceKind,
    ResponseObject, Statement, Status, Verb,
};
pub use item::{Item, ItemParams, ItemType};
pub use persist::WorldStore;
pub use rel::{rel_id, Rel, RelParams};
pub use tree::Tree;
pub use world::{World, CURRENT_VERSION};
