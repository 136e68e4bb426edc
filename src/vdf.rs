//! The generic VDF (Valve KeyValues) tree and its parser and formatter,
//! implemented with the `pest` parsing library.
//!
//! VMF files are VDF documents: blocks introduced by a bare name containing
//! quoted key/value pairs and nested blocks. A key that appears more than
//! once at the same level becomes a list-valued entry, which is how Hammer
//! expresses repeated solids, entities, and entity outputs. Escape sequences
//! are never processed.

use derive_more::{Deref, DerefMut, IntoIterator};
use indexmap::IndexMap;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::errors::{VmfError, VmfResult};

/// The VDF parser.
#[derive(Parser)]
#[grammar = "vdf.pest"]
struct VdfParser;

/// A value in a VDF object: a quoted scalar, a nested block, or the list
/// produced by a repeated key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum VdfValue {
    /// A quoted scalar, stored verbatim.
    Str(String),
    /// All occurrences of a key that is repeated at one level.
    List(Vec<VdfValue>),
    /// A brace-delimited block.
    Obj(VdfObject),
}

impl VdfValue {
    /// Returns the scalar text, if this value is a scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VdfValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested object, if this value is a block.
    pub fn as_obj(&self) -> Option<&VdfObject> {
        match self {
            VdfValue::Obj(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns the nested object mutably, if this value is a block.
    pub fn as_obj_mut(&mut self) -> Option<&mut VdfObject> {
        match self {
            VdfValue::Obj(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_obj(&self) -> bool {
        matches!(self, VdfValue::Obj(_))
    }
}

impl From<&str> for VdfValue {
    fn from(s: &str) -> Self {
        VdfValue::Str(s.to_string())
    }
}

impl From<String> for VdfValue {
    fn from(s: String) -> Self {
        VdfValue::Str(s)
    }
}

/// An insertion-ordered VDF block: the entries of one brace-delimited object,
/// or of the document root.
#[derive(Debug, Default, Clone, PartialEq, Deref, DerefMut, IntoIterator)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct VdfObject(pub IndexMap<String, VdfValue>);

impl VdfObject {
    pub fn new() -> Self {
        VdfObject(IndexMap::new())
    }

    /// Gets the scalar value for a key, if the entry is a scalar.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(VdfValue::as_str)
    }

    /// Appends an entry, turning a repeated key into a list-valued entry.
    pub fn push_entry(&mut self, key: impl Into<String>, value: VdfValue) {
        let key = key.into();
        match self.0.get_mut(&key) {
            None => {
                self.0.insert(key, value);
            }
            Some(VdfValue::List(list)) => list.push(value),
            Some(existing) => {
                let first = std::mem::replace(existing, VdfValue::List(Vec::with_capacity(2)));
                if let VdfValue::List(list) = existing {
                    list.push(first);
                    list.push(value);
                }
            }
        }
    }

    /// Removes one occurrence of `value` under `key`, collapsing a
    /// now-singleton list back to a scalar entry so that re-serialisation
    /// matches what the parser would produce. A non-list entry is removed
    /// outright.
    pub fn remove_entry_value(&mut self, key: &str, value: &VdfValue) {
        let Some(entry) = self.0.get_mut(key) else {
            return;
        };
        match entry {
            VdfValue::List(list) => {
                if let Some(pos) = list.iter().position(|v| v == value) {
                    list.remove(pos);
                }
                if list.len() == 1 {
                    let only = list.remove(0);
                    *entry = only;
                } else if list.is_empty() {
                    self.0.shift_remove(key);
                }
            }
            _ => {
                self.0.shift_remove(key);
            }
        }
    }
}

/// Parses a VDF document into its root object.
///
/// # Arguments
///
/// * `input` - The VDF text to parse.
///
/// # Returns
///
/// A `VmfResult` containing the root `VdfObject` or a `VmfError` if parsing
/// fails.
pub fn parse_vdf(input: &str) -> VmfResult<VdfObject> {
    let parsed = VdfParser::parse(Rule::file, input)
        .map_err(|e| VmfError::Parse(Box::new(e)))?
        .next()
        .ok_or_else(|| VmfError::InvalidFormat("input contains no VDF document".to_string()))?;

    let mut root = VdfObject::new();
    for pair in parsed.into_inner() {
        match pair.as_rule() {
            Rule::block => {
                let (name, obj) = parse_block(pair)?;
                root.push_entry(name, VdfValue::Obj(obj));
            }
            Rule::key_value => {
                let (key, value) = parse_key_value(pair)?;
                root.push_entry(key, VdfValue::Str(value));
            }
            _ => {}
        }
    }

    Ok(root)
}

/// Parses a `Pair` representing a block into its name and contents.
fn parse_block(pair: Pair<Rule>) -> VmfResult<(String, VdfObject)> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .ok_or_else(|| VmfError::InvalidFormat("block name not found".to_string()))?
        .as_str()
        .to_string();

    let mut obj = VdfObject::new();
    for item in inner {
        match item.as_rule() {
            Rule::key_value => {
                let (key, value) = parse_key_value(item)?;
                obj.push_entry(key, VdfValue::Str(value));
            }
            Rule::block => {
                let (child_name, child) = parse_block(item)?;
                obj.push_entry(child_name, VdfValue::Obj(child));
            }
            _ => {}
        }
    }

    Ok((name, obj))
}

fn parse_key_value(pair: Pair<Rule>) -> VmfResult<(String, String)> {
    let mut kv_inner = pair.into_inner();
    let key = strip_quotes(
        kv_inner
            .next()
            .ok_or_else(|| VmfError::InvalidFormat("key not found".to_string()))?
            .as_str(),
    );
    let value = strip_quotes(
        kv_inner
            .next()
            .ok_or_else(|| VmfError::InvalidFormat("value not found".to_string()))?
            .as_str(),
    );
    Ok((key, value))
}

/// Removes the leading and trailing quotes from a string.
fn strip_quotes(s: &str) -> String {
    s.trim_matches('"').to_string()
}

/// Serialises a VDF root object back into document text, using the same
/// round-tripping rules the parser applies: repeated entries re-expand from
/// their list form, and nothing is escaped.
pub fn format_vdf(root: &VdfObject) -> String {
    let mut output = String::with_capacity(4096);
    for (key, value) in root.iter() {
        write_entry(&mut output, 0, key, value);
    }
    output
}

fn write_entry(output: &mut String, indent_level: usize, key: &str, value: &VdfValue) {
    match value {
        VdfValue::Str(s) => {
            let indent = "\t".repeat(indent_level);
            output.push_str(&format!("{}\"{}\" \"{}\"\n", indent, key, s));
        }
        VdfValue::Obj(obj) => {
            let indent = "\t".repeat(indent_level);
            output.push_str(&format!("{0}{1}\n{0}{{\n", indent, key));
            for (child_key, child_value) in obj.iter() {
                write_entry(output, indent_level + 1, child_key, child_value);
            }
            output.push_str(&format!("{}}}\n", indent));
        }
        VdfValue::List(items) => {
            for item in items {
                write_entry(output, indent_level, key, item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_vdf_valid_block() {
        let input = "entity { \"classname\" \"logic_relay\" }";
        let root = parse_vdf(input).unwrap();

        let entity = root.get("entity").unwrap().as_obj().unwrap();
        assert_eq!(entity.get_str("classname"), Some("logic_relay"));
    }

    #[test]
    fn parse_vdf_nested_blocks() {
        let input = "entity { \"classname\" \"logic_relay\" solid { \"id\" \"1\" } }";
        let root = parse_vdf(input).unwrap();

        let entity = root.get("entity").unwrap().as_obj().unwrap();
        assert_eq!(entity.get_str("classname"), Some("logic_relay"));
        let solid = entity.get("solid").unwrap().as_obj().unwrap();
        assert_eq!(solid.get_str("id"), Some("1"));
    }

    #[test]
    fn parse_vdf_empty_block() {
        let root = parse_vdf("entity { }").unwrap();
        let entity = root.get("entity").unwrap().as_obj().unwrap();
        assert!(entity.is_empty());
    }

    #[test]
    fn parse_vdf_repeated_keys_become_lists() {
        let input = "\
            world\n\
            {\n\
            \tsolid { \"id\" \"2\" }\n\
            \tsolid { \"id\" \"3\" }\n\
            }\n";
        let root = parse_vdf(input).unwrap();

        let world = root.get("world").unwrap().as_obj().unwrap();
        match world.get("solid").unwrap() {
            VdfValue::List(solids) => {
                assert_eq!(solids.len(), 2);
                assert_eq!(solids[0].as_obj().unwrap().get_str("id"), Some("2"));
                assert_eq!(solids[1].as_obj().unwrap().get_str("id"), Some("3"));
            }
            other => panic!("expected a list of solids, got {:?}", other),
        }
    }

    #[test]
    fn parse_vdf_repeated_scalar_keys() {
        let input = "connections { \"OnTrigger\" \"a\" \"OnTrigger\" \"b\" }";
        let root = parse_vdf(input).unwrap();

        let connections = root.get("connections").unwrap().as_obj().unwrap();
        assert_eq!(
            connections.get("OnTrigger").unwrap(),
            &VdfValue::List(vec![VdfValue::from("a"), VdfValue::from("b")])
        );
    }

    #[test]
    fn parse_vdf_invalid_input() {
        let result = parse_vdf("world { \"unterminated\" ");
        assert!(matches!(result, Err(VmfError::Parse(_))));
    }

    #[test]
    fn format_round_trips() {
        let input = "\
            versioninfo\n\
            {\n\
            \t\"editorversion\" \"400\"\n\
            \t\"mapversion\" \"1\"\n\
            }\n\
            world\n\
            {\n\
            \t\"id\" \"1\"\n\
            \t\"classname\" \"worldspawn\"\n\
            \tsolid\n\
            \t{\n\
            \t\t\"id\" \"2\"\n\
            \t}\n\
            \tsolid\n\
            \t{\n\
            \t\t\"id\" \"3\"\n\
            \t}\n\
            }\n";
        let root = parse_vdf(input).unwrap();
        let output = format_vdf(&root);
        assert_eq!(output, input);

        let reparsed = parse_vdf(&output).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn push_entry_promotes_to_list() {
        let mut obj = VdfObject::new();
        obj.push_entry("key", VdfValue::from("a"));
        assert_eq!(obj.get("key").unwrap(), &VdfValue::from("a"));

        obj.push_entry("key", VdfValue::from("b"));
        assert_eq!(
            obj.get("key").unwrap(),
            &VdfValue::List(vec![VdfValue::from("a"), VdfValue::from("b")])
        );
    }

    #[test]
    fn remove_entry_value_collapses_singleton() {
        let mut obj = VdfObject::new();
        obj.push_entry("key", VdfValue::from("a"));
        obj.push_entry("key", VdfValue::from("b"));

        obj.remove_entry_value("key", &VdfValue::from("a"));
        assert_eq!(obj.get("key").unwrap(), &VdfValue::from("b"));

        obj.remove_entry_value("key", &VdfValue::from("b"));
        assert!(obj.get("key").is_none());
    }
}
