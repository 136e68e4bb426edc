//! Flat access to the nested property structure of a map object.
//!
//! The differ wants to see an object as a flat list of key/value pairs.
//! Nested keys are joined with [`PROPERTY_DELIMITER`], a sequence containing
//! a double quote. The double quote is the one human-readable character that
//! is universally disallowed in VMF field text, so the joined paths can
//! never collide with user data.

use std::collections::{BTreeSet, HashMap};

use crate::errors::{VmfError, VmfResult};
use crate::map::ObjectId;
use crate::vdf::{VdfObject, VdfValue};

/// Separator for sub-property paths.
pub const PROPERTY_DELIMITER: &str = "\"::\"";

/// The full property path to an object's VisGroup membership list.
pub const VISGROUP_PROPERTY_PATH: &str = "editor\"::\"visgroupid";

/// The full property path to an object's group membership.
pub const GROUP_PROPERTY_PATH: &str = "editor\"::\"groupid";

/// Keys that are not properties: ID attributes, revision counters, entity
/// I/O, and the class tags of owned sub-objects.
const IGNORED_KEYS: [&str; 9] = [
    "id",
    "mapversion",
    "connections",
    "world",
    "solid",
    "side",
    "group",
    "entity",
    "visgroup",
];

fn split_path(path: &str) -> Vec<&str> {
    path.split(PROPERTY_DELIMITER).collect()
}

/// Whether the object has a value at the given delimiter-joined path.
pub fn has_property(obj: &VdfObject, path: &str) -> bool {
    get_property(obj, path).is_ok()
}

/// Gets the value at the given delimiter-joined path.
pub fn get_property<'a>(obj: &'a VdfObject, path: &str) -> VmfResult<&'a VdfValue> {
    let segments = split_path(path);
    let (last, init) = segments
        .split_last()
        .ok_or_else(|| VmfError::Key(path.to_string()))?;

    let mut current = obj;
    for segment in init {
        current = current
            .get(*segment)
            .and_then(VdfValue::as_obj)
            .ok_or_else(|| VmfError::Key(path.to_string()))?;
    }
    current
        .get(*last)
        .ok_or_else(|| VmfError::Key(path.to_string()))
}

/// Sets the value at the given delimiter-joined path, creating intermediate
/// objects as needed. Fails if the path runs through a non-object value.
pub fn set_property(obj: &mut VdfObject, path: &str, value: VdfValue) -> VmfResult<()> {
    let segments = split_path(path);
    let (last, init) = segments
        .split_last()
        .ok_or_else(|| VmfError::Key(path.to_string()))?;

    let mut current = obj;
    for segment in init {
        if !current.contains_key(*segment) {
            current.insert(segment.to_string(), VdfValue::Obj(VdfObject::new()));
        }
        current = current
            .get_mut(*segment)
            .and_then(VdfValue::as_obj_mut)
            .ok_or_else(|| VmfError::Key(path.to_string()))?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Deletes the value at the given delimiter-joined path. Intermediate
/// objects that end up empty are removed as well.
pub fn delete_property(obj: &mut VdfObject, path: &str) -> VmfResult<()> {
    let segments = split_path(path);
    delete_in(obj, &segments, path)
}

fn delete_in(obj: &mut VdfObject, segments: &[&str], full_path: &str) -> VmfResult<()> {
    if segments.len() <= 1 {
        let key = segments
            .first()
            .ok_or_else(|| VmfError::Key(full_path.to_string()))?;
        obj.shift_remove(*key)
            .ok_or_else(|| VmfError::Key(full_path.to_string()))?;
        return Ok(());
    }

    let now_empty = {
        let child = obj
            .get_mut(segments[0])
            .and_then(VdfValue::as_obj_mut)
            .ok_or_else(|| VmfError::Key(full_path.to_string()))?;
        delete_in(child, &segments[1..], full_path)?;
        child.is_empty()
    };
    if now_empty {
        obj.shift_remove(segments[0]);
    }
    Ok(())
}

/// The set of VisGroup IDs the object is a member of, in integer form.
pub fn visgroup_ids(obj: &VdfObject) -> BTreeSet<ObjectId> {
    let Ok(value) = get_property(obj, VISGROUP_PROPERTY_PATH) else {
        return BTreeSet::new();
    };
    let mut ids = BTreeSet::new();
    let mut note = |item: &VdfValue| {
        if let Some(id) = item.as_str().and_then(|s| s.parse::<ObjectId>().ok()) {
            ids.insert(id);
        }
    };
    match value {
        VdfValue::List(items) => items.iter().for_each(&mut note),
        other => note(other),
    }
    ids
}

/// Writes the object's VisGroup membership as the sorted list of decimal
/// strings the format requires.
pub fn set_visgroup_ids(obj: &mut VdfObject, ids: &BTreeSet<ObjectId>) -> VmfResult<()> {
    let list = VdfValue::List(ids.iter().map(|id| VdfValue::Str(id.to_string())).collect());
    set_property(obj, VISGROUP_PROPERTY_PATH, list)
}

/// Flattens an object into delimiter-joined key/value pairs.
///
/// ID attributes, `mapversion`, entity I/O, and owned sub-object tags are
/// not properties. A `solid` entry *is* yielded when its value is a scalar:
/// that is a point entity's `solid` property, not a brush.
pub fn iter_properties(obj: &VdfObject) -> Vec<(String, &VdfValue)> {
    let mut out = Vec::new();
    collect_properties(obj, None, &mut out);
    out
}

fn collect_properties<'a>(
    obj: &'a VdfObject,
    prefix: Option<&str>,
    out: &mut Vec<(String, &'a VdfValue)>,
) {
    for (key, value) in obj.iter() {
        let scalar_solid = key == "solid" && matches!(value, VdfValue::Str(_));
        if IGNORED_KEYS.contains(&key.as_str()) && !scalar_solid {
            continue;
        }
        let path = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, PROPERTY_DELIMITER, key),
            None => key.clone(),
        };
        match value {
            VdfValue::Obj(child) => collect_properties(child, Some(&path), out),
            other => out.push((path, other)),
        }
    }
}

/// All output occurrences of an entity, as `(name, value, occurrence)`.
/// `occurrence` counts prior occurrences of the identical `(name, value)`
/// pair, so repeated identical outputs remain distinguishable.
pub fn iter_outputs(entity: &VdfObject) -> Vec<(String, String, u32)> {
    let Some(connections) = entity.get("connections").and_then(VdfValue::as_obj) else {
        return Vec::new();
    };

    let mut count_for_output: HashMap<(&str, &str), u32> = HashMap::new();
    let mut out = Vec::new();
    for (name, values) in connections.iter() {
        let scalars: Vec<&str> = match values {
            VdfValue::Str(s) => vec![s.as_str()],
            VdfValue::List(items) => items.iter().filter_map(VdfValue::as_str).collect(),
            VdfValue::Obj(_) => continue,
        };
        for value in scalars {
            let count = count_for_output.entry((name, value)).or_insert(0);
            out.push((name.clone(), value.to_string(), *count));
            *count += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdf::parse_vdf;
    use pretty_assertions::assert_eq;

    fn editor_obj() -> VdfObject {
        let root = parse_vdf(
            "solid { \"id\" \"4\" editor { \"color\" \"0 180 0\" \"visgroupshown\" \"1\" } }",
        )
        .unwrap();
        root.get("solid").unwrap().as_obj().unwrap().clone()
    }

    #[test]
    fn get_property_walks_nested_paths() {
        let solid = editor_obj();
        let value = get_property(&solid, "editor\"::\"color").unwrap();
        assert_eq!(value, &VdfValue::from("0 180 0"));
    }

    #[test]
    fn get_property_through_scalar_fails() {
        let solid = editor_obj();
        let result = get_property(&solid, "id\"::\"nested");
        assert!(matches!(result, Err(VmfError::Key(_))));
    }

    #[test]
    fn set_property_creates_intermediates() {
        let mut obj = VdfObject::new();
        set_property(&mut obj, "editor\"::\"comments", VdfValue::from("hi")).unwrap();
        assert_eq!(
            get_property(&obj, "editor\"::\"comments").unwrap(),
            &VdfValue::from("hi")
        );
    }

    #[test]
    fn delete_property_collapses_empty_intermediates() {
        let mut obj = VdfObject::new();
        set_property(&mut obj, "editor\"::\"comments", VdfValue::from("hi")).unwrap();
        set_property(&mut obj, "editor\"::\"color", VdfValue::from("255 0 0")).unwrap();

        delete_property(&mut obj, "editor\"::\"comments").unwrap();
        assert!(obj.get("editor").is_some(), "sibling keeps the object alive");

        delete_property(&mut obj, "editor\"::\"color").unwrap();
        assert!(obj.get("editor").is_none(), "empty intermediate is removed");
    }

    #[test]
    fn delete_missing_property_fails() {
        let mut obj = VdfObject::new();
        assert!(matches!(
            delete_property(&mut obj, "nope"),
            Err(VmfError::Key(_))
        ));
    }

    #[test]
    fn visgroup_ids_round_trip_through_integers() {
        let mut obj = VdfObject::new();
        let ids: BTreeSet<ObjectId> = [10, 2].into_iter().collect();
        set_visgroup_ids(&mut obj, &ids).unwrap();

        // Stored as sorted decimal strings.
        assert_eq!(
            get_property(&obj, VISGROUP_PROPERTY_PATH).unwrap(),
            &VdfValue::List(vec![VdfValue::from("2"), VdfValue::from("10")])
        );
        assert_eq!(visgroup_ids(&obj), ids);
    }

    #[test]
    fn iter_properties_flattens_and_skips_structure() {
        let root = parse_vdf(
            "entity { \"id\" \"7\" \"classname\" \"func_detail\" \
             connections { \"OnTrigger\" \"x\" } \
             editor { \"color\" \"220 30 220\" } }",
        )
        .unwrap();
        let entity = root.get("entity").unwrap().as_obj().unwrap();

        let properties = iter_properties(entity);
        let keys: Vec<&str> = properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["classname", "editor\"::\"color"]);
    }

    #[test]
    fn iter_properties_keeps_scalar_solid() {
        let root = parse_vdf("entity { \"id\" \"7\" \"solid\" \"6\" }").unwrap();
        let entity = root.get("entity").unwrap().as_obj().unwrap();

        let properties = iter_properties(entity);
        assert_eq!(properties.len(), 1);
        assert_eq!(properties[0].0, "solid");
    }

    #[test]
    fn iter_outputs_numbers_duplicates() {
        let root = parse_vdf(
            "entity { \"id\" \"7\" connections { \
             \"OnPressed\" \"a\" \"OnPressed\" \"a\" \"OnPressed\" \"b\" } }",
        )
        .unwrap();
        let entity = root.get("entity").unwrap().as_obj().unwrap();

        let outputs = iter_outputs(entity);
        assert_eq!(
            outputs,
            vec![
                ("OnPressed".to_string(), "a".to_string(), 0),
                ("OnPressed".to_string(), "a".to_string(), 1),
                ("OnPressed".to_string(), "b".to_string(), 0),
            ]
        );
    }
}
