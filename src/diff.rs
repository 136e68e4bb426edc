//! The structural differ: computes the canonical, ordered delta list that
//! mutates a parent map into a child map.
//!
//! IDs are assigned independently per map, so every child-only object gets a
//! fresh parent-side ID minted here, and every dependent reference (parent
//! pointers, group memberships, VisGroup memberships, brush face lists) is
//! rewritten through the child→parent ID map.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::delta::{Change, Delta};
use crate::map::props::{self, GROUP_PROPERTY_PATH, VISGROUP_PROPERTY_PATH};
use crate::map::{ObjectId, ObjectInfo, VmfClass, VmfMap};
use crate::vdf::VdfValue;

/// Entity classnames whose `sides` property lists brush face IDs that must
/// be rewritten whenever Side IDs change.
const SIDES_ENTITY_CLASSNAMES: [&str; 2] = ["env_cubemap", "info_overlay"];

/// Compares two maps and returns the deltas that mutate `parent` into
/// `child`. The output order is deterministic.
///
/// Minting fresh IDs advances the parent's per-class ID counters, so this
/// is an impure function with side effects on the parent map. A caller that
/// runs several diffs against one parent and needs purity must diff against
/// deep copies.
pub fn diff(parent: &mut VmfMap, child: &VmfMap) -> Vec<Delta> {
    let mut deltas: Vec<Delta> = Vec::new();
    // Child-side info → fresh parent-side ID, for newly-added objects.
    let mut new_ids: HashMap<ObjectInfo, ObjectId> = HashMap::new();
    // Indices of `sides` property deltas that need the face-ID fix-up pass.
    let mut sides_fixups: Vec<usize> = Vec::new();
    let mut change_marked: HashSet<ObjectInfo> = HashSet::new();

    // New-object sweep. Containers come first in the iteration order, so a
    // new object's parent already has its fresh ID by the time we look it up.
    for (class, child_id, child_obj) in child.iter_objects() {
        if parent.has(class, child_id) {
            continue;
        }
        let new_id = parent.next_available_id(class);
        new_ids.insert((class, child_id), new_id);

        let parent_info = map_info(&new_ids, child.parent_of(class, child_id));
        deltas.push(Delta::new(Change::AddObject {
            parent: parent_info,
            class,
            id: new_id,
        }));

        for (key, value) in props::iter_properties(child_obj) {
            if class == VmfClass::VisGroup && (key == "visgroup" || key == "visgroupid") {
                // Sub-VisGroups are objects in their own right, and the ID
                // attribute is not a property.
                continue;
            }
            if key == VISGROUP_PROPERTY_PATH {
                let memberships = visgroup_set_of_value(value);
                add_visgroup_deltas(
                    &mut deltas,
                    &new_ids,
                    class,
                    new_id,
                    &BTreeSet::new(),
                    &memberships,
                );
                continue;
            }

            let mut value = value.clone();
            if key == GROUP_PROPERTY_PATH {
                value = rewrite_group_id(&new_ids, value);
            }
            let fixup = is_sides_property(class, child_obj, &key);
            deltas.push(Delta::new(Change::AddProperty {
                class,
                id: new_id,
                key,
                value,
            }));
            if fixup {
                sides_fixups.push(deltas.len() - 1);
            }
        }

        if class == VmfClass::Entity {
            for (name, value, occurrence) in props::iter_outputs(child_obj) {
                deltas.push(Delta::new(Change::AddOutput {
                    entity_id: new_id,
                    name,
                    value,
                    occurrence,
                }));
            }
        }
    }

    // Changed/removed sweep over the parent's objects.
    for (class, id, parent_obj) in parent.iter_objects() {
        let Ok(child_obj) = child.get(class, id) else {
            // Object was deleted in the child. Record its direct children so
            // the merger can recognise their removals as dependents of this
            // one.
            let cascaded = parent.iter_sub_object_infos(class, id);
            deltas.push(Delta::new(Change::RemoveObject { class, id, cascaded }));
            continue;
        };

        if class == VmfClass::VisGroup {
            let parent_side = parent.parent_of(class, id);
            let child_side = map_info(&new_ids, child.parent_of(class, id));
            if parent_side != child_side {
                deltas.push(Delta::new(Change::ReparentObject {
                    parent: child_side,
                    class,
                    id,
                }));
            }
        } else {
            let base = props::visgroup_ids(parent_obj);
            let current = props::visgroup_ids(child_obj);
            add_visgroup_deltas(&mut deltas, &new_ids, class, id, &base, &current);
        }

        // New properties.
        for (key, value) in props::iter_properties(child_obj) {
            if key == VISGROUP_PROPERTY_PATH {
                continue;
            }
            if props::has_property(parent_obj, &key) {
                continue;
            }
            mark_changed(parent, child, &mut deltas, &mut change_marked, class, id);

            let mut value = value.clone();
            if key == GROUP_PROPERTY_PATH {
                value = rewrite_group_id(&new_ids, value);
            }
            let fixup = is_sides_property(class, child_obj, &key);
            deltas.push(Delta::new(Change::AddProperty {
                class,
                id,
                key,
                value,
            }));
            if fixup {
                sides_fixups.push(deltas.len() - 1);
            }
        }

        // Changed and deleted properties.
        for (key, parent_value) in props::iter_properties(parent_obj) {
            if key == VISGROUP_PROPERTY_PATH {
                continue;
            }
            match props::get_property(child_obj, &key) {
                Err(_) => {
                    mark_changed(parent, child, &mut deltas, &mut change_marked, class, id);
                    deltas.push(Delta::new(Change::RemoveProperty { class, id, key }));
                }
                Ok(child_value) => {
                    if child_value == parent_value {
                        continue;
                    }
                    mark_changed(parent, child, &mut deltas, &mut change_marked, class, id);

                    let mut value = child_value.clone();
                    if key == GROUP_PROPERTY_PATH {
                        value = rewrite_group_id(&new_ids, value);
                    }
                    let fixup = is_sides_property(class, child_obj, &key);
                    deltas.push(Delta::new(Change::ChangeProperty {
                        class,
                        id,
                        key,
                        value,
                    }));
                    if fixup {
                        sides_fixups.push(deltas.len() - 1);
                    }
                }
            }
        }

        // Entity I/O, by symmetric set difference on output occurrences.
        if class == VmfClass::Entity {
            let parent_outputs = props::iter_outputs(parent_obj);
            let child_outputs = props::iter_outputs(child_obj);
            let parent_set: HashSet<&(String, String, u32)> = parent_outputs.iter().collect();
            let child_set: HashSet<&(String, String, u32)> = child_outputs.iter().collect();

            for output in &child_outputs {
                if !parent_set.contains(output) {
                    mark_changed(parent, child, &mut deltas, &mut change_marked, class, id);
                    deltas.push(Delta::new(Change::AddOutput {
                        entity_id: id,
                        name: output.0.clone(),
                        value: output.1.clone(),
                        occurrence: output.2,
                    }));
                }
            }
            for output in &parent_outputs {
                if !child_set.contains(output) {
                    mark_changed(parent, child, &mut deltas, &mut change_marked, class, id);
                    deltas.push(Delta::new(Change::RemoveOutput {
                        entity_id: id,
                        name: output.0.clone(),
                        value: output.1.clone(),
                        occurrence: output.2,
                    }));
                }
            }
        }
    }

    // Newly-tied and retied solids.
    for (solid_id, entity_id) in child.ties() {
        match parent.tied_entity(solid_id) {
            None => {
                // Unless an AddObject already created the solid as the child
                // of an entity.
                if !new_ids.contains_key(&(VmfClass::Solid, solid_id)) {
                    let entity_id = new_ids
                        .get(&(VmfClass::Entity, entity_id))
                        .copied()
                        .unwrap_or(entity_id);
                    deltas.push(Delta::new(Change::TieSolid {
                        solid_id,
                        entity_id,
                    }));
                }
            }
            Some(parent_entity) if parent_entity != entity_id => {
                // Untied and retied to a different entity.
                let entity_id = new_ids
                    .get(&(VmfClass::Entity, entity_id))
                    .copied()
                    .unwrap_or(entity_id);
                deltas.push(Delta::new(Change::UntieSolid { solid_id }));
                deltas.push(Delta::new(Change::TieSolid {
                    solid_id,
                    entity_id,
                }));
            }
            Some(_) => {}
        }
    }
    // Untied solids.
    for (solid_id, _) in parent.ties() {
        if child.tied_entity(solid_id).is_none() {
            deltas.push(Delta::new(Change::UntieSolid { solid_id }));
        }
    }

    // Cubemap and overlay face references point at child-side Side IDs;
    // rewrite them through the new-ID map.
    for index in sides_fixups {
        if let Change::AddProperty { value, .. } | Change::ChangeProperty { value, .. } =
            &mut deltas[index].change
        {
            if let VdfValue::Str(sides) = value {
                let fixed = sides
                    .split_whitespace()
                    .map(|token| match token.parse::<ObjectId>() {
                        Ok(side_id) => new_ids
                            .get(&(VmfClass::Side, side_id))
                            .copied()
                            .unwrap_or(side_id)
                            .to_string(),
                        Err(_) => token.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                *sides = fixed;
            }
        }
    }

    deltas
}

/// Emits one deduplicated `ChangeObject` for the object and cascades it up
/// the chain of ancestors. The cascade stops before an Entity ancestor when
/// the child has untied the solid: the entity itself did not change.
fn mark_changed(
    parent: &VmfMap,
    child: &VmfMap,
    deltas: &mut Vec<Delta>,
    marked: &mut HashSet<ObjectInfo>,
    class: VmfClass,
    id: ObjectId,
) {
    if class == VmfClass::VisGroup {
        return;
    }
    let mut info = (class, id);
    loop {
        if !marked.insert(info) {
            break;
        }
        deltas.push(Delta::new(Change::ChangeObject {
            class: info.0,
            id: info.1,
        }));

        let Some(parent_info) = parent.parent_of(info.0, info.1) else {
            break;
        };
        if parent_info.0 == VmfClass::Entity && child.tied_entity(info.1).is_none() {
            break;
        }
        info = parent_info;
    }
}

fn add_visgroup_deltas(
    deltas: &mut Vec<Delta>,
    new_ids: &HashMap<ObjectInfo, ObjectId>,
    class: VmfClass,
    id: ObjectId,
    base: &BTreeSet<ObjectId>,
    current: &BTreeSet<ObjectId>,
) {
    for visgroup_id in current.difference(base) {
        // A membership may refer to a VisGroup the child also added.
        let visgroup_id = new_ids
            .get(&(VmfClass::VisGroup, *visgroup_id))
            .copied()
            .unwrap_or(*visgroup_id);
        deltas.push(Delta::new(Change::AddToVisGroup {
            class,
            id,
            visgroup_id,
        }));
    }
    for visgroup_id in base.difference(current) {
        deltas.push(Delta::new(Change::RemoveFromVisGroup {
            class,
            id,
            visgroup_id: *visgroup_id,
        }));
    }
}

fn map_info(
    new_ids: &HashMap<ObjectInfo, ObjectId>,
    info: Option<ObjectInfo>,
) -> Option<ObjectInfo> {
    info.map(|(class, id)| (class, new_ids.get(&(class, id)).copied().unwrap_or(id)))
}

fn visgroup_set_of_value(value: &VdfValue) -> BTreeSet<ObjectId> {
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

/// Group memberships name a Group by ID; when the group is itself new, the
/// reference must follow the freshly minted ID.
fn rewrite_group_id(new_ids: &HashMap<ObjectInfo, ObjectId>, value: VdfValue) -> VdfValue {
    match value.as_str().and_then(|s| s.parse::<ObjectId>().ok()) {
        Some(group_id) => {
            let mapped = new_ids
                .get(&(VmfClass::Group, group_id))
                .copied()
                .unwrap_or(group_id);
            VdfValue::Str(mapped.to_string())
        }
        None => value,
    }
}

fn is_sides_property(class: VmfClass, obj: &crate::vdf::VdfObject, key: &str) -> bool {
    class == VmfClass::Entity
        && key == "sides"
        && obj
            .get_str("classname")
            .is_some_and(|classname| SIDES_ENTITY_CLASSNAMES.contains(&classname))
}
