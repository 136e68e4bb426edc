//! Conflict resolution: synthesising the "Manual Merge" VisGroups that
//! materialise the parent-side and each conflicting child-side version of
//! the affected objects, so a human can reconcile them inside Hammer.
//!
//! The resolver never mutates the merged map directly. It emits *additional*
//! deltas; the final `apply_deltas` remains the single mutation point, and
//! [`VmfMap::clone_object_deferred`] keeps the same discipline by yielding
//! deltas itself.

use std::collections::{HashMap, HashSet};

use crate::delta::{Change, Delta, DeltaKey};
use crate::errors::{VmfError, VmfResult};
use crate::map::{ObjectId, ObjectInfo, VmfClass, VmfMap};
use crate::vdf::VdfValue;

/// Name of the root conflict-resolution VisGroup.
pub const MANUAL_MERGE_VISGROUP_NAME: &str = "Manual Merge Required";

const CONFLICT_VISGROUP_COLOR: &str = "255 0 0";

/// Takes the parent map and the flattened conflict list, and returns deltas
/// that, appended to the merged list before `apply_deltas`, create the
/// conflict-resolution VisGroups:
///
/// 1. A root VisGroup named "Manual Merge Required".
/// 2. Under it, a VisGroup named after the parent file, collecting the
///    original versions of the affected objects.
/// 3. Per contributing child, up to two VisGroups: "Changed in \<file\>" and
///    "Removed in \<file\>".
///
/// `merged` is consulted so that an object a surviving removal is about to
/// delete is not re-referenced after it is gone.
pub fn create_conflict_resolution_deltas(
    parent: &mut VmfMap,
    conflicted: &[Delta],
    merged: &[Delta],
    children: &[VmfMap],
) -> VmfResult<Vec<Delta>> {
    let mut result: Vec<Delta> = Vec::new();

    let removed_in_merged: HashSet<ObjectInfo> = merged
        .iter()
        .filter_map(|delta| match &delta.change {
            Change::RemoveObject { class, id, .. } => Some((*class, *id)),
            _ => None,
        })
        .collect();

    // Objects whose AddObject is itself conflicted are "new": their content
    // deltas are re-emitted verbatim rather than cloned.
    let new_object_infos: HashSet<ObjectInfo> = conflicted
        .iter()
        .filter_map(|delta| match &delta.change {
            Change::AddObject { class, id, .. } => Some((*class, *id)),
            _ => None,
        })
        .collect();

    let root_id = create_visgroup(parent, &mut result, None, MANUAL_MERGE_VISGROUP_NAME);
    let root_info = (VmfClass::VisGroup, root_id);
    let parent_name = parent.filename();
    let parent_visgroup = create_visgroup(parent, &mut result, Some(root_info), &parent_name);

    let mut changed_visgroup_for_child: HashMap<Option<usize>, ObjectId> = HashMap::new();
    let mut removed_visgroup_for_child: HashMap<Option<usize>, ObjectId> = HashMap::new();
    // Per child, original object info → its clone's ID.
    let mut clone_ids_for_child: HashMap<Option<usize>, HashMap<ObjectInfo, ObjectId>> =
        HashMap::new();
    // The same object is never added twice to the same VisGroup.
    let mut seen_memberships: HashSet<DeltaKey> = HashSet::new();

    for delta in conflicted {
        let origin = delta.origin;

        let mut affected = affected_object(parent, &delta.change);

        // The World, Groups, and VisGroups are never materialised; those
        // conflicts are left for human resolution without VisGroup aid.
        if matches!(
            affected.0,
            VmfClass::World | VmfClass::Group | VmfClass::VisGroup
        ) {
            continue;
        }

        // A Side is resolved through its owning Solid; if that solid is tied,
        // through the owning Entity.
        if affected.0 == VmfClass::Side && !new_object_infos.contains(&affected) {
            if let Some((_, solid_id)) = parent.parent_of(VmfClass::Side, affected.1) {
                affected = match parent.tied_entity(solid_id) {
                    Some(entity_id) => (VmfClass::Entity, entity_id),
                    None => (VmfClass::Solid, solid_id),
                };
            }
        }

        match &delta.change {
            Change::RemoveObject { .. } => {
                // Tied-solid correction: Hammer discards per-solid VisGroup
                // membership inside a brush-entity, so tag the entity.
                let target = match affected {
                    (VmfClass::Solid, solid_id) => match parent.tied_entity(solid_id) {
                        Some(entity_id) => (VmfClass::Entity, entity_id),
                        None => affected,
                    },
                    _ => affected,
                };
                let visgroup_id = child_visgroup(
                    parent,
                    &mut result,
                    root_info,
                    &mut removed_visgroup_for_child,
                    origin,
                    "Removed in",
                    children,
                );
                push_membership(&mut result, &mut seen_memberships, target, visgroup_id);
            }

            Change::AddObject { .. } => {
                // Re-emit the add so the object exists, then collect it.
                result.push(delta.clone());
                let visgroup_id = child_visgroup(
                    parent,
                    &mut result,
                    root_info,
                    &mut changed_visgroup_for_child,
                    origin,
                    "Changed in",
                    children,
                );
                push_membership(&mut result, &mut seen_memberships, affected, visgroup_id);
            }

            _ => {
                let direct = direct_target(&delta.change);
                if let Some(info) = direct.filter(|info| new_object_infos.contains(info)) {
                    // A conflict on a new object: the object is re-created by
                    // its re-emitted AddObject, so the delta applies as-is.
                    result.push(delta.clone());
                    let visgroup_id = child_visgroup(
                        parent,
                        &mut result,
                        root_info,
                        &mut changed_visgroup_for_child,
                        origin,
                        "Changed in",
                        children,
                    );
                    push_membership(&mut result, &mut seen_memberships, info, visgroup_id);
                    continue;
                }

                // A conflict on an existing object: keep the parent original
                // visible, and materialise the child's version on a deep
                // clone.
                if !removed_in_merged.contains(&affected) {
                    push_membership(
                        &mut result,
                        &mut seen_memberships,
                        affected,
                        parent_visgroup,
                    );
                }

                let already_cloned = clone_ids_for_child
                    .get(&origin)
                    .is_some_and(|clone_ids| clone_ids.contains_key(&affected));
                if !already_cloned {
                    let mut fresh_clone_ids = HashMap::new();
                    let clone_deltas = parent.clone_object_deferred(
                        affected.0,
                        affected.1,
                        &mut fresh_clone_ids,
                    )?;
                    result.extend(clone_deltas);

                    let clone_id = fresh_clone_ids
                        .get(&affected)
                        .copied()
                        .ok_or_else(|| VmfError::no_object(affected.0, affected.1))?;
                    clone_ids_for_child
                        .entry(origin)
                        .or_default()
                        .extend(fresh_clone_ids);

                    let visgroup_id = child_visgroup(
                        parent,
                        &mut result,
                        root_info,
                        &mut changed_visgroup_for_child,
                        origin,
                        "Changed in",
                        children,
                    );
                    push_membership(
                        &mut result,
                        &mut seen_memberships,
                        (affected.0, clone_id),
                        visgroup_id,
                    );
                }

                // Re-address the conflicted delta at the clone and emit it.
                if let Some(clone_ids) = clone_ids_for_child.get(&origin) {
                    let mut rewritten = delta.clone();
                    rewrite_to_clone(&mut rewritten.change, clone_ids);
                    result.push(rewritten);
                }
            }
        }
    }

    Ok(result)
}

/// The object a conflicted delta would have affected.
fn affected_object(parent: &VmfMap, change: &Change) -> ObjectInfo {
    match change {
        Change::AddOutput { entity_id, .. } | Change::RemoveOutput { entity_id, .. } => {
            (VmfClass::Entity, *entity_id)
        }
        Change::TieSolid {
            solid_id,
            entity_id,
        } => {
            if parent.has(VmfClass::Entity, *entity_id) {
                (VmfClass::Entity, *entity_id)
            } else {
                (VmfClass::Solid, *solid_id)
            }
        }
        Change::UntieSolid { solid_id } => match parent.tied_entity(*solid_id) {
            Some(entity_id) => (VmfClass::Entity, entity_id),
            None => (VmfClass::Solid, *solid_id),
        },
        Change::AddObject { class, id, .. }
        | Change::RemoveObject { class, id, .. }
        | Change::ChangeObject { class, id }
        | Change::AddProperty { class, id, .. }
        | Change::RemoveProperty { class, id, .. }
        | Change::ChangeProperty { class, id, .. }
        | Change::ReparentObject { class, id, .. }
        | Change::AddToVisGroup { class, id, .. }
        | Change::RemoveFromVisGroup { class, id, .. }
        | Change::HideObject { class, id }
        | Change::UnHideObject { class, id } => (*class, *id),
    }
}

/// The object a delta directly addresses, where that is a `(class, id)`
/// pair. Tie and output deltas address through entity/solid IDs instead.
fn direct_target(change: &Change) -> Option<ObjectInfo> {
    match change {
        Change::AddObject { class, id, .. }
        | Change::RemoveObject { class, id, .. }
        | Change::ChangeObject { class, id }
        | Change::AddProperty { class, id, .. }
        | Change::RemoveProperty { class, id, .. }
        | Change::ChangeProperty { class, id, .. }
        | Change::ReparentObject { class, id, .. }
        | Change::AddToVisGroup { class, id, .. }
        | Change::RemoveFromVisGroup { class, id, .. }
        | Change::HideObject { class, id }
        | Change::UnHideObject { class, id } => Some((*class, *id)),
        Change::TieSolid { .. }
        | Change::UntieSolid { .. }
        | Change::AddOutput { .. }
        | Change::RemoveOutput { .. } => None,
    }
}

fn create_visgroup(
    parent: &mut VmfMap,
    result: &mut Vec<Delta>,
    under: Option<ObjectInfo>,
    name: &str,
) -> ObjectId {
    let id = parent.next_available_id(VmfClass::VisGroup);
    result.push(Delta::new(Change::AddObject {
        parent: under,
        class: VmfClass::VisGroup,
        id,
    }));
    result.push(Delta::new(Change::AddProperty {
        class: VmfClass::VisGroup,
        id,
        key: "name".to_string(),
        value: VdfValue::from(name),
    }));
    result.push(Delta::new(Change::AddProperty {
        class: VmfClass::VisGroup,
        id,
        key: "color".to_string(),
        value: VdfValue::from(CONFLICT_VISGROUP_COLOR),
    }));
    id
}

/// Lazily creates the per-child "Changed in ..." / "Removed in ..."
/// VisGroup.
fn child_visgroup(
    parent: &mut VmfMap,
    result: &mut Vec<Delta>,
    root_info: ObjectInfo,
    table: &mut HashMap<Option<usize>, ObjectId>,
    origin: Option<usize>,
    prefix: &str,
    children: &[VmfMap],
) -> ObjectId {
    if let Some(id) = table.get(&origin) {
        return *id;
    }
    let filename = origin
        .and_then(|index| children.get(index))
        .map(VmfMap::filename)
        .unwrap_or_else(|| "(unknown)".to_string());
    let id = create_visgroup(parent, result, Some(root_info), &format!("{} {}", prefix, filename));
    table.insert(origin, id);
    id
}

fn push_membership(
    result: &mut Vec<Delta>,
    seen: &mut HashSet<DeltaKey>,
    target: ObjectInfo,
    visgroup_id: ObjectId,
) {
    let delta = Delta::new(Change::AddToVisGroup {
        class: target.0,
        id: target.1,
        visgroup_id,
    });
    if seen.insert(delta.key()) {
        result.push(delta);
    }
}

/// Re-addresses a conflicted delta at the clone of its object. `TieSolid`
/// rewrites whichever side is a known clone; output deltas rewrite the
/// entity; everything else rewrites its own ID.
fn rewrite_to_clone(change: &mut Change, clone_ids: &HashMap<ObjectInfo, ObjectId>) {
    match change {
        Change::TieSolid {
            solid_id,
            entity_id,
        } => {
            if let Some(clone) = clone_ids.get(&(VmfClass::Solid, *solid_id)) {
                *solid_id = *clone;
            } else if let Some(clone) = clone_ids.get(&(VmfClass::Entity, *entity_id)) {
                *entity_id = *clone;
            }
        }
        Change::UntieSolid { solid_id } => {
            if let Some(clone) = clone_ids.get(&(VmfClass::Solid, *solid_id)) {
                *solid_id = *clone;
            }
        }
        Change::AddOutput { entity_id, .. } | Change::RemoveOutput { entity_id, .. } => {
            if let Some(clone) = clone_ids.get(&(VmfClass::Entity, *entity_id)) {
                *entity_id = *clone;
            }
        }
        Change::AddObject { .. } | Change::RemoveObject { .. } => {}
        Change::ChangeObject { class, id }
        | Change::AddProperty { class, id, .. }
        | Change::RemoveProperty { class, id, .. }
        | Change::ChangeProperty { class, id, .. }
        | Change::ReparentObject { class, id, .. }
        | Change::AddToVisGroup { class, id, .. }
        | Change::RemoveFromVisGroup { class, id, .. }
        | Change::HideObject { class, id }
        | Change::UnHideObject { class, id } => {
            if let Some(clone) = clone_ids.get(&(*class, *id)) {
                *id = *clone;
            }
        }
    }
}
