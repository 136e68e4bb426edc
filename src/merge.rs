//! Folding N delta lists into one consistent change set, detecting
//! semantic conflicts.
//!
//! Variants are processed in a fixed order (the declaration order of
//! [`DeltaKind`]) because the conflict rules depend on prior state: a
//! `TieSolid` must be able to see removals, a `ChangeProperty` must be able
//! to see its object's `ChangeObject` verdict. Within a variant, deltas are
//! consumed in input order, except `RemoveObject`, which is consumed in
//! reverse input order so that a cascade starting at a parent removal sees
//! its child removals while they are still in the merged set.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use crate::delta::{Change, Delta, DeltaKey, DeltaKind};
use crate::map::{ObjectId, ObjectInfo, VmfClass};

/// A conflict was detected while merging deltas.
///
/// Not fatal: `partial` holds the merged list with the conflicting entries
/// demoted, and `conflicted` holds the demoted deltas, stably sorted by
/// variant order. The driver proceeds to conflict resolution and applies the
/// partial list anyway.
#[derive(Debug, Error)]
#[error("merge conflict(s) detected; manual conflict resolution will be required")]
pub struct DeltaMergeConflict {
    pub partial: Vec<Delta>,
    pub conflicted: Vec<Delta>,
}

/// Merges multiple delta lists into a single list that mutates the parent
/// into a map carrying every child's changes.
///
/// The `aggressive` flag is reserved and currently a no-op.
pub fn merge_delta_lists(
    delta_lists: Vec<Vec<Delta>>,
    _aggressive: bool,
) -> Result<Vec<Delta>, DeltaMergeConflict> {
    // Bucket by variant, preserving input order within each bucket.
    let mut buckets: IndexMap<DeltaKind, Vec<Delta>> = DeltaKind::ALL
        .iter()
        .map(|kind| (*kind, Vec::new()))
        .collect();
    for deltas in delta_lists {
        for delta in deltas {
            buckets
                .entry(delta.kind())
                .or_default()
                .push(delta);
        }
    }
    if let Some(removes) = buckets.get_mut(&DeltaKind::RemoveObject) {
        removes.reverse();
    }

    let mut merger = Merger::default();
    for (_, bucket) in buckets {
        for delta in bucket {
            merger.merge_one(delta);
        }
    }

    let partial: Vec<Delta> = merger.merged.into_values().collect();
    if merger.conflicted.is_empty() {
        return Ok(partial);
    }

    let mut conflicted: Vec<Delta> = merger.conflicted.into_values().flatten().collect();
    conflicted.sort_by_key(Delta::kind);
    Err(DeltaMergeConflict {
        partial,
        conflicted,
    })
}

#[derive(Default)]
struct Merger {
    /// The delta list being assembled, keyed by equivalence.
    merged: IndexMap<DeltaKey, Delta>,
    /// Deltas ruled in conflict, grouped by equivalence key.
    conflicted: IndexMap<DeltaKey, Vec<Delta>>,
}

impl Merger {
    fn merge_one(&mut self, delta: Delta) {
        match &delta.change {
            Change::ChangeObject { class, id } => {
                let remove_key = DeltaKey::RemoveObject(*class, *id);
                if self.merged.contains_key(&remove_key) || self.is_conflicted(&remove_key) {
                    warn!("conflict: {} collides with a removal of the same object", delta);
                    // An isolated removal wins over the change and stays
                    // merged. A structural removal (one with cascaded child
                    // removals, or one that is itself a cascaded child of a
                    // pending removal) cannot be applied partially, so its
                    // whole family is demoted.
                    let info = (*class, *id);
                    if !self.removal_cascade(info).is_empty()
                        || self.find_enclosing_removal(info).is_some()
                    {
                        self.demote_removal_families_around(info);
                    }
                    self.conflict_incoming(delta);
                    return;
                }
            }

            Change::AddProperty {
                class, id, value, ..
            } => {
                if self.is_conflicted(&DeltaKey::ChangeObject(*class, *id))
                    || self.is_conflicted(&DeltaKey::AddObject(*class, *id))
                {
                    // The object itself is already in dispute.
                    self.conflict_incoming(delta);
                    return;
                }

                let key = delta.key();
                let merged_disagrees = matches!(
                    self.merged.get(&key).map(|other| &other.change),
                    Some(Change::AddProperty { value: other, .. }) if other != value
                );
                if merged_disagrees {
                    warn!("conflict: {} disagrees with an equivalent AddProperty", delta);
                    self.demote_merged(&key);
                    self.conflict_incoming(delta);
                    return;
                }
                if self.conflicted_value_disagrees(&key, value) {
                    warn!("conflict: {} disagrees with an equivalent AddProperty", delta);
                    self.conflict_incoming(delta);
                    return;
                }
            }

            Change::ChangeProperty {
                class,
                id,
                key: property,
                value,
            } => {
                if self.is_conflicted(&DeltaKey::ChangeObject(*class, *id)) {
                    self.conflict_incoming(delta);
                    return;
                }
                if *class == VmfClass::VisGroup
                    && self
                        .merged
                        .contains_key(&DeltaKey::RemoveObject(VmfClass::VisGroup, *id))
                {
                    // The VisGroup is gone; the change is moot.
                    return;
                }

                let remove_key = DeltaKey::RemoveProperty(*class, *id, property.clone());
                if self.merged.contains_key(&remove_key) || self.is_conflicted(&remove_key) {
                    warn!(
                        "conflict: {} collides with a removal of the same property",
                        delta
                    );
                    self.demote_merged(&remove_key);
                    self.conflict_incoming(delta);
                    return;
                }

                let key = delta.key();
                let merged_disagrees = matches!(
                    self.merged.get(&key).map(|other| &other.change),
                    Some(Change::ChangeProperty { value: other, .. }) if other != value
                );
                if merged_disagrees {
                    warn!(
                        "conflict: {} disagrees with an equivalent ChangeProperty",
                        delta
                    );
                    self.demote_merged(&key);
                    self.conflict_incoming(delta);
                    return;
                }
                if self.conflicted_value_disagrees(&key, value) {
                    warn!(
                        "conflict: {} disagrees with an equivalent ChangeProperty",
                        delta
                    );
                    self.conflict_incoming(delta);
                    return;
                }
            }

            Change::TieSolid {
                solid_id,
                entity_id,
            } => {
                let entity_id = *entity_id;
                if self.is_conflicted(&DeltaKey::ChangeObject(VmfClass::Solid, *solid_id)) {
                    self.conflict_incoming(delta);
                    self.demote_entity_add(entity_id);
                    return;
                }

                let remove_key = DeltaKey::RemoveObject(VmfClass::Solid, *solid_id);
                if self.merged.contains_key(&remove_key) || self.is_conflicted(&remove_key) {
                    warn!("conflict: {} ties a removed solid", delta);
                    self.conflict_incoming(delta);
                    self.demote_entity_add(entity_id);
                    return;
                }

                let key = delta.key();
                let merged_other_entity = match self.merged.get(&key).map(|other| &other.change) {
                    Some(Change::TieSolid {
                        entity_id: other, ..
                    }) if *other != entity_id => Some(*other),
                    _ => None,
                };
                if let Some(other_entity) = merged_other_entity {
                    warn!("conflict: {} ties the solid to a different entity", delta);
                    self.demote_merged(&key);
                    self.demote_entity_add(other_entity);
                    self.conflict_incoming(delta);
                    self.demote_entity_add(entity_id);
                    return;
                }
                let conflicted_disagrees = self.conflicted.get(&key).is_some_and(|others| {
                    others.iter().any(|other| {
                        matches!(
                            &other.change,
                            Change::TieSolid { entity_id: other, .. } if *other != entity_id
                        )
                    })
                });
                if conflicted_disagrees {
                    warn!("conflict: {} ties the solid to a different entity", delta);
                    self.conflict_incoming(delta);
                    self.demote_entity_add(entity_id);
                    return;
                }
            }

            Change::ReparentObject { class, id, .. } => {
                if self
                    .merged
                    .contains_key(&DeltaKey::RemoveObject(*class, *id))
                {
                    // The object is gone; nothing to reparent.
                    return;
                }
            }

            Change::AddToVisGroup {
                class,
                id,
                visgroup_id,
            } => {
                if self
                    .merged
                    .contains_key(&DeltaKey::RemoveObject(VmfClass::VisGroup, *visgroup_id))
                    || self
                        .merged
                        .contains_key(&DeltaKey::RemoveObject(*class, *id))
                {
                    // Either end of the membership is gone; drop silently.
                    return;
                }
                if self.is_conflicted(&DeltaKey::AddObject(*class, *id)) {
                    self.conflict_incoming(delta);
                    return;
                }
            }

            // No conflict rules of their own; conflicts involving these are
            // raised by the later variants above.
            Change::AddObject { .. }
            | Change::UntieSolid { .. }
            | Change::RemoveObject { .. }
            | Change::RemoveProperty { .. }
            | Change::AddOutput { .. }
            | Change::RemoveOutput { .. }
            | Change::RemoveFromVisGroup { .. }
            | Change::HideObject { .. }
            | Change::UnHideObject { .. } => {}
        }

        self.merged.insert(delta.key(), delta);
    }

    fn is_conflicted(&self, key: &DeltaKey) -> bool {
        self.conflicted.contains_key(key)
    }

    fn conflict_incoming(&mut self, delta: Delta) {
        self.conflicted.entry(delta.key()).or_default().push(delta);
    }

    /// Moves the merged entry for `key`, if any, into the conflicted set.
    fn demote_merged(&mut self, key: &DeltaKey) {
        if let Some(delta) = self.merged.shift_remove(key) {
            self.conflicted.entry(key.clone()).or_default().push(delta);
        }
    }

    fn demote_entity_add(&mut self, entity_id: ObjectId) {
        self.demote_merged(&DeltaKey::AddObject(VmfClass::Entity, entity_id));
    }

    /// The cascaded-removals list of the processed removal of `info`.
    fn removal_cascade(&self, info: ObjectInfo) -> Vec<ObjectInfo> {
        let key = DeltaKey::RemoveObject(info.0, info.1);
        let delta = self
            .merged
            .get(&key)
            .or_else(|| self.conflicted.get(&key).and_then(|list| list.first()));
        match delta.map(|d| &d.change) {
            Some(Change::RemoveObject { cascaded, .. }) => cascaded.clone(),
            _ => Vec::new(),
        }
    }

    /// A merged removal that lists `info` among its cascaded child removals.
    fn find_enclosing_removal(&self, info: ObjectInfo) -> Option<ObjectInfo> {
        self.merged.values().find_map(|delta| match &delta.change {
            Change::RemoveObject {
                class,
                id,
                cascaded,
            } if cascaded.contains(&info) => Some((*class, *id)),
            _ => None,
        })
    }

    /// Demotes the removal of `info`, every cascaded descendant removal, and
    /// every enclosing ancestor removal (with *its* descendants), so that no
    /// partial removal of the subtree survives in the merged list.
    fn demote_removal_families_around(&mut self, info: ObjectInfo) {
        self.demote_removal_family(info);
        let mut current = info;
        while let Some(ancestor) = self.find_enclosing_removal(current) {
            self.demote_removal_family(ancestor);
            current = ancestor;
        }
    }

    fn demote_removal_family(&mut self, info: ObjectInfo) {
        let cascade = self.removal_cascade(info);
        self.demote_merged(&DeltaKey::RemoveObject(info.0, info.1));
        for child in cascade {
            if self
                .merged
                .contains_key(&DeltaKey::RemoveObject(child.0, child.1))
            {
                self.demote_removal_family(child);
            }
        }
    }

    fn conflicted_value_disagrees(&self, key: &DeltaKey, value: &crate::vdf::VdfValue) -> bool {
        self.conflicted.get(key).is_some_and(|others| {
            others.iter().any(|other| match &other.change {
                Change::AddProperty { value: other, .. }
                | Change::ChangeProperty { value: other, .. } => other != value,
                _ => false,
            })
        })
    }
}
