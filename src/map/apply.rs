//! Executing a merged delta list against the map, and the deferred
//! deep-clone used by conflict resolution.

use std::collections::HashMap;

use crate::delta::{Change, Delta};
use crate::errors::{VmfError, VmfResult};
use crate::vdf::{VdfObject, VdfValue};

use super::props;
use super::{ObjectId, ObjectInfo, VmfClass, VmfMap};

impl VmfMap {
    /// Applies the given deltas in input order, then increments the map
    /// revision unless the caller opts out.
    ///
    /// The tables and the raw shape stay consistent throughout: ties and
    /// parent pointers move in lock-step with the structural deltas, and
    /// removing a sub-object whose ancestor is already gone only clears the
    /// table entries.
    pub fn apply_deltas(&mut self, deltas: &[Delta], increment_revision: bool) -> VmfResult<()> {
        for delta in deltas {
            self.apply_one(&delta.change)?;
        }
        if increment_revision {
            self.increment_revision();
        }
        Ok(())
    }

    fn apply_one(&mut self, change: &Change) -> VmfResult<()> {
        match change {
            Change::AddObject { parent, class, id } => {
                // A child-minted ID may be ahead of this map's counter.
                let last = self.last_id.entry(*class).or_insert(0);
                if *id > *last {
                    *last = *id;
                }

                let mut obj = VdfObject::new();
                obj.insert(class.id_key().to_string(), VdfValue::Str(id.to_string()));
                let table = self.class_table_mut(*class).ok_or_else(|| {
                    VmfError::InvalidFormat("cannot add an object of class 'world'".to_string())
                })?;
                table.insert(*id, obj);

                if let Some(parent_info) = parent {
                    if !self.has(parent_info.0, parent_info.1) {
                        return Err(VmfError::no_object(parent_info.0, parent_info.1));
                    }
                    self.parent_info.insert((*class, *id), *parent_info);
                    if parent_info.0 == VmfClass::Entity && *class == VmfClass::Solid {
                        self.entity_for_solid.insert(*id, parent_info.1);
                    }
                }
            }

            Change::RemoveObject { class, id, .. } => {
                let table = self.class_table_mut(*class).ok_or_else(|| {
                    VmfError::InvalidFormat("cannot remove the world".to_string())
                })?;
                table
                    .shift_remove(id)
                    .ok_or_else(|| VmfError::no_object(*class, *id))?;
                self.parent_info.remove(&(*class, *id));
                if *class == VmfClass::Solid {
                    self.entity_for_solid.shift_remove(id);
                }
            }

            Change::ChangeObject { .. } => {}

            Change::AddProperty {
                class,
                id,
                key,
                value,
            }
            | Change::ChangeProperty {
                class,
                id,
                key,
                value,
            } => {
                let obj = self.get_mut(*class, *id)?;
                props::set_property(obj, key, value.clone())?;
            }

            Change::RemoveProperty { class, id, key } => {
                let obj = self.get_mut(*class, *id)?;
                props::delete_property(obj, key)?;
            }

            Change::AddOutput {
                entity_id,
                name,
                value,
                ..
            } => {
                let entity = self.get_mut(VmfClass::Entity, *entity_id)?;
                if !entity.get("connections").is_some_and(VdfValue::is_obj) {
                    entity.insert(
                        "connections".to_string(),
                        VdfValue::Obj(VdfObject::new()),
                    );
                }
                let connections = entity
                    .get_mut("connections")
                    .and_then(VdfValue::as_obj_mut)
                    .ok_or_else(|| VmfError::Key("connections".to_string()))?;
                connections.push_entry(name.clone(), VdfValue::Str(value.clone()));
            }

            Change::RemoveOutput {
                entity_id,
                name,
                value,
                ..
            } => {
                let entity = self.get_mut(VmfClass::Entity, *entity_id)?;
                let connections = entity
                    .get_mut("connections")
                    .and_then(VdfValue::as_obj_mut)
                    .ok_or_else(|| VmfError::Key("connections".to_string()))?;
                connections.remove_entry_value(name, &VdfValue::Str(value.clone()));
            }

            Change::TieSolid {
                solid_id,
                entity_id,
            } => {
                self.get(VmfClass::Solid, *solid_id)?;
                self.get(VmfClass::Entity, *entity_id)?;
                self.entity_for_solid.insert(*solid_id, *entity_id);
                self.parent_info.insert(
                    (VmfClass::Solid, *solid_id),
                    (VmfClass::Entity, *entity_id),
                );
            }

            Change::UntieSolid { solid_id } => {
                self.get(VmfClass::Solid, *solid_id)?;
                self.entity_for_solid.shift_remove(solid_id);
                self.parent_info.insert(
                    (VmfClass::Solid, *solid_id),
                    (VmfClass::World, self.world_id),
                );
            }

            Change::ReparentObject { parent, class, id } => {
                self.get(*class, *id)?;
                match parent {
                    Some(parent_info) => {
                        self.parent_info.insert((*class, *id), *parent_info);
                    }
                    None => {
                        self.parent_info.remove(&(*class, *id));
                    }
                }
            }

            Change::AddToVisGroup {
                class,
                id,
                visgroup_id,
            } => {
                let obj = self.get_mut(*class, *id)?;
                let mut ids = props::visgroup_ids(obj);
                ids.insert(*visgroup_id);
                props::set_visgroup_ids(obj, &ids)?;
            }

            Change::RemoveFromVisGroup {
                class,
                id,
                visgroup_id,
            } => {
                let obj = self.get_mut(*class, *id)?;
                let mut ids = props::visgroup_ids(obj);
                ids.remove(visgroup_id);
                props::set_visgroup_ids(obj, &ids)?;
            }

            // Stubbed until hide semantics are pinned down.
            Change::HideObject { .. } | Change::UnHideObject { .. } => {}
        }
        Ok(())
    }

    /// Returns a list of deltas that, when applied, reproduce the entire
    /// subtree under freshly minted IDs. The original→clone ID mapping is
    /// recorded in `clone_ids` per `(class, id)`. VisGroup memberships are
    /// not copied: the caller decides which VisGroups the clones belong to.
    ///
    /// Not applicable to the World, Groups, or VisGroups.
    pub fn clone_object_deferred(
        &mut self,
        class: VmfClass,
        id: ObjectId,
        clone_ids: &mut HashMap<ObjectInfo, ObjectId>,
    ) -> VmfResult<Vec<Delta>> {
        debug_assert!(
            !matches!(class, VmfClass::World | VmfClass::Group | VmfClass::VisGroup),
            "cannot clone objects of class '{}'",
            class
        );

        self.get(class, id)?;
        let parent = self.parent_of(class, id);
        let new_id = self.next_available_id(class);
        clone_ids.insert((class, id), new_id);

        let mut result = vec![Delta::new(Change::AddObject {
            parent,
            class,
            id: new_id,
        })];

        let (properties, outputs) = {
            let obj = self.get(class, id)?;
            // The clone carries no VisGroup memberships of its own; the
            // caller assigns the memberships the clone should have.
            let properties: Vec<(String, VdfValue)> = props::iter_properties(obj)
                .into_iter()
                .filter(|(key, _)| key.as_str() != props::VISGROUP_PROPERTY_PATH)
                .map(|(key, value)| (key, value.clone()))
                .collect();
            let outputs = if class == VmfClass::Entity {
                props::iter_outputs(obj)
            } else {
                Vec::new()
            };
            (properties, outputs)
        };

        for (key, value) in properties {
            result.push(Delta::new(Change::AddProperty {
                class,
                id: new_id,
                key,
                value,
            }));
        }
        for (name, value, occurrence) in outputs {
            result.push(Delta::new(Change::AddOutput {
                entity_id: new_id,
                name,
                value,
                occurrence,
            }));
        }

        for (sub_class, sub_id) in self.iter_sub_object_infos(class, id) {
            let mut sub_deltas = self.clone_object_deferred(sub_class, sub_id, clone_ids)?;
            // The clones' parent pointers must follow the cloned root.
            for delta in &mut sub_deltas {
                if let Change::AddObject { parent, .. } = &mut delta.change {
                    if *parent == Some((class, id)) {
                        *parent = Some((class, new_id));
                    }
                }
            }
            result.append(&mut sub_deltas);
        }

        Ok(result)
    }
}
