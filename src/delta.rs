//! The delta algebra: the closed set of change records that the differ
//! emits and the merger folds.
//!
//! Two deltas of the same variant are *equivalent* when they represent the
//! same conceptual change, without regard to the new value that change
//! carries. Two `ChangeProperty` deltas of the same key on the same object
//! are equivalent no matter what their respective values are; that is what
//! merging and conflict detection key on. Equivalence lives on [`DeltaKey`],
//! not on the structural equality of the full payload.

use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::map::{ObjectId, ObjectInfo, VmfClass};
use crate::vdf::VdfValue;

/// One change record, optionally tagged with the child map it came from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Delta {
    /// The change itself.
    pub change: Change,
    /// Index of the originating child map in the merge's child list. Used
    /// only for conflict reporting and resolution grouping.
    pub origin: Option<usize>,
}

impl Delta {
    pub fn new(change: Change) -> Self {
        Delta {
            change,
            origin: None,
        }
    }

    /// The canonical equivalence key of this delta.
    pub fn key(&self) -> DeltaKey {
        self.change.key()
    }

    /// The variant tag, in merge processing order.
    pub fn kind(&self) -> DeltaKind {
        self.change.kind()
    }
}

impl From<Change> for Delta {
    fn from(change: Change) -> Self {
        Delta::new(change)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.change, f)
    }
}

/// The closed set of structural changes between two maps.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum Change {
    /// A new object under the given parent (`None` for top-level Entities
    /// and top-level VisGroups).
    AddObject {
        parent: Option<ObjectInfo>,
        class: VmfClass,
        id: ObjectId,
    },
    /// Removal of an object. `cascaded` lists the direct sub-objects whose
    /// own removals are dependents of this removal; the field establishes
    /// the relationship, it does not itself remove anything.
    RemoveObject {
        class: VmfClass,
        id: ObjectId,
        cascaded: Vec<ObjectInfo>,
    },
    /// A marker that the object (or something it owns) differs from the
    /// parent version.
    ChangeObject { class: VmfClass, id: ObjectId },
    AddProperty {
        class: VmfClass,
        id: ObjectId,
        key: String,
        value: VdfValue,
    },
    RemoveProperty {
        class: VmfClass,
        id: ObjectId,
        key: String,
    },
    ChangeProperty {
        class: VmfClass,
        id: ObjectId,
        key: String,
        value: VdfValue,
    },
    /// The solid becomes brush-entity geometry owned by the entity.
    TieSolid {
        solid_id: ObjectId,
        entity_id: ObjectId,
    },
    /// The solid goes back to being world geometry.
    UntieSolid { solid_id: ObjectId },
    /// One output occurrence on an entity. `occurrence` counts prior
    /// occurrences of the identical `(name, value)` pair, so repeated
    /// identical outputs stay distinguishable.
    AddOutput {
        entity_id: ObjectId,
        name: String,
        value: String,
        occurrence: u32,
    },
    RemoveOutput {
        entity_id: ObjectId,
        name: String,
        value: String,
        occurrence: u32,
    },
    /// The object moves under a different parent (`None` meaning top-level).
    ReparentObject {
        parent: Option<ObjectInfo>,
        class: VmfClass,
        id: ObjectId,
    },
    AddToVisGroup {
        class: VmfClass,
        id: ObjectId,
        visgroup_id: ObjectId,
    },
    RemoveFromVisGroup {
        class: VmfClass,
        id: ObjectId,
        visgroup_id: ObjectId,
    },
    /// Stubbed: recognised by the algebra but a no-op in apply and excluded
    /// from merge conflict rules until per-map hide semantics are pinned
    /// down.
    HideObject { class: VmfClass, id: ObjectId },
    /// Stubbed, see [`Change::HideObject`].
    UnHideObject { class: VmfClass, id: ObjectId },
}

impl Change {
    /// The canonical equivalence key: the fields that identify the
    /// conceptual change for merge and hashing purposes, independent of any
    /// new value. Two changes of different variants never share a key.
    pub fn key(&self) -> DeltaKey {
        match self {
            Change::AddObject { class, id, .. } => DeltaKey::AddObject(*class, *id),
            Change::RemoveObject { class, id, .. } => DeltaKey::RemoveObject(*class, *id),
            Change::ChangeObject { class, id } => DeltaKey::ChangeObject(*class, *id),
            Change::AddProperty { class, id, key, .. } => {
                DeltaKey::AddProperty(*class, *id, key.clone())
            }
            Change::RemoveProperty { class, id, key } => {
                DeltaKey::RemoveProperty(*class, *id, key.clone())
            }
            Change::ChangeProperty { class, id, key, .. } => {
                DeltaKey::ChangeProperty(*class, *id, key.clone())
            }
            Change::TieSolid { solid_id, .. } => DeltaKey::TieSolid(*solid_id),
            Change::UntieSolid { solid_id } => DeltaKey::UntieSolid(*solid_id),
            Change::AddOutput {
                entity_id,
                name,
                value,
                occurrence,
            } => DeltaKey::AddOutput(*entity_id, name.clone(), value.clone(), *occurrence),
            Change::RemoveOutput {
                entity_id,
                name,
                value,
                occurrence,
            } => DeltaKey::RemoveOutput(*entity_id, name.clone(), value.clone(), *occurrence),
            Change::ReparentObject { class, id, .. } => DeltaKey::ReparentObject(*class, *id),
            Change::AddToVisGroup {
                class,
                id,
                visgroup_id,
            } => DeltaKey::AddToVisGroup(*class, *id, *visgroup_id),
            Change::RemoveFromVisGroup {
                class,
                id,
                visgroup_id,
            } => DeltaKey::RemoveFromVisGroup(*class, *id, *visgroup_id),
            Change::HideObject { class, id } => DeltaKey::HideObject(*class, *id),
            Change::UnHideObject { class, id } => DeltaKey::UnHideObject(*class, *id),
        }
    }

    pub fn kind(&self) -> DeltaKind {
        match self {
            Change::AddObject { .. } => DeltaKind::AddObject,
            Change::UntieSolid { .. } => DeltaKind::UntieSolid,
            Change::RemoveObject { .. } => DeltaKind::RemoveObject,
            Change::TieSolid { .. } => DeltaKind::TieSolid,
            Change::ChangeObject { .. } => DeltaKind::ChangeObject,
            Change::AddProperty { .. } => DeltaKind::AddProperty,
            Change::RemoveProperty { .. } => DeltaKind::RemoveProperty,
            Change::ChangeProperty { .. } => DeltaKind::ChangeProperty,
            Change::AddOutput { .. } => DeltaKind::AddOutput,
            Change::RemoveOutput { .. } => DeltaKind::RemoveOutput,
            Change::ReparentObject { .. } => DeltaKind::ReparentObject,
            Change::AddToVisGroup { .. } => DeltaKind::AddToVisGroup,
            Change::RemoveFromVisGroup { .. } => DeltaKind::RemoveFromVisGroup,
            Change::HideObject { .. } => DeltaKind::HideObject,
            Change::UnHideObject { .. } => DeltaKind::UnHideObject,
        }
    }
}

/// The equivalence key of a delta. Hashing and equality of keys define
/// merge identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum DeltaKey {
    AddObject(VmfClass, ObjectId),
    RemoveObject(VmfClass, ObjectId),
    ChangeObject(VmfClass, ObjectId),
    AddProperty(VmfClass, ObjectId, String),
    RemoveProperty(VmfClass, ObjectId, String),
    ChangeProperty(VmfClass, ObjectId, String),
    TieSolid(ObjectId),
    UntieSolid(ObjectId),
    AddOutput(ObjectId, String, String, u32),
    RemoveOutput(ObjectId, String, String, u32),
    ReparentObject(VmfClass, ObjectId),
    AddToVisGroup(VmfClass, ObjectId, ObjectId),
    RemoveFromVisGroup(VmfClass, ObjectId, ObjectId),
    HideObject(VmfClass, ObjectId),
    UnHideObject(VmfClass, ObjectId),
}

/// Variant tags in merge processing order. The `Ord` impl (declaration
/// order) is the fixed order the merger consumes variants in and the sort
/// key for reported conflict lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeltaKind {
    AddObject,
    UntieSolid,
    RemoveObject,
    TieSolid,
    ChangeObject,
    AddProperty,
    RemoveProperty,
    ChangeProperty,
    AddOutput,
    RemoveOutput,
    ReparentObject,
    AddToVisGroup,
    RemoveFromVisGroup,
    HideObject,
    UnHideObject,
}

impl DeltaKind {
    pub const ALL: [DeltaKind; 15] = [
        DeltaKind::AddObject,
        DeltaKind::UntieSolid,
        DeltaKind::RemoveObject,
        DeltaKind::TieSolid,
        DeltaKind::ChangeObject,
        DeltaKind::AddProperty,
        DeltaKind::RemoveProperty,
        DeltaKind::ChangeProperty,
        DeltaKind::AddOutput,
        DeltaKind::RemoveOutput,
        DeltaKind::ReparentObject,
        DeltaKind::AddToVisGroup,
        DeltaKind::RemoveFromVisGroup,
        DeltaKind::HideObject,
        DeltaKind::UnHideObject,
    ];
}

fn fmt_parent(parent: &Option<ObjectInfo>) -> String {
    match parent {
        Some((class, id)) => format!("({}, {})", class, id),
        None => "None".to_string(),
    }
}

fn fmt_value(value: &VdfValue) -> String {
    match value {
        VdfValue::Str(s) => format!("{:?}", s),
        VdfValue::List(items) => format!(
            "[{}]",
            items
                .iter()
                .map(fmt_value)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        VdfValue::Obj(_) => "{..}".to_string(),
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddObject { parent, class, id } => {
                write!(f, "AddObject({}, {}, {})", fmt_parent(parent), class, id)
            }
            Change::RemoveObject {
                class,
                id,
                cascaded,
            } => {
                if cascaded.is_empty() {
                    write!(f, "RemoveObject({}, {})", class, id)
                } else {
                    let infos = cascaded
                        .iter()
                        .map(|(c, i)| format!("({}, {})", c, i))
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "RemoveObject({}, {}, [{}])", class, id, infos)
                }
            }
            Change::ChangeObject { class, id } => write!(f, "ChangeObject({}, {})", class, id),
            Change::AddProperty {
                class,
                id,
                key,
                value,
            } => write!(
                f,
                "AddProperty({}, {}, {:?}, {})",
                class,
                id,
                key,
                fmt_value(value)
            ),
            Change::RemoveProperty { class, id, key } => {
                write!(f, "RemoveProperty({}, {}, {:?})", class, id, key)
            }
            Change::ChangeProperty {
                class,
                id,
                key,
                value,
            } => write!(
                f,
                "ChangeProperty({}, {}, {:?}, {})",
                class,
                id,
                key,
                fmt_value(value)
            ),
            Change::TieSolid {
                solid_id,
                entity_id,
            } => write!(f, "TieSolid({}, {})", solid_id, entity_id),
            Change::UntieSolid { solid_id } => write!(f, "UntieSolid({})", solid_id),
            Change::AddOutput {
                entity_id,
                name,
                value,
                occurrence,
            } => write!(
                f,
                "AddOutput({}, {:?}, {:?}, {})",
                entity_id, name, value, occurrence
            ),
            Change::RemoveOutput {
                entity_id,
                name,
                value,
                occurrence,
            } => write!(
                f,
                "RemoveOutput({}, {:?}, {:?}, {})",
                entity_id, name, value, occurrence
            ),
            Change::ReparentObject { parent, class, id } => {
                write!(
                    f,
                    "ReparentObject({}, {}, {})",
                    fmt_parent(parent),
                    class,
                    id
                )
            }
            Change::AddToVisGroup {
                class,
                id,
                visgroup_id,
            } => write!(f, "AddToVisGroup({}, {}, {})", class, id, visgroup_id),
            Change::RemoveFromVisGroup {
                class,
                id,
                visgroup_id,
            } => write!(f, "RemoveFromVisGroup({}, {}, {})", class, id, visgroup_id),
            Change::HideObject { class, id } => write!(f, "HideObject({}, {})", class, id),
            Change::UnHideObject { class, id } => write!(f, "UnHideObject({}, {})", class, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::VmfClass;
    use std::collections::HashSet;

    #[test]
    fn equivalence_ignores_values() {
        let a = Change::ChangeProperty {
            class: VmfClass::Solid,
            id: 1,
            key: "material".to_string(),
            value: VdfValue::from("BRICK/BRICKFLOOR001A"),
        };
        let b = Change::ChangeProperty {
            class: VmfClass::Solid,
            id: 1,
            key: "material".to_string(),
            value: VdfValue::from("DEV/DEV_MEASUREGENERIC01B"),
        };

        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
    }

    #[test]
    fn different_variants_are_never_equivalent() {
        let change = Change::ChangeObject {
            class: VmfClass::Solid,
            id: 1,
        };
        let remove = Change::RemoveObject {
            class: VmfClass::Solid,
            id: 1,
            cascaded: Vec::new(),
        };

        assert_ne!(change.key(), remove.key());
    }

    #[test]
    fn equivalent_deltas_collapse_in_sets() {
        let mut set = HashSet::new();
        set.insert(
            Change::AddToVisGroup {
                class: VmfClass::Solid,
                id: 2,
                visgroup_id: 1,
            }
            .key(),
        );
        set.insert(
            Change::AddToVisGroup {
                class: VmfClass::Solid,
                id: 2,
                visgroup_id: 1,
            }
            .key(),
        );

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn output_value_is_part_of_the_key() {
        let a = Change::AddOutput {
            entity_id: 42,
            name: "OnPressed".to_string(),
            value: "v1".to_string(),
            occurrence: 0,
        };
        let b = Change::AddOutput {
            entity_id: 42,
            name: "OnPressed".to_string(),
            value: "v2".to_string(),
            occurrence: 0,
        };

        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn kind_order_matches_merge_processing_order() {
        assert!(DeltaKind::AddObject < DeltaKind::UntieSolid);
        assert!(DeltaKind::UntieSolid < DeltaKind::RemoveObject);
        assert!(DeltaKind::RemoveObject < DeltaKind::TieSolid);
        assert!(DeltaKind::TieSolid < DeltaKind::ChangeObject);
        assert!(DeltaKind::RemoveFromVisGroup < DeltaKind::HideObject);
    }
}
