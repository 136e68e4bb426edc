//! The in-memory map model.
//!
//! A [`VmfMap`] keeps two views of one VMF file in lock-step: the raw
//! recursive VDF shape (for serialiser fidelity) and a set of per-class,
//! insertion-ordered ID tables with parent pointers and a solid→entity tie
//! table (for lookups). Class-owned sub-objects (solids, sides, groups,
//! visgroups) are lifted out of the raw tree into the tables on load and
//! re-assembled on save; everything else (versioninfo, viewsettings,
//! cameras, editor blocks, and so on) travels in the tree untouched.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

use crate::errors::{VmfError, VmfResult};
use crate::vdf::{VdfObject, VdfValue};

mod apply;
pub(crate) mod io;
pub mod props;

/// Numeric object identifier. IDs are unique per class within one map and
/// independently assigned across maps.
pub type ObjectId = i32;

/// Identifying information for one object: its class and its ID.
pub type ObjectInfo = (VmfClass, ObjectId);

/// The classes of VMF objects the merge engine tracks structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum VmfClass {
    World,
    Solid,
    Side,
    Group,
    Entity,
    VisGroup,
}

impl VmfClass {
    /// All classes, in no particular order.
    pub const ALL: [VmfClass; 6] = [
        VmfClass::World,
        VmfClass::Solid,
        VmfClass::Side,
        VmfClass::Group,
        VmfClass::Entity,
        VmfClass::VisGroup,
    ];

    /// The key this class appears under in the raw tree.
    pub fn tag(self) -> &'static str {
        match self {
            VmfClass::World => "world",
            VmfClass::Solid => "solid",
            VmfClass::Side => "side",
            VmfClass::Group => "group",
            VmfClass::Entity => "entity",
            VmfClass::VisGroup => "visgroup",
        }
    }

    /// The attribute the class stores its ID under. VisGroup IDs live under
    /// `visgroupid`; all other classes use `id`.
    pub fn id_key(self) -> &'static str {
        match self {
            VmfClass::VisGroup => "visgroupid",
            _ => "id",
        }
    }
}

impl fmt::Display for VmfClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One VMF file, indexed for structural diffing and merging.
#[derive(Debug, Clone)]
pub struct VmfMap {
    /// The path the map was loaded from, if any.
    pub path: Option<PathBuf>,

    /// Top-level entries that are not class objects (versioninfo,
    /// viewsettings, cameras, cordons, ...).
    root: VdfObject,
    /// The world object, stripped of its solids and groups.
    world: VdfObject,
    world_id: ObjectId,

    solids: IndexMap<ObjectId, VdfObject>,
    sides: IndexMap<ObjectId, VdfObject>,
    groups: IndexMap<ObjectId, VdfObject>,
    entities: IndexMap<ObjectId, VdfObject>,
    visgroups: IndexMap<ObjectId, VdfObject>,

    /// Structural parent of each Solid, Side, Group, VisGroup, and tied
    /// Solid. Top-level Entities and top-level VisGroups have no entry.
    parent_info: HashMap<ObjectInfo, ObjectInfo>,
    /// Which Solids are currently tied into brush-entities.
    entity_for_solid: IndexMap<ObjectId, ObjectId>,

    /// Per-class last-assigned-ID counter. Monotonic; used to mint fresh IDs.
    last_id: HashMap<VmfClass, ObjectId>,
    /// `versioninfo.mapversion`.
    revision: i32,
}

fn parse_id(obj: &VdfObject, key: &str) -> VmfResult<ObjectId> {
    obj.get_str(key)
        .and_then(|s| s.parse::<ObjectId>().ok())
        .ok_or_else(|| VmfError::InvalidFormat(format!("object has no integer '{}' attribute", key)))
}

/// Takes the sub-objects stored under `key` out of `owner`, tolerating the
/// singleton-vs-list ambiguity of the raw representation. A scalar entry is
/// left in place: a point entity may carry a plain `solid` property.
fn take_sub_objects(owner: &mut VdfObject, key: &str) -> Vec<VdfObject> {
    if matches!(owner.get(key), Some(VdfValue::Str(_)) | None) {
        return Vec::new();
    }
    match owner.shift_remove(key) {
        Some(VdfValue::Obj(obj)) => vec![obj],
        Some(VdfValue::List(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                VdfValue::Obj(obj) => Some(obj),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl VmfMap {
    /// Builds a map from a parsed VDF tree.
    ///
    /// The world entry is mandatory; Solids owned directly by the World are
    /// world geometry, Solids owned by an Entity are brush-entity geometry
    /// and are simultaneously recorded in the tie table. VisGroups are
    /// walked breadth-first so parent pointers are always available when a
    /// child is encountered.
    pub fn from_tree(mut tree: VdfObject, path: Option<PathBuf>) -> VmfResult<Self> {
        let revision = tree
            .get("versioninfo")
            .and_then(VdfValue::as_obj)
            .and_then(|vi| vi.get_str("mapversion"))
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or_else(|| {
                VmfError::invalid_map(path.as_deref(), "versioninfo has no usable mapversion")
            })?;

        let mut world = match tree.shift_remove("world") {
            Some(VdfValue::Obj(world)) => world,
            Some(_) => {
                return Err(VmfError::invalid_map(
                    path.as_deref(),
                    "world entry is not an object",
                ))
            }
            None => {
                return Err(VmfError::invalid_map(
                    path.as_deref(),
                    "VMF has no world entry",
                ))
            }
        };
        let world_id = parse_id(&world, "id")
            .map_err(|_| VmfError::invalid_map(path.as_deref(), "world has no integer id"))?;

        let mut map = VmfMap {
            path,
            root: VdfObject::new(),
            world: VdfObject::new(),
            world_id,
            solids: IndexMap::new(),
            sides: IndexMap::new(),
            groups: IndexMap::new(),
            entities: IndexMap::new(),
            visgroups: IndexMap::new(),
            parent_info: HashMap::new(),
            entity_for_solid: IndexMap::new(),
            last_id: HashMap::new(),
            revision,
        };
        map.note_id(VmfClass::World, world_id);

        // World geometry and groups.
        map.index_solids(&mut world, (VmfClass::World, world_id))?;
        for group in take_sub_objects(&mut world, "group") {
            let group_id = parse_id(&group, "id")?;
            map.parent_info
                .insert((VmfClass::Group, group_id), (VmfClass::World, world_id));
            map.note_id(VmfClass::Group, group_id);
            map.groups.insert(group_id, group);
        }
        map.world = world;

        // Entities, possibly repeated at the top level.
        let entity_objects = take_sub_objects(&mut tree, "entity");
        for mut entity in entity_objects {
            let entity_id = parse_id(&entity, "id")?;
            map.note_id(VmfClass::Entity, entity_id);
            map.index_solids(&mut entity, (VmfClass::Entity, entity_id))?;
            map.entities.insert(entity_id, entity);
        }

        // VisGroups, breadth-first so parents are indexed before children.
        if let Some(VdfValue::Obj(mut visgroups_root)) = tree.shift_remove("visgroups") {
            let mut queue: VecDeque<(Option<ObjectId>, VdfObject)> =
                take_sub_objects(&mut visgroups_root, "visgroup")
                    .into_iter()
                    .map(|vg| (None, vg))
                    .collect();
            while let Some((parent_id, mut visgroup)) = queue.pop_front() {
                let children = take_sub_objects(&mut visgroup, "visgroup");
                let id = parse_id(&visgroup, "visgroupid")?;
                if let Some(parent_id) = parent_id {
                    map.parent_info
                        .insert((VmfClass::VisGroup, id), (VmfClass::VisGroup, parent_id));
                }
                map.note_id(VmfClass::VisGroup, id);
                map.visgroups.insert(id, visgroup);
                queue.extend(children.into_iter().map(|child| (Some(id), child)));
            }
        }

        map.root = tree;
        Ok(map)
    }

    /// Lifts `owner`'s solids (and their sides) into the tables, recording
    /// parent pointers and, for entity owners, tie-table entries.
    fn index_solids(&mut self, owner: &mut VdfObject, owner_info: ObjectInfo) -> VmfResult<()> {
        for mut solid in take_sub_objects(owner, "solid") {
            let solid_id = parse_id(&solid, "id")?;
            if owner_info.0 == VmfClass::Entity {
                self.entity_for_solid.insert(solid_id, owner_info.1);
            }
            self.parent_info
                .insert((VmfClass::Solid, solid_id), owner_info);
            self.note_id(VmfClass::Solid, solid_id);

            for side in take_sub_objects(&mut solid, "side") {
                let side_id = parse_id(&side, "id")?;
                self.parent_info
                    .insert((VmfClass::Side, side_id), (VmfClass::Solid, solid_id));
                self.note_id(VmfClass::Side, side_id);
                self.sides.insert(side_id, side);
            }

            self.solids.insert(solid_id, solid);
        }
        Ok(())
    }

    fn note_id(&mut self, class: VmfClass, id: ObjectId) {
        let last = self.last_id.entry(class).or_insert(0);
        if id > *last {
            *last = id;
        }
    }

    fn class_table(&self, class: VmfClass) -> Option<&IndexMap<ObjectId, VdfObject>> {
        match class {
            VmfClass::World => None,
            VmfClass::Solid => Some(&self.solids),
            VmfClass::Side => Some(&self.sides),
            VmfClass::Group => Some(&self.groups),
            VmfClass::Entity => Some(&self.entities),
            VmfClass::VisGroup => Some(&self.visgroups),
        }
    }

    fn class_table_mut(&mut self, class: VmfClass) -> Option<&mut IndexMap<ObjectId, VdfObject>> {
        match class {
            VmfClass::World => None,
            VmfClass::Solid => Some(&mut self.solids),
            VmfClass::Side => Some(&mut self.sides),
            VmfClass::Group => Some(&mut self.groups),
            VmfClass::Entity => Some(&mut self.entities),
            VmfClass::VisGroup => Some(&mut self.visgroups),
        }
    }

    /// Looks an object up by class and ID.
    pub fn get(&self, class: VmfClass, id: ObjectId) -> VmfResult<&VdfObject> {
        match class {
            VmfClass::World => Ok(&self.world),
            _ => self
                .class_table(class)
                .and_then(|table| table.get(&id))
                .ok_or_else(|| VmfError::no_object(class, id)),
        }
    }

    /// Looks an object up mutably by class and ID.
    pub fn get_mut(&mut self, class: VmfClass, id: ObjectId) -> VmfResult<&mut VdfObject> {
        match class {
            VmfClass::World => Ok(&mut self.world),
            _ => self
                .class_table_mut(class)
                .and_then(|table| table.get_mut(&id))
                .ok_or_else(|| VmfError::no_object(class, id)),
        }
    }

    pub fn has(&self, class: VmfClass, id: ObjectId) -> bool {
        match class {
            VmfClass::World => id == self.world_id,
            _ => self
                .class_table(class)
                .is_some_and(|table| table.contains_key(&id)),
        }
    }

    pub fn world_id(&self) -> ObjectId {
        self.world_id
    }

    pub fn revision(&self) -> i32 {
        self.revision
    }

    /// The structural parent of the given object, or `None` for top-level
    /// Entities and top-level VisGroups.
    pub fn parent_of(&self, class: VmfClass, id: ObjectId) -> Option<ObjectInfo> {
        self.parent_info.get(&(class, id)).copied()
    }

    /// The entity a solid is tied into, if it is brush-entity geometry.
    pub fn tied_entity(&self, solid_id: ObjectId) -> Option<ObjectId> {
        self.entity_for_solid.get(&solid_id).copied()
    }

    /// All solid→entity ties, in document order.
    pub fn ties(&self) -> impl Iterator<Item = (ObjectId, ObjectId)> + '_ {
        self.entity_for_solid
            .iter()
            .map(|(solid, entity)| (*solid, *entity))
    }

    /// Mints a fresh ID for the class. The counter seeds at
    /// `max(existing) + 1`, or at 1 when no object of the class exists.
    pub fn next_available_id(&mut self, class: VmfClass) -> ObjectId {
        let last = self.last_id.entry(class).or_insert(0);
        *last += 1;
        *last
    }

    /// Iterates all tracked objects in a fixed order: VisGroup, Group,
    /// World, Entity, Solid, Side. Higher-level containers come before
    /// their dependents, which the differ relies on when assigning new IDs.
    pub fn iter_objects(&self) -> impl Iterator<Item = (VmfClass, ObjectId, &VdfObject)> + '_ {
        let visgroups = self
            .visgroups
            .iter()
            .map(|(id, obj)| (VmfClass::VisGroup, *id, obj));
        let groups = self
            .groups
            .iter()
            .map(|(id, obj)| (VmfClass::Group, *id, obj));
        let world = std::iter::once((VmfClass::World, self.world_id, &self.world));
        let entities = self
            .entities
            .iter()
            .map(|(id, obj)| (VmfClass::Entity, *id, obj));
        let solids = self
            .solids
            .iter()
            .map(|(id, obj)| (VmfClass::Solid, *id, obj));
        let sides = self.sides.iter().map(|(id, obj)| (VmfClass::Side, *id, obj));

        visgroups
            .chain(groups)
            .chain(world)
            .chain(entities)
            .chain(solids)
            .chain(sides)
    }

    /// The direct sub-objects of the given object, one level deep, in
    /// document order.
    pub fn iter_sub_object_infos(&self, class: VmfClass, id: ObjectId) -> Vec<ObjectInfo> {
        let child_class = match class {
            VmfClass::World | VmfClass::Entity => VmfClass::Solid,
            VmfClass::Solid => VmfClass::Side,
            VmfClass::VisGroup => VmfClass::VisGroup,
            VmfClass::Side | VmfClass::Group => return Vec::new(),
        };
        self.children_of(child_class, (class, id))
            .into_iter()
            .map(|child_id| (child_class, child_id))
            .collect()
    }

    fn children_of(&self, child_class: VmfClass, parent: ObjectInfo) -> Vec<ObjectId> {
        self.class_table(child_class)
            .map(|table| {
                table
                    .keys()
                    .copied()
                    .filter(|child_id| {
                        self.parent_info.get(&(child_class, *child_id)) == Some(&parent)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn top_level_visgroups(&self) -> Vec<ObjectId> {
        self.visgroups
            .keys()
            .copied()
            .filter(|id| !self.parent_info.contains_key(&(VmfClass::VisGroup, *id)))
            .collect()
    }

    /// Bumps the map revision in `versioninfo.mapversion` and in the
    /// World's `mapversion` field.
    pub fn increment_revision(&mut self) {
        self.revision += 1;
        let revision = VdfValue::Str(self.revision.to_string());
        if let Some(versioninfo) = self.root.get_mut("versioninfo").and_then(VdfValue::as_obj_mut)
        {
            versioninfo.insert("mapversion".to_string(), revision.clone());
        }
        self.world.insert("mapversion".to_string(), revision);
    }

    /// Re-assembles the raw tree from the tables, in Hammer's canonical
    /// top-level order.
    pub fn to_tree(&self) -> VdfObject {
        let mut out = VdfObject::new();

        if let Some(versioninfo) = self.root.get("versioninfo") {
            out.push_entry("versioninfo", versioninfo.clone());
        }
        out.push_entry("visgroups", VdfValue::Obj(self.build_visgroups_block()));
        if let Some(viewsettings) = self.root.get("viewsettings") {
            out.push_entry("viewsettings", viewsettings.clone());
        }
        out.push_entry("world", VdfValue::Obj(self.build_world()));
        for entity_id in self.entities.keys() {
            out.push_entry(
                "entity",
                VdfValue::Obj(self.build_object(VmfClass::Entity, *entity_id)),
            );
        }
        for (key, value) in self.root.iter() {
            if matches!(key.as_str(), "versioninfo" | "viewsettings") {
                continue;
            }
            out.push_entry(key.clone(), value.clone());
        }

        out
    }

    fn build_visgroups_block(&self) -> VdfObject {
        let mut block = VdfObject::new();
        for id in self.top_level_visgroups() {
            block.push_entry(
                "visgroup",
                VdfValue::Obj(self.build_object(VmfClass::VisGroup, id)),
            );
        }
        block
    }

    fn build_world(&self) -> VdfObject {
        let mut world = self.world.clone();
        for solid_id in self.children_of(VmfClass::Solid, (VmfClass::World, self.world_id)) {
            world.push_entry(
                "solid",
                VdfValue::Obj(self.build_object(VmfClass::Solid, solid_id)),
            );
        }
        for group_id in self.groups.keys() {
            world.push_entry(
                "group",
                VdfValue::Obj(self.build_object(VmfClass::Group, *group_id)),
            );
        }
        world
    }

    /// Rebuilds one object's raw shape, re-attaching its lifted sub-objects.
    /// Children slot in before a trailing `editor` block when the object has
    /// one, matching where Hammer writes them.
    fn build_object(&self, class: VmfClass, id: ObjectId) -> VdfObject {
        let mut obj = match self.class_table(class).and_then(|table| table.get(&id)) {
            Some(obj) => obj.clone(),
            None => return VdfObject::new(),
        };

        let child_class = match class {
            VmfClass::Entity => Some(VmfClass::Solid),
            VmfClass::Solid => Some(VmfClass::Side),
            VmfClass::VisGroup => Some(VmfClass::VisGroup),
            _ => None,
        };
        let Some(child_class) = child_class else {
            return obj;
        };

        let mut children: Vec<VdfValue> = self
            .children_of(child_class, (class, id))
            .into_iter()
            .map(|child_id| VdfValue::Obj(self.build_object(child_class, child_id)))
            .collect();
        if children.is_empty() {
            return obj;
        }

        let value = match children.len() {
            1 => children.remove(0),
            _ => VdfValue::List(children),
        };
        match obj.get_index_of("editor") {
            Some(index) => {
                obj.shift_insert(index, child_class.tag().to_string(), value);
            }
            None => {
                obj.insert(child_class.tag().to_string(), value);
            }
        }
        obj
    }
}
