//! Identity and containment primitives.
//!
//! All entities live in one arena ([`Topology`]) and refer to each other through
//! [`EntityId`] handles. A container owns named [`Slot`]s, each an insertion-ordered
//! list of child handles. The parent handle is fixed when the child is added; a slot
//! can also act as a secondary index (see [`Topology::link`]) without changing
//! ownership.

use crate::model::{EntityKind, LineShape, Location, NetworkData, NetworkType};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Handle to an entity in a [`Topology`] arena.
///
/// Handles are minted only by the arena that owns the entity and are meaningless in
/// any other arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(usize);

impl EntityId {
    #[inline]
    pub(crate) fn new(value: usize) -> Self {
        EntityId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

/// Named child collections a container may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Buses,
    Lines,
    Switches,
    Substations,
    VoltageLevels,
    SubTopologies,
    TwoWindingsTransformers,
    ThreeWindingsTransformers,
    Loads,
    Generators,
    UsagePoints,
    UsagePointLocations,
    DanglingLines,
    ShuntCompensators,
    Meters,
}

impl Slot {
    pub const ALL: [Slot; 15] = [
        Slot::Buses,
        Slot::Lines,
        Slot::Switches,
        Slot::Substations,
        Slot::VoltageLevels,
        Slot::SubTopologies,
        Slot::TwoWindingsTransformers,
        Slot::ThreeWindingsTransformers,
        Slot::Loads,
        Slot::Generators,
        Slot::UsagePoints,
        Slot::UsagePointLocations,
        Slot::DanglingLines,
        Slot::ShuntCompensators,
        Slot::Meters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Buses => "buses",
            Slot::Lines => "lines",
            Slot::Switches => "switches",
            Slot::Substations => "substations",
            Slot::VoltageLevels => "voltageLevels",
            Slot::SubTopologies => "subTopologies",
            Slot::TwoWindingsTransformers => "twoWindingsTransformers",
            Slot::ThreeWindingsTransformers => "threeWindingsTransformers",
            Slot::Loads => "loads",
            Slot::Generators => "generators",
            Slot::UsagePoints => "usagePoints",
            Slot::UsagePointLocations => "usagePointLocations",
            Slot::DanglingLines => "danglingLines",
            Slot::ShuntCompensators => "shuntCompensators",
            Slot::Meters => "meters",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Slot::ALL
            .iter()
            .copied()
            .find(|slot| slot.as_str() == value)
            .ok_or_else(|| format!("unknown slot '{value}'"))
    }
}

/// Identity and presentation attributes supplied when creating an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementInfo {
    pub id: String,
    pub name: String,
    pub location: Option<Location>,
    pub shape: Option<LineShape>,
    pub feeder_num: Option<String>,
}

impl ElementInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn with_shape(mut self, shape: Option<LineShape>) -> Self {
        self.shape = shape.filter(|s| !s.is_empty());
        self
    }

    pub fn with_feeder_num(mut self, feeder_num: Option<String>) -> Self {
        self.feeder_num = feeder_num.filter(|n| !n.is_empty());
        self
    }
}

/// One node of the containment tree.
#[derive(Debug, Clone)]
pub struct Entity {
    id: String,
    name: String,
    prefix: Option<String>,
    parent: Option<EntityId>,
    location: Option<Location>,
    shape: Option<LineShape>,
    feeder_num: Option<String>,
    kind: EntityKind,
    slots: Vec<(Slot, Vec<EntityId>)>,
}

impl Entity {
    pub fn new(info: ElementInfo, kind: EntityKind) -> Self {
        Self {
            id: info.id,
            name: info.name,
            prefix: None,
            parent: None,
            location: info.location,
            shape: info.shape,
            feeder_num: info.feeder_num,
            kind,
            slots: Vec::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit prefix only; use [`Topology::prefix`] for the inherited value.
    pub fn own_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn shape(&self) -> Option<&LineShape> {
        self.shape.as_ref()
    }

    pub fn feeder_num(&self) -> Option<&str> {
        self.feeder_num.as_deref()
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut EntityKind {
        &mut self.kind
    }

    /// Children in `slot`, in insertion order. Empty when the slot was never used.
    pub fn slot(&self, slot: Slot) -> &[EntityId] {
        self.slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, children)| children.as_slice())
            .unwrap_or(&[])
    }

    /// Slots this entity has populated, in first-use order.
    pub fn slots(&self) -> impl Iterator<Item = (Slot, &[EntityId])> {
        self.slots.iter().map(|(s, c)| (*s, c.as_slice()))
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Vec<EntityId> {
        let pos = match self.slots.iter().position(|(s, _)| *s == slot) {
            Some(pos) => pos,
            None => {
                self.slots.push((slot, Vec::new()));
                self.slots.len() - 1
            }
        };
        &mut self.slots[pos].1
    }
}

/// Arena holding every entity of an imported topology, rooted at an MV network.
#[derive(Debug, Clone)]
pub struct Topology {
    entities: Vec<Entity>,
    root: EntityId,
}

impl Topology {
    /// Create an arena containing only the root network.
    pub fn new(id: impl Into<String>, name: impl Into<String>, system: impl Into<String>) -> Self {
        let root = Entity::new(
            ElementInfo::new(id, name),
            EntityKind::Network(NetworkData {
                system: system.into(),
                network_type: NetworkType::Mv,
            }),
        );
        Self {
            entities: vec![root],
            root: EntityId::new(0),
        }
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity.
    ///
    /// # Panics
    ///
    /// When `id` was minted by a different, larger arena.
    pub fn get(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    /// Every entity with its handle, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(idx, entity)| (EntityId::new(idx), entity))
    }

    /// Append `entity` to `slot` of `parent` and make `parent` its owner.
    ///
    /// Duplicate ids are not checked here; the typed builders do that.
    pub fn add_element(&mut self, parent: EntityId, slot: Slot, mut entity: Entity) -> EntityId {
        let handle = EntityId::new(self.entities.len());
        entity.parent = Some(parent);
        self.entities.push(entity);
        self.get_mut(parent).slot_mut(slot).push(handle);
        handle
    }

    /// Index `child` under `slot` of `container` without changing its owner.
    pub fn link(&mut self, container: EntityId, slot: Slot, child: EntityId) {
        let children = self.get_mut(container).slot_mut(slot);
        if !children.contains(&child) {
            children.push(child);
        }
    }

    pub fn elements(&self, container: EntityId, slot: Slot) -> &[EntityId] {
        self.get(container).slot(slot)
    }

    /// Same as [`Topology::elements`] with a slot given by name; unknown names yield nothing.
    pub fn elements_by_name(&self, container: EntityId, slot: &str) -> &[EntityId] {
        match slot.parse::<Slot>() {
            Ok(slot) => self.elements(container, slot),
            Err(_) => &[],
        }
    }

    /// First child in `slot` whose id equals `id`.
    pub fn element(&self, container: EntityId, slot: Slot, id: &str) -> Option<EntityId> {
        self.elements(container, slot)
            .iter()
            .copied()
            .find(|child| self.get(*child).id == id)
    }

    /// Resolved prefix: the entity's own, else the nearest ancestor's, else empty.
    pub fn prefix(&self, id: EntityId) -> &str {
        let mut current = Some(id);
        while let Some(handle) = current {
            let entity = self.get(handle);
            if let Some(prefix) = entity.prefix.as_deref() {
                return prefix;
            }
            current = entity.parent;
        }
        ""
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.get(id).parent
    }

    /// Chain of owners from the direct parent up to the root.
    pub fn ancestors(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        std::iter::successors(self.parent(id), move |handle| self.parent(*handle))
    }
}
