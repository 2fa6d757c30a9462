//! Scene resolution
//!
//! Maps externally supplied entity ids (NPC ids from links and tag selection)
//! onto canonical rooms. Resolution is total: ids outside the membership table
//! land in the default room so the view always has a scene to render.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DomainError;
use crate::ids::RoomId;
use crate::scene::{SceneIdentity, SceneTag, FALLBACK_SCENE_ID};

/// One room and the entity ids that belong to it.
///
/// The first member is the representative id used when a tag is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneGroup {
    pub tag: SceneTag,
    pub room_id: RoomId,
    pub members: Vec<u64>,
}

/// Static membership table plus the default room.
#[derive(Debug, Clone)]
pub struct SceneTable {
    groups: Vec<SceneGroup>,
    default_room: RoomId,
    by_member: HashMap<u64, usize>,
}

impl SceneTable {
    /// Build a table, validating that it can be inverted.
    ///
    /// Every group needs at least one member, member ids and tags must be
    /// unique across groups, and the default room must belong to a group so
    /// unknown ids still have a tag.
    pub fn new(groups: Vec<SceneGroup>, default_room: RoomId) -> Result<Self, DomainError> {
        let mut by_member = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            if group.members.is_empty() {
                return Err(DomainError::validation(format!(
                    "scene group '{}' has no members",
                    group.tag
                )));
            }
            if groups[..index].iter().any(|g| g.tag == group.tag) {
                return Err(DomainError::validation(format!(
                    "duplicate scene tag '{}'",
                    group.tag
                )));
            }
            for member in &group.members {
                if by_member.insert(*member, index).is_some() {
                    return Err(DomainError::validation(format!(
                        "entity {member} belongs to more than one scene group"
                    )));
                }
            }
        }

        if !groups.iter().any(|g| g.room_id == default_room) {
            return Err(DomainError::validation(format!(
                "default room '{default_room}' has no scene group"
            )));
        }

        Ok(Self {
            groups,
            default_room,
            by_member,
        })
    }

    /// The shipped table: ranch (room 4) and idol (room 3), defaulting to ranch.
    pub fn builtin() -> Self {
        let groups = builtin_groups();
        let by_member = groups
            .iter()
            .enumerate()
            .flat_map(|(index, g)| g.members.iter().map(move |m| (*m, index)))
            .collect();
        Self {
            groups,
            default_room: RoomId::new_unchecked("4"),
            by_member,
        }
    }

    /// The shipped membership table with a different default room.
    pub fn builtin_with_default(default_room: RoomId) -> Result<Self, DomainError> {
        Self::new(builtin_groups(), default_room)
    }

    pub fn groups(&self) -> &[SceneGroup] {
        &self.groups
    }

    pub fn default_room(&self) -> &RoomId {
        &self.default_room
    }

    fn group_for_member(&self, member: u64) -> Option<&SceneGroup> {
        self.by_member.get(&member).map(|&i| &self.groups[i])
    }

    fn group_for_room(&self, room_id: &RoomId) -> Option<&SceneGroup> {
        self.groups.iter().find(|g| &g.room_id == room_id)
    }
}

fn builtin_groups() -> Vec<SceneGroup> {
    vec![
        SceneGroup {
            tag: SceneTag::new("ranch"),
            room_id: RoomId::new_unchecked("4"),
            members: vec![10016, 10017, 10018, 10019, 10020, 10021],
        },
        SceneGroup {
            tag: SceneTag::new("idol"),
            room_id: RoomId::new_unchecked("3"),
            members: vec![10012, 10009, 10006, 10022],
        },
    ]
}

/// Pure, deterministic resolver over a shared `SceneTable`.
#[derive(Debug, Clone)]
pub struct SceneResolver {
    table: Arc<SceneTable>,
}

impl Default for SceneResolver {
    fn default() -> Self {
        Self::new(SceneTable::builtin())
    }
}

impl SceneResolver {
    pub fn new(table: SceneTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &SceneTable {
        &self.table
    }

    /// Resolve an external id into a scene identity. Never fails.
    pub fn resolve(&self, external_id: &str) -> SceneIdentity {
        let external_id = match external_id.trim() {
            "" => FALLBACK_SCENE_ID,
            trimmed => trimmed,
        };
        SceneIdentity::new(external_id.to_string(), self.room_for(external_id))
    }

    pub fn room_for(&self, external_id: &str) -> RoomId {
        self.group_for(external_id)
            .map(|g| g.room_id.clone())
            .unwrap_or_else(|| self.table.default_room.clone())
    }

    /// Tag for UI selection; unknown ids select the default room's tag.
    pub fn tag_for(&self, external_id: &str) -> SceneTag {
        match self.group_for(external_id) {
            Some(group) => group.tag.clone(),
            None => self.default_tag(),
        }
    }

    pub fn tag_for_room(&self, room_id: &RoomId) -> Option<SceneTag> {
        self.table.group_for_room(room_id).map(|g| g.tag.clone())
    }

    /// External id that selecting `tag` navigates to.
    ///
    /// Unknown tags fall back to the default room's representative.
    pub fn representative_id(&self, tag: &SceneTag) -> String {
        let group = self
            .table
            .groups
            .iter()
            .find(|g| &g.tag == tag)
            .or_else(|| self.table.group_for_room(&self.table.default_room));
        match group.and_then(|g| g.members.first()) {
            Some(member) => member.to_string(),
            None => FALLBACK_SCENE_ID.to_string(),
        }
    }

    pub fn default_room(&self) -> &RoomId {
        &self.table.default_room
    }

    fn default_tag(&self) -> SceneTag {
        self.table
            .group_for_room(&self.table.default_room)
            .map(|g| g.tag.clone())
            .unwrap_or_else(|| SceneTag::new(self.table.default_room.as_str()))
    }

    fn group_for(&self, external_id: &str) -> Option<&SceneGroup> {
        external_id
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|member| self.table.group_for_member(member))
    }
}
