//! Entity storage for the arena simulation.
//!
//! Fighters and players live in generational slot arenas. A handle carries the
//! slot index plus the generation it was issued for, so a handle to a deleted
//! entity never becomes valid again even after its slot is reused. The slot
//! index doubles as the entity id sent over the wire.
//!
//! The player-to-fighter relationship (`PlayerControl`) is kept as a separate
//! record keyed by player. It may point at a fighter that no longer exists;
//! callers check [`World::is_fighter_valid`] before using it.

use crate::client_manager::ConnectionId;
use crate::physics::Vector2;
use shared::FIGHTER_SIZE;
use std::collections::HashMap;

/// Handle to a fighter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FighterId {
    index: u32,
    generation: u32,
}

/// Handle to a player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId {
    index: u32,
    generation: u32,
}

impl FighterId {
    /// Wire representation of this fighter.
    pub fn index(&self) -> i32 {
        self.index as i32
    }
}

impl PlayerId {
    /// Wire representation of this player.
    pub fn index(&self) -> i32 {
        self.index as i32
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fighter {
    pub position: Vector2,
    pub target: Vector2,
    pub rotation: f32,
    pub size: f32,
    pub spell_target: Vector2,
}

impl Fighter {
    /// A fighter standing still at `position`.
    pub fn spawn(position: Vector2) -> Self {
        Self {
            position,
            target: position,
            rotation: 0.0,
            size: FIGHTER_SIZE,
            spell_target: position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Connection this player arrived on.
    pub connection: ConnectionId,
    /// Set once the client has been sent its own id.
    pub knows_themselves: bool,
}

impl Player {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            knows_themselves: false,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena backing one entity kind.
#[derive(Debug)]
struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    fn insert(&mut self, value: T) -> (u32, u32) {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return (index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        (index, 0)
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Live `(index, generation)` pairs in ascending index order.
    fn live(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| (index as u32, slot.generation))
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }
}

/// All simulation entities of one session.
#[derive(Debug)]
pub struct World {
    fighters: Slots<Fighter>,
    players: Slots<Player>,
    controls: HashMap<PlayerId, FighterId>,
}

impl World {
    pub fn new() -> Self {
        Self {
            fighters: Slots::new(),
            players: Slots::new(),
            controls: HashMap::new(),
        }
    }

    /// Stores a fighter and returns its handle. Freed slots are reused with a
    /// bumped generation.
    pub fn create_fighter(&mut self, fighter: Fighter) -> FighterId {
        let (index, generation) = self.fighters.insert(fighter);
        FighterId { index, generation }
    }

    /// Stores a player and returns its handle. The handle's index is the id
    /// the client sees on the wire.
    pub fn create_player(&mut self, player: Player) -> PlayerId {
        let (index, generation) = self.players.insert(player);
        PlayerId { index, generation }
    }

    /// Binds `player` to `fighter`, replacing any previous binding.
    pub fn force_create_player_control(&mut self, player: PlayerId, fighter: FighterId) {
        self.controls.insert(player, fighter);
    }

    /// The fighter `player` controls, if a control record exists. The fighter
    /// itself may have been deleted since.
    pub fn player_control(&self, player: PlayerId) -> Option<FighterId> {
        self.controls.get(&player).copied()
    }

    /// Whether `id` still names a live fighter.
    pub fn is_fighter_valid(&self, id: FighterId) -> bool {
        self.fighters.get(id.index, id.generation).is_some()
    }

    /// Whether `id` still names a live player.
    pub fn is_player_valid(&self, id: PlayerId) -> bool {
        self.players.get(id.index, id.generation).is_some()
    }

    /// Resolves a wire index to the live player currently in that slot.
    pub fn player_at(&self, index: i32) -> Option<PlayerId> {
        let index = u32::try_from(index).ok()?;
        let slot = self.players.slots.get(index as usize)?;
        slot.value.as_ref().map(|_| PlayerId {
            index,
            generation: slot.generation,
        })
    }

    /// Reads a fighter. `None` for stale or unknown handles.
    pub fn fighter(&self, id: FighterId) -> Option<&Fighter> {
        self.fighters.get(id.index, id.generation)
    }

    /// Mutable access to a fighter. `None` for stale or unknown handles.
    pub fn fighter_mut(&mut self, id: FighterId) -> Option<&mut Fighter> {
        self.fighters.get_mut(id.index, id.generation)
    }

    /// Reads a player. `None` for stale or unknown handles.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.index, id.generation)
    }

    /// Mutable access to a player. `None` for stale or unknown handles.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id.index, id.generation)
    }

    /// Removes the player and its control record. The controlled fighter is
    /// left alone.
    pub fn delete_player(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(id.index, id.generation)?;
        self.controls.remove(&id);
        Some(player)
    }

    /// Removes a fighter. Control records pointing at it are left dangling.
    pub fn delete_fighter(&mut self, id: FighterId) -> Option<Fighter> {
        self.fighters.remove(id.index, id.generation)
    }

    /// Handles of all live fighters in ascending slot order.
    pub fn fighter_ids(&self) -> impl Iterator<Item = FighterId> + '_ {
        self.fighters
            .live()
            .map(|(index, generation)| FighterId { index, generation })
    }

    /// Handles of all live players in ascending slot order.
    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players
            .live()
            .map(|(index, generation)| PlayerId { index, generation })
    }

    /// Visits every live fighter in ascending slot order.
    pub fn for_each_fighter(&self, mut visit: impl FnMut(FighterId, &Fighter)) {
        for id in self.fighter_ids() {
            if let Some(fighter) = self.fighter(id) {
                visit(id, fighter);
            }
        }
    }

    /// Visits every live player in ascending slot order.
    pub fn for_each_player(&self, mut visit: impl FnMut(PlayerId, &Player)) {
        for id in self.player_ids() {
            if let Some(player) = self.player(id) {
                visit(id, player);
            }
        }
    }

    /// Mutable access to every live fighter, used by the simulation step.
    pub fn fighters_mut(&mut self) -> impl Iterator<Item = &mut Fighter> + '_ {
        self.fighters.values_mut()
    }

    /// Number of live fighters.
    pub fn fighter_count(&self) -> usize {
        self.fighters.len
    }

    /// Number of live players.
    pub fn player_count(&self) -> usize {
        self.players.len
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
