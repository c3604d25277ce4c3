use crate::client_manager::ConnectionId;
use crate::physics::{step_fighter, Vector2};
use crate::store::{Fighter, FighterId, Player, PlayerId, World};
use log::{debug, info};
use shared::{Action, Command, Update};
use std::time::Duration;

/// Why a command was dropped without effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The actor index does not name a live player.
    UnknownActor,
    /// The actor belongs to a different connection.
    ConnectionMismatch,
    /// The player has no control record.
    NoControl,
}

/// Result of applying one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Moved(FighterId),
    SpellTargeted(FighterId),
    Rejected(Rejection),
}

/// Updates destined for one connection during a broadcast tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbox {
    pub connection: ConnectionId,
    pub player: PlayerId,
    pub updates: Vec<Update>,
}

/// The authoritative simulation state of one running server.
#[derive(Debug)]
pub struct Session {
    pub tick: u64,
    world: World,
    max_players: usize,
}

impl Session {
    pub fn new(max_players: usize) -> Self {
        Self {
            tick: 0,
            world: World::new(),
            max_players,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn player_count(&self) -> usize {
        self.world.player_count()
    }

    pub fn is_full(&self) -> bool {
        self.world.player_count() >= self.max_players
    }

    /// Creates a player and its fighter for a freshly accepted connection.
    /// Returns `None` when the admission cap is already reached.
    pub fn join(&mut self, connection: ConnectionId) -> Option<PlayerId> {
        if self.is_full() {
            return None;
        }

        let fighter = self.world.create_fighter(Fighter::spawn(Vector2::ZERO));
        let player = self.world.create_player(Player::new(connection));
        self.world.force_create_player_control(player, fighter);

        debug!(
            "Player {} joined on connection {} with fighter {}",
            player.index(),
            connection,
            fighter.index()
        );
        Some(player)
    }

    /// Removes every player bound to `connection` together with the fighter it
    /// controls.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Vec<PlayerId> {
        let mut stale = Vec::new();
        self.world.for_each_player(|id, player| {
            if player.connection == connection {
                stale.push(id);
            }
        });

        for &player in &stale {
            if let Some(fighter) = self.world.player_control(player) {
                self.world.delete_fighter(fighter);
            }
            self.world.delete_player(player);
            debug!("Player {} left (connection {})", player.index(), connection);
        }

        stale
    }

    /// Validates and applies a command that arrived on `connection`.
    pub fn apply_command(&mut self, connection: ConnectionId, command: &Command) -> CommandOutcome {
        let outcome = self.try_apply(connection, command);
        if let CommandOutcome::Rejected(reason) = outcome {
            debug!(
                "Dropped command from connection {} for actor {}: {:?}",
                connection, command.actor, reason
            );
        }
        outcome
    }

    fn try_apply(&mut self, connection: ConnectionId, command: &Command) -> CommandOutcome {
        let Some(player) = self.world.player_at(command.actor) else {
            return CommandOutcome::Rejected(Rejection::UnknownActor);
        };

        // A client may only steer its own player.
        match self.world.player(player) {
            Some(p) if p.connection == connection => {}
            _ => return CommandOutcome::Rejected(Rejection::ConnectionMismatch),
        }

        let Some(bound) = self.world.player_control(player) else {
            return CommandOutcome::Rejected(Rejection::NoControl);
        };

        let fighter = if self.world.is_fighter_valid(bound) {
            bound
        } else {
            let fighter = self.world.create_fighter(Fighter::spawn(Vector2::ZERO));
            self.world.force_create_player_control(player, fighter);
            info!(
                "Respawned fighter {} for player {}",
                fighter.index(),
                player.index()
            );
            fighter
        };

        let Some(state) = self.world.fighter_mut(fighter) else {
            return CommandOutcome::Rejected(Rejection::NoControl);
        };

        match command.action {
            Action::Move { x, y } => {
                state.target = Vector2::new(x, y);
                CommandOutcome::Moved(fighter)
            }
            Action::Spell { x, y } => {
                state.spell_target = Vector2::new(x, y);
                CommandOutcome::SpellTargeted(fighter)
            }
        }
    }

    /// Builds this tick's updates for every player whose connection passes
    /// `is_active`: one fighter update per live fighter followed by the
    /// player's own id.
    pub fn broadcast(&mut self, is_active: impl Fn(ConnectionId) -> bool) -> Vec<Outbox> {
        let mut fighters = Vec::with_capacity(self.world.fighter_count());
        self.world.for_each_fighter(|id, fighter| {
            fighters.push(Update::Fighter {
                id: id.index(),
                x: fighter.position.x,
                y: fighter.position.y,
            });
        });

        let mut recipients = Vec::new();
        self.world.for_each_player(|id, player| {
            if is_active(player.connection) {
                recipients.push((id, player.connection));
            }
        });

        let mut outboxes = Vec::with_capacity(recipients.len());
        for (player, connection) in recipients {
            let mut updates = Vec::with_capacity(fighters.len() + 1);
            updates.extend_from_slice(&fighters);
            updates.push(Update::SendId { id: player.index() });

            // Identity goes out every tick regardless of this flag.
            if let Some(state) = self.world.player_mut(player) {
                state.knows_themselves = true;
            }

            outboxes.push(Outbox {
                connection,
                player,
                updates,
            });
        }

        outboxes
    }

    /// Advances every fighter by the wall time elapsed since the last tick.
    pub fn advance(&mut self, elapsed: Duration) {
        let dt = elapsed.as_micros() as f32 / 1_000_000.0;
        for fighter in self.world.fighters_mut() {
            step_fighter(fighter, dt);
        }
        self.tick += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const A: ConnectionId = ConnectionId(1);
    const B: ConnectionId = ConnectionId(2);

    fn fighter_of(session: &Session, player: PlayerId) -> Fighter {
        let id = session.world().player_control(player).unwrap();
        session.world().fighter(id).unwrap().clone()
    }

    #[test]
    fn test_join_spawns_player_and_fighter() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();

        let fighter = fighter_of(&session, player);
        assert_eq!(fighter.position, Vector2::ZERO);
        assert_eq!(fighter.rotation, 0.0);
        assert_eq!(fighter.size, 10.0);
        assert_eq!(session.world().player(player).unwrap().connection, A);
        assert_eq!(session.world().fighter_count(), 1);
    }

    #[test]
    fn test_join_respects_cap() {
        let mut session = Session::new(2);
        assert!(session.join(ConnectionId(1)).is_some());
        assert!(session.join(ConnectionId(2)).is_some());
        assert!(session.join(ConnectionId(3)).is_none());
        assert_eq!(session.player_count(), 2);
        assert!(session.is_full());
    }

    #[test]
    fn test_move_sets_target() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();

        let command = Command::new(player.index(), Action::Move { x: 0.5, y: -0.25 });
        assert!(matches!(
            session.apply_command(A, &command),
            CommandOutcome::Moved(_)
        ));

        let fighter = fighter_of(&session, player);
        assert_eq!(fighter.target, Vector2::new(0.5, -0.25));
        assert_eq!(fighter.spell_target, Vector2::ZERO);
    }

    #[test]
    fn test_spell_sets_spell_target_only() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();

        let command = Command::new(player.index(), Action::Spell { x: 0.1, y: 0.2 });
        assert!(matches!(
            session.apply_command(A, &command),
            CommandOutcome::SpellTargeted(_)
        ));

        let fighter = fighter_of(&session, player);
        assert_eq!(fighter.spell_target, Vector2::new(0.1, 0.2));
        assert_eq!(fighter.target, Vector2::ZERO);
    }

    #[test]
    fn test_spoofed_actor_is_rejected() {
        let mut session = Session::new(4);
        let victim = session.join(A).unwrap();
        let _attacker = session.join(B).unwrap();
        let before = fighter_of(&session, victim);

        let command = Command::new(victim.index(), Action::Move { x: 1.0, y: 0.0 });
        assert_eq!(
            session.apply_command(B, &command),
            CommandOutcome::Rejected(Rejection::ConnectionMismatch)
        );
        assert_eq!(fighter_of(&session, victim), before);
    }

    #[test]
    fn test_unknown_actor_is_rejected() {
        let mut session = Session::new(4);
        session.join(A).unwrap();

        for actor in [-1, 5, i32::MAX] {
            let command = Command::new(actor, Action::Move { x: 1.0, y: 0.0 });
            assert_eq!(
                session.apply_command(A, &command),
                CommandOutcome::Rejected(Rejection::UnknownActor)
            );
        }
    }

    #[test]
    fn test_missing_fighter_is_recreated() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();
        let original = session.world().player_control(player).unwrap();
        session.world.delete_fighter(original);

        let command = Command::new(player.index(), Action::Move { x: 0.0, y: 0.5 });
        let outcome = session.apply_command(A, &command);

        let rebound = session.world().player_control(player).unwrap();
        assert_eq!(outcome, CommandOutcome::Moved(rebound));
        assert!(session.world().is_fighter_valid(rebound));
        assert_eq!(fighter_of(&session, player).target, Vector2::new(0.0, 0.5));
    }

    #[test]
    fn test_player_without_control_is_rejected() {
        let mut session = Session::new(4);
        let player = session.world.create_player(Player::new(A));

        let command = Command::new(player.index(), Action::Move { x: 0.0, y: 0.5 });
        assert_eq!(
            session.apply_command(A, &command),
            CommandOutcome::Rejected(Rejection::NoControl)
        );
        assert_eq!(session.world().fighter_count(), 0);
    }

    #[test]
    fn test_disconnect_cleans_up_and_rejects_old_actor() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();
        let other = session.join(B).unwrap();

        let removed = session.disconnect(A);
        assert_eq!(removed, vec![player]);
        assert_eq!(session.player_count(), 1);
        assert_eq!(session.world().fighter_count(), 1);

        let mut bound_to_a = 0;
        session.world().for_each_player(|_, p| {
            if p.connection == A {
                bound_to_a += 1;
            }
        });
        assert_eq!(bound_to_a, 0);

        let command = Command::new(player.index(), Action::Move { x: 1.0, y: 0.0 });
        assert!(matches!(
            session.apply_command(A, &command),
            CommandOutcome::Rejected(_)
        ));
        assert!(session.world().is_player_valid(other));
    }

    #[test]
    fn test_reused_slot_still_rejects_old_connection() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();
        session.disconnect(A);
        let newcomer = session.join(B).unwrap();
        assert_eq!(player.index(), newcomer.index());

        let command = Command::new(player.index(), Action::Move { x: 1.0, y: 0.0 });
        assert_eq!(
            session.apply_command(A, &command),
            CommandOutcome::Rejected(Rejection::ConnectionMismatch)
        );
    }

    #[test]
    fn test_broadcast_lists_every_fighter_then_identity() {
        let mut session = Session::new(4);
        let a = session.join(A).unwrap();
        let b = session.join(B).unwrap();
        session.join(ConnectionId(3)).unwrap();

        let outboxes = session.broadcast(|conn| conn != ConnectionId(3));
        assert_eq!(outboxes.len(), 2);

        for (outbox, player) in outboxes.iter().zip([a, b]) {
            assert_eq!(outbox.player, player);
            assert_eq!(outbox.updates.len(), 4);

            let fighters = outbox
                .updates
                .iter()
                .filter(|u| matches!(u, Update::Fighter { .. }))
                .count();
            assert_eq!(fighters, 3);
            assert_eq!(
                outbox.updates.last(),
                Some(&Update::SendId { id: player.index() })
            );
            assert!(session.world().player(player).unwrap().knows_themselves);
        }
    }

    #[test]
    fn test_broadcast_repeats_identity_every_tick() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();

        for _ in 0..3 {
            let outboxes = session.broadcast(|_| true);
            assert_eq!(
                outboxes[0].updates.last(),
                Some(&Update::SendId { id: player.index() })
            );
        }
    }

    #[test]
    fn test_move_then_one_tick() {
        let mut session = Session::new(4);
        let player = session.join(A).unwrap();

        let command = Command::new(player.index(), Action::Move { x: 1.0, y: 0.0 });
        session.apply_command(A, &command);
        session.advance(Duration::from_millis(100));

        let fighter = fighter_of(&session, player);
        assert_approx_eq!(fighter.position.x, 0.1);
        assert_approx_eq!(fighter.position.y, 0.0);
        assert_eq!(session.tick, 1);
    }
}
