//! Shrinking map and missiles
//!
//! Royale shrinks the playable radius on a fixed cadence, each step preceded
//! by a warning. Race shrinks every few turns from the turn loop instead.
//! Missiles destroy one hex after a flight delay; a hex that fell in the
//! meantime makes the missile fizzle.

use tracing::{debug, info};

use crate::ws::protocol::ServerMsg;

use super::hex::Hex;
use super::player::Item;
use super::room::{Phase, Room};
use super::scheduler::TimerKey;

/// A missile in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Missile {
    pub shooter: usize,
    pub target: Hex,
}

impl Room {
    /// Arm the next warning and shrink, unless the map is already minimal
    pub(super) fn schedule_shrink_cycle(&mut self) {
        if self.phase != Phase::Active || self.safe_radius <= 1 {
            return;
        }
        let interval = self.config.shrink_interval;
        let lead = self.config.shrink_warning;
        self.scheduler
            .schedule(TimerKey::ShrinkWarning, interval.saturating_sub(lead));
        self.scheduler.schedule(TimerKey::Shrink, interval);
    }

    pub(super) fn warn_shrink(&mut self) {
        if self.safe_radius <= 1 {
            return;
        }
        self.broadcast_alive(ServerMsg::ShrinkWarning {
            new_radius: self.safe_radius - 1,
            seconds: self.config.shrink_warning.as_secs(),
        });
    }

    pub(super) fn on_shrink_timer(&mut self) {
        self.shrink_step();
        self.schedule_shrink_cycle();
    }

    /// Drop the outer ring: its hexes and loot go, anyone standing there is out
    pub(super) fn shrink_step(&mut self) {
        if self.phase != Phase::Active || self.safe_radius <= 1 {
            return;
        }
        self.safe_radius -= 1;
        let radius = self.safe_radius;

        let mut falling: Vec<Hex> = match &self.grid {
            Some(grid) => grid
                .hexes()
                .filter(|h| h.dist() > radius && self.alive_hexes.contains(h))
                .collect(),
            None => Vec::new(),
        };
        falling.sort();
        for hex in &falling {
            self.alive_hexes.remove(hex);
            self.loot.remove(hex);
        }

        let victims: Vec<usize> = self
            .players
            .iter()
            .filter(|p| p.alive && p.pos.dist() > radius)
            .map(|p| p.idx)
            .collect();

        info!(room = %self.code, radius, falling = falling.len(), caught = victims.len(), "Map shrunk");
        self.broadcast_room(ServerMsg::Shrink {
            new_radius: radius,
            falling_hexes: falling,
            eliminated: victims.clone(),
        });
        self.eliminate_batch(&victims, "Caught in the shrink!");
    }

    pub(super) fn use_item(&mut self, idx: usize, item: Item, target: Hex) {
        if !self.players[idx].alive {
            return;
        }
        match item {
            Item::Missile => self.launch_missile(idx, target),
        }
    }

    fn launch_missile(&mut self, idx: usize, target: Hex) {
        if self.players[idx].inventory.count(Item::Missile) == 0 {
            self.send_to(idx, ServerMsg::ItemError { msg: "No missiles!".to_string() });
            return;
        }
        if !self.alive_hexes.contains(&target) {
            self.send_to(idx, ServerMsg::ItemError { msg: "Hex already gone!".to_string() });
            return;
        }

        self.players[idx].inventory.take(Item::Missile);
        self.next_missile_id += 1;
        let id = self.next_missile_id;
        self.missiles.insert(id, Missile { shooter: idx, target });

        let inventory = self.players[idx].inventory;
        self.send_to(idx, ServerMsg::ItemUsed { item: Item::Missile, inventory });
        self.broadcast_room(ServerMsg::MissileLaunched {
            from_idx: idx,
            from: self.players[idx].pos,
            target,
            time: self.config.missile_flight.as_secs(),
        });
        self.scheduler
            .schedule(TimerKey::Missile(id), self.config.missile_flight);

        debug!(room = %self.code, player = idx, %target, id, "Missile launched");
    }

    pub(super) fn missile_impact(&mut self, id: u64) {
        let Some(missile) = self.missiles.remove(&id) else {
            return;
        };
        let target = missile.target;

        if !self.alive_hexes.remove(&target) {
            self.broadcast_room(ServerMsg::MissileFizzle { target });
            return;
        }
        self.loot.remove(&target);

        let victim = self.occupant(target);
        self.broadcast_room(ServerMsg::MissileImpact {
            target,
            by_idx: missile.shooter,
            victim_idx: victim,
        });
        info!(room = %self.code, %target, by = missile.shooter, ?victim, "Missile impact");

        if let Some(victim) = victim {
            let reason = format!("Hit by {}'s missile!", self.players[missile.shooter].name);
            self.eliminate(victim, &reason, Some(missile.shooter));
        }
    }
}
