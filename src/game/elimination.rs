//! Eliminations, placements and game end

use tracing::info;

use crate::ws::protocol::{GameMode, ServerMsg};

use super::race::TurnStage;
use super::room::{Phase, Room};

impl Room {
    /// Eliminate one player, then check for a winner
    pub(super) fn eliminate(&mut self, idx: usize, reason: &str, killer: Option<usize>) {
        if !self.mark_eliminated(idx, reason, killer) {
            return;
        }
        self.check_winner();
        self.resume_turn_loop();
    }

    /// Eliminate a group as one step. Placements are handed out in order but
    /// the winner check runs once, so a group wiping out the field ends with
    /// no winner.
    pub(super) fn eliminate_batch(&mut self, victims: &[usize], reason: &str) {
        let mut any = false;
        for &idx in victims {
            any |= self.mark_eliminated(idx, reason, None);
        }
        if any {
            self.check_winner();
            self.resume_turn_loop();
        }
    }

    /// Returns false when the player was not alive
    pub(super) fn mark_eliminated(&mut self, idx: usize, reason: &str, killer: Option<usize>) -> bool {
        match self.players.get_mut(idx) {
            Some(player) if player.alive => player.alive = false,
            _ => return false,
        }

        self.alive_count = self.alive_count.saturating_sub(1);
        let placement = self.alive_count as u32 + 1;
        self.players[idx].placement = Some(placement);

        let heir = killer.filter(|&k| {
            k != idx && self.mode == GameMode::Royale && self.players.get(k).is_some_and(|p| p.alive)
        });
        if let Some(heir) = heir {
            let mut spoils = std::mem::take(&mut self.players[idx].inventory);
            self.players[heir].inventory.absorb(&mut spoils);
            let inventory = self.players[heir].inventory;
            self.send_to(heir, ServerMsg::LootTransfer { inventory });
        }

        let total = self.players.len();
        self.send_to(
            idx,
            ServerMsg::Eliminated {
                reason: reason.to_string(),
                placement,
                total,
            },
        );
        self.broadcast_room(ServerMsg::PlayerEliminated {
            idx,
            reason: reason.to_string(),
            alive_count: self.alive_count,
            placement,
        });
        info!(room = %self.code, player = idx, placement, alive = self.alive_count, reason, "Player eliminated");

        self.forfeit_duels(idx);
        true
    }

    /// Last survivor wins; an empty field ends with nobody
    pub(super) fn check_winner(&mut self) {
        if !matches!(self.phase, Phase::SpawnSelection | Phase::Active) || self.alive_count > 1 {
            return;
        }
        let winner = self.players.iter().find(|p| p.alive).map(|p| p.idx);
        self.end_game(winner, "Last one standing!");
    }

    pub(super) fn end_game(&mut self, winner: Option<usize>, reason: &str) {
        if self.phase == Phase::Ended {
            return;
        }
        self.phase = Phase::Ended;
        self.scheduler.cancel_all();
        self.duels.clear();
        self.missiles.clear();
        self.turn.stage = TurnStage::Idle;

        let (winner_idx, winner_name) = match winner {
            Some(idx) => {
                self.players[idx].placement = Some(1);
                self.send_to(idx, ServerMsg::Victory { reason: reason.to_string() });
                (idx as i64, self.players[idx].name.clone())
            }
            None => (-1, "Nobody".to_string()),
        };
        self.broadcast_room(ServerMsg::GameOver {
            winner_idx,
            winner_name: winner_name.clone(),
        });
        info!(room = %self.code, winner = %winner_name, "Game over");
    }

    /// `idx` crossed the finish (`line` is "center" or "finish"): everyone
    /// else loses at once.
    pub(super) fn finish_line_victory(&mut self, idx: usize, line: &str) {
        let defeat = format!("{} reached the {line}!", self.players[idx].name);
        self.end_game(Some(idx), &format!("You reached the {line} first!"));

        let others: Vec<usize> = self
            .players
            .iter()
            .filter(|p| p.idx != idx)
            .map(|p| p.idx)
            .collect();
        for other in others {
            self.send_to(other, ServerMsg::Defeat { reason: defeat.clone() });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::game::room::test_support::*;
    use crate::game::room::Phase;
    use crate::ws::protocol::{GameMode, ServerMsg};

    #[test]
    fn placements_count_down_to_the_winner() {
        let mut room = started(GameMode::Royale, 5, config());
        for (idx, expected) in [(4, 5), (0, 4), (2, 3), (1, 2)] {
            room.eliminate(idx, "test", None);
            assert_eq!(room.players()[idx].placement, Some(expected));
        }
        assert_eq!(room.phase(), Phase::Ended);
        assert_eq!(room.players()[3].placement, Some(1));

        let out = room.drain_outbox();
        assert!(to(&out, 0).contains(&ServerMsg::GameOver {
            winner_idx: 3,
            winner_name: "P3".to_string(),
        }));
    }

    #[test]
    fn eliminating_twice_is_a_no_op() {
        let mut room = started(GameMode::Royale, 3, config());
        room.eliminate(1, "test", None);
        room.drain_outbox();
        room.eliminate(1, "again", None);
        assert!(room.drain_outbox().is_empty());
        assert_eq!(room.alive_count(), 2);
    }

    #[test]
    fn batch_wipeout_ends_with_nobody() {
        let mut room = started(GameMode::Royale, 3, config());
        room.eliminate_batch(&[0, 1, 2], "Caught in the shrink!");
        let out = room.drain_outbox();

        assert_eq!(room.phase(), Phase::Ended);
        assert_eq!(count(&out, |m| matches!(m, ServerMsg::Victory { .. })), 0);
        assert!(to(&out, 0).contains(&ServerMsg::GameOver {
            winner_idx: -1,
            winner_name: "Nobody".to_string(),
        }));
        let mut placements: Vec<u32> = room.players().iter().filter_map(|p| p.placement).collect();
        placements.sort_unstable();
        assert_eq!(placements, [1, 2, 3]);
    }

    #[test]
    fn killer_credit_only_moves_loot_in_royale() {
        let mut room = started(GameMode::Classic, 3, config());
        room.players[1].inventory.missile = 2;
        room.eliminate(1, "test", Some(0));
        assert_eq!(room.players()[0].inventory.missile, 0);
    }
}
