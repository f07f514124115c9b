//! Head-to-head quiz contests
//!
//! A duel starts when two players contest the same hex (or, in ladder, the
//! finish line). Both answer one question under a shared timer; the round
//! closes when both have answered or the timer expires, whichever comes first,
//! and is resolved exactly once. A draw re-asks with a fresh question.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::questions::{Answer, Question};
use crate::ws::protocol::{GameMode, LadderPosition, ServerMsg};

use super::hex::Hex;
use super::room::Room;
use super::scheduler::{OneShot, TimerKey};

/// What a duel is fought over. At most one duel per key exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DuelKey {
    /// A contested hex
    Hex(Hex),
    /// Ladder finish-line tie, numbered per room
    Finish(u32),
}

impl DuelKey {
    pub fn hex(self) -> Option<Hex> {
        match self {
            DuelKey::Hex(hex) => Some(hex),
            DuelKey::Finish(_) => None,
        }
    }
}

/// Outcome of one closed round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelVerdict {
    Draw,
    Decided { winner: usize, loser: usize },
}

#[derive(Debug, Clone)]
pub struct Duel {
    pub key: DuelKey,
    /// Challenger first
    pub contestants: [usize; 2],
    pub question: Question,
    pub round: u32,
    answers: HashMap<usize, Answer>,
    closed: OneShot,
}

impl Duel {
    pub fn new(key: DuelKey, challenger: usize, defender: usize, question: Question) -> Self {
        Self {
            key,
            contestants: [challenger, defender],
            question,
            round: 1,
            answers: HashMap::new(),
            closed: OneShot::default(),
        }
    }

    pub fn involves(&self, idx: usize) -> bool {
        self.contestants.contains(&idx)
    }

    pub fn opponent_of(&self, idx: usize) -> Option<usize> {
        match self.contestants {
            [a, b] if a == idx => Some(b),
            [a, b] if b == idx => Some(a),
            _ => None,
        }
    }

    /// First answer per contestant per round wins; later ones are ignored
    pub fn record(&mut self, idx: usize, answer: Answer) -> bool {
        if !self.involves(idx) || self.closed.has_fired() || self.answers.contains_key(&idx) {
            return false;
        }
        self.answers.insert(idx, answer);
        true
    }

    pub fn all_answered(&self) -> bool {
        self.contestants.iter().all(|c| self.answers.contains_key(c))
    }

    /// Close the round, filling missing answers with the timeout sentinel.
    /// `None` when the round was already closed.
    pub fn close_round(&mut self) -> Option<DuelVerdict> {
        if !self.closed.try_fire() {
            return None;
        }
        for c in self.contestants {
            self.answers.entry(c).or_insert(Answer::TimedOut);
        }

        let [a, b] = self.contestants;
        let correct = |idx: usize| {
            self.answers
                .get(&idx)
                .is_some_and(|&answer| self.question.is_correct(answer))
        };
        Some(match (correct(a), correct(b)) {
            (true, false) => DuelVerdict::Decided { winner: a, loser: b },
            (false, true) => DuelVerdict::Decided { winner: b, loser: a },
            _ => DuelVerdict::Draw,
        })
    }

    pub fn next_round(&mut self, question: Question) {
        self.question = question;
        self.answers.clear();
        self.round += 1;
        self.closed.reset();
    }
}

impl Room {
    /// Open a duel between `challenger` and `defender`. Refused when the key
    /// is already contested or either player is busy.
    pub(super) fn start_duel(&mut self, challenger: usize, defender: usize, key: DuelKey) -> bool {
        if self.duels.contains_key(&key)
            || self.duel_of(challenger).is_some()
            || self.duel_of(defender).is_some()
        {
            self.reject_move(challenger, "Duel in progress!");
            return false;
        }

        let category = key
            .hex()
            .and_then(|hex| self.grid.as_ref().and_then(|g| g.category(hex)))
            .map(str::to_string);
        let question = self.draw_question(category.as_deref());
        let view = question.view();
        self.duels
            .insert(key, Duel::new(key, challenger, defender, question));

        let seconds = self.config.duel_window.as_secs();
        for (me, opp) in [(challenger, defender), (defender, challenger)] {
            let opp_name = self.players[opp].name.clone();
            self.send_to(
                me,
                ServerMsg::DuelStart {
                    opp_name,
                    opp_idx: opp,
                    hex: key.hex(),
                    question: view.clone(),
                    seconds,
                },
            );
        }
        self.scheduler
            .schedule(TimerKey::Duel(key), self.config.duel_window);

        info!(room = %self.code, ?key, challenger, defender, "Duel started");
        true
    }

    pub(super) fn duel_answer(&mut self, idx: usize, answer: i32) {
        let Some(key) = self.duel_of(idx) else {
            return;
        };
        let complete = match self.duels.get_mut(&key) {
            Some(duel) => duel.record(idx, Answer::Choice(answer)) && duel.all_answered(),
            None => false,
        };
        if complete {
            self.scheduler.cancel(TimerKey::Duel(key));
            self.resolve_duel_round(key);
        }
    }

    /// Close the current round of `key`: re-ask on a draw, settle otherwise
    pub(super) fn resolve_duel_round(&mut self, key: DuelKey) {
        let (verdict, asked, contestants) = {
            let Some(duel) = self.duels.get_mut(&key) else {
                return;
            };
            let Some(verdict) = duel.close_round() else {
                return;
            };
            (verdict, duel.question.clone(), duel.contestants)
        };

        match verdict {
            DuelVerdict::Draw => {
                let question = self.deck.draw_other(Some(&asked.category), &asked);
                let view = question.view();
                let round = match self.duels.get_mut(&key) {
                    Some(duel) => {
                        duel.next_round(question);
                        duel.round
                    }
                    None => return,
                };

                let seconds = self.config.duel_window.as_secs();
                for idx in contestants {
                    self.send_to(
                        idx,
                        ServerMsg::DuelNext {
                            question: view.clone(),
                            round,
                            seconds,
                        },
                    );
                }
                self.scheduler
                    .schedule(TimerKey::Duel(key), self.config.duel_window);
                debug!(room = %self.code, ?key, round, "Duel drawn, re-asking");
            }
            DuelVerdict::Decided { winner, loser } => {
                self.duels.remove(&key);
                self.settle_duel(key, winner, loser, false);
            }
        }
    }

    /// Apply a duel outcome. A forfeit means the loser was already eliminated
    /// elsewhere and only the winner's side is applied.
    pub(super) fn settle_duel(&mut self, key: DuelKey, winner: usize, loser: usize, forfeit: bool) {
        self.scheduler.cancel(TimerKey::Duel(key));

        if let Some(hex) = key.hex() {
            if self.alive_hexes.contains(&hex) && self.players[winner].alive {
                self.players[winner].pos = hex;
            }
        } else if !forfeit {
            self.players[loser].step = self.config.ladder_steps.saturating_sub(1);
        }

        // Loot and the loser's inventory change hands before results go out
        let mut decided = false;
        if !forfeit {
            if let DuelKey::Hex(hex) = key {
                if self.mode == GameMode::Royale && self.players[winner].pos == hex {
                    self.claim_loot(winner, hex);
                }
                let reason = format!("Lost duel to {}", self.players[winner].name);
                decided = self.mark_eliminated(loser, &reason, Some(winner));
            }
        }

        let winner_inventory = self.players[winner].inventory;
        self.send_to(
            winner,
            ServerMsg::DuelResult {
                won: true,
                hex: key.hex(),
                inventory: winner_inventory,
            },
        );
        if !forfeit {
            let loser_inventory = self.players[loser].inventory;
            self.send_to(
                loser,
                ServerMsg::DuelResult {
                    won: false,
                    hex: key.hex(),
                    inventory: loser_inventory,
                },
            );
        }
        self.broadcast_room(ServerMsg::DuelEnded {
            winner_idx: winner,
            loser_idx: loser,
            hex: key.hex(),
        });
        info!(room = %self.code, ?key, winner, loser, forfeit, "Duel settled");

        if forfeit {
            return;
        }

        match key {
            DuelKey::Hex(_) if decided => self.check_winner(),
            DuelKey::Hex(_) => {}
            DuelKey::Finish(_) => self.broadcast_ladder(None),
        }
        self.resume_turn_loop();
    }

    /// Contestant left or was eliminated elsewhere: the opponent wins outright
    pub(super) fn forfeit_duels(&mut self, idx: usize) {
        let keys: Vec<DuelKey> = self
            .duels
            .values()
            .filter(|d| d.involves(idx))
            .map(|d| d.key)
            .collect();

        for key in keys {
            let Some(duel) = self.duels.remove(&key) else {
                continue;
            };
            if let Some(opponent) = duel.opponent_of(idx) {
                self.settle_duel(key, opponent, idx, true);
            }
        }
    }

    pub(super) fn broadcast_ladder(&mut self, correct: Option<u8>) {
        let positions = self
            .players
            .iter()
            .filter(|p| p.alive)
            .map(|p| LadderPosition {
                idx: p.idx,
                step: p.step,
            })
            .collect();
        self.broadcast_room(ServerMsg::LadderUpdate {
            turn: self.turn.number,
            correct,
            positions,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Item;
    use crate::game::room::test_support::*;
    use crate::game::room::Phase;
    use crate::game::player::Inventory;
    use crate::questions::test_support::question;
    use crate::questions::QuestionDeck;
    use crate::ws::protocol::ClientMsg;

    #[test]
    fn verdicts_follow_correctness() {
        let mut duel = Duel::new(DuelKey::Hex(Hex::CENTER), 0, 1, question("space", "q", 2));
        assert!(duel.record(0, Answer::Choice(2)));
        assert!(!duel.record(0, Answer::Choice(1)), "first answer sticks");
        assert!(!duel.record(7, Answer::Choice(2)), "outsiders are ignored");
        assert_eq!(duel.close_round(), Some(DuelVerdict::Decided { winner: 0, loser: 1 }));
        assert_eq!(duel.close_round(), None, "a round closes once");
    }

    #[test]
    fn both_wrong_or_both_right_is_a_draw() {
        let mut duel = Duel::new(DuelKey::Finish(1), 3, 4, question("space", "q", 0));
        duel.record(3, Answer::Choice(0));
        duel.record(4, Answer::Choice(0));
        assert_eq!(duel.close_round(), Some(DuelVerdict::Draw));

        duel.next_round(question("space", "q2", 1));
        assert_eq!(duel.round, 2);
        assert_eq!(duel.close_round(), Some(DuelVerdict::Draw), "double timeout");
    }

    fn royale_pair() -> Room {
        let mut room = started(GameMode::Royale, 2, config());
        place(&mut room, 0, Hex::new(1, 0));
        place(&mut room, 1, Hex::new(0, 0));
        room
    }

    #[test]
    fn stepping_onto_an_occupied_hex_starts_a_duel() {
        let mut room = royale_pair();
        room.handle(conn(0), ClientMsg::Move { q: 0, r: 0 });
        let out = room.drain_outbox();

        assert_eq!(room.duel_count(), 1);
        assert_eq!(room.players()[0].pos, Hex::new(1, 0), "challenger stays put");
        assert!(room.scheduler().is_pending(TimerKey::Duel(DuelKey::Hex(Hex::CENTER))));
        for idx in [0, 1] {
            assert!(to(&out, idx).iter().any(|m| matches!(m, ServerMsg::DuelStart { .. })));
        }

        room.handle(conn(1), ClientMsg::Move { q: -1, r: 0 });
        let out = room.drain_outbox();
        assert_eq!(
            to(&out, 1),
            vec![ServerMsg::MoveRejected { msg: "Finish your duel first!".to_string() }]
        );
    }

    #[test]
    fn draw_then_decisive_round_transfers_everything() {
        let mut room = royale_pair();
        room.players[1].inventory.missile = 2;
        room.loot.insert(Hex::CENTER, Item::Missile);
        room.handle(conn(0), ClientMsg::Move { q: 0, r: 0 });
        room.drain_outbox();

        room.handle(conn(0), ClientMsg::DuelAnswer { answer: 1 });
        room.handle(conn(1), ClientMsg::DuelAnswer { answer: 1 });
        let out = room.drain_outbox();
        assert_eq!(count(&out, |m| matches!(m, ServerMsg::DuelNext { round: 2, .. })), 2);
        assert_eq!(room.duel_count(), 1);

        room.handle(conn(0), ClientMsg::DuelAnswer { answer: 0 });
        room.handle(conn(1), ClientMsg::DuelAnswer { answer: 3 });
        let out = room.drain_outbox();

        assert_eq!(room.duel_count(), 0);
        assert_eq!(room.players()[0].pos, Hex::CENTER);
        assert!(!room.players()[1].alive);
        assert_eq!(room.players()[0].inventory.missile, 3);
        assert_eq!(room.players()[1].inventory.missile, 0);
        assert!(to(&out, 0).contains(&ServerMsg::LootItem {
            item: Item::Missile,
            inventory: Inventory { missile: 1 },
        }));
        assert!(to(&out, 0).contains(&ServerMsg::LootTransfer {
            inventory: Inventory { missile: 3 },
        }));
        assert_eq!(room.phase(), Phase::Ended);
        assert!(to(&out, 0).iter().any(|m| matches!(m, ServerMsg::Victory { .. })));
    }

    #[test]
    fn timeout_closes_round_once() {
        let mut room = royale_pair();
        room.handle(conn(0), ClientMsg::Move { q: 0, r: 0 });
        room.handle(conn(1), ClientMsg::DuelAnswer { answer: 0 });
        let key = TimerKey::Duel(DuelKey::Hex(Hex::CENTER));
        let token = room.scheduler().token(key).unwrap();

        room.on_timer(token);
        assert!(!room.players()[0].alive, "silent challenger loses");
        assert_eq!(room.players()[1].pos, Hex::CENTER);

        room.drain_outbox();
        room.on_timer(token);
        assert!(room.drain_outbox().is_empty());
    }

    #[test]
    fn classic_loser_is_eliminated_and_winner_takes_hex() {
        let mut room = started(GameMode::Classic, 3, config());
        place(&mut room, 0, Hex::new(2, 0));
        place(&mut room, 1, Hex::new(1, 0));
        place(&mut room, 2, Hex::new(-2, 0));

        room.handle(conn(0), ClientMsg::Move { q: 1, r: 0 });
        room.handle(conn(0), ClientMsg::DuelAnswer { answer: 0 });
        room.handle(conn(1), ClientMsg::DuelAnswer { answer: 2 });
        let out = room.drain_outbox();

        assert_eq!(room.players()[0].pos, Hex::new(1, 0));
        assert!(!room.players()[1].alive);
        assert_eq!(room.phase(), Phase::Active);
        assert!(to(&out, 2).contains(&ServerMsg::DuelEnded {
            winner_idx: 0,
            loser_idx: 1,
            hex: Some(Hex::new(1, 0)),
        }));
        assert!(to(&out, 1).iter().any(|m| matches!(
            m,
            ServerMsg::Eliminated { reason, .. } if reason == "Lost duel to P0"
        )));
    }

    #[test]
    fn contestant_leaving_forfeits_duel() {
        let mut room = started(GameMode::Royale, 3, config());
        place(&mut room, 0, Hex::new(1, 0));
        place(&mut room, 1, Hex::CENTER);
        place(&mut room, 2, Hex::new(-2, 0));
        room.handle(conn(0), ClientMsg::Move { q: 0, r: 0 });
        room.drain_outbox();

        room.leave(conn(1));
        let out = room.drain_outbox();

        assert_eq!(room.duel_count(), 0);
        assert_eq!(room.players()[0].pos, Hex::CENTER);
        assert!(room.players()[0].alive);
        assert!(!room.scheduler().is_pending(TimerKey::Duel(DuelKey::Hex(Hex::CENTER))));
        assert!(to(&out, 0).iter().any(|m| matches!(m, ServerMsg::DuelResult { won: true, .. })));
    }

    #[test]
    fn contested_hex_is_locked_while_dueling() {
        let mut room = started(GameMode::Royale, 3, config());
        place(&mut room, 0, Hex::new(1, 0));
        place(&mut room, 1, Hex::CENTER);
        place(&mut room, 2, Hex::new(-1, 0));
        room.handle(conn(0), ClientMsg::Move { q: 0, r: 0 });
        room.drain_outbox();

        room.handle(conn(2), ClientMsg::Move { q: 0, r: 0 });
        let out = room.drain_outbox();

        assert_eq!(
            to(&out, 2),
            vec![ServerMsg::MoveRejected { msg: "Duel in progress!".to_string() }]
        );
        assert_eq!(room.duel_count(), 1);
        assert_eq!(room.duel_of(2), None);
        assert_eq!(room.players()[2].pos, Hex::new(-1, 0));
    }

    #[test]
    fn draw_never_repeats_the_question_just_asked() {
        let mut room = started(GameMode::Royale, 2, config());
        let contested = Hex::new(1, 0);
        let category = room.grid().unwrap().category(contested).unwrap().to_string();
        let mut questions = vec![question(&category, "only-one", 0)];
        questions.extend((0..5).map(|i| question("elsewhere", &format!("other{i}"), 0)));
        room.deck = QuestionDeck::new(questions).unwrap();
        place(&mut room, 0, Hex::new(2, 0));
        place(&mut room, 1, contested);

        room.handle(conn(0), ClientMsg::Move { q: 1, r: 0 });
        let mut asked = to(&room.drain_outbox(), 0)
            .into_iter()
            .find_map(|m| match m {
                ServerMsg::DuelStart { question, .. } => Some(question.prompt),
                _ => None,
            })
            .unwrap();
        assert_eq!(asked, "only-one");

        for round in 2..=4 {
            room.handle(conn(0), ClientMsg::DuelAnswer { answer: 0 });
            room.handle(conn(1), ClientMsg::DuelAnswer { answer: 0 });
            let next = to(&room.drain_outbox(), 1)
                .into_iter()
                .find_map(|m| match m {
                    ServerMsg::DuelNext { question, round: r, .. } if r == round => {
                        Some(question.prompt)
                    }
                    _ => None,
                })
                .unwrap();
            assert_ne!(next, asked, "round {round} re-asked the same question");
            asked = next;
        }
        assert_eq!(room.duel_count(), 1);
    }

    #[test]
    fn winner_result_carries_transferred_inventory() {
        let mut room = royale_pair();
        room.players[1].inventory.missile = 2;
        room.handle(conn(0), ClientMsg::Move { q: 0, r: 0 });
        room.handle(conn(0), ClientMsg::DuelAnswer { answer: 0 });
        room.handle(conn(1), ClientMsg::DuelAnswer { answer: 1 });
        let out = to(&room.drain_outbox(), 0);

        let result = out
            .iter()
            .position(|m| matches!(m, ServerMsg::DuelResult { won: true, .. }))
            .unwrap();
        assert_eq!(
            out[result],
            ServerMsg::DuelResult {
                won: true,
                hex: Some(Hex::CENTER),
                inventory: Inventory { missile: 2 },
            }
        );
        let victory = out
            .iter()
            .position(|m| matches!(m, ServerMsg::Victory { .. }))
            .unwrap();
        assert!(result < victory, "result is reported before the game ends");
    }
}
