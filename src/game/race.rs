//! Synchronized turn loops: race (hex board) and ladder (step counter)
//!
//! Race turns run move window, then answer window, then resolution. Ladder
//! turns skip the move window. Each window closes early once every living
//! player has submitted, and closes exactly once either way.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::debug;

use crate::questions::{Answer, Question};
use crate::ws::protocol::{GameMode, ServerMsg, TurnOutcome};

use super::duel::DuelKey;
use super::hex::Hex;
use super::room::{Phase, Room};
use super::scheduler::{OneShot, TimerKey};

/// Most players that may end a race turn on one hex
const HEX_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnStage {
    #[default]
    Idle,
    Moving,
    Answering,
    Resolving,
    /// Waiting for duels opened by the last resolution
    Dueling,
}

#[derive(Debug, Clone, Default)]
pub struct TurnState {
    pub number: u32,
    pub stage: TurnStage,
    pub window: OneShot,
    pub submissions: usize,
    pub question: Option<Question>,
}

impl TurnState {
    fn open(&mut self, stage: TurnStage) {
        self.stage = stage;
        self.window.reset();
        self.submissions = 0;
    }
}

impl Room {
    /// Current hex plus every living neighbor
    pub fn legal_targets(&self, idx: usize) -> Vec<Hex> {
        let Some(player) = self.players.get(idx) else {
            return Vec::new();
        };
        let pos = player.pos;
        std::iter::once(pos)
            .chain(
                pos.neighbors()
                    .into_iter()
                    .filter(|h| self.alive_hexes.contains(h)),
            )
            .collect()
    }

    pub(super) fn begin_turn(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        self.turn.number += 1;
        self.turn.question = None;
        self.turn.open(TurnStage::Moving);
        for p in &mut self.players {
            p.reset_turn();
        }

        let seconds = self.config.move_window.as_secs();
        for idx in self.alive_indices() {
            let targets = self.legal_targets(idx);
            self.send_to(
                idx,
                ServerMsg::MovePhase {
                    turn: self.turn.number,
                    targets,
                    seconds,
                },
            );
        }
        self.scheduler
            .schedule(TimerKey::MoveWindow, self.config.move_window);
        debug!(room = %self.code, turn = self.turn.number, "Move window opened");
    }

    pub(super) fn submit_move(&mut self, idx: usize, target: Hex) {
        let player = &self.players[idx];
        if self.turn.stage != TurnStage::Moving || !player.alive || player.locked {
            return;
        }
        if !self.legal_targets(idx).contains(&target) {
            self.reject_move(idx, "Illegal move!");
            return;
        }

        let player = &mut self.players[idx];
        player.pending_move = Some(target);
        player.locked = true;
        self.turn.submissions += 1;

        if self.turn.submissions >= self.alive_count {
            self.close_move_window();
        }
    }

    pub(super) fn close_move_window(&mut self) {
        if self.turn.stage != TurnStage::Moving || !self.turn.window.try_fire() {
            return;
        }
        self.scheduler.cancel(TimerKey::MoveWindow);

        let question = self.draw_question(None);
        let view = question.view();
        self.turn.question = Some(question);
        self.turn.open(TurnStage::Answering);

        self.broadcast_alive(ServerMsg::QuestionPhase {
            turn: self.turn.number,
            question: view,
            seconds: self.config.answer_window.as_secs(),
        });
        self.scheduler
            .schedule(TimerKey::AnswerWindow, self.config.answer_window);
    }

    pub(super) fn submit_answer(&mut self, idx: usize, answer: i32) {
        let player = &mut self.players[idx];
        if self.turn.stage != TurnStage::Answering || !player.alive || player.last_answer.is_some() {
            return;
        }
        player.last_answer = Some(Answer::Choice(answer));
        self.turn.submissions += 1;

        if self.turn.submissions >= self.alive_count {
            self.close_answer_window();
        }
    }

    pub(super) fn close_answer_window(&mut self) {
        if self.turn.stage != TurnStage::Answering || !self.turn.window.try_fire() {
            return;
        }
        self.scheduler.cancel(TimerKey::AnswerWindow);
        self.turn.stage = TurnStage::Resolving;

        match self.mode {
            GameMode::Race => self.resolve_race_turn(),
            GameMode::Ladder => self.resolve_ladder_turn(),
            GameMode::Classic | GameMode::Royale => {}
        }
    }

    /// A departure may have left every remaining player submitted
    pub(super) fn recheck_barriers(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        let alive = self.players.iter().filter(|p| p.alive);
        match self.turn.stage {
            TurnStage::Moving => {
                self.turn.submissions = alive.filter(|p| p.locked).count();
                if self.turn.submissions >= self.alive_count {
                    self.close_move_window();
                }
            }
            TurnStage::Answering => {
                self.turn.submissions = alive.filter(|p| p.last_answer.is_some()).count();
                if self.turn.submissions >= self.alive_count {
                    self.close_answer_window();
                }
            }
            _ => {}
        }
    }

    fn resolve_race_turn(&mut self) {
        let Some(question) = self.turn.question.clone() else {
            return;
        };

        let mut outcomes = Vec::new();
        for p in self.players.iter_mut().filter(|p| p.alive) {
            let correct = p.last_answer.is_some_and(|a| question.is_correct(a));
            if correct {
                if let Some(target) = p.pending_move {
                    p.pos = target;
                }
            }
            outcomes.push(TurnOutcome {
                idx: p.idx,
                q: p.pos.q,
                r: p.pos.r,
                correct,
            });
        }
        self.broadcast_room(ServerMsg::TurnResult {
            turn: self.turn.number,
            correct: question.answer,
            players: outcomes,
        });

        let mut crowds: BTreeMap<Hex, Vec<usize>> = BTreeMap::new();
        for p in self.players.iter().filter(|p| p.alive) {
            crowds.entry(p.pos).or_default().push(p.idx);
        }

        for (hex, mut group) in crowds.into_iter().filter(|(_, g)| g.len() >= HEX_CAPACITY) {
            while group.len() > HEX_CAPACITY {
                let pick = self.rng.gen_range(0..group.len());
                let evicted = group.swap_remove(pick);
                self.eliminate(evicted, "Crowded out", None);
                if self.phase != Phase::Active {
                    return;
                }
            }
            group.sort_unstable();
            self.start_duel(group[0], group[1], DuelKey::Hex(hex));
        }

        if let Some(idx) = self.center_finisher() {
            self.finish_line_victory(idx, "center");
            return;
        }

        self.turn.stage = TurnStage::Dueling;
        self.resume_turn_loop();
    }

    /// Sole, undisputed occupant of the center
    fn center_finisher(&self) -> Option<usize> {
        let mut at_center = self
            .players
            .iter()
            .filter(|p| p.alive && p.pos.is_center());
        match (at_center.next(), at_center.next()) {
            (Some(p), None) if self.duel_of(p.idx).is_none() => Some(p.idx),
            _ => None,
        }
    }

    /// Advance the turn loop once resolution and its duels are done
    pub(super) fn resume_turn_loop(&mut self) {
        if self.phase != Phase::Active
            || self.turn.stage != TurnStage::Dueling
            || !self.duels.is_empty()
        {
            return;
        }

        match self.mode {
            GameMode::Race => {
                if let Some(idx) = self.center_finisher() {
                    self.finish_line_victory(idx, "center");
                    return;
                }
                self.turn.stage = TurnStage::Idle;
                if self.turn.number % self.config.shrink_every_turns == 0 {
                    self.shrink_step();
                    if self.phase != Phase::Active {
                        return;
                    }
                }
                self.begin_turn();
            }
            GameMode::Ladder => self.settle_finishers(),
            GameMode::Classic | GameMode::Royale => {}
        }
    }

    pub(super) fn begin_ladder_turn(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        self.turn.number += 1;
        self.turn.open(TurnStage::Answering);
        for p in &mut self.players {
            p.reset_turn();
        }

        let question = self.draw_question(None);
        let view = question.view();
        self.turn.question = Some(question);

        self.broadcast_alive(ServerMsg::LadderQuestion {
            turn: self.turn.number,
            question: view,
            seconds: self.config.answer_window.as_secs(),
        });
        self.scheduler
            .schedule(TimerKey::AnswerWindow, self.config.answer_window);
        debug!(room = %self.code, turn = self.turn.number, "Ladder question asked");
    }

    fn resolve_ladder_turn(&mut self) {
        let Some(question) = self.turn.question.clone() else {
            return;
        };
        let steps = self.config.ladder_steps;

        for p in self.players.iter_mut().filter(|p| p.alive) {
            match p.last_answer {
                Some(answer) if question.is_correct(answer) => p.step = (p.step + 1).min(steps),
                Some(_) => p.step = p.step.saturating_sub(1),
                None => {}
            }
        }
        self.broadcast_ladder(Some(question.answer));

        self.turn.stage = TurnStage::Dueling;
        self.settle_finishers();
    }

    /// A lone finisher wins; simultaneous finishers duel in pairs (ascending
    /// index), an odd one out waits for the next pairing.
    fn settle_finishers(&mut self) {
        if self.phase != Phase::Active {
            return;
        }
        let steps = self.config.ladder_steps;
        let waiting: Vec<usize> = self
            .players
            .iter()
            .filter(|p| p.alive && p.step >= steps)
            .map(|p| p.idx)
            .filter(|&idx| self.duel_of(idx).is_none())
            .collect();

        if waiting.len() == 1 && self.duels.is_empty() {
            self.finish_line_victory(waiting[0], "finish");
            return;
        }

        for pair in waiting.chunks_exact(2) {
            self.next_duel_id += 1;
            self.start_duel(pair[0], pair[1], DuelKey::Finish(self.next_duel_id));
        }

        if self.duels.is_empty() {
            self.turn.stage = TurnStage::Idle;
            self.begin_ladder_turn();
        } else {
            self.turn.stage = TurnStage::Dueling;
        }
    }
}
