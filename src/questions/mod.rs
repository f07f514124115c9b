//! Quiz content: question records, the source seam, and the per-game deck

pub mod local;
pub mod remote;

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

pub use local::LocalAnswerKey;
pub use remote::RemoteQuestionService;

/// Number of options every question carries
pub const OPTION_COUNT: usize = 4;

/// A question with its answer key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub category: String,
    pub prompt: String,
    pub options: [String; OPTION_COUNT],
    /// Index of the correct option
    #[serde(alias = "correct")]
    pub answer: u8,
}

impl Question {
    pub fn is_correct(&self, answer: Answer) -> bool {
        matches!(answer, Answer::Choice(c) if c == i32::from(self.answer))
    }

    /// What clients get to see: never the answer
    pub fn view(&self) -> QuestionView {
        QuestionView {
            category: self.category.clone(),
            prompt: self.prompt.clone(),
            options: self.options.clone(),
        }
    }
}

/// Question as broadcast to players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub category: String,
    pub prompt: String,
    pub options: [String; OPTION_COUNT],
}

/// A submitted answer, or the sentinel recorded when a window expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Choice(i32),
    TimedOut,
}

/// What the engine asks its content collaborator for at game start
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionRequest {
    pub categories: Vec<String>,
    pub count: usize,
}

/// Question content collaborator
pub trait QuestionSource: Send + Sync {
    fn fetch(&self, request: QuestionRequest) -> BoxFuture<'_, Result<Vec<Question>, QuestionError>>;
}

/// Content acquisition errors
#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No questions available")]
    Empty,

    #[error("Invalid question: {0}")]
    Invalid(String),
}

/// Questions for one game, handed out in order and cycled when exhausted
#[derive(Debug, Clone)]
pub struct QuestionDeck {
    questions: Vec<Question>,
    cursor: usize,
    by_category: HashMap<String, Vec<usize>>,
    category_cursor: HashMap<String, usize>,
}

impl QuestionDeck {
    pub fn new(questions: Vec<Question>) -> Result<Self, QuestionError> {
        if questions.is_empty() {
            return Err(QuestionError::Empty);
        }
        if let Some(bad) = questions
            .iter()
            .find(|q| usize::from(q.answer) >= OPTION_COUNT)
        {
            return Err(QuestionError::Invalid(format!(
                "answer index {} out of range for \"{}\"",
                bad.answer, bad.prompt
            )));
        }

        Ok(Self::index(questions))
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    fn index(questions: Vec<Question>) -> Self {
        let mut by_category: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, q) in questions.iter().enumerate() {
            by_category.entry(q.category.clone()).or_default().push(i);
        }
        Self {
            questions,
            cursor: 0,
            by_category,
            category_cursor: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Next question, preferring `category` when the deck has any for it
    pub fn draw(&mut self, category: Option<&str>) -> Question {
        if let Some(indices) = category.and_then(|c| self.by_category.get(c)) {
            let key = category.unwrap_or_default().to_string();
            let cursor = self.category_cursor.entry(key).or_default();
            let pick = indices[*cursor % indices.len()];
            *cursor += 1;
            return self.questions[pick].clone();
        }

        let pick = self.cursor % self.questions.len();
        self.cursor += 1;
        self.questions[pick].clone()
    }

    /// Next question other than `current`. Falls back to the whole deck when
    /// the category has nothing else to offer.
    pub fn draw_other(&mut self, category: Option<&str>, current: &Question) -> Question {
        let pick = self.draw(category);
        if pick.prompt != current.prompt {
            return pick;
        }
        (0..self.questions.len())
            .map(|_| self.draw(None))
            .find(|q| q.prompt != current.prompt)
            .unwrap_or(pick)
    }
}

/// The built-in answer key, so a room always has something to draw from
impl Default for QuestionDeck {
    fn default() -> Self {
        Self::index(LocalAnswerKey::questions(&[]))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::question;
    use super::*;

    #[test]
    fn empty_deck_is_rejected() {
        assert!(matches!(QuestionDeck::new(Vec::new()), Err(QuestionError::Empty)));
    }

    #[test]
    fn out_of_range_answer_is_rejected() {
        let bad = question("science", "broken", 7);
        assert!(matches!(
            QuestionDeck::new(vec![bad]),
            Err(QuestionError::Invalid(_))
        ));
    }

    #[test]
    fn deck_cycles_when_exhausted() {
        let mut deck =
            QuestionDeck::new(vec![question("a", "one", 0), question("b", "two", 1)]).unwrap();
        let prompts: Vec<String> = (0..5).map(|_| deck.draw(None).prompt).collect();
        assert_eq!(prompts, ["one", "two", "one", "two", "one"]);
    }

    #[test]
    fn deck_prefers_requested_category() {
        let mut deck = QuestionDeck::new(vec![
            question("music", "m1", 0),
            question("sports", "s1", 0),
            question("music", "m2", 0),
        ])
        .unwrap();
        assert_eq!(deck.draw(Some("music")).prompt, "m1");
        assert_eq!(deck.draw(Some("music")).prompt, "m2");
        assert_eq!(deck.draw(Some("music")).prompt, "m1");
        assert_eq!(deck.draw(Some("food")).prompt, "m1");
    }

    #[test]
    fn draw_other_skips_the_current_question() {
        let mut deck = QuestionDeck::new(vec![
            question("music", "m1", 0),
            question("sports", "s1", 0),
            question("sports", "s2", 0),
        ])
        .unwrap();
        let current = deck.draw(Some("music"));
        assert_eq!(deck.draw_other(Some("music"), &current).prompt, "s1");
        assert_eq!(deck.draw_other(Some("sports"), &current).prompt, "s1");

        let mut single = QuestionDeck::new(vec![question("music", "m1", 0)]).unwrap();
        let current = single.draw(None);
        assert_eq!(single.draw_other(Some("music"), &current).prompt, "m1");
    }

    #[test]
    fn timeout_is_never_correct() {
        let q = question("science", "x", 2);
        assert!(q.is_correct(Answer::Choice(2)));
        assert!(!q.is_correct(Answer::Choice(1)));
        assert!(!q.is_correct(Answer::Choice(-1)));
        assert!(!q.is_correct(Answer::TimedOut));
    }

    #[test]
    fn question_accepts_correct_alias() {
        let json = r#"{"category":"space","prompt":"p","options":["a","b","c","d"],"correct":3}"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.answer, 3);
    }
}
