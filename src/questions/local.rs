//! Built-in answer key used when no question service is configured

use futures::future::{self, BoxFuture, FutureExt};
use rand::seq::SliceRandom;

use super::{Question, QuestionError, QuestionRequest, QuestionSource};

/// (category, prompt, options, answer)
const BANK: &[(&str, &str, [&str; 4], u8)] = &[
    ("science", "What is the chemical symbol for gold?", ["Ag", "Au", "Gd", "Go"], 1),
    ("science", "What gas do plants absorb from the air?", ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"], 2),
    ("science", "How many bones are in the adult human body?", ["186", "206", "226", "246"], 1),
    ("history", "In which year did the Berlin Wall fall?", ["1987", "1989", "1991", "1993"], 1),
    ("history", "Who was the first emperor of Rome?", ["Julius Caesar", "Nero", "Augustus", "Caligula"], 2),
    ("history", "Which ship sank on its maiden voyage in 1912?", ["Lusitania", "Titanic", "Britannic", "Olympic"], 1),
    ("geography", "What is the capital of Australia?", ["Sydney", "Canberra", "Melbourne", "Perth"], 1),
    ("geography", "Which is the longest river in South America?", ["Amazon", "Parana", "Orinoco", "Magdalena"], 0),
    ("geography", "Mount Kilimanjaro is in which country?", ["Kenya", "Uganda", "Tanzania", "Ethiopia"], 2),
    ("entertainment", "Who directed the film Jaws?", ["Steven Spielberg", "George Lucas", "Ridley Scott", "James Cameron"], 0),
    ("entertainment", "Which board game features Colonel Mustard?", ["Monopoly", "Cluedo", "Risk", "Scrabble"], 1),
    ("entertainment", "What color is Pac-Man?", ["Red", "Blue", "Yellow", "Green"], 2),
    ("sports", "How many players does a soccer team field?", ["9", "10", "11", "12"], 2),
    ("sports", "Which country hosted the 2016 Summer Olympics?", ["China", "Brazil", "UK", "Japan"], 1),
    ("sports", "In tennis, what is a score of zero called?", ["Nil", "Love", "Duck", "Blank"], 1),
    ("music", "How many strings does a standard guitar have?", ["4", "5", "6", "7"], 2),
    ("music", "Which composer wrote the Moonlight Sonata?", ["Mozart", "Beethoven", "Bach", "Chopin"], 1),
    ("music", "What does 'forte' instruct a musician to play?", ["Slowly", "Quietly", "Loudly", "Quickly"], 2),
    ("food", "Which country is the origin of the croissant's ancestor, the kipferl?", ["France", "Austria", "Italy", "Belgium"], 1),
    ("food", "What is the main ingredient of guacamole?", ["Avocado", "Tomato", "Lime", "Pepper"], 0),
    ("food", "Saffron comes from which flower?", ["Rose", "Tulip", "Crocus", "Lily"], 2),
    ("space", "Which planet is known as the Red Planet?", ["Venus", "Mars", "Jupiter", "Mercury"], 1),
    ("space", "What is the largest planet in our solar system?", ["Saturn", "Neptune", "Jupiter", "Uranus"], 2),
    ("space", "Who was the first person to walk on the Moon?", ["Buzz Aldrin", "Neil Armstrong", "Yuri Gagarin", "Michael Collins"], 1),
    ("technology", "What does CPU stand for?", ["Central Processing Unit", "Core Power Unit", "Computer Program Utility", "Central Peripheral Unit"], 0),
    ("technology", "Which company created the Android operating system originally?", ["Google", "Android Inc.", "Samsung", "HTC"], 1),
    ("technology", "How many bits are in a byte?", ["4", "8", "16", "32"], 1),
    ("animals", "What is the fastest land animal?", ["Lion", "Cheetah", "Pronghorn", "Greyhound"], 1),
    ("animals", "How many hearts does an octopus have?", ["1", "2", "3", "4"], 2),
    ("animals", "Which mammal can truly fly?", ["Flying squirrel", "Bat", "Sugar glider", "Colugo"], 1),
];

/// Fixed local question bank
#[derive(Debug, Clone, Default)]
pub struct LocalAnswerKey;

impl LocalAnswerKey {
    pub fn new() -> Self {
        Self
    }

    /// Every question in the bank, optionally limited to `categories`
    pub fn questions(categories: &[String]) -> Vec<Question> {
        let wanted = |cat: &str| categories.is_empty() || categories.iter().any(|c| c == cat);
        let mut selected: Vec<Question> = BANK
            .iter()
            .filter(|(cat, ..)| wanted(*cat))
            .map(|(cat, prompt, options, answer)| Question {
                category: cat.to_string(),
                prompt: prompt.to_string(),
                options: options.map(str::to_string),
                answer: *answer,
            })
            .collect();

        if selected.is_empty() {
            selected = Self::questions(&[]);
        }
        selected
    }
}

impl QuestionSource for LocalAnswerKey {
    fn fetch(&self, request: QuestionRequest) -> BoxFuture<'_, Result<Vec<Question>, QuestionError>> {
        let mut questions = Self::questions(&request.categories);
        questions.shuffle(&mut rand::thread_rng());
        questions.truncate(request.count.max(1));
        future::ready(Ok(questions)).boxed()
    }
}
