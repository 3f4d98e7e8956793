//! Practice interview questions

pub const STANDARD_QUESTIONS: [&str; 10] = [
    "Tell me about yourself and why you're interested in this position.",
    "What are your greatest strengths and how do they apply to this role?",
    "Describe a challenging situation you faced and how you overcame it.",
    "Where do you see yourself in 5 years?",
    "Why should we hire you over other candidates?",
    "Tell me about a time when you worked in a team.",
    "How do you handle stress and pressure?",
    "What is your greatest weakness?",
    "Describe your ideal work environment.",
    "What motivates you to do your best work?",
];

/// Cycles through a fixed list of questions
#[derive(Debug, Clone)]
pub struct QuestionDeck {
    questions: Vec<String>,
    index: usize,
}

impl QuestionDeck {
    /// A deck over `questions`. Falls back to the standard set when empty.
    pub fn new(questions: Vec<String>) -> Self {
        if questions.is_empty() {
            return Self::default();
        }
        Self { questions, index: 0 }
    }

    pub fn current(&self) -> &str {
        &self.questions[self.index]
    }

    /// Move to the next question, wrapping to the first after the last
    pub fn advance(&mut self) -> &str {
        self.index = (self.index + 1) % self.questions.len();
        tracing::debug!("Question {}/{}", self.index + 1, self.questions.len());
        self.current()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl Default for QuestionDeck {
    fn default() -> Self {
        Self {
            questions: STANDARD_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps() {
        let mut deck = QuestionDeck::default();
        assert_eq!(deck.len(), 10);
        assert_eq!(deck.current(), STANDARD_QUESTIONS[0]);

        for i in 1..10 {
            assert_eq!(deck.advance(), STANDARD_QUESTIONS[i]);
        }
        assert_eq!(deck.advance(), STANDARD_QUESTIONS[0]);
        assert_eq!(deck.index(), 0);
    }

    #[test]
    fn test_custom_deck() {
        let mut deck = QuestionDeck::new(vec!["A?".into(), "B?".into()]);
        assert_eq!(deck.advance(), "B?");
        assert_eq!(deck.advance(), "A?");
        assert_eq!(QuestionDeck::new(Vec::new()).len(), 10);
    }
}
