//! Corpus passages

use serde::{Deserialize, Serialize};

use super::Label;

/// Short pattern description tagged with the labels it illustrates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// `{label}_p{nn}`
    pub passage_id: String,
    pub doc_id: String,
    pub content: String,
    pub tags: Vec<Label>,
}

impl Passage {
    /// A passage is usable when it has text and at least one tag
    pub fn is_valid(&self) -> bool {
        !self.content.trim().is_empty() && !self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        let mut p = Passage {
            passage_id: "brute_force_p01".into(),
            doc_id: "brute_force_doc".into(),
            content: "Repeated password guesses".into(),
            tags: vec![Label::BruteForce],
        };
        assert!(p.is_valid());
        p.tags.clear();
        assert!(!p.is_valid());
        p.tags.push(Label::BruteForce);
        p.content = "   ".into();
        assert!(!p.is_valid());
    }
}
