//! Retrieved regulation passages

use serde::{Deserialize, Serialize};

/// A knowledge-base passage cited as applicable to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Regulation {
    /// Source identifier of the passage ("Unknown" when the payload has none)
    pub citation: String,
    pub text: String,
    /// Fixed provenance tag of the corpus
    pub source: String,
}

impl Regulation {
    /// First `max_chars` characters of the text, never splitting a character.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        prefix_chars(&self.text, max_chars)
    }
}

/// Borrow the first `max_chars` characters of `text`.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_respects_char_boundaries() {
        assert_eq!(prefix_chars("héllo", 2), "hé");
        assert_eq!(prefix_chars("abc", 10), "abc");
        assert_eq!(prefix_chars("", 5), "");
    }

    #[test]
    fn test_excerpt() {
        let reg = Regulation {
            citation: "CAL_OSHA.pdf".to_string(),
            text: "Employees shall wear approved head protection.".to_string(),
            source: "CAL_OSHA".to_string(),
        };
        assert_eq!(reg.excerpt(9), "Employees");
    }
}
