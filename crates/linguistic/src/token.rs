//! Sentence splitting and tokenization with lightweight token attributes.
//!
//! The attributes (lowercase form, orthographic shape, coarse part-of-speech)
//! are what the tagger and relation matcher key off. Everything here is pure
//! and deterministic: the same text always yields the same token stream,
//! which downstream cache keys depend on.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Coarse part-of-speech, assigned from closed-class word lists and
/// orthography rather than a statistical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosTag {
    Noun,
    ProperNoun,
    Verb,
    Preposition,
    Determiner,
    Number,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub lower: String,
    /// Orthographic shape: `Nginx` -> `Xxxxx` (runs collapsed past four),
    /// `10.0.0.1` -> `dd.d.d.d`.
    pub shape: String,
    pub pos: PosTag,
    /// Index within the owning sentence.
    pub index: usize,
    /// Byte span within the owning sentence text.
    pub span: (usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub index: usize,
    pub text: String,
    /// Byte span within the source document.
    pub span: (usize, usize),
    pub tokens: Vec<Token>,
}

impl Sentence {
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

static DETERMINERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["the", "a", "an", "this", "that", "these", "those", "its", "our", "my", "their"]
        .into_iter()
        .collect()
});

static PREPOSITIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "on", "to", "for", "of", "at", "with", "by", "from", "in", "into", "over", "behind",
        "through", "via",
    ]
    .into_iter()
    .collect()
});

static COMMON_VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "is", "are", "was", "were", "be", "been", "has", "have", "had", "does", "do", "did",
        "can", "will", "should", "uses", "use", "used", "using", "serves", "serve", "served",
        "provides", "provide", "needs", "need", "talks", "talk",
    ]
    .into_iter()
    .collect()
});

static ABBREVIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["e.g", "i.e", "etc", "vs", "cf", "no", "dr", "mr", "mrs", "ms"]
        .into_iter()
        .collect()
});

/// Split text into sentences. Periods after known abbreviations and inside
/// dotted tokens (IPs, versions, hostnames) do not terminate a sentence.
pub fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '!' || c == '?' || c == '\n' || c == '.' {
            let is_boundary = if c == '.' {
                let next_ws = bytes
                    .get(i + 1)
                    .map_or(true, |b| (*b as char).is_whitespace());
                next_ws && !is_abbreviation(&text[start..i])
            } else {
                true
            };
            if is_boundary {
                push_sentence(text, start, i + 1, &mut sentences);
                start = i + 1;
            }
        }
        i += 1;
    }
    push_sentence(text, start, bytes.len(), &mut sentences);
    sentences
}

fn is_abbreviation(prefix: &str) -> bool {
    let last_word = prefix
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or("");
    ABBREVIATIONS.contains(last_word.trim_matches('.').to_ascii_lowercase().as_str())
}

fn push_sentence(text: &str, start: usize, end: usize, out: &mut Vec<Sentence>) {
    let raw = &text[start..end.min(text.len())];
    if raw.trim().is_empty() {
        return;
    }
    let index = out.len();
    let trimmed_start = start + (raw.len() - raw.trim_start().len());
    let trimmed = raw.trim();
    out.push(Sentence {
        index,
        text: trimmed.to_string(),
        span: (trimmed_start, trimmed_start + trimmed.len()),
        tokens: tokenize(trimmed),
    });
}

/// Tokenize one sentence and assign attributes.
pub fn tokenize(sentence: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (index, (offset, word)) in sentence.unicode_word_indices().enumerate() {
        let lower = word.to_lowercase();
        let pos = classify(word, &lower, index);
        tokens.push(Token {
            text: word.to_string(),
            shape: shape_of(word),
            span: (offset, offset + word.len()),
            lower,
            pos,
            index,
        });
    }
    tokens
}

fn classify(word: &str, lower: &str, index: usize) -> PosTag {
    if word.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ':' || c == '/')
        && word.chars().any(|c| c.is_ascii_digit())
    {
        return PosTag::Number;
    }
    if DETERMINERS.contains(lower) {
        return PosTag::Determiner;
    }
    if PREPOSITIONS.contains(lower) {
        return PosTag::Preposition;
    }
    if COMMON_VERBS.contains(lower) || crate::relations::verb_tag(lower).is_some() {
        return PosTag::Verb;
    }
    if index > 0 && word.chars().next().is_some_and(|c| c.is_uppercase()) {
        return PosTag::ProperNoun;
    }
    PosTag::Noun
}

fn shape_of(word: &str) -> String {
    let mut shape = String::with_capacity(word.len().min(8));
    let mut last = '\0';
    let mut run = 0usize;
    for c in word.chars() {
        let mapped = if c.is_uppercase() {
            'X'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_ascii_digit() {
            'd'
        } else {
            c
        };
        if mapped == last {
            run += 1;
            if run >= 4 {
                continue;
            }
        } else {
            run = 1;
            last = mapped;
        }
        shape.push(mapped);
    }
    shape
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminators() {
        let s = split_sentences("First sentence. Second one! Third?");
        assert_eq!(s.len(), 3);
        assert_eq!(s[0].text, "First sentence.");
        assert_eq!(s[2].text, "Third?");
    }

    #[test]
    fn abbreviations_do_not_split() {
        let s = split_sentences("Use a proxy, e.g. traefik, for routing. Done.");
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn dotted_literals_survive() {
        let s = split_sentences("The server at 10.0.0.1 is fine.");
        assert_eq!(s.len(), 1);
        assert!(s[0].tokens.iter().any(|t| t.text == "10.0.0.1"));
    }

    #[test]
    fn token_attributes_assigned() {
        let tokens = tokenize("The nginx service depends on Postgres");
        assert_eq!(tokens[0].pos, PosTag::Determiner);
        assert_eq!(tokens[3].lower, "depends");
        assert_eq!(tokens[3].pos, PosTag::Verb);
        assert_eq!(tokens[4].pos, PosTag::Preposition);
        assert_eq!(tokens[5].pos, PosTag::ProperNoun);
    }

    #[test]
    fn shapes_collapse_long_runs() {
        assert_eq!(shape_of("Nginx"), "Xxxx");
        assert_eq!(shape_of("Kubernetes"), "Xxxx");
        assert_eq!(shape_of("10.0.0.1"), "dd.d.d.d");
    }

    #[test]
    fn tokenization_is_deterministic() {
        let a = tokenize("traefik routes traffic to the backend");
        let b = tokenize("traefik routes traffic to the backend");
        assert_eq!(a, b);
    }
}
