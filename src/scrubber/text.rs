//! Random replacement text for overwritten items.

use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use regex::Regex;
use thiserror::Error;

use crate::source::ItemKind;

const WORDS: &[&str] = &[
    "apple", "river", "window", "garden", "pencil", "morning", "cloud", "table", "orange",
    "meadow", "lantern", "blanket", "kettle", "harbor", "pebble", "maple", "candle", "button",
    "violet", "basket", "island", "feather", "ladder", "willow", "teapot", "marble", "canyon",
    "breeze", "cotton", "forest", "saddle", "puzzle", "velvet", "compass", "honey", "pillow",
    "ribbon", "shadow", "tunnel", "walnut", "anchor", "bicycle", "carpet", "dolphin", "engine",
    "falcon", "glacier", "hammock", "igloo", "jacket", "kitten", "lemon", "mitten", "noodle",
    "oyster", "parrot", "quartz", "rocket", "sunset", "tulip",
];

/// How many candidates to draw before giving up on an item.
const MAX_ROLLS: usize = 32;

/// Accepted body length range, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

impl LengthBounds {
    #[must_use]
    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }
}

/// Per-kind length limits plus patterns generated text must never match.
#[derive(Debug, Clone)]
pub struct TextConstraints {
    pub comment: LengthBounds,
    pub post: LengthBounds,
    /// Regexes; a candidate that matches one in full is re-rolled.
    pub banned_patterns: Vec<String>,
}

impl Default for TextConstraints {
    fn default() -> Self {
        Self {
            comment: LengthBounds { min: 5, max: 200 },
            post: LengthBounds { min: 5, max: 200 },
            banned_patterns: Vec::new(),
        }
    }
}

impl TextConstraints {
    #[must_use]
    pub fn bounds(&self, kind: ItemKind) -> LengthBounds {
        match kind {
            ItemKind::Post => self.post,
            ItemKind::Comment => self.comment,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid banned pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid length bounds {min}..={max}")]
    Bounds { min: usize, max: usize },
    #[error("no acceptable replacement text after {0} attempts")]
    Exhausted(usize),
}

/// Produces word salad within the configured bounds.
///
/// The random source is injected so runs can be reproduced from a seed.
pub struct TextGenerator {
    constraints: TextConstraints,
    banned: Vec<Regex>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl std::fmt::Debug for TextGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextGenerator")
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

impl TextGenerator {
    /// Create a generator seeded from `seed`, or from OS entropy when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are empty or a banned pattern does not compile.
    pub fn new(constraints: TextConstraints, seed: Option<u64>) -> Result<Self, GenerationError> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(constraints, Box::new(rng))
    }

    /// Create a generator drawing from the given random source.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are empty or a banned pattern does not compile.
    pub fn with_rng(
        constraints: TextConstraints,
        rng: Box<dyn RngCore + Send>,
    ) -> Result<Self, GenerationError> {
        for bounds in [constraints.comment, constraints.post] {
            if bounds.min == 0 || bounds.max < bounds.min {
                return Err(GenerationError::Bounds {
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }

        let banned = constraints
            .banned_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                    GenerationError::Pattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            constraints,
            banned,
            rng: Mutex::new(rng),
        })
    }

    /// Generate replacement text for an item of `kind` whose current body is `original`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Exhausted`] if every candidate was rejected.
    pub fn generate(&self, kind: ItemKind, original: &str) -> Result<String, GenerationError> {
        let bounds = self.constraints.bounds(kind);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        for _ in 0..MAX_ROLLS {
            let candidate = roll(&mut **rng, bounds);
            if candidate == original || self.is_banned(&candidate) {
                continue;
            }
            return Ok(candidate);
        }

        Err(GenerationError::Exhausted(MAX_ROLLS))
    }

    fn is_banned(&self, text: &str) -> bool {
        self.banned.iter().any(|re| re.is_match(text))
    }
}

/// Draw one candidate of a random length within `bounds`.
fn roll(rng: &mut dyn RngCore, bounds: LengthBounds) -> String {
    let target = rng.gen_range(bounds.min..=bounds.max);
    let mut text = String::with_capacity(target + 16);

    while text.len() < target {
        if !text.is_empty() {
            text.push(' ');
        }
        let word = WORDS[rng.gen_range(0..WORDS.len())];
        if text.is_empty() {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                text.push(first.to_ascii_uppercase());
                text.push_str(chars.as_str());
            }
        } else {
            text.push_str(word);
        }
    }

    // Word list is ASCII, so byte length equals character count.
    text.truncate(target);
    if text.ends_with(' ') {
        text.pop();
        text.push(char::from(rng.gen_range(b'a'..=b'z')));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(min: usize, max: usize) -> TextConstraints {
        TextConstraints {
            comment: LengthBounds { min, max },
            post: LengthBounds { min: 50, max: 60 },
            banned_patterns: Vec::new(),
        }
    }

    #[test]
    fn test_length_within_bounds() {
        let generator = TextGenerator::new(constraints(5, 200), Some(1)).unwrap();
        for _ in 0..500 {
            let text = generator.generate(ItemKind::Comment, "hello world").unwrap();
            let len = text.chars().count();
            assert!((5..=200).contains(&len), "length {len} out of bounds");
            assert!(!text.trim().is_empty());
            assert_ne!(text, "hello world");
        }
    }

    #[test]
    fn test_kind_specific_bounds() {
        let generator = TextGenerator::new(constraints(5, 10), Some(2)).unwrap();
        for _ in 0..100 {
            let len = generator
                .generate(ItemKind::Post, "")
                .unwrap()
                .chars()
                .count();
            assert!((50..=60).contains(&len));
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let a = TextGenerator::new(constraints(5, 200), Some(42)).unwrap();
        let b = TextGenerator::new(constraints(5, 200), Some(42)).unwrap();
        for _ in 0..10 {
            assert_eq!(
                a.generate(ItemKind::Comment, "x").unwrap(),
                b.generate(ItemKind::Comment, "x").unwrap()
            );
        }
    }

    #[test]
    fn test_collision_with_original_is_rerolled() {
        let seeded = TextGenerator::new(constraints(5, 200), Some(9)).unwrap();
        let first = seeded.generate(ItemKind::Comment, "").unwrap();

        let again = TextGenerator::new(constraints(5, 200), Some(9)).unwrap();
        let second = again.generate(ItemKind::Comment, &first).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_banned_patterns_exhaust() {
        let mut c = constraints(5, 8);
        c.banned_patterns = vec![".*".to_string()];
        let generator = TextGenerator::new(c, Some(3)).unwrap();
        assert!(matches!(
            generator.generate(ItemKind::Comment, ""),
            Err(GenerationError::Exhausted(_))
        ));
    }

    #[test]
    fn test_banned_pattern_is_full_match() {
        let mut c = constraints(5, 200);
        // Would match a substring of nearly everything, but never a whole candidate.
        c.banned_patterns = vec!["a".to_string()];
        let generator = TextGenerator::new(c, Some(4)).unwrap();
        assert!(generator.generate(ItemKind::Comment, "").is_ok());
    }

    #[test]
    fn test_invalid_configuration() {
        let mut c = constraints(5, 200);
        c.banned_patterns = vec!["(".to_string()];
        assert!(matches!(
            TextGenerator::new(c, None),
            Err(GenerationError::Pattern { .. })
        ));
        assert!(matches!(
            TextGenerator::new(constraints(0, 10), None),
            Err(GenerationError::Bounds { .. })
        ));
    }

    #[test]
    fn test_single_length_bound() {
        let generator = TextGenerator::new(constraints(1, 1), Some(5)).unwrap();
        let text = generator.generate(ItemKind::Comment, "").unwrap();
        assert_eq!(text.len(), 1);
        assert!(text.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
