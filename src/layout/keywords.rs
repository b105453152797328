//! Freeform keyword ("bubble") map
//!
//! Keywords spiral out from an anchor on the golden angle with a little
//! random jitter so the map does not look machine-ruled.

use emath::{Pos2, Vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::{spiral_position, SpiralConfig};

pub const DEFAULT_JITTER: f32 = 6.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub text: String,
    pub position: Pos2,
}

/// Keywords placed around a single anchor
#[derive(Debug, Clone)]
pub struct KeywordMap {
    anchor: Pos2,
    spiral: SpiralConfig,
    jitter: f32,
    keywords: Vec<Keyword>,
}

impl KeywordMap {
    pub fn new(anchor: Pos2) -> Self {
        Self {
            anchor,
            spiral: SpiralConfig::default(),
            jitter: DEFAULT_JITTER,
            keywords: Vec::new(),
        }
    }

    pub fn with_spiral(mut self, spiral: SpiralConfig) -> Self {
        self.spiral = spiral;
        self
    }

    pub fn with_jitter(mut self, jitter: f32) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Place a keyword; returns `None` if the same text is already on the map
    pub fn add<R: Rng + ?Sized>(&mut self, text: impl Into<String>, rng: &mut R) -> Option<&Keyword> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() || self.keywords.iter().any(|k| k.text == trimmed) {
            return None;
        }
        let base = spiral_position(self.anchor, self.keywords.len(), &self.spiral);
        let jitter = if self.jitter > 0.0 {
            Vec2::new(
                rng.gen_range(-self.jitter..=self.jitter),
                rng.gen_range(-self.jitter..=self.jitter),
            )
        } else {
            Vec2::ZERO
        };
        self.keywords.push(Keyword {
            text: trimmed.to_string(),
            position: base + jitter,
        });
        self.keywords.last()
    }

    pub fn remove(&mut self, text: &str) -> bool {
        let before = self.keywords.len();
        self.keywords.retain(|k| k.text != text);
        self.keywords.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_jitter_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut map = KeywordMap::new(Pos2::ZERO);
        for i in 0..20 {
            let placed = map.add(format!("kw{}", i), &mut rng).unwrap().position;
            let exact = spiral_position(Pos2::ZERO, i, &SpiralConfig::default());
            assert!((placed.x - exact.x).abs() <= DEFAULT_JITTER);
            assert!((placed.y - exact.y).abs() <= DEFAULT_JITTER);
        }
    }

    #[test]
    fn test_duplicates_and_blank_ignored() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut map = KeywordMap::new(Pos2::ZERO);
        assert!(map.add("rust", &mut rng).is_some());
        assert!(map.add(" rust ", &mut rng).is_none());
        assert!(map.add("   ", &mut rng).is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut map = KeywordMap::new(Pos2::new(10.0, 10.0)).with_jitter(0.0);
        let p = map.add("a", &mut rng).unwrap().position;
        assert_eq!(p, Pos2::new(130.0, 10.0));
        assert!(map.remove("a"));
        assert!(map.is_empty());
    }
}
