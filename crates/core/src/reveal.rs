use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    PayloadJson,
    Explanation,
}

impl Artifact {
    pub fn token_prefix(self) -> &'static str {
        match self {
            Self::PayloadJson => "stream",
            Self::Explanation => "explanation",
        }
    }

    /// Heading shown above snapshots of this artifact.
    pub fn label(self) -> &'static str {
        match self {
            Self::PayloadJson => "Campaign Payload",
            Self::Explanation => "Strategy Analysis",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        let prefix = token.split('-').next()?;
        [Self::PayloadJson, Self::Explanation]
            .into_iter()
            .find(|artifact| artifact.token_prefix() == prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealStep {
    /// Absolute unit index just consumed.
    pub index: usize,
    pub publish: bool,
    pub last: bool,
}

/// Unit-by-unit reveal of a fixed text. A unit is one grapheme cluster.
#[derive(Debug, Clone)]
pub struct Reveal {
    full: String,
    boundaries: Vec<usize>,
    position: usize,
    revealed: String,
    publish_every: usize,
}

impl Reveal {
    pub fn new(full: String, publish_every: usize) -> Self {
        Self::resume(full, 0, String::new(), publish_every)
    }

    /// Continue from `position`, appending to text already shown.
    pub fn resume(full: String, position: usize, revealed: String, publish_every: usize) -> Self {
        let boundaries = full
            .grapheme_indices(true)
            .map(|(offset, _)| offset)
            .chain(std::iter::once(full.len()))
            .collect::<Vec<_>>();
        let units = boundaries.len() - 1;

        Self {
            full,
            boundaries,
            position: position.min(units),
            revealed,
            publish_every: publish_every.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.len()
    }

    pub fn revealed(&self) -> &str {
        &self.revealed
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub fn into_revealed(self) -> String {
        self.revealed
    }

    pub fn advance(&mut self) -> Option<RevealStep> {
        if self.is_complete() {
            return None;
        }

        let index = self.position;
        let unit = &self.full[self.boundaries[index]..self.boundaries[index + 1]];
        self.revealed.push_str(unit);
        self.position += 1;

        let last = index + 1 == self.len();
        Some(RevealStep {
            index,
            publish: index % self.publish_every == 0 || last,
            last,
        })
    }
}
