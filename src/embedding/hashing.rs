//! Deterministic feature-hashing embedder
//!
//! Bag of unigrams and bigrams, stop words removed, light suffix stemming,
//! each feature hashed into a signed bucket. Needs no model download and no
//! network, so it backs tests and offline deployments.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::core::EmbeddingProvider;
use crate::error::Result;
use crate::index::similarity::normalize;

const BIGRAM_WEIGHT: f32 = 0.5;

/// Common English words that carry no retrieval signal
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "can", "this", "that", "these", "those",
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
];

/// Local embedder based on the hashing trick
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing `dimensions`-component vectors
    pub fn new(dimensions: usize) -> Self {
        HashingEmbedder {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let terms = terms(text);
        let mut vector = vec![0.0f32; self.dimensions];

        for term in &terms {
            self.accumulate(&mut vector, term, 1.0);
        }
        for pair in terms.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// Lowercased, stemmed content words of `text`
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

fn stem(word: &str) -> String {
    let len = word.chars().count();
    if len > 5 && word.ends_with("ing") {
        word[..word.len() - 3].to_string()
    } else if len > 4 && word.ends_with("ed") {
        word[..word.len() - 2].to_string()
    } else if len > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
