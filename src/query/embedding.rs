// Summary embeddings and similarity search

use anyhow::Result;
use tracing::{debug, warn};

/// Turns text into fixed-length vectors
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Local feature-hashing embedder: no model download, no network.
///
/// Tokens, token bigrams and character trigrams are hashed with blake3 into a
/// signed bucket; the result is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

const TOKEN_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.8;
const TRIGRAM_WEIGHT: f32 = 0.15;

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(16) }
    }

    fn add_feature(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let digest = blake3::hash(feature.as_bytes());
        let bytes = digest.as_bytes();
        let mut first = [0u8; 8];
        first.copy_from_slice(&bytes[..8]);
        let idx = (u64::from_le_bytes(first) % self.dim as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign * weight;
    }
}

/// Lowercased word tokens; camelCase and snake_case identifiers are split too
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut current = String::new();
        let mut previous_lower = false;
        for ch in word.chars() {
            if ch.is_uppercase() && previous_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current).to_lowercase());
            }
            previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
            current.push(ch);
        }
        if !current.is_empty() {
            tokens.push(current.to_lowercase());
        }
    }
    tokens
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vec = vec![0.0f32; self.dim];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Ok(vec);
        }

        for token in &tokens {
            self.add_feature(&mut vec, &format!("t:{}", token), TOKEN_WEIGHT);

            let padded: Vec<char> = format!("#{}#", token).chars().collect();
            for tri in padded.windows(3) {
                let trigram: String = tri.iter().collect();
                self.add_feature(&mut vec, &format!("c:{}", trigram), TRIGRAM_WEIGHT);
            }
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vec, &format!("b:{}_{}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        Ok(vec)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for i in 0..a.len().min(b.len()) {
        dot += a[i] * b[i];
        na += a[i] * a[i];
        nb += b[i] * b[i];
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// A retrieved entry and its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredName {
    pub name: String,
    pub score: f32,
}

/// Vectors keyed by summary name, in insertion order
#[derive(Debug, Clone, Default)]
pub struct EmbeddingIndex {
    entries: Vec<(String, Vec<f32>)>,
}

impl EmbeddingIndex {
    /// Embed every item; items that fail to embed are skipped
    pub fn build<'a, I>(embedder: &dyn Embedder, items: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries = Vec::new();
        for (name, text) in items {
            match embedder.embed(text) {
                Ok(vector) => entries.push((name.to_string(), vector)),
                Err(e) => warn!("Failed to embed summary {}: {}", name, e),
            }
        }
        debug!("Embedded {} summaries", entries.len());
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `n` entries by descending cosine similarity; ties keep insertion order
    pub fn search(&self, query: &[f32], n: usize) -> Vec<ScoredName> {
        let mut scored: Vec<ScoredName> = self
            .entries
            .iter()
            .map(|(name, vector)| ScoredName {
                name: name.clone(),
                score: cosine_similarity(query, vector),
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(n);
        scored
    }
}
