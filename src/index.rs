use crate::error::{ReportError, Result};
use crate::segmenter::Section;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub trait Embedder {
    /// Backend name used in load reports and error messages.
    fn name(&self) -> &str;

    /// Embeds every text, returning one vector per input in the same order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(&[query])?
            .into_iter()
            .next()
            .ok_or_else(|| ReportError::EmbeddingUnavailable {
                backend: self.name().to_string(),
                reason: "backend returned no vector for the query".to_string(),
            })
    }
}

/// Offline embedder hashing character unigrams and bigrams into a fixed-width
/// bag, L2-normalized. Deterministic and dependency free, which keeps the
/// pipeline usable without a model download.
#[derive(Debug, Clone)]
pub struct NgramEmbedder {
    dimensions: usize,
}

impl Default for NgramEmbedder {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, gram: &[char]) -> usize {
        let mut hasher = DefaultHasher::new();
        gram.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        let mut vector = vec![0.0f32; self.dimensions];
        for window in chars.windows(1) {
            vector[self.bucket(window)] += 1.0;
        }
        // Bigrams carry most of the signal for CJK terms.
        for window in chars.windows(2) {
            vector[self.bucket(window)] += 2.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Embedder for NgramEmbedder {
    fn name(&self) -> &str {
        "char-ngram"
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSection {
    pub section: Section,
    /// L2 distance to the query; lower is more similar.
    pub score: f32,
}

impl ScoredSection {
    /// Maps distance onto (0, 1], where 1 is an exact match.
    pub fn relevance(&self) -> f32 {
        1.0 / (1.0 + self.score)
    }
}

/// Anything that can return ranked passages for a query.
pub trait Retriever {
    fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredSection>>;

    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Section>> {
        Ok(self
            .retrieve_scored(query, k)?
            .into_iter()
            .map(|hit| hit.section)
            .collect())
    }

    /// Up to `k` passages from the start of the document, for when no query matched.
    fn leading(&self, k: usize) -> Vec<Section>;
}

/// Section vectors ranked by L2 distance to the query; lower scores are closer.
pub struct SemanticIndex {
    sections: Vec<Section>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for SemanticIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticIndex")
            .field("sections", &self.sections.len())
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

impl SemanticIndex {
    /// Embeds every section once. Fails with `EmbeddingUnavailable` when the
    /// backend cannot produce vectors.
    pub fn build(sections: Vec<Section>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        info!(
            "Building semantic index over {} sections with '{}'",
            sections.len(),
            embedder.name()
        );

        let texts: Vec<&str> = sections.iter().map(|s| s.content.as_str()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed(&texts)?
        };

        if vectors.len() != sections.len() {
            return Err(ReportError::EmbeddingUnavailable {
                backend: embedder.name().to_string(),
                reason: format!(
                    "expected {} vectors, backend returned {}",
                    sections.len(),
                    vectors.len()
                ),
            });
        }

        Ok(Self {
            sections,
            vectors,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The `k` sections closest to `query`, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Section>> {
        Ok(self
            .search_with_score(query, k)?
            .into_iter()
            .map(|hit| hit.section)
            .collect())
    }

    pub fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<ScoredSection>> {
        if self.sections.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query)?;

        let mut ranked: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, l2_distance(&query_vector, v)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);

        debug!(
            "Query '{}' matched {} sections (best distance {:?})",
            query,
            ranked.len(),
            ranked.first().map(|r| r.1)
        );

        Ok(ranked
            .into_iter()
            .map(|(i, score)| ScoredSection {
                section: self.sections[i].clone(),
                score,
            })
            .collect())
    }
}

impl Retriever for SemanticIndex {
    fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<ScoredSection>> {
        self.search_with_score(query, k)
    }

    fn leading(&self, k: usize) -> Vec<Section> {
        self.sections
            .iter()
            .filter(|s| !s.is_empty())
            .take(k)
            .cloned()
            .collect()
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
