//! Tag Vectorizer
//!
//! TF-IDF model over problem tag documents (tags joined by spaces).
//!
//! # Weighting
//! - tokens: lowercase, `\b\w\w+\b`
//! - vocabulary: top `max_features` terms by total count, ties alphabetical,
//!   indexed alphabetically
//! - idf: `ln((1 + n) / (1 + df)) + 1`
//! - row: raw count × idf, L2-normalized
//!
//! The vocabulary is frozen at fit time so every transformed row has the
//! same dimensionality; refitting changes the meaning of every column.

use crate::utils::l2_normalize;
use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is a valid regex"));

#[derive(Debug, Error)]
pub enum VectorizerError {
    #[error("Empty vocabulary: documents contain no usable terms")]
    EmptyVocabulary,

    #[error("Invalid max_features: {0}")]
    InvalidMaxFeatures(usize),
}

pub type Result<T> = std::result::Result<T, VectorizerError>;

/// Fitted TF-IDF model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagVectorizer {
    max_features: usize,
    /// term -> column index (alphabetical order)
    vocabulary: BTreeMap<String, usize>,
    /// idf weight per column
    idf: Vec<f64>,
}

impl TagVectorizer {
    /// Fit the vocabulary and idf weights on a corpus of tag documents
    pub fn fit<S: AsRef<str>>(documents: &[S], max_features: usize) -> Result<Self> {
        if max_features == 0 {
            return Err(VectorizerError::InvalidMaxFeatures(max_features));
        }

        let n_documents = documents.len() as f64;
        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let tokens = tokenize(doc.as_ref());
            let unique: HashSet<&String> = tokens.iter().collect();
            for term in unique {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            for term in tokens {
                *term_counts.entry(term).or_insert(0) += 1;
            }
        }

        if term_counts.is_empty() {
            return Err(VectorizerError::EmptyVocabulary);
        }

        // BTreeMap iteration is alphabetical, so the stable sort keeps ties alphabetical
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);

        let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        let idf = terms
            .iter()
            .map(|term| {
                let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_documents) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term, idx))
            .collect();

        let vectorizer = Self {
            max_features,
            vocabulary,
            idf,
        };

        debug!(
            documents = documents.len(),
            vocabulary = vectorizer.dimension(),
            "Fitted tag vectorizer"
        );

        Ok(vectorizer)
    }

    /// One L2-normalized TF-IDF row per document
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Array2<f64> {
        let mut matrix = Array2::zeros((documents.len(), self.dimension()));

        for (row, doc) in documents.iter().enumerate() {
            for token in tokenize(doc.as_ref()) {
                if let Some(&col) = self.vocabulary.get(&token) {
                    matrix[[row, col]] += self.idf[col];
                }
            }
            l2_normalize(matrix.row_mut(row));
        }

        matrix
    }

    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vocabulary terms in column order
    pub fn terms(&self) -> Vec<&str> {
        let mut terms: Vec<(&str, usize)> = self
            .vocabulary
            .iter()
            .map(|(term, &idx)| (term.as_str(), idx))
            .collect();
        terms.sort_by_key(|(_, idx)| *idx);
        terms.into_iter().map(|(term, _)| term).collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}
