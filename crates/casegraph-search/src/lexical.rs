//! In-process lexical fallback for the semantic side of hybrid search.
//!
//! Scores documents by query-token overlap. Deliberately simple: this is
//! the rendition used in development and tests, and the seam a real
//! vector index plugs into in production.

use std::{
  collections::HashMap,
  sync::RwLock,
};

use async_trait::async_trait;
use casegraph_core::query::SemanticHit;

use crate::{Result, service::SemanticIndex};

pub fn tokenize(text: &str) -> Vec<String> {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|token| !token.is_empty())
    .map(str::to_lowercase)
    .collect()
}

/// Fraction of query tokens present in the document tokens.
pub fn overlap_score(query_tokens: &[String], doc_tokens: &[String]) -> f64 {
  if query_tokens.is_empty() {
    return 0.0;
  }
  let hits = query_tokens
    .iter()
    .filter(|token| doc_tokens.iter().any(|candidate| candidate == *token))
    .count();
  hits as f64 / query_tokens.len() as f64
}

/// Token index over case texts, keyed by case_id.
#[derive(Default)]
pub struct LexicalIndex {
  docs: RwLock<HashMap<String, Vec<String>>>,
}

impl LexicalIndex {
  pub fn new() -> Self { Self::default() }

  /// Index (or re-index) one case text.
  pub fn upsert(&self, case_id: &str, text: &str) {
    let tokens = tokenize(text);
    self
      .docs
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .insert(case_id.to_owned(), tokens);
  }

  pub fn len(&self) -> usize {
    self
      .docs
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .len()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl SemanticIndex for LexicalIndex {
  async fn index_case(&self, case_id: &str, text: &str) -> Result<()> {
    self.upsert(case_id, text);
    Ok(())
  }

  async fn query_similar(
    &self,
    text: &str,
    top_k: usize,
  ) -> Result<Vec<SemanticHit>> {
    let query_tokens = tokenize(text);
    let docs = self
      .docs
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut scored: Vec<(f64, String)> = docs
      .iter()
      .map(|(case_id, tokens)| {
        (overlap_score(&query_tokens, tokens), case_id.clone())
      })
      .filter(|(score, _)| *score > 0.0)
      .collect();

    scored.sort_by(|a, b| {
      b.0
        .partial_cmp(&a.0)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.1.cmp(&b.1))
    });
    scored.truncate(top_k);

    Ok(
      scored
        .into_iter()
        .map(|(score, case_id)| SemanticHit {
          case_id,
          similarity: Some(score),
          distance: None,
          snippet: None,
          metadata: Default::default(),
        })
        .collect(),
    )
  }
}
