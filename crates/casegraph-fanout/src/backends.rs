//! HTTP clients for the secondary stores.
//!
//! Both speak plain JSON over reqwest. The document store receives the
//! nested snapshot at `PUT {base}/{collection}/{case_id}`; the search
//! index receives an id-plus-fields upsert at
//! `POST {base}/indexes/{index}/documents`. Exact backend shapes are the
//! deployment's concern; the contract this crate enforces is that every
//! identifier written matches the primary store.

use async_trait::async_trait;
use casegraph_core::{
  fanout::{Backend, BackendError, SecondaryStore},
  snapshot::CaseSnapshot,
};
use serde_json::json;

fn transport(error: reqwest::Error) -> BackendError {
  BackendError::Transport(error.to_string())
}

fn check_status(response: reqwest::Response) -> Result<(), BackendError> {
  let status = response.status();
  if status.is_success() {
    Ok(())
  } else {
    Err(BackendError::Rejected(format!("http status {status}")))
  }
}

// ─── Document store ──────────────────────────────────────────────────────────

/// Writes the nested case snapshot into a JSON document store.
pub struct DocumentStoreClient {
  client:     reqwest::Client,
  base_url:   String,
  collection: String,
}

impl DocumentStoreClient {
  pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
    Self {
      client:     reqwest::Client::new(),
      base_url:   trim_slash(base_url.into()),
      collection: collection.into(),
    }
  }
}

#[async_trait]
impl SecondaryStore for DocumentStoreClient {
  fn backend(&self) -> Backend { Backend::DocumentStore }

  async fn write_case(
    &self,
    snapshot: &CaseSnapshot,
  ) -> Result<(), BackendError> {
    let url = format!(
      "{}/{}/{}",
      self.base_url, self.collection, snapshot.case_id
    );
    let response = self
      .client
      .put(&url)
      .json(snapshot)
      .send()
      .await
      .map_err(transport)?;
    check_status(response)
  }
}

// ─── Search index ────────────────────────────────────────────────────────────

/// Upserts a searchable rendition of the snapshot into a managed index.
pub struct SearchIndexClient {
  client:   reqwest::Client,
  base_url: String,
  index:    String,
}

impl SearchIndexClient {
  pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
    Self {
      client:   reqwest::Client::new(),
      base_url: trim_slash(base_url.into()),
      index:    index.into(),
    }
  }
}

#[async_trait]
impl SecondaryStore for SearchIndexClient {
  fn backend(&self) -> Backend { Backend::SearchIndex }

  async fn write_case(
    &self,
    snapshot: &CaseSnapshot,
  ) -> Result<(), BackendError> {
    let url = format!("{}/indexes/{}/documents", self.base_url, self.index);
    let body = json!({
      "id": snapshot.case_id,
      "fields": snapshot,
    });
    let response = self
      .client
      .post(&url)
      .json(&body)
      .send()
      .await
      .map_err(transport)?;
    check_status(response)
  }
}

fn trim_slash(mut url: String) -> String {
  while url.ends_with('/') {
    url.pop();
  }
  url
}

#[cfg(test)]
mod tests {
  use super::trim_slash;

  #[test]
  fn base_urls_are_normalized() {
    assert_eq!(trim_slash("http://docs:5984//".into()), "http://docs:5984");
    assert_eq!(trim_slash("http://docs:5984".into()), "http://docs:5984");
  }
}
