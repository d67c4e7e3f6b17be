//! JSON REST boundary for casegraph.
//!
//! Exposes an axum [`Router`] over the SQLite store, the ingest pipeline,
//! and the hybrid search service. Auth, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", casegraph_api::api_router(state))
//! ```

pub mod error;
pub mod indicators;
pub mod ingest;
pub mod search;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use casegraph_fanout::IngestPipeline;
use casegraph_search::{HybridSearchService, SemanticIndex};
use casegraph_store_sqlite::SqliteStore;

pub use error::ApiError;

/// Shared handler state. The semantic index stays generic so deployments
/// can swap the in-process lexical index for a vector backend.
pub struct ApiState<V> {
  pub store:    Arc<SqliteStore>,
  pub index:    Arc<V>,
  pub pipeline: Arc<IngestPipeline<SqliteStore>>,
  pub search:   Arc<HybridSearchService<SqliteStore, V>>,
}

impl<V> Clone for ApiState<V> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      index:    self.index.clone(),
      pipeline: self.pipeline.clone(),
      search:   self.search.clone(),
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router
/// regardless of its own state type.
pub fn api_router<V>(state: ApiState<V>) -> Router<()>
where
  V: SemanticIndex + 'static,
{
  Router::new()
    .route("/cases", post(ingest::create::<V>))
    .route("/search", post(search::handler::<V>))
    .route("/indicators/search", get(indicators::handler::<V>))
    .with_state(state)
}
