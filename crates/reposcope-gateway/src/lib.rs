//! HTTP API for reposcope: search, assistant questions and re-indexing.

mod error;
mod handlers;
mod router;
mod server;
mod service;

pub use error::GatewayError;
pub use server::GatewayServer;
pub use service::{AnalyzerService, BoxFuture, IndexSummary, SearchResult};
