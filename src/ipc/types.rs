use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::filter::FacetSet;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Facet registry for the current filter session. Transient: cleared on
    /// workspace.select and filter.reset, never persisted.
    pub facets: FacetSet,
}
