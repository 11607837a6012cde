//! Connections to the remote SQL engine which stages, infers, and stores
//! the tables of batch jobs.
//!
//! `Warehouse` is the seam through which every remote operation flows.
//! `Client` implements it over the engine's HTTP statement execution API,
//! and `MockWarehouse` implements it in memory for tests.
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod api;
mod auth;
mod client;
mod error;
pub mod mock;
mod settings;

pub use auth::{Credential, DELEGATED_TOKEN_HEADER};
pub use client::{Client, Connector};
pub use error::Error;
pub use mock::MockWarehouse;
pub use settings::{Settings, Volume};

/// Warehouse executes statements against, and uploads files into,
/// the remote engine under a single identity.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute a statement for its side effects, discarding any result rows.
    async fn execute(&self, statement: &Statement) -> Result<(), Error>;

    /// Execute a query and return its complete result set.
    async fn query(&self, statement: &Statement) -> Result<ResultSet, Error>;

    /// Upload `body` as the file at `path` of a durable storage volume,
    /// replacing any existing file.
    async fn upload(&self, path: &str, body: bytes::Bytes) -> Result<(), Error>;
}

/// Connect builds Warehouses for the privileged app identity,
/// and for delegated user identities.
pub trait Connect: Send + Sync {
    fn app(&self) -> Arc<dyn Warehouse>;
    fn delegated(&self, credential: Credential) -> Arc<dyn Warehouse>;
}

/// Statement is SQL text with named parameters. Parameters are referenced
/// in the text as `:name` markers, and are bound by the remote engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    /// Bind the STRING parameter `name` to `value`.
    pub fn bind(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            value: value.into(),
            type_name: "STRING".to_string(),
        });
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

/// ResultSet is the complete, ordered result of a query.
/// All values are in their string representation, and NULL is None.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    /// Iterate over rows as JSON objects keyed on column name.
    pub fn records(&self) -> impl Iterator<Item = serde_json::Map<String, serde_json::Value>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| {
                    let value = match value {
                        Some(v) => serde_json::Value::String(v.clone()),
                        None => serde_json::Value::Null,
                    };
                    (column.name.clone(), value)
                })
                .collect()
        })
    }
}
