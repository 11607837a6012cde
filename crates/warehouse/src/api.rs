//! Wire types of the SQL statement execution API.
use crate::Parameter;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug)]
pub struct ExecuteRequest<'a> {
    pub warehouse_id: &'a str,
    pub statement: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    pub parameters: &'a [Parameter],
    pub wait_timeout: String,
    pub on_wait_timeout: &'static str,
    pub disposition: &'static str,
    pub format: &'static str,
}

fn is_empty(parameters: &&[Parameter]) -> bool {
    parameters.is_empty()
}

#[derive(Deserialize, Debug)]
pub struct StatementResponse {
    pub statement_id: String,
    pub status: StatementStatus,
    #[serde(default)]
    pub manifest: Option<Manifest>,
    #[serde(default)]
    pub result: Option<ResultChunk>,
}

#[derive(Deserialize, Debug)]
pub struct StatementStatus {
    pub state: String,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

impl StatementStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self.state.as_str(), "PENDING" | "RUNNING")
    }
    pub fn is_succeeded(&self) -> bool {
        self.state == "SUCCEEDED"
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ServiceError {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Manifest {
    pub schema: Schema,
}

#[derive(Deserialize, Debug)]
pub struct Schema {
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

#[derive(Deserialize, Debug)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(default)]
    pub type_name: Option<String>,
    pub position: usize,
}

#[derive(Deserialize, Debug, Default)]
pub struct ResultChunk {
    #[serde(default)]
    pub data_array: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub next_chunk_internal_link: Option<String>,
}
