//! An in-memory Warehouse which records the calls made of it.
use crate::{Connect, Credential, Error, ResultSet, Statement, Warehouse};
use std::sync::{Arc, Mutex};

/// Call is a single recorded operation of a MockWarehouse.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute {
        identity: String,
        statement: Statement,
    },
    Query {
        identity: String,
        statement: Statement,
    },
    Upload {
        identity: String,
        path: String,
        body: bytes::Bytes,
    },
}

impl Call {
    pub fn identity(&self) -> &str {
        match self {
            Call::Execute { identity, .. }
            | Call::Query { identity, .. }
            | Call::Upload { identity, .. } => identity,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            Call::Execute { statement, .. } | Call::Query { statement, .. } => {
                Some(&statement.sql)
            }
            Call::Upload { .. } => None,
        }
    }
}

#[derive(Clone)]
enum Failure {
    // The statement or upload fails remotely.
    Fail(String),
    // The engine rejects the caller's credential.
    Deny(String),
}

impl Failure {
    fn into_error(self, statement_id: String, upload: bool) -> Error {
        match self {
            Failure::Deny(message) => Error::Authorization(message),
            Failure::Fail(body) if upload => Error::Api {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body,
            },
            Failure::Fail(message) => Error::Statement {
                statement_id,
                state: "FAILED".to_string(),
                error_code: None,
                message,
            },
        }
    }
}

// Calls whose SQL or path contains `needle` fail, optionally only
// for a single identity.
struct Scripted {
    identity: Option<String>,
    needle: String,
    failure: Failure,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    failures: Vec<Scripted>,
    // Queries containing the substring return the result set.
    results: Vec<(String, ResultSet)>,
}

/// MockWarehouse records every call it receives, and may be scripted to fail
/// statements or to return canned results. Clones share recorded state.
/// As a `Connect`, it hands out views of itself tagged by identity.
#[derive(Clone)]
pub struct MockWarehouse {
    identity: String,
    state: Arc<Mutex<State>>,
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            identity: "app".to_string(),
            state: Default::default(),
        }
    }

    /// Fail any statement whose SQL, or upload whose path, contains `needle`.
    pub fn fail_when(&self, needle: &str, message: &str) -> &Self {
        self.lock().failures.push(Scripted {
            identity: None,
            needle: needle.to_string(),
            failure: Failure::Fail(message.to_string()),
        });
        self
    }

    /// Reject calls of `identity` whose SQL or path contains `needle`,
    /// as the engine does for a credential lacking the required grants.
    pub fn deny_when(&self, identity: &str, needle: &str, message: &str) -> &Self {
        self.lock().failures.push(Scripted {
            identity: Some(identity.to_string()),
            needle: needle.to_string(),
            failure: Failure::Deny(message.to_string()),
        });
        self
    }

    /// Return `result` from any query whose SQL contains `needle`.
    pub fn respond_when(&self, needle: &str, result: ResultSet) -> &Self {
        self.lock().results.push((needle.to_string(), result));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn queries(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Query { .. }))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock means a test already panicked.
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    // Find the scripted failure of a call by this identity on `subject`.
    fn failure(&self, subject: &str, upload: bool) -> Result<(), Error> {
        let state = self.lock();
        let scripted = state.failures.iter().find(|s| {
            subject.contains(s.needle.as_str())
                && s.identity.as_ref().map_or(true, |id| *id == self.identity)
        });

        match scripted {
            Some(s) => Err(s
                .failure
                .clone()
                .into_error(format!("mock-{}", state.calls.len()), upload)),
            None => Ok(()),
        }
    }

    fn check(&self, statement: &Statement) -> Result<(), Error> {
        self.failure(&statement.sql, false)
    }
}

#[async_trait::async_trait]
impl Warehouse for MockWarehouse {
    async fn execute(&self, statement: &Statement) -> Result<(), Error> {
        self.lock().calls.push(Call::Execute {
            identity: self.identity.clone(),
            statement: statement.clone(),
        });
        self.check(statement)
    }

    async fn query(&self, statement: &Statement) -> Result<ResultSet, Error> {
        self.lock().calls.push(Call::Query {
            identity: self.identity.clone(),
            statement: statement.clone(),
        });
        self.check(statement)?;

        let state = self.lock();
        Ok(state
            .results
            .iter()
            .find(|(needle, _)| statement.sql.contains(needle.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }

    async fn upload(&self, path: &str, body: bytes::Bytes) -> Result<(), Error> {
        self.lock().calls.push(Call::Upload {
            identity: self.identity.clone(),
            path: path.to_string(),
            body,
        });
        self.failure(path, true)
    }
}

impl Connect for MockWarehouse {
    fn app(&self) -> Arc<dyn Warehouse> {
        Arc::new(self.clone())
    }

    fn delegated(&self, credential: Credential) -> Arc<dyn Warehouse> {
        let identity = match credential {
            Credential::Delegated(token) => format!("user:{token}"),
            other => other.kind().to_string(),
        };
        Arc::new(Self {
            identity,
            state: self.state.clone(),
        })
    }
}
