use crate::JobId;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // Catalog and schema names are restricted to simple identifiers,
    // so they render identically whether or not they are quoted.
    static ref SIMPLE_IDENT_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Default schema into which job tables are staged.
pub const DEFAULT_SCHEMA: &str = "tmp";

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("{part} {value:?} is not a simple identifier (expected [A-Za-z_][A-Za-z0-9_]*)")]
pub struct NameError {
    pub part: &'static str,
    pub value: String,
}

/// Namespace is the optional catalog and required schema of staged tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    catalog: Option<String>,
    schema: String,
}

impl Namespace {
    pub fn new(catalog: Option<&str>, schema: &str) -> Result<Self, NameError> {
        if let Some(catalog) = catalog {
            check_ident("catalog", catalog)?;
        }
        check_ident("schema", schema)?;

        Ok(Self {
            catalog: catalog.map(str::to_string),
            schema: schema.to_string(),
        })
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            catalog: None,
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

fn check_ident(part: &'static str, value: &str) -> Result<(), NameError> {
    if SIMPLE_IDENT_RE.is_match(value) {
        Ok(())
    } else {
        Err(NameError {
            part,
            value: value.to_string(),
        })
    }
}

/// Quote `ident` as a backtick-delimited SQL identifier.
/// Embedded backticks are escaped by doubling them.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// TableRef is a fully-qualified reference to a remote table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(flatten)]
    pub namespace: Namespace,
    pub name: String,
}

impl TableRef {
    /// Render this reference for inclusion in SQL text, with every part quoted.
    pub fn to_sql(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(catalog) = self.namespace.catalog() {
            parts.push(quote_ident(catalog));
        }
        parts.push(quote_ident(self.namespace.schema()));
        parts.push(quote_ident(&self.name));
        parts.join(".")
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(catalog) = self.namespace.catalog() {
            write!(f, "{catalog}.")?;
        }
        write!(f, "{}.{}", self.namespace.schema(), self.name)
    }
}

/// Stage of a job's table lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Uploaded rows, staged verbatim.
    Raw,
    /// Raw rows plus the inference result column.
    Processed,
    /// Processed rows plus the evaluation column.
    Evaluated,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Raw, Stage::Processed, Stage::Evaluated];

    pub fn prefix(&self) -> &'static str {
        match self {
            Stage::Raw => "user_upload_",
            Stage::Processed => "user_upload_processed_",
            Stage::Evaluated => "user_upload_evaluated_",
        }
    }

    pub fn table_name(&self, id: &JobId) -> String {
        format!("{}{id}", self.prefix())
    }
}

/// Job is the descriptor of a single submission: its id, and the names of
/// every table in its lifecycle. Names are computed once, here, and never
/// re-derived from one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub raw: TableRef,
    pub processed: TableRef,
    pub evaluated: TableRef,
}

impl Job {
    pub fn new(id: JobId, namespace: &Namespace) -> Self {
        let table = |stage: Stage| TableRef {
            namespace: namespace.clone(),
            name: stage.table_name(&id),
        };
        Self {
            raw: table(Stage::Raw),
            processed: table(Stage::Processed),
            evaluated: table(Stage::Evaluated),
            id,
        }
    }

    pub fn table(&self, stage: Stage) -> &TableRef {
        match stage {
            Stage::Raw => &self.raw,
            Stage::Processed => &self.processed,
            Stage::Evaluated => &self.evaluated,
        }
    }

    /// Name of the staged upload file for this job, within a volume.
    pub fn upload_file_name(&self) -> String {
        format!("{}.csv", self.raw.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::JobIdGenerator;
    use std::collections::BTreeSet;
    use std::str::FromStr;

    #[test]
    fn test_job_table_names() {
        let job = Job::new(JobId::from_str("0a1b2c3d").unwrap(), &Namespace::default());

        assert_eq!(job.raw.to_string(), "tmp.user_upload_0a1b2c3d");
        assert_eq!(job.processed.to_string(), "tmp.user_upload_processed_0a1b2c3d");
        assert_eq!(job.evaluated.to_string(), "tmp.user_upload_evaluated_0a1b2c3d");
        assert_eq!(job.processed.to_sql(), "`tmp`.`user_upload_processed_0a1b2c3d`");
        assert_eq!(job.upload_file_name(), "user_upload_0a1b2c3d.csv");

        let ns = Namespace::new(Some("main"), "scratch").unwrap();
        let job = Job::new(job.id, &ns);
        assert_eq!(job.raw.to_string(), "main.scratch.user_upload_0a1b2c3d");
        assert_eq!(job.raw.to_sql(), "`main`.`scratch`.`user_upload_0a1b2c3d`");
    }

    #[test]
    fn test_evaluated_name_matches_processed_replacement() {
        let gen = JobIdGenerator::default();

        for _ in 0..100 {
            let job = Job::new(gen.next(), &Namespace::default());
            let processed = job.processed.to_string();

            assert_eq!(processed.matches("processed").count(), 1);
            assert_eq!(
                job.evaluated.to_string(),
                processed.replacen("processed", "evaluated", 1)
            );
        }
    }

    #[test]
    fn test_distinct_jobs_have_disjoint_tables() {
        let gen = JobIdGenerator::default();
        let (a, b) = (
            Job::new(gen.next(), &Namespace::default()),
            Job::new(gen.next(), &Namespace::default()),
        );
        assert_ne!(a.id, b.id);

        let names = |job: &Job| -> BTreeSet<String> {
            Stage::ALL.iter().map(|s| job.table(*s).to_string()).collect()
        };
        assert_eq!(names(&a).len(), 3);
        assert!(names(&a).is_disjoint(&names(&b)));
    }

    #[test]
    fn test_namespace_validation() {
        assert!(Namespace::new(None, "tmp").is_ok());
        assert_eq!(
            Namespace::new(None, "tmp; DROP TABLE x"),
            Err(NameError {
                part: "schema",
                value: "tmp; DROP TABLE x".to_string()
            })
        );
        assert!(Namespace::new(Some("a-b"), "tmp").is_err());
        assert!(Namespace::new(None, "9lives").is_err());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("text"), "`text`");
        assert_eq!(quote_ident("my column"), "`my column`");
        assert_eq!(quote_ident("a`b"), "`a``b`");
    }
}
