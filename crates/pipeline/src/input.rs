use std::collections::BTreeSet;

/// InputError is a reason why uploaded data cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("upload is empty")]
    Empty,
    #[error("upload has no header row")]
    NoHeader,
    #[error("column {index} has an empty name")]
    EmptyColumnName { index: usize },
    #[error("column {0:?} appears more than once")]
    DuplicateColumn(String),
    #[error("column {column:?} does not exist (available columns: {})", available.join(", "))]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },
    #[error("column {0:?} is reserved for pipeline results")]
    ReservedColumn(String),
    #[error("malformed CSV")]
    Csv(#[from] csv::Error),
}

/// InputTable is uploaded tabular data having ordered, named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl InputTable {
    /// Parse CSV `bytes`, which must begin with a header row.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, InputError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(InputError::Empty);
        }
        // Strip a UTF-8 byte-order mark, which spreadsheet exports often carry.
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(InputError::NoHeader);
        }

        let mut seen = BTreeSet::new();
        let mut columns = Vec::with_capacity(headers.len());
        for (index, name) in headers.iter().enumerate() {
            if name.is_empty() {
                return Err(InputError::EmptyColumnName { index });
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(InputError::DuplicateColumn(name.to_string()));
            }
            columns.push(name.to_string());
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// The first `n` rows of the table.
    pub fn preview(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Return the canonical name of `column`, or an error if it doesn't exist.
    /// The remote engine resolves column names case-insensitively, and so do we.
    pub fn require_column(&self, column: &str) -> Result<&str, InputError> {
        resolve_column(&self.columns, column)
    }

    /// Render the table as normalized CSV, suitable for staging.
    pub fn to_csv(&self) -> Result<Vec<u8>, InputError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|err| InputError::Csv(csv::Error::from(err.into_error())))
    }
}

pub(crate) fn resolve_column<'c>(columns: &'c [String], column: &str) -> Result<&'c str, InputError> {
    columns
        .iter()
        .find(|c| c.as_str() == column)
        .or_else(|| columns.iter().find(|c| c.eq_ignore_ascii_case(column)))
        .map(String::as_str)
        .ok_or_else(|| InputError::UnknownColumn {
            column: column.to_string(),
            available: columns.to_vec(),
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_and_preview() {
        let table = InputTable::from_csv(
            b"\xEF\xBB\xBFid, text\n1,The cat sat.\n2,\"Hello, world\"\n3,\n",
        )
        .unwrap();

        assert_eq!(table.columns(), &["id", "text"]);
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.rows()[1][1], "Hello, world");
        assert_eq!(table.preview(2).len(), 2);
        assert_eq!(table.preview(10).len(), 3);

        assert_eq!(table.require_column("text").unwrap(), "text");
        assert_eq!(table.require_column("TEXT").unwrap(), "text");
        let err = table.require_column("body").unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"column "body" does not exist (available columns: id, text)"#
        );
    }

    #[test]
    fn test_header_only_is_an_empty_table() {
        let table = InputTable::from_csv(b"text\n").unwrap();
        assert_eq!(table.columns(), &["text"]);
        assert!(table.rows().is_empty());
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(InputTable::from_csv(b""), Err(InputError::Empty)));
        assert!(matches!(InputTable::from_csv(b" \n "), Err(InputError::Empty)));
        assert!(matches!(
            InputTable::from_csv(b"a,,c\n1,2,3\n"),
            Err(InputError::EmptyColumnName { index: 1 })
        ));
        assert!(matches!(
            InputTable::from_csv(b"text,Text\n1,2\n"),
            Err(InputError::DuplicateColumn(c)) if c == "Text"
        ));
        // Ragged records are rejected.
        assert!(matches!(
            InputTable::from_csv(b"a,b\n1,2\n3\n"),
            Err(InputError::Csv(_))
        ));
        // As is non-UTF-8 data.
        assert!(matches!(
            InputTable::from_csv(b"a\n\xff\xfe\n"),
            Err(InputError::Csv(_))
        ));
    }

    #[test]
    fn test_normalized_csv() {
        let table = InputTable::from_csv(b" id ,text\n1,\"Hello, world\"\n2,plain\n").unwrap();
        let csv = String::from_utf8(table.to_csv().unwrap()).unwrap();
        assert_eq!(csv, "id,text\n1,\"Hello, world\"\n2,plain\n");

        assert_eq!(InputTable::from_csv(csv.as_bytes()).unwrap(), table);
    }
}
