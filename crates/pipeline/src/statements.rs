//! Builders of the statements issued by each pipeline stage.
//!
//! Statement text crosses a trust boundary, and values reach it in one of
//! three ways:
//!
//! * Identifiers (tables and the user-selected column) are backtick-quoted.
//!   The column must also exist in the loaded input table.
//! * The model name and prompt templates are fixed constants of this crate.
//!   `ai_query` requires constant arguments, so they are embedded as escaped
//!   string literals.
//! * Anything else, such as the staged file path, is a bound parameter.
//!
//! Row values never pass through here: prompts are formatted row-wise by the
//! remote engine's `format_string`.
use batch_models::{quote_ident, TableRef, EVALUATION_TEMPLATE};
use warehouse::Statement;

/// Column added to processed tables, holding the inference result of each row.
pub const RESULT_COLUMN: &str = "ai_result";
/// Column added to evaluated tables, holding the evaluation of each result.
pub const EVALUATION_COLUMN: &str = "evaluation";

/// Quote `value` as a SQL string literal. Backslashes and single quotes are
/// escaped, as the engine treats backslash as an escape character.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Stage the CSV file at `source_path` as the table `raw`.
pub fn stage_raw(raw: &TableRef, source_path: &str) -> Statement {
    Statement::new(format!(
        "CREATE OR REPLACE TABLE {raw} AS\n\
         SELECT * FROM read_files(:source_path, format => 'csv', header => true)",
        raw = raw.to_sql(),
    ))
    .bind("source_path", source_path)
}

/// Create `target` as every row of `source`, plus a `result_column`
/// holding the model's response to `template` formatted with `column`.
fn create_with_inference(
    target: &TableRef,
    source: &TableRef,
    model: &str,
    template: &str,
    column: &str,
    result_column: &str,
) -> Statement {
    Statement::new(format!(
        "CREATE OR REPLACE TABLE {target} AS\n\
         SELECT\n  \
           *,\n  \
           ai_query(\n    \
             {model},\n    \
             format_string({template}, {column})\n  \
           ) AS {result_column}\n\
         FROM {source}",
        target = target.to_sql(),
        source = source.to_sql(),
        model = quote_literal(model),
        template = quote_literal(template),
        column = quote_ident(column),
        result_column = quote_ident(result_column),
    ))
}

/// Create `processed` by running `template` over `column` of `raw`.
pub fn infer(
    processed: &TableRef,
    raw: &TableRef,
    model: &str,
    template: &str,
    column: &str,
) -> Statement {
    create_with_inference(processed, raw, model, template, column, RESULT_COLUMN)
}

/// Read every row of `table`.
pub fn fetch(table: &TableRef) -> Statement {
    Statement::new(format!("SELECT * FROM {}", table.to_sql()))
}

/// Create `evaluated` by asking `model` to judge each result of `processed`.
pub fn evaluate(evaluated: &TableRef, processed: &TableRef, model: &str) -> Statement {
    create_with_inference(
        evaluated,
        processed,
        model,
        EVALUATION_TEMPLATE,
        RESULT_COLUMN,
        EVALUATION_COLUMN,
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use batch_models::{Job, Namespace, Task};

    fn job() -> Job {
        Job::new("0a1b2c3d".parse().unwrap(), &Namespace::default())
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal(r#"say "hi""#), r#"'say "hi"'"#);
        assert_eq!(quote_literal("it's"), r"'it\'s'");
        assert_eq!(quote_literal(r"a\b"), r"'a\\b'");
        assert_eq!(quote_literal(r"\'"), r"'\\\''");
    }

    #[test]
    fn test_stage_raw() {
        let stmt = stage_raw(&job().raw, "/Volumes/main/tmp/uploads/user_upload_0a1b2c3d.csv");

        insta::assert_snapshot!(&stmt.sql, @r###"
        CREATE OR REPLACE TABLE `tmp`.`user_upload_0a1b2c3d` AS
        SELECT * FROM read_files(:source_path, format => 'csv', header => true)
        "###);
        assert_eq!(
            stmt.parameter("source_path"),
            Some("/Volumes/main/tmp/uploads/user_upload_0a1b2c3d.csv")
        );
    }

    #[test]
    fn test_infer() {
        let job = job();
        let stmt = infer(
            &job.processed,
            &job.raw,
            "databricks-meta-llama-3-3-70b-instruct",
            Task::Summarization.template(),
            "text",
        );

        insta::assert_snapshot!(&stmt.sql, @r###"
        CREATE OR REPLACE TABLE `tmp`.`user_upload_processed_0a1b2c3d` AS
        SELECT
          *,
          ai_query(
            'databricks-meta-llama-3-3-70b-instruct',
            format_string('Summarize the following text: "%s"', `text`)
          ) AS `ai_result`
        FROM `tmp`.`user_upload_0a1b2c3d`
        "###);
        assert!(stmt.parameters.is_empty());
    }

    #[test]
    fn test_hostile_column_is_quoted() {
        let job = job();
        let stmt = infer(
            &job.processed,
            &job.raw,
            "m",
            Task::TopicClassification.template(),
            "x`) AS y FROM t; DROP TABLE z; --",
        );
        assert!(stmt
            .sql
            .contains("format_string('Classify the topic of: \"%s\"', `x``) AS y FROM t; DROP TABLE z; --`)"));
    }

    #[test]
    fn test_fetch_and_evaluate() {
        let job = job();
        assert_eq!(
            fetch(&job.processed).sql,
            "SELECT * FROM `tmp`.`user_upload_processed_0a1b2c3d`"
        );

        let stmt = evaluate(&job.evaluated, &job.processed, "m");
        insta::assert_snapshot!(&stmt.sql, @r###"
        CREATE OR REPLACE TABLE `tmp`.`user_upload_evaluated_0a1b2c3d` AS
        SELECT
          *,
          ai_query(
            'm',
            format_string('Evaluate this result: "%s". Is it accurate? Respond Yes/No with a brief explanation.', `ai_result`)
          ) AS `evaluation`
        FROM `tmp`.`user_upload_processed_0a1b2c3d`
        "###);
    }
}
