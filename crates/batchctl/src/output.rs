use serde::Serialize;
use std::io::{self, Write};
use warehouse::ResultSet;

#[derive(clap::Args, Clone, Debug, Default)]
pub struct Output {
    /// How to format CLI output
    #[clap(global = true, short, long, value_enum)]
    pub output: Option<OutputType>,
}

#[derive(clap::ValueEnum, Debug, Copy, Clone, PartialEq)]
pub enum OutputType {
    /// Format output as compact JSON with items separated by newlines
    Json,
    /// Format output as YAML
    Yaml,
    /// Format the output as a pretty-printed table
    Table,
}

/// A trait for things that can be output from the CLI as either JSON, YAML, or a table.
/// The body of this trait is focused on table output, since JSON and YAML are both handled
/// by `Serialize`.
pub trait CliOutput: Serialize {
    /// Allows threading through an alternate representation of table output.
    /// `type TableAlt = ();` is used to opt out of having an alternative representation.
    type TableAlt: Copy;
    /// The type output from `into_table_row`.
    type CellValue: Into<comfy_table::Cell>;

    /// Returns the column headers of the table.
    fn table_headers(alt: Self::TableAlt) -> Vec<&'static str>;

    /// Converts this item into a tablular representation. The returned cells must be in the
    /// same order as the `table_headers`.
    fn into_table_row(self, alt: Self::TableAlt) -> Vec<Self::CellValue>;
}

pub fn print_yaml(items: impl IntoIterator<Item = impl CliOutput>) -> anyhow::Result<()> {
    write_yaml(&mut io::stdout().lock(), items)
}

pub fn print_json(items: impl IntoIterator<Item = impl CliOutput>) -> anyhow::Result<()> {
    write_json(&mut io::stdout().lock(), items)
}

pub fn print_table<T: CliOutput>(
    alt: T::TableAlt,
    items: impl IntoIterator<Item = T>,
) -> anyhow::Result<()> {
    let mut table = crate::new_table(T::table_headers(alt));
    for item in items {
        table.add_row(item.into_table_row(alt));
    }
    write_lines(&mut io::stdout().lock(), &table)
}

/// Prints the rows of a query result. JSON and YAML render each row as an
/// object keyed on column name, while tables use the result's own columns.
pub fn print_result_set(ty: OutputType, result: &ResultSet) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    match ty {
        OutputType::Json => {
            for record in result.records() {
                serde_json::to_writer(&mut stdout, &record)?;
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
        OutputType::Yaml => {
            let records: Vec<_> = result.records().collect();
            serde_yaml::to_writer(&mut stdout, &records)?;
            stdout.write_all(b"\n")?;
            Ok(())
        }
        OutputType::Table => write_lines(&mut stdout, &result_table(result)),
    }
}

/// Prints a preview of CSV input to stderr.
pub fn print_preview(columns: &[String], rows: &[Vec<String>], total: usize) -> anyhow::Result<()> {
    let mut table = crate::new_table(columns.iter().map(String::as_str).collect());
    for row in rows {
        table.add_row(row.clone());
    }

    let mut stderr = io::stderr().lock();
    write_lines(&mut stderr, &table)?;
    writeln!(stderr, "({} of {total} rows)", rows.len())?;
    Ok(())
}

fn result_table(result: &ResultSet) -> comfy_table::Table {
    let mut table = crate::new_table(result.columns.iter().map(|c| c.name.as_str()).collect());
    for row in &result.rows {
        table.add_row(
            row.iter()
                .map(|value| value.as_deref().unwrap_or("NULL").to_string()),
        );
    }
    table
}

fn write_json<W: Write>(
    w: &mut W,
    items: impl IntoIterator<Item = impl CliOutput>,
) -> anyhow::Result<()> {
    for item in items {
        serde_json::to_writer(&mut *w, &item)?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

fn write_yaml<W: Write>(
    w: &mut W,
    items: impl IntoIterator<Item = impl CliOutput>,
) -> anyhow::Result<()> {
    for item in items {
        serde_yaml::to_writer(&mut *w, &item)?;
        w.write_all(b"\n")?;
    }
    Ok(())
}

fn write_lines<W: Write>(w: &mut W, table: &comfy_table::Table) -> anyhow::Result<()> {
    for line in table.lines() {
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
    }
    Ok(())
}
