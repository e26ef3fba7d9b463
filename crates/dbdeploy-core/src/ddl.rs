//! Helpers shared by every DDL renderer.

use crate::dialect::Translator;
use crate::error::{Error, Result};
use crate::types::Column;

/// Longest identifier accepted; matches the width of the history table's
/// `SCHEMA_NAME` and `OBJECT_NAME` columns.
pub const MAX_NAME_LENGTH: usize = 64;

/// Reject anything that is not a plain SQL identifier.
///
/// Names are spliced into DDL text, so only `[A-Za-z_][A-Za-z0-9_]*` passes.
pub fn assert_valid_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_NAME_LENGTH {
        return Err(Error::InvalidModel(format!("invalid identifier: {name:?}")));
    }
    Ok(())
}

pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{schema}.{name}")
}

pub fn join_names(names: &[String]) -> String {
    names.join(", ")
}

/// Render `NAME TYPE [DEFAULT x] [NOT NULL]`.
pub fn column_definition(column: &Column, translator: &dyn Translator) -> String {
    let mut sql = format!(
        "{} {}",
        column.name,
        translator.column_type(&column.data_type)
    );
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

pub fn column_definitions(columns: &[Column], translator: &dyn Translator) -> Vec<String> {
    columns
        .iter()
        .map(|column| column_definition(column, translator))
        .collect()
}
