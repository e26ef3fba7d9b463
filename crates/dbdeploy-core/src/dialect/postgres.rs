use std::collections::BTreeMap;

use tracing::warn;

use super::{DbType, Translator, with_alias};
use crate::connection::ConnectionDetails;
use crate::error::VendorError;
use crate::types::DataType;

/// PostgreSQL dialect, classified by SQLSTATE.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresTranslator;

impl Translator for PostgresTranslator {
    fn db_type(&self) -> DbType {
        DbType::Postgresql
    }

    fn is_duplicate(&self, err: &VendorError) -> bool {
        err.sql_state() == Some("23505")
    }

    fn is_already_exists(&self, err: &VendorError) -> bool {
        matches!(
            err.sql_state(),
            Some("42P07") | Some("42710") | Some("42P06") | Some("42723")
        )
    }

    fn is_lock_timeout(&self, err: &VendorError) -> bool {
        err.sql_state() == Some("55P03")
    }

    fn is_deadlock(&self, err: &VendorError) -> bool {
        err.sql_state() == Some("40P01")
    }

    fn is_connection_error(&self, err: &VendorError) -> bool {
        err.sql_state()
            .is_some_and(|state| state.starts_with("08") || state == "57P01")
    }

    fn is_undefined_name(&self, err: &VendorError) -> bool {
        matches!(
            err.sql_state(),
            Some("42P01") | Some("42704") | Some("42883") | Some("3F000")
        )
    }

    // Temporary tables live in the session's own pg_temp schema.
    fn global_temp_table_name(&self, table_name: &str) -> String {
        table_name.to_string()
    }

    fn create_global_temp_table(&self, ddl: &str) -> String {
        format!("CREATE {ddl}")
    }

    fn timestamp_diff(&self, left: &str, right: &str, alias: Option<&str>) -> String {
        with_alias(format!("EXTRACT(EPOCH FROM ({right} - {left}))"), alias)
    }

    fn create_sequence(&self, qualified_name: &str, start: i64, cache: u32) -> String {
        if cache > 1 {
            format!("CREATE SEQUENCE {qualified_name} AS BIGINT START WITH {start} CACHE {cache}")
        } else {
            format!("CREATE SEQUENCE {qualified_name} AS BIGINT START WITH {start}")
        }
    }

    fn reorg_table_command(&self, _qualified_name: &str) -> Option<String> {
        None
    }

    fn column_type(&self, data_type: &DataType) -> String {
        match data_type {
            DataType::Integer => "INTEGER".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Double => "DOUBLE PRECISION".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Varchar { length } => format!("VARCHAR({length})"),
            DataType::Char { length } => format!("CHAR({length})"),
            DataType::Clob => "TEXT".to_string(),
            DataType::Blob => "BYTEA".to_string(),
        }
    }

    fn create_row_type(&self, qualified_name: &str, column_defs: &[String]) -> Option<String> {
        Some(format!(
            "CREATE TYPE {qualified_name} AS ({})",
            column_defs.join(", ")
        ))
    }

    // An index is always created in the schema of its table.
    fn index_name(&self, _schema: &str, index_name: &str) -> String {
        index_name.to_string()
    }

    fn fill_properties(&self, props: &mut BTreeMap<String, String>, details: &ConnectionDetails) {
        props.insert("user".to_string(), details.user.clone());
        props.insert("password".to_string(), details.password.clone());

        if details.ssl {
            props.insert("sslmode".to_string(), "require".to_string());
        }

        if details.ha {
            warn!("No HA support for PostgreSQL");
        }
    }
}
