use std::collections::BTreeMap;

use tracing::warn;

use super::{DbType, Translator, with_alias};
use crate::connection::ConnectionDetails;
use crate::error::VendorError;
use crate::types::DataType;

/// Embedded dialect, used for tests and single-process deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct DerbyTranslator;

impl Translator for DerbyTranslator {
    fn db_type(&self) -> DbType {
        DbType::Derby
    }

    fn is_duplicate(&self, err: &VendorError) -> bool {
        err.sql_state() == Some("23505")
    }

    fn is_already_exists(&self, err: &VendorError) -> bool {
        err.sql_state() == Some("X0Y32") || err.sql_state() == Some("42710")
    }

    // Derby reports lock timeouts as deadlocks (40XL1).
    fn is_lock_timeout(&self, _err: &VendorError) -> bool {
        false
    }

    fn is_deadlock(&self, err: &VendorError) -> bool {
        matches!(err.sql_state(), Some("40XL1") | Some("40XL2"))
    }

    fn is_undefined_name(&self, err: &VendorError) -> bool {
        err.sql_state() == Some("42X05")
    }

    fn global_temp_table_name(&self, table_name: &str) -> String {
        format!("SESSION.{table_name}")
    }

    fn create_global_temp_table(&self, ddl: &str) -> String {
        format!("DECLARE {ddl}")
    }

    fn timestamp_diff(&self, left: &str, right: &str, alias: Option<&str>) -> String {
        with_alias(
            format!("{{fn timestampdiff(SQL_TSI_SECOND, {left}, {right})}}"),
            alias,
        )
    }

    // cache isn't supported
    fn create_sequence(&self, qualified_name: &str, start: i64, _cache: u32) -> String {
        format!("CREATE SEQUENCE {qualified_name} AS BIGINT START WITH {start}")
    }

    fn drop_sequence(&self, qualified_name: &str) -> String {
        format!("DROP SEQUENCE {qualified_name} RESTRICT")
    }

    fn reorg_table_command(&self, _qualified_name: &str) -> Option<String> {
        None
    }

    fn column_type(&self, data_type: &DataType) -> String {
        match data_type {
            DataType::Integer => "INT".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Varchar { length } => format!("VARCHAR({length})"),
            DataType::Char { length } => format!("CHAR({length})"),
            DataType::Clob => "CLOB".to_string(),
            DataType::Blob => "BLOB".to_string(),
        }
    }

    fn create_row_type(&self, _qualified_name: &str, _column_defs: &[String]) -> Option<String> {
        None
    }

    fn fill_properties(&self, props: &mut BTreeMap<String, String>, details: &ConnectionDetails) {
        props.insert("user".to_string(), details.user.clone());
        props.insert("password".to_string(), details.password.clone());

        if details.ssl {
            props.insert("sslConnection".to_string(), "true".to_string());
        }

        if details.ha {
            warn!("No HA support for Derby");
        }
    }
}
