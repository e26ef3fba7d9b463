use std::collections::BTreeMap;

use super::{DbType, Translator, with_alias};
use crate::connection::ConnectionDetails;
use crate::error::VendorError;
use crate::types::DataType;

const SQLCODE_DEADLOCK_OR_TIMEOUT: i32 = -911;
const SQLCODE_DEADLOCK_OR_TIMEOUT_NO_ROLLBACK: i32 = -913;
const REASON_LOCK_TIMEOUT: i32 = 68;

/// Db2 LUW dialect. Classification uses SQLCODE plus the SQLERRMC reason.
#[derive(Debug, Clone, Copy, Default)]
pub struct Db2Translator;

impl Db2Translator {
    fn is_lock_failure(err: &VendorError) -> bool {
        matches!(
            err.code,
            Some(SQLCODE_DEADLOCK_OR_TIMEOUT) | Some(SQLCODE_DEADLOCK_OR_TIMEOUT_NO_ROLLBACK)
        )
    }
}

/// Extract the reason code from a message carrying `SQLERRMC=<n>`.
fn reason_code(message: &str) -> Option<i32> {
    let start = message.find("SQLERRMC=")? + "SQLERRMC=".len();
    let digits: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl Translator for Db2Translator {
    fn db_type(&self) -> DbType {
        DbType::Db2
    }

    fn is_duplicate(&self, err: &VendorError) -> bool {
        err.code == Some(-803) || err.sql_state() == Some("23505")
    }

    fn is_already_exists(&self, err: &VendorError) -> bool {
        err.code == Some(-601) || err.sql_state() == Some("42710")
    }

    fn is_lock_timeout(&self, err: &VendorError) -> bool {
        Self::is_lock_failure(err) && reason_code(&err.message) == Some(REASON_LOCK_TIMEOUT)
    }

    fn is_deadlock(&self, err: &VendorError) -> bool {
        Self::is_lock_failure(err) && reason_code(&err.message) != Some(REASON_LOCK_TIMEOUT)
    }

    fn is_connection_error(&self, err: &VendorError) -> bool {
        err.code == Some(-4499) || err.sql_state().is_some_and(|state| state.starts_with("08"))
    }

    fn is_undefined_name(&self, err: &VendorError) -> bool {
        err.code == Some(-204) || err.sql_state() == Some("42704")
    }

    fn global_temp_table_name(&self, table_name: &str) -> String {
        format!("SESSION.{table_name}")
    }

    fn create_global_temp_table(&self, ddl: &str) -> String {
        format!("DECLARE {ddl}")
    }

    fn timestamp_diff(&self, left: &str, right: &str, alias: Option<&str>) -> String {
        with_alias(format!("TIMESTAMPDIFF(2, CHAR({right} - {left}))"), alias)
    }

    fn create_sequence(&self, qualified_name: &str, start: i64, cache: u32) -> String {
        if cache > 1 {
            format!("CREATE SEQUENCE {qualified_name} AS BIGINT START WITH {start} CACHE {cache} NO CYCLE")
        } else {
            format!("CREATE SEQUENCE {qualified_name} AS BIGINT START WITH {start} NO CACHE NO CYCLE")
        }
    }

    fn reorg_table_command(&self, qualified_name: &str) -> Option<String> {
        Some(format!("CALL SYSPROC.ADMIN_CMD ('REORG TABLE {qualified_name}')"))
    }

    fn column_type(&self, data_type: &DataType) -> String {
        match data_type {
            DataType::Integer => "INT".to_string(),
            DataType::BigInt => "BIGINT".to_string(),
            DataType::Double => "DOUBLE".to_string(),
            DataType::Boolean => "BOOLEAN".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Varchar { length } => format!("VARCHAR({length} OCTETS)"),
            DataType::Char { length } => format!("CHAR({length} OCTETS)"),
            DataType::Clob => "CLOB(2147483647)".to_string(),
            DataType::Blob => "BLOB(2147483647)".to_string(),
        }
    }

    fn create_row_type(&self, qualified_name: &str, column_defs: &[String]) -> Option<String> {
        Some(format!(
            "CREATE OR REPLACE TYPE {qualified_name} AS ROW ({})",
            column_defs.join(", ")
        ))
    }

    fn fill_properties(&self, props: &mut BTreeMap<String, String>, details: &ConnectionDetails) {
        props.insert("user".to_string(), details.user.clone());
        props.insert("password".to_string(), details.password.clone());

        if details.ssl {
            props.insert("sslConnection".to_string(), "true".to_string());
        }

        // Automatic client reroute
        if details.ha {
            props.insert("enableClientAffinitiesList".to_string(), "1".to_string());
            props.insert("enableSeamlessFailover".to_string(), "1".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sqlcode(code: i32, message: &str) -> VendorError {
        VendorError::new(message).with_code(code)
    }

    #[test]
    fn splits_911_by_reason_code() {
        let tr = Db2Translator;
        let deadlock = sqlcode(-911, "DB2 SQL Error: SQLCODE=-911, SQLSTATE=40001, SQLERRMC=2");
        let timeout = sqlcode(-911, "DB2 SQL Error: SQLCODE=-911, SQLSTATE=40001, SQLERRMC=68");
        assert_eq!(tr.classify(&deadlock), ErrorKind::Deadlock);
        assert_eq!(tr.classify(&timeout), ErrorKind::LockTimeout);
    }

    #[test]
    fn classifies_catalog_errors() {
        let tr = Db2Translator;
        assert_eq!(tr.classify(&sqlcode(-803, "dup")), ErrorKind::Duplicate);
        assert_eq!(tr.classify(&sqlcode(-601, "exists")), ErrorKind::AlreadyExists);
        assert_eq!(tr.classify(&sqlcode(-204, "undefined")), ErrorKind::UndefinedName);
        assert_eq!(tr.classify(&sqlcode(-4499, "socket")), ErrorKind::ConnectionError);
        assert_eq!(tr.classify(&sqlcode(-104, "syntax")), ErrorKind::Generic);
    }

    #[test]
    fn reorg_and_cache_are_supported() {
        let tr = Db2Translator;
        assert_eq!(
            tr.reorg_table_command("FHIRDATA.PATIENT").as_deref(),
            Some("CALL SYSPROC.ADMIN_CMD ('REORG TABLE FHIRDATA.PATIENT')")
        );
        assert!(tr.create_sequence("S.SEQ", 1, 1000).contains("CACHE 1000"));
        assert!(tr.create_sequence("S.SEQ", 1, 0).contains("NO CACHE"));
    }

    #[test]
    fn ha_sets_client_reroute_properties() {
        let details = ConnectionDetails {
            ha: true,
            ..ConnectionDetails::default()
        };
        let mut props = BTreeMap::new();
        Db2Translator.fill_properties(&mut props, &details);
        assert_eq!(
            props.get("enableSeamlessFailover").map(String::as_str),
            Some("1")
        );
        assert!(!props.contains_key("sslConnection"));
    }

    #[test]
    fn declares_session_temp_tables() {
        let tr = Db2Translator;
        assert_eq!(tr.global_temp_table_name("ERASE_IDS"), "SESSION.ERASE_IDS");
        assert_eq!(
            tr.create_global_temp_table("GLOBAL TEMPORARY TABLE ERASE_IDS (ID BIGINT)"),
            "DECLARE GLOBAL TEMPORARY TABLE ERASE_IDS (ID BIGINT)"
        );
    }
}
