//! Dialect translators.
//!
//! A [`Translator`] is the only place where vendor identity is allowed to
//! show. It classifies raw vendor errors into [`ErrorKind`] and renders the
//! DDL fragments whose spelling differs between products.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionDetails;
use crate::error::{DataAccessError, Error, ErrorKind, VendorError};
use crate::types::DataType;

mod db2;
mod derby;
mod postgres;

pub use db2::Db2Translator;
pub use derby::DerbyTranslator;
pub use postgres::PostgresTranslator;

/// Supported database products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Derby,
    Db2,
    Postgresql,
}

impl DbType {
    pub fn translator(self) -> Box<dyn Translator> {
        match self {
            DbType::Derby => Box::new(DerbyTranslator),
            DbType::Db2 => Box::new(Db2Translator),
            DbType::Postgresql => Box::new(PostgresTranslator),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbType::Derby => "derby",
            DbType::Db2 => "db2",
            DbType::Postgresql => "postgresql",
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "derby" => Ok(DbType::Derby),
            "db2" => Ok(DbType::Db2),
            "postgres" | "postgresql" => Ok(DbType::Postgresql),
            other => Err(Error::Unsupported(format!("database type: {other}"))),
        }
    }
}

/// Vendor-specific error classification and DDL rendering.
pub trait Translator: Send + Sync + fmt::Debug {
    fn db_type(&self) -> DbType;

    fn is_duplicate(&self, err: &VendorError) -> bool;

    fn is_already_exists(&self, err: &VendorError) -> bool;

    fn is_lock_timeout(&self, err: &VendorError) -> bool;

    fn is_deadlock(&self, err: &VendorError) -> bool;

    /// SQLSTATE class 08 is the connection exception class for every
    /// supported product.
    fn is_connection_error(&self, err: &VendorError) -> bool {
        err.sql_state().is_some_and(|state| state.starts_with("08"))
    }

    fn is_undefined_name(&self, err: &VendorError) -> bool;

    /// First match wins: deadlock, lock timeout, connection error,
    /// duplicate, already exists, undefined name, generic.
    fn classify(&self, err: &VendorError) -> ErrorKind {
        if self.is_deadlock(err) {
            ErrorKind::Deadlock
        } else if self.is_lock_timeout(err) {
            ErrorKind::LockTimeout
        } else if self.is_connection_error(err) {
            ErrorKind::ConnectionError
        } else if self.is_duplicate(err) {
            ErrorKind::Duplicate
        } else if self.is_already_exists(err) {
            ErrorKind::AlreadyExists
        } else if self.is_undefined_name(err) {
            ErrorKind::UndefinedName
        } else {
            ErrorKind::Generic
        }
    }

    fn translate(&self, err: VendorError) -> DataAccessError {
        let kind = self.classify(&err);
        DataAccessError::new(kind, err)
    }

    fn add_for_update(&self, sql: &str) -> String {
        format!("{sql} FOR UPDATE")
    }

    fn global_temp_table_name(&self, table_name: &str) -> String;

    fn create_global_temp_table(&self, ddl: &str) -> String;

    /// Seconds between two timestamp expressions, optionally aliased.
    fn timestamp_diff(&self, left: &str, right: &str, alias: Option<&str>) -> String;

    fn create_sequence(&self, qualified_name: &str, start: i64, cache: u32) -> String;

    fn drop_sequence(&self, qualified_name: &str) -> String {
        format!("DROP SEQUENCE {qualified_name}")
    }

    /// `None` when the product has no table maintenance command.
    fn reorg_table_command(&self, qualified_name: &str) -> Option<String>;

    fn column_type(&self, data_type: &DataType) -> String;

    /// `None` when the product has no row types.
    fn create_row_type(&self, qualified_name: &str, column_defs: &[String]) -> Option<String>;

    fn index_name(&self, schema: &str, index_name: &str) -> String {
        format!("{schema}.{index_name}")
    }

    /// Fill driver connection properties from the connection details.
    fn fill_properties(&self, props: &mut BTreeMap<String, String>, details: &ConnectionDetails);
}

pub(crate) fn with_alias(expr: String, alias: Option<&str>) -> String {
    match alias {
        Some(alias) if !alias.is_empty() => format!("{expr} AS {alias}"),
        _ => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flags every error as both a deadlock and a duplicate.
    #[derive(Debug)]
    struct AmbiguousTranslator;

    impl Translator for AmbiguousTranslator {
        fn db_type(&self) -> DbType {
            DbType::Derby
        }
        fn is_duplicate(&self, _err: &VendorError) -> bool {
            true
        }
        fn is_already_exists(&self, _err: &VendorError) -> bool {
            true
        }
        fn is_lock_timeout(&self, _err: &VendorError) -> bool {
            false
        }
        fn is_deadlock(&self, _err: &VendorError) -> bool {
            true
        }
        fn is_undefined_name(&self, _err: &VendorError) -> bool {
            true
        }
        fn global_temp_table_name(&self, table_name: &str) -> String {
            table_name.to_string()
        }
        fn create_global_temp_table(&self, ddl: &str) -> String {
            ddl.to_string()
        }
        fn timestamp_diff(&self, left: &str, right: &str, _alias: Option<&str>) -> String {
            format!("{right} - {left}")
        }
        fn create_sequence(&self, qualified_name: &str, _start: i64, _cache: u32) -> String {
            format!("CREATE SEQUENCE {qualified_name}")
        }
        fn reorg_table_command(&self, _qualified_name: &str) -> Option<String> {
            None
        }
        fn column_type(&self, _data_type: &DataType) -> String {
            "INT".to_string()
        }
        fn create_row_type(&self, _qualified_name: &str, _column_defs: &[String]) -> Option<String> {
            None
        }
        fn fill_properties(&self, _props: &mut BTreeMap<String, String>, _details: &ConnectionDetails) {}
    }

    #[test]
    fn deadlock_wins_over_duplicate() {
        let err = AmbiguousTranslator.translate(VendorError::new("both"));
        assert_eq!(err.kind(), ErrorKind::Deadlock);
    }

    #[test]
    fn parses_db_type_names() {
        assert_eq!("postgres".parse::<DbType>().unwrap(), DbType::Postgresql);
        assert_eq!("DB2".parse::<DbType>().unwrap(), DbType::Db2);
        assert!("oracle".parse::<DbType>().is_err());
    }

    #[test]
    fn every_translator_reports_its_type() {
        for db_type in [DbType::Derby, DbType::Db2, DbType::Postgresql] {
            assert_eq!(db_type.translator().db_type(), db_type);
        }
    }
}
