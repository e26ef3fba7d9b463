//! Persisted layout of the version ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constraints::PrimaryKey;
use crate::error::Result;
use crate::object::{DatabaseObject, ObjectType, TableBuilder};
use crate::types::Column;

pub const VERSION_HISTORY: &str = "VERSION_HISTORY";
pub const SCHEMA_NAME: &str = "SCHEMA_NAME";
pub const OBJECT_TYPE: &str = "OBJECT_TYPE";
pub const OBJECT_NAME: &str = "OBJECT_NAME";
pub const VERSION: &str = "VERSION";
pub const APPLIED: &str = "APPLIED";

const PK_VERSION_HISTORY: &str = "PK_VERSION_HISTORY";

/// The ledger table itself. Version `0`: it is deployed with plain `apply`
/// because every versioned lookup depends on it.
pub fn version_history_table(admin_schema: &str) -> Result<DatabaseObject> {
    TableBuilder::new(admin_schema, VERSION_HISTORY)
        .version(0)
        .column(Column::varchar(SCHEMA_NAME, 64, false))
        .column(Column::varchar(OBJECT_TYPE, 16, false))
        .column(Column::varchar(OBJECT_NAME, 64, false))
        .column(Column::integer(VERSION, false))
        .column(Column::timestamp(APPLIED, false))
        .primary_key(
            PK_VERSION_HISTORY,
            &[SCHEMA_NAME, OBJECT_TYPE, OBJECT_NAME, VERSION],
        )
        .build()
}

/// Snapshot key, `schema:type:name`.
pub fn ledger_key(schema: &str, object_type: ObjectType, name: &str) -> String {
    format!("{schema}:{object_type}:{name}")
}

/// One history row. Rows are appended, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRow {
    pub schema_name: String,
    pub object_type: ObjectType,
    pub object_name: String,
    pub version: i32,
    pub applied: DateTime<Utc>,
}

impl VersionRow {
    pub fn key(&self) -> String {
        ledger_key(&self.schema_name, self.object_type, &self.object_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresTranslator;

    #[test]
    fn history_table_is_untracked_with_four_part_key() {
        let table = version_history_table("FHIR_ADMIN").unwrap();
        assert_eq!(table.version(), 0);
        let ddl = table.create_statements(0, &PostgresTranslator);
        assert_eq!(
            ddl,
            vec![
                "CREATE TABLE FHIR_ADMIN.VERSION_HISTORY (SCHEMA_NAME VARCHAR(64) NOT NULL, OBJECT_TYPE VARCHAR(16) NOT NULL, OBJECT_NAME VARCHAR(64) NOT NULL, VERSION INTEGER NOT NULL, APPLIED TIMESTAMP NOT NULL, CONSTRAINT PK_VERSION_HISTORY PRIMARY KEY (SCHEMA_NAME, OBJECT_TYPE, OBJECT_NAME, VERSION))".to_string()
            ]
        );
    }

    #[test]
    fn key_joins_schema_type_and_name() {
        assert_eq!(
            ledger_key("FHIRDATA", ObjectType::Table, "PATIENT"),
            "FHIRDATA:TABLE:PATIENT"
        );
    }
}
