//! Versioned database objects and their DDL.
//!
//! Every deployable unit is a [`DatabaseObject`]: a shared header (identity,
//! version, tags, privileges, dependency edges) plus one [`ObjectBody`]
//! variant. Objects never reference each other directly; dependency edges
//! and group members are [`ObjectId`] handles into the owning
//! [`PhysicalModel`](crate::graph::PhysicalModel).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constraints::{ForeignKey, IndexDef, PrimaryKey};
use crate::ddl::{assert_valid_name, column_definition, column_definitions, join_names, qualified_name};
use crate::dialect::Translator;
use crate::error::{Error, Result};
use crate::types::{Column, Privilege};

/// Stable handle of an object inside its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub(crate) usize);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of deployable object, as recorded in the version ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Table,
    Type,
    Sequence,
    View,
    Index,
    Group,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Table => "TABLE",
            ObjectType::Type => "TYPE",
            ObjectType::Sequence => "SEQUENCE",
            ObjectType::View => "VIEW",
            ObjectType::Index => "INDEX",
            ObjectType::Group => "GROUP",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "TABLE" => Ok(ObjectType::Table),
            "TYPE" => Ok(ObjectType::Type),
            "SEQUENCE" => Ok(ObjectType::Sequence),
            "VIEW" => Ok(ObjectType::View),
            "INDEX" => Ok(ObjectType::Index),
            "GROUP" => Ok(ObjectType::Group),
            other => Err(Error::InvalidModel(format!("unknown object type: {other}"))),
        }
    }
}

/// Identity of an object: `(object type, object name)`, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub object_type: ObjectType,
    pub name: String,
}

impl ObjectKey {
    pub fn new(object_type: ObjectType, name: impl Into<String>) -> Self {
        Self {
            object_type,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.name)
    }
}

/// Parses the `TYPE:NAME` form used in definitions and logs.
impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let (object_type, name) = value
            .split_once(':')
            .ok_or_else(|| Error::InvalidModel(format!("expected TYPE:NAME, got {value:?}")))?;
        Ok(ObjectKey::new(object_type.parse()?, name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowType {
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub start: i64,
    pub cache: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub table: String,
    pub definition: IndexDef,
}

/// Ordered members sharing one deployment slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub members: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    Table(Table),
    RowType(RowType),
    Sequence(Sequence),
    View(View),
    Index(Index),
    Group(Group),
}

impl ObjectBody {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBody::Table(_) => ObjectType::Table,
            ObjectBody::RowType(_) => ObjectType::Type,
            ObjectBody::Sequence(_) => ObjectType::Sequence,
            ObjectBody::View(_) => ObjectType::View,
            ObjectBody::Index(_) => ObjectType::Index,
            ObjectBody::Group(_) => ObjectType::Group,
        }
    }
}

/// A versioned unit of deployable schema.
///
/// Equality and hashing of the graph use [`ObjectKey`] only; `version == 0`
/// means the object is not tracked in the version ledger.
#[derive(Debug, Clone)]
pub struct DatabaseObject {
    schema_name: String,
    key: ObjectKey,
    version: i32,
    tags: BTreeMap<String, String>,
    privileges: BTreeMap<String, BTreeSet<Privilege>>,
    pub(crate) dependencies: BTreeSet<ObjectId>,
    body: ObjectBody,
}

impl PartialEq for DatabaseObject {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DatabaseObject {}

impl DatabaseObject {
    pub fn new(
        schema_name: impl Into<String>,
        name: impl Into<String>,
        version: i32,
        body: ObjectBody,
    ) -> Result<Self> {
        let schema_name = schema_name.into();
        let name = name.into();
        assert_valid_name(&schema_name)?;
        assert_valid_name(&name)?;
        if version < 0 {
            return Err(Error::InvalidModel(format!(
                "negative version {version} for {name}"
            )));
        }

        let key = ObjectKey::new(body.object_type(), name);
        validate_body(&key, &body)?;

        Ok(Self {
            schema_name,
            key,
            version,
            tags: BTreeMap::new(),
            privileges: BTreeMap::new(),
            dependencies: BTreeSet::new(),
            body,
        })
    }

    pub fn sequence(schema: &str, name: &str, version: i32, start: i64, cache: u32) -> Result<Self> {
        Self::new(schema, name, version, ObjectBody::Sequence(Sequence { start, cache }))
    }

    pub fn row_type(schema: &str, name: &str, version: i32, columns: Vec<Column>) -> Result<Self> {
        Self::new(schema, name, version, ObjectBody::RowType(RowType { columns }))
    }

    pub fn view(schema: &str, name: &str, version: i32, query: impl Into<String>) -> Result<Self> {
        Self::new(
            schema,
            name,
            version,
            ObjectBody::View(View {
                query: query.into(),
            }),
        )
    }

    pub fn index(schema: &str, table: &str, version: i32, definition: IndexDef) -> Result<Self> {
        let name = definition.name.clone();
        Self::new(
            schema,
            name,
            version,
            ObjectBody::Index(Index {
                table: table.to_string(),
                definition,
            }),
        )
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn object_type(&self) -> ObjectType {
        self.key.object_type
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn body(&self) -> &ObjectBody {
        &self.body
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(&self.schema_name, &self.key.name)
    }

    /// `TYPE:NAME`, used in every log line about this object.
    pub fn type_and_name(&self) -> String {
        self.key.to_string()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn add_tag(&mut self, tag_group: impl Into<String>, tag_value: impl Into<String>) {
        self.tags.insert(tag_group.into(), tag_value.into());
    }

    pub fn add_tags(&mut self, tags: impl IntoIterator<Item = (String, String)>) {
        self.tags.extend(tags);
    }

    /// Register the privileges a named privilege group receives on grant.
    pub fn add_privileges(&mut self, group: impl Into<String>, privileges: impl IntoIterator<Item = Privilege>) {
        self.privileges
            .entry(group.into())
            .or_default()
            .extend(privileges);
    }

    pub fn privileges(&self, group: &str) -> Option<&BTreeSet<Privilege>> {
        self.privileges.get(group)
    }

    /// Direct dependency edges.
    pub fn dependencies(&self) -> &BTreeSet<ObjectId> {
        &self.dependencies
    }

    /// Append the direct dependencies to `out`.
    pub fn fetch_dependencies_to(&self, out: &mut Vec<ObjectId>) {
        out.extend(self.dependencies.iter().copied());
    }

    pub fn is_group(&self) -> bool {
        matches!(self.body, ObjectBody::Group(_))
    }

    pub fn members(&self) -> &[ObjectId] {
        match &self.body {
            ObjectBody::Group(group) => &group.members,
            _ => &[],
        }
    }

    /// DDL to bring this object from `prior_version` to its own version.
    ///
    /// Tables at `prior_version > 0` only receive the columns introduced
    /// after it. Columns whose `since` is ahead of the object's version are
    /// left out until that version is deployed. Groups render nothing; their members carry the DDL.
    pub fn create_statements(&self, prior_version: i32, translator: &dyn Translator) -> Vec<String> {
        let qname = self.qualified_name();
        match &self.body {
            ObjectBody::Table(table) if prior_version > 0 => {
                self.alter_table_statements(table, prior_version, translator)
            }
            ObjectBody::Table(table) => {
                let mut statements = vec![self.create_table_statement(table, translator)];
                for index in &table.indexes {
                    statements.push(create_index_statement(
                        translator,
                        &self.schema_name,
                        &qname,
                        index,
                    ));
                }
                statements
            }
            ObjectBody::RowType(row_type) => {
                let columns = column_definitions(&row_type.columns, translator);
                match translator.create_row_type(&qname, &columns) {
                    Some(ddl) => vec![ddl],
                    None => {
                        tracing::warn!(
                            object = %self.type_and_name(),
                            dialect = %translator.db_type(),
                            "row types not supported, skipping"
                        );
                        Vec::new()
                    }
                }
            }
            ObjectBody::Sequence(sequence) => {
                vec![translator.create_sequence(&qname, sequence.start, sequence.cache)]
            }
            ObjectBody::View(view) => vec![format!("CREATE VIEW {qname} AS {}", view.query)],
            ObjectBody::Index(index) => {
                let table = qualified_name(&self.schema_name, &index.table);
                vec![create_index_statement(
                    translator,
                    &self.schema_name,
                    &table,
                    &index.definition,
                )]
            }
            ObjectBody::Group(_) => Vec::new(),
        }
    }

    pub fn drop_statements(&self, translator: &dyn Translator) -> Vec<String> {
        let qname = self.qualified_name();
        match &self.body {
            ObjectBody::Table(_) => vec![format!("DROP TABLE {qname}")],
            ObjectBody::RowType(_) => {
                if translator.create_row_type(&qname, &[]).is_some() {
                    vec![format!("DROP TYPE {qname}")]
                } else {
                    Vec::new()
                }
            }
            ObjectBody::Sequence(_) => vec![translator.drop_sequence(&qname)],
            ObjectBody::View(_) => vec![format!("DROP VIEW {qname}")],
            ObjectBody::Index(index) => vec![format!(
                "DROP INDEX {}",
                qualified_name(&self.schema_name, &index.definition.name)
            )],
            ObjectBody::Group(_) => Vec::new(),
        }
    }

    /// `GRANT` for the privileges registered under `group`; types and
    /// indexes have nothing to grant.
    pub fn grant_statements(&self, group: &str, grantee: &str) -> Result<Vec<String>> {
        assert_valid_name(grantee)?;
        let Some(privileges) = self.privileges.get(group) else {
            return Ok(Vec::new());
        };
        if privileges.is_empty() {
            return Ok(Vec::new());
        }

        let target = match &self.body {
            ObjectBody::Table(_) | ObjectBody::View(_) => format!("TABLE {}", self.qualified_name()),
            ObjectBody::Sequence(_) => format!("SEQUENCE {}", self.qualified_name()),
            ObjectBody::RowType(_) | ObjectBody::Index(_) | ObjectBody::Group(_) => {
                return Ok(Vec::new());
            }
        };

        let privs: Vec<&str> = privileges.iter().map(|p| p.as_sql()).collect();
        Ok(vec![format!(
            "GRANT {} ON {target} TO {grantee}",
            privs.join(", ")
        )])
    }

    fn create_table_statement(&self, table: &Table, translator: &dyn Translator) -> String {
        let columns: Vec<Column> = table
            .columns
            .iter()
            .filter(|column| column.since <= self.version)
            .cloned()
            .collect();
        let mut parts = column_definitions(&columns, translator);

        if let Some(pk) = &table.primary_key {
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                pk.name,
                join_names(&pk.columns)
            ));
        }

        for fk in &table.foreign_keys {
            let schema = fk.referenced_schema.as_deref().unwrap_or(&self.schema_name);
            parts.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                fk.name,
                join_names(&fk.columns),
                qualified_name(schema, &fk.referenced_table),
                join_names(&fk.referenced_columns),
                fk.on_delete.as_sql()
            ));
        }

        format!(
            "CREATE TABLE {} ({})",
            self.qualified_name(),
            parts.join(", ")
        )
    }

    fn alter_table_statements(&self, table: &Table, prior_version: i32, translator: &dyn Translator) -> Vec<String> {
        let qname = self.qualified_name();
        let mut statements: Vec<String> = table
            .columns
            .iter()
            .filter(|column| column.since > prior_version && column.since <= self.version)
            .map(|column| {
                format!(
                    "ALTER TABLE {qname} ADD COLUMN {}",
                    column_definition(column, translator)
                )
            })
            .collect();

        if !statements.is_empty() {
            if let Some(reorg) = translator.reorg_table_command(&qname) {
                statements.push(reorg);
            }
        }
        statements
    }
}

fn create_index_statement(
    translator: &dyn Translator,
    schema: &str,
    table_qname: &str,
    index: &IndexDef,
) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    format!(
        "CREATE {unique}INDEX {} ON {table_qname} ({})",
        translator.index_name(schema, &index.name),
        join_names(&index.columns)
    )
}

fn validate_body(key: &ObjectKey, body: &ObjectBody) -> Result<()> {
    let columns = match body {
        ObjectBody::Table(table) => &table.columns,
        ObjectBody::RowType(row_type) => &row_type.columns,
        ObjectBody::Index(index) => {
            assert_valid_name(&index.table)?;
            for column in &index.definition.columns {
                assert_valid_name(column)?;
            }
            return Ok(());
        }
        ObjectBody::Sequence(_) | ObjectBody::View(_) | ObjectBody::Group(_) => return Ok(()),
    };

    if columns.is_empty() {
        return Err(Error::InvalidModel(format!("{key} has no columns")));
    }

    let mut names = BTreeSet::new();
    for column in columns {
        assert_valid_name(&column.name)?;
        if !names.insert(column.name.as_str()) {
            return Err(Error::InvalidModel(format!(
                "duplicate column name: {key}.{}",
                column.name
            )));
        }
    }

    if let ObjectBody::Table(table) = body {
        let mut referenced: Vec<(&str, &Vec<String>)> = Vec::new();
        if let Some(pk) = &table.primary_key {
            assert_valid_name(&pk.name)?;
            referenced.push(("primary key", &pk.columns));
        }
        for fk in &table.foreign_keys {
            assert_valid_name(&fk.name)?;
            assert_valid_name(&fk.referenced_table)?;
            if let Some(schema) = &fk.referenced_schema {
                assert_valid_name(schema)?;
            }
            for column in &fk.referenced_columns {
                assert_valid_name(column)?;
            }
            referenced.push(("foreign key", &fk.columns));
        }
        for index in &table.indexes {
            assert_valid_name(&index.name)?;
            referenced.push(("index", &index.columns));
        }

        for (what, columns) in referenced {
            for column in columns {
                if !names.contains(column.as_str()) {
                    return Err(Error::InvalidModel(format!(
                        "{what} column not found: {key}.{column}"
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Fluent construction of a [`Table`] object.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    schema_name: String,
    table_name: String,
    version: i32,
    table: Table,
    tags: Vec<(String, String)>,
    privileges: Vec<(String, Vec<Privilege>)>,
}

impl TableBuilder {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            version: 1,
            table: Table {
                columns: Vec::new(),
                primary_key: None,
                foreign_keys: Vec::new(),
                indexes: Vec::new(),
            },
            tags: Vec::new(),
            privileges: Vec::new(),
        }
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.table.columns.push(column);
        self
    }

    pub fn varchar_column(self, name: &str, length: u32, nullable: bool) -> Self {
        self.column(Column::varchar(name, length, nullable))
    }

    pub fn int_column(self, name: &str, nullable: bool) -> Self {
        self.column(Column::integer(name, nullable))
    }

    pub fn bigint_column(self, name: &str, nullable: bool) -> Self {
        self.column(Column::bigint(name, nullable))
    }

    pub fn timestamp_column(self, name: &str, nullable: bool) -> Self {
        self.column(Column::timestamp(name, nullable))
    }

    pub fn primary_key(mut self, name: &str, columns: &[&str]) -> Self {
        self.table.primary_key = Some(PrimaryKey {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.table.foreign_keys.push(foreign_key);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.table.indexes.push(index);
        self
    }

    pub fn tag(mut self, tag_group: &str, tag_value: &str) -> Self {
        self.tags.push((tag_group.to_string(), tag_value.to_string()));
        self
    }

    pub fn privileges(mut self, group: &str, privileges: &[Privilege]) -> Self {
        self.privileges.push((group.to_string(), privileges.to_vec()));
        self
    }

    pub fn build(self) -> Result<DatabaseObject> {
        let mut object = DatabaseObject::new(
            self.schema_name,
            self.table_name,
            self.version,
            ObjectBody::Table(self.table),
        )?;
        object.add_tags(self.tags);
        for (group, privileges) in self.privileges {
            object.add_privileges(group, privileges);
        }
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::FkAction;
    use crate::dialect::{Db2Translator, DerbyTranslator, PostgresTranslator};

    fn patient(version: i32) -> DatabaseObject {
        TableBuilder::new("FHIRDATA", "PATIENT")
            .version(version)
            .bigint_column("ID", false)
            .varchar_column("NAME", 64, true)
            .column(Column::timestamp("LAST_UPDATED", true).since(2))
            .primary_key("PK_PATIENT", &["ID"])
            .index(IndexDef {
                name: "IDX_PATIENT_NAME".to_string(),
                columns: vec!["NAME".to_string()],
                unique: false,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn creates_table_with_constraints_and_indexes() {
        let statements = patient(2).create_statements(0, &DerbyTranslator);
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE FHIRDATA.PATIENT (ID BIGINT NOT NULL, NAME VARCHAR(64), LAST_UPDATED TIMESTAMP, CONSTRAINT PK_PATIENT PRIMARY KEY (ID))".to_string(),
                "CREATE INDEX FHIRDATA.IDX_PATIENT_NAME ON FHIRDATA.PATIENT (NAME)".to_string(),
            ]
        );
    }

    #[test]
    fn upgrade_adds_only_newer_columns_then_reorgs() {
        let statements = patient(2).create_statements(1, &Db2Translator);
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE FHIRDATA.PATIENT ADD COLUMN LAST_UPDATED TIMESTAMP".to_string(),
                "CALL SYSPROC.ADMIN_CMD ('REORG TABLE FHIRDATA.PATIENT')".to_string(),
            ]
        );
        assert!(patient(2).create_statements(2, &Db2Translator).is_empty());
    }

    #[test]
    fn future_columns_wait_for_their_version() {
        let created = patient(1).create_statements(0, &PostgresTranslator);
        assert_eq!(
            created[0],
            "CREATE TABLE FHIRDATA.PATIENT (ID BIGINT NOT NULL, NAME VARCHAR(64), CONSTRAINT PK_PATIENT PRIMARY KEY (ID))"
        );
        assert!(patient(1).create_statements(1, &PostgresTranslator).is_empty());

        let upgraded = patient(2).create_statements(1, &PostgresTranslator);
        assert_eq!(
            upgraded,
            vec!["ALTER TABLE FHIRDATA.PATIENT ADD COLUMN LAST_UPDATED TIMESTAMP".to_string()]
        );
    }

    #[test]
    fn renders_foreign_keys_against_own_schema() {
        let table = TableBuilder::new("FHIRDATA", "OBSERVATION")
            .bigint_column("ID", false)
            .bigint_column("PATIENT_ID", false)
            .foreign_key(ForeignKey {
                name: "FK_OBS_PATIENT".to_string(),
                columns: vec!["PATIENT_ID".to_string()],
                referenced_schema: None,
                referenced_table: "PATIENT".to_string(),
                referenced_columns: vec!["ID".to_string()],
                on_delete: FkAction::Cascade,
            })
            .build()
            .unwrap();
        let ddl = &table.create_statements(0, &PostgresTranslator)[0];
        assert!(ddl.contains(
            "CONSTRAINT FK_OBS_PATIENT FOREIGN KEY (PATIENT_ID) REFERENCES FHIRDATA.PATIENT (ID) ON DELETE CASCADE"
        ));
    }

    #[test]
    fn row_type_is_skipped_where_unsupported() {
        let row_type = DatabaseObject::row_type(
            "FHIRDATA",
            "T_STR_VALUES",
            1,
            vec![Column::integer("PARAMETER_NAME_ID", true), Column::varchar("STR_VALUE", 511, true)],
        )
        .unwrap();
        assert!(row_type.create_statements(0, &DerbyTranslator).is_empty());
        assert!(row_type.drop_statements(&DerbyTranslator).is_empty());
        assert_eq!(
            row_type.create_statements(0, &PostgresTranslator),
            vec!["CREATE TYPE FHIRDATA.T_STR_VALUES AS (PARAMETER_NAME_ID INTEGER, STR_VALUE VARCHAR(511))".to_string()]
        );
    }

    #[test]
    fn grants_only_registered_group() {
        let mut sequence = DatabaseObject::sequence("FHIRDATA", "FHIR_SEQUENCE", 1, 1, 1000).unwrap();
        sequence.add_privileges("FHIRSERVER", [Privilege::Usage]);
        assert_eq!(
            sequence.grant_statements("FHIRSERVER", "FHIRUSER").unwrap(),
            vec!["GRANT USAGE ON SEQUENCE FHIRDATA.FHIR_SEQUENCE TO FHIRUSER".to_string()]
        );
        assert!(sequence.grant_statements("OTHER", "FHIRUSER").unwrap().is_empty());
        assert!(sequence.grant_statements("FHIRSERVER", "BAD NAME").is_err());
    }

    #[test]
    fn identity_ignores_version_and_schema() {
        let a = patient(1);
        let b = TableBuilder::new("OTHER", "PATIENT")
            .version(7)
            .bigint_column("ID", false)
            .build()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.type_and_name(), "TABLE:PATIENT");
    }

    #[test]
    fn rejects_primary_key_on_unknown_column() {
        let result = TableBuilder::new("FHIRDATA", "PATIENT")
            .bigint_column("ID", false)
            .primary_key("PK_PATIENT", &["MISSING"])
            .build();
        assert!(matches!(result, Err(Error::InvalidModel(_))));
    }

    #[test]
    fn parses_type_and_name() {
        let key: ObjectKey = "SEQUENCE:FHIR_SEQUENCE".parse().unwrap();
        assert_eq!(key, ObjectKey::new(ObjectType::Sequence, "FHIR_SEQUENCE"));
        assert!("FHIR_SEQUENCE".parse::<ObjectKey>().is_err());
    }
}
