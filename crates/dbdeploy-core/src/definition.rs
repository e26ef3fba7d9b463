//! Serializable schema definitions.
//!
//! A [`SchemaDefinition`] is the on-disk form of a deployment (JSON or
//! TOML). [`SchemaDefinition::build`] turns it into a validated
//! [`PhysicalModel`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constraints::{ForeignKey, IndexDef, PrimaryKey};
use crate::error::{Error, Result};
use crate::graph::{ModelBuilder, PhysicalModel};
use crate::object::{DatabaseObject, Index, ObjectBody, ObjectKey, RowType, Sequence, Table, View};
use crate::types::{Column, Privilege};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Default schema for objects that do not name one.
    pub schema: String,
    #[serde(default)]
    pub objects: Vec<ObjectDefinition>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub privileges: BTreeMap<String, Vec<Privilege>>,
    /// Explicit edges as `TYPE:NAME`.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub body: BodyDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyDefinition {
    Table {
        columns: Vec<Column>,
        #[serde(default)]
        primary_key: Option<PrimaryKey>,
        #[serde(default)]
        foreign_keys: Vec<ForeignKey>,
        #[serde(default)]
        indexes: Vec<IndexDef>,
    },
    RowType {
        columns: Vec<Column>,
    },
    Sequence {
        #[serde(default = "default_start")]
        start: i64,
        #[serde(default)]
        cache: u32,
    },
    View {
        query: String,
    },
    Index {
        table: String,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
}

/// Members are deployed in the order listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub members: Vec<String>,
}

fn default_version() -> i32 {
    1
}

fn default_start() -> i64 {
    1
}

impl ObjectDefinition {
    fn to_object(&self, default_schema: &str) -> Result<DatabaseObject> {
        let schema = self.schema.as_deref().unwrap_or(default_schema);
        let body = match &self.body {
            BodyDefinition::Table {
                columns,
                primary_key,
                foreign_keys,
                indexes,
            } => ObjectBody::Table(Table {
                columns: columns.clone(),
                primary_key: primary_key.clone(),
                foreign_keys: foreign_keys.clone(),
                indexes: indexes.clone(),
            }),
            BodyDefinition::RowType { columns } => ObjectBody::RowType(RowType {
                columns: columns.clone(),
            }),
            BodyDefinition::Sequence { start, cache } => ObjectBody::Sequence(Sequence {
                start: *start,
                cache: *cache,
            }),
            BodyDefinition::View { query } => ObjectBody::View(View {
                query: query.clone(),
            }),
            BodyDefinition::Index {
                table,
                columns,
                unique,
            } => ObjectBody::Index(Index {
                table: table.clone(),
                definition: IndexDef {
                    name: self.name.clone(),
                    columns: columns.clone(),
                    unique: *unique,
                },
            }),
        };

        let mut object = DatabaseObject::new(schema, &self.name, self.version, body)?;
        object.add_tags(self.tags.clone());
        for (group, privileges) in &self.privileges {
            object.add_privileges(group.clone(), privileges.iter().copied());
        }
        Ok(object)
    }
}

impl SchemaDefinition {
    pub fn build(&self) -> Result<PhysicalModel> {
        let mut builder = ModelBuilder::new();

        for definition in &self.objects {
            let id = builder.add(definition.to_object(&self.schema)?)?;
            for dependency in &definition.depends_on {
                builder.depends_on(id, dependency.parse::<ObjectKey>()?);
            }
        }

        for group in &self.groups {
            let mut members = Vec::with_capacity(group.members.len());
            for member in &group.members {
                let key: ObjectKey = member.parse()?;
                let id = builder.find(&key).ok_or_else(|| {
                    Error::InvalidModel(format!("group {} lists unknown member {key}", group.name))
                })?;
                members.push(id);
            }
            let schema = group.schema.as_deref().unwrap_or(&self.schema);
            builder.add_group(schema, &group.name, members)?;
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectType;
    use crate::types::DataType;

    const JSON: &str = r#"{
        "schema": "FHIRDATA",
        "objects": [
            {
                "kind": "table",
                "name": "PATIENT",
                "version": 2,
                "tags": { "resource": "Patient" },
                "privileges": { "FHIRSERVER": ["select", "insert"] },
                "columns": [
                    { "name": "ID", "data_type": { "type": "big_int" }, "nullable": false },
                    { "name": "LAST_UPDATED", "data_type": { "type": "timestamp" }, "since": 2 }
                ],
                "primary_key": { "name": "PK_PATIENT", "columns": ["ID"] }
            },
            { "kind": "sequence", "name": "FHIR_SEQUENCE", "cache": 1000 },
            {
                "kind": "view",
                "name": "PATIENT_IDS",
                "query": "SELECT ID FROM FHIRDATA.PATIENT",
                "depends_on": ["TABLE:PATIENT"]
            }
        ],
        "groups": [
            { "name": "PATIENT_GROUP", "members": ["TABLE:PATIENT", "VIEW:PATIENT_IDS"] }
        ]
    }"#;

    #[test]
    fn builds_model_from_json() {
        let definition: SchemaDefinition = serde_json::from_str(JSON).unwrap();
        let model = definition.build().unwrap();
        assert_eq!(model.len(), 4);

        let patient = model
            .find(&ObjectKey::new(ObjectType::Table, "PATIENT"))
            .unwrap();
        let object = model.get(patient);
        assert_eq!(object.version(), 2);
        assert_eq!(object.tags().get("resource").map(String::as_str), Some("Patient"));
        assert!(object.privileges("FHIRSERVER").unwrap().contains(&Privilege::Insert));

        let group = model.group_of(patient).unwrap();
        assert!(model.get(group).dependencies().is_empty());

        let sequence = model
            .find(&ObjectKey::new(ObjectType::Sequence, "FHIR_SEQUENCE"))
            .unwrap();
        assert_eq!(model.topological_order().unwrap(), vec![sequence, group]);
    }

    #[test]
    fn builds_model_from_toml() {
        let definition: SchemaDefinition = toml::from_str(
            r#"
            schema = "FHIRDATA"

            [[objects]]
            kind = "row_type"
            name = "T_STR_VALUES"
            columns = [
                { name = "STR_VALUE", data_type = { type = "varchar", length = 511 } },
            ]

            [[objects]]
            kind = "index"
            name = "IDX_STR_VALUES"
            schema = "FHIRDATA"
            table = "STR_VALUES"
            columns = ["STR_VALUE"]
            unique = true
            "#,
        )
        .unwrap();

        match &definition.objects[0].body {
            BodyDefinition::RowType { columns } => {
                assert_eq!(columns[0].data_type, DataType::Varchar { length: 511 });
                assert!(columns[0].nullable);
            }
            other => panic!("unexpected body {other:?}"),
        }
        assert_eq!(definition.build().unwrap().len(), 2);
    }

    #[test]
    fn unknown_group_member_is_rejected() {
        let definition = SchemaDefinition {
            schema: "FHIRDATA".to_string(),
            objects: Vec::new(),
            groups: vec![GroupDefinition {
                name: "G".to_string(),
                schema: None,
                members: vec!["TABLE:MISSING".to_string()],
            }],
        };
        assert!(matches!(definition.build(), Err(Error::InvalidModel(_))));
    }
}
