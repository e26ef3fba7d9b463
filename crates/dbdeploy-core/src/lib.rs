//! Core contracts for dbdeploy.
//!
//! This crate holds everything that does not touch a live database: the
//! error taxonomy, the versioned object model and its dependency graph, the
//! dialect translators and the layout of the version ledger.

pub mod connection;
pub mod constraints;
pub mod ddl;
pub mod definition;
pub mod dialect;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod object;
pub mod types;

pub use connection::{ConnectionDetails, redact_url};
pub use constraints::{FkAction, ForeignKey, IndexDef, PrimaryKey};
pub use definition::{BodyDefinition, GroupDefinition, ObjectDefinition, SchemaDefinition};
pub use dialect::{Db2Translator, DbType, DerbyTranslator, PostgresTranslator, Translator};
pub use error::{DataAccessError, Error, ErrorKind, Result, VendorError};
pub use graph::{ModelBuilder, PhysicalModel};
pub use ledger::{VersionRow, ledger_key, version_history_table};
pub use object::{DatabaseObject, ObjectBody, ObjectId, ObjectKey, ObjectType, TableBuilder};
pub use types::{Column, DataType, Privilege};
