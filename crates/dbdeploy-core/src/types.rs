use serde::{Deserialize, Serialize};

/// Portable column type; each dialect renders its own spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataType {
    Integer,
    BigInt,
    Double,
    Boolean,
    Timestamp,
    Varchar { length: u32 },
    Char { length: u32 },
    Clob,
    Blob,
}

/// Column of a table or row type.
///
/// `since` is the object version that introduced the column. Columns newer
/// than the deployed version are added with `ALTER TABLE` on upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default = "default_since")]
    pub since: i32,
}

fn default_nullable() -> bool {
    true
}

fn default_since() -> i32 {
    1
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            default: None,
            since: default_since(),
        }
    }

    pub fn varchar(name: impl Into<String>, length: u32, nullable: bool) -> Self {
        Self::new(name, DataType::Varchar { length }, nullable)
    }

    pub fn integer(name: impl Into<String>, nullable: bool) -> Self {
        Self::new(name, DataType::Integer, nullable)
    }

    pub fn bigint(name: impl Into<String>, nullable: bool) -> Self {
        Self::new(name, DataType::BigInt, nullable)
    }

    pub fn timestamp(name: impl Into<String>, nullable: bool) -> Self {
        Self::new(name, DataType::Timestamp, nullable)
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark the column as introduced in `version`.
    pub fn since(mut self, version: i32) -> Self {
        self.since = version;
        self
    }
}

/// Privilege that can be granted on a table, view or sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
    References,
    Alter,
    Usage,
    Execute,
}

impl Privilege {
    pub fn as_sql(self) -> &'static str {
        match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
            Privilege::References => "REFERENCES",
            Privilege::Alter => "ALTER",
            Privilege::Usage => "USAGE",
            Privilege::Execute => "EXECUTE",
        }
    }
}
