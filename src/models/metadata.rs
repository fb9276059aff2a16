use serde::{Deserialize, Serialize};

/// Column discovered from the database catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// How a column takes part in search predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Numeric,
    Date,
}

impl ColumnInfo {
    pub fn kind(&self) -> ColumnKind {
        if self.name.to_lowercase().contains("date") {
            return ColumnKind::Date;
        }
        ColumnKind::from_data_type(&self.data_type)
    }
}

impl ColumnKind {
    pub fn from_data_type(data_type: &str) -> Self {
        let t = data_type.to_lowercase();
        let base = t.split('(').next().unwrap_or("").trim();
        match base {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "int2" | "int4"
            | "int8" | "serial" | "bigserial" => ColumnKind::Integer,
            "numeric" | "decimal" | "number" | "real" | "float" | "double" | "double precision"
            | "money" | "smallmoney" | "float4" | "float8" | "binary_float" | "binary_double" => {
                ColumnKind::Numeric
            }
            "date" | "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" | "time" => {
                ColumnKind::Date
            }
            _ if base.starts_with("timestamp") => ColumnKind::Date,
            _ => ColumnKind::Text,
        }
    }
}
