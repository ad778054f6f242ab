//! The value type flowing through every physical operator's columns.
//! Narrowed from the teacher's vectorized-execution engine (which also
//! carried `ColumnBatch`/`VectorizedExecutor`/hash-table materialization
//! machinery for a single-node SQL engine) down to the one piece the
//! operator tree in SPEC_FULL.md §4.4 actually needs: a typed column cell.

/// Value in a column (supports multiple types).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub enum ColumnValue {
    Null,
    Integer(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    String(String),
    Boolean(bool),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn from_string(s: String) -> Self {
        if s == "NULL" || s.is_empty() {
            return ColumnValue::Null;
        }

        if let Ok(i) = s.parse::<i32>() {
            ColumnValue::Integer(i)
        } else if let Ok(i) = s.parse::<i64>() {
            ColumnValue::BigInt(i)
        } else if let Ok(f) = s.parse::<f64>() {
            ColumnValue::Double(f)
        } else if s == "true" || s == "false" {
            ColumnValue::Boolean(s == "true")
        } else {
            ColumnValue::String(s)
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            ColumnValue::Null => "NULL".to_string(),
            ColumnValue::Integer(i) => i.to_string(),
            ColumnValue::BigInt(i) => i.to_string(),
            ColumnValue::Float(f) => f.to_string(),
            ColumnValue::Double(f) => f.to_string(),
            ColumnValue::String(s) => s.clone(),
            ColumnValue::Boolean(b) => b.to_string(),
        }
    }
}
