use std::fmt::{Display, Formatter};

use influxdb_utils::time::format_unix_nano;

/// FieldType is the primitive type of a field's values. The numeric codes are
/// shared by the export stream and the shard block encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Float,
    Integer,
    Boolean,
    String,
    Unsigned,
}

impl FieldType {
    pub fn value(&self) -> u8 {
        match self {
            FieldType::Float => 0,
            FieldType::Integer => 1,
            FieldType::Boolean => 2,
            FieldType::String => 3,
            FieldType::Unsigned => 4,
        }
    }

    pub fn from_value(v: u8) -> anyhow::Result<Self> {
        match v {
            0 => Ok(FieldType::Float),
            1 => Ok(FieldType::Integer),
            2 => Ok(FieldType::Boolean),
            3 => Ok(FieldType::String),
            4 => Ok(FieldType::Unsigned),
            _ => Err(anyhow!("unknown field type: {}", v)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Float => "float",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::String => "string",
            FieldType::Unsigned => "unsigned",
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(Vec<u8>),
    Unsigned(u64),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Integer(_) => FieldType::Integer,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Unsigned(_) => FieldType::Unsigned,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}i", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{:?}", String::from_utf8_lossy(v)),
            FieldValue::Unsigned(v) => write!(f, "{}u", v),
        }
    }
}

/// Value is a single timestamped sample of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub unix_nano: i64,
    pub value: FieldValue,
}

impl Value {
    pub fn new(unix_nano: i64, value: FieldValue) -> Self {
        Self { unix_nano, value }
    }

    pub fn float(unix_nano: i64, v: f64) -> Self {
        Self::new(unix_nano, FieldValue::Float(v))
    }

    pub fn integer(unix_nano: i64, v: i64) -> Self {
        Self::new(unix_nano, FieldValue::Integer(v))
    }

    pub fn field_type(&self) -> FieldType {
        self.value.field_type()
    }

    /// encode_size is the number of bytes the value occupies uncompressed.
    pub fn encode_size(&self) -> usize {
        match &self.value {
            FieldValue::Boolean(_) => 9,
            FieldValue::String(v) => 8 + v.len(),
            _ => 16,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", format_unix_nano(self.unix_nano), self.value)
    }
}
