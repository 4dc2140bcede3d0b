use std::{fmt::Display, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Byte-order prefix of a NumPy-style type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `<`
    Little,
    /// `>`
    Big,
    /// `|`: order irrelevant (single-byte or opaque kinds only).
    None,
}

impl ByteOrder {
    fn from_char(c: char) -> Result<Self, DataTypeError> {
        match c {
            '<' => Ok(Self::Little),
            '>' => Ok(Self::Big),
            '|' => Ok(Self::None),
            other => Err(DataTypeError::UnknownByteOrder(other)),
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Little => '<',
            Self::Big => '>',
            Self::None => '|',
        }
    }
}

/// Scalar kind letter of a NumPy-style type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// `b`
    Bool,
    /// `i`
    Int,
    /// `u`
    UInt,
    /// `f`
    Float,
    /// `c`
    Complex,
    /// `m`
    TimeDelta,
    /// `M`
    DateTime,
    /// `S`
    ByteStr,
    /// `U`
    UnicodeStr,
    /// `V`
    Void,
}

impl ScalarKind {
    fn from_char(c: char) -> Result<Self, DataTypeError> {
        match c {
            'b' => Ok(Self::Bool),
            'i' => Ok(Self::Int),
            'u' => Ok(Self::UInt),
            'f' => Ok(Self::Float),
            'c' => Ok(Self::Complex),
            'm' => Ok(Self::TimeDelta),
            'M' => Ok(Self::DateTime),
            'S' => Ok(Self::ByteStr),
            'U' => Ok(Self::UnicodeStr),
            'V' => Ok(Self::Void),
            other => Err(DataTypeError::UnknownKind(other)),
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Bool => 'b',
            Self::Int => 'i',
            Self::UInt => 'u',
            Self::Float => 'f',
            Self::Complex => 'c',
            Self::TimeDelta => 'm',
            Self::DateTime => 'M',
            Self::ByteStr => 'S',
            Self::UnicodeStr => 'U',
            Self::Void => 'V',
        }
    }

    /// Kinds for which `|` is a legal byte order.
    fn order_free(self) -> bool {
        matches!(self, Self::Bool | Self::ByteStr | Self::Void)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DataTypeError {
    #[error("type string `{0}` is malformed")]
    Malformed(String),
    #[error("unknown byte order character `{0}`")]
    UnknownByteOrder(char),
    #[error("unknown scalar kind character `{0}`")]
    UnknownKind(char),
    #[error("kind `{kind}` does not support item size {size}")]
    InvalidSize { kind: char, size: usize },
    #[error("byte order `|` is not valid for kind `{0}`")]
    OrderRequired(char),
    #[error("structured dtype has no fields")]
    EmptyRecord,
    #[error("structured dtype repeats field name `{0}`")]
    DuplicateField(String),
    #[error("structured dtype entry for `{0}` is not a [name, dtype] pair")]
    MalformedField(String),
}

/// A scalar type descriptor: byte order, kind, and item size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarType {
    pub order: ByteOrder,
    pub kind: ScalarKind,
    pub size: usize,
}

impl ScalarType {
    pub fn new(order: ByteOrder, kind: ScalarKind, size: usize) -> Result<Self, DataTypeError> {
        let st = Self { order, kind, size };
        st.validate()?;
        Ok(st)
    }

    fn validate(&self) -> Result<(), DataTypeError> {
        let kind_char = self.kind.as_char();
        let size_ok = match self.kind {
            ScalarKind::Bool => self.size == 1,
            ScalarKind::Int | ScalarKind::UInt => matches!(self.size, 1 | 2 | 4 | 8),
            ScalarKind::Float => matches!(self.size, 2 | 4 | 8),
            ScalarKind::Complex => matches!(self.size, 8 | 16),
            ScalarKind::TimeDelta | ScalarKind::DateTime => self.size == 8,
            ScalarKind::ByteStr | ScalarKind::UnicodeStr | ScalarKind::Void => self.size > 0,
        };
        if !size_ok {
            return Err(DataTypeError::InvalidSize {
                kind: kind_char,
                size: self.size,
            });
        }
        if self.order == ByteOrder::None && !self.kind.order_free() {
            return Err(DataTypeError::OrderRequired(kind_char));
        }
        Ok(())
    }

    pub fn item_size(&self) -> usize {
        self.size
    }

    pub fn is_floating(&self) -> bool {
        self.kind == ScalarKind::Float
    }
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.order.as_char(),
            self.kind.as_char(),
            self.size
        )
    }
}

impl FromStr for ScalarType {
    type Err = DataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DataTypeError::Malformed(s.to_owned());
        let mut chars = s.chars();
        let order = ByteOrder::from_char(chars.next().ok_or_else(malformed)?)?;
        let kind = ScalarKind::from_char(chars.next().ok_or_else(malformed)?)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let size: usize = digits.parse().map_err(|_| malformed())?;
        if size == 0 {
            return Err(DataTypeError::InvalidSize {
                kind: kind.as_char(),
                size,
            });
        }
        Self::new(order, kind, size)
    }
}

/// One field of a structured record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredField {
    pub name: String,
    pub dtype: ScalarType,
}

/// The `dtype` of an array: a scalar, or an ordered record of named
/// scalar fields packed without padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Scalar(ScalarType),
    Structured(Vec<StructuredField>),
}

impl DataType {
    /// Bytes per array element.
    pub fn item_size(&self) -> usize {
        match self {
            Self::Scalar(st) => st.item_size(),
            Self::Structured(fields) => fields.iter().map(|f| f.dtype.item_size()).sum(),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    pub fn fields(&self) -> Option<&[StructuredField]> {
        match self {
            Self::Scalar(_) => None,
            Self::Structured(fields) => Some(fields),
        }
    }

    /// The declared byte order; `None` for structured records, where each
    /// field carries its own.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        match self {
            Self::Scalar(st) => Some(st.order),
            Self::Structured(_) => None,
        }
    }

    /// Whether fill values for this type use the IEEE-754 non-finite
    /// JSON sentinels.
    pub fn is_floating(&self) -> bool {
        match self {
            Self::Scalar(st) => st.is_floating(),
            Self::Structured(_) => false,
        }
    }

    fn from_structured_json(entries: &[serde_json::Value]) -> Result<Self, DataTypeError> {
        if entries.is_empty() {
            return Err(DataTypeError::EmptyRecord);
        }
        let mut fields: Vec<StructuredField> = Vec::with_capacity(entries.len());
        for entry in entries {
            let pair = entry
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| DataTypeError::MalformedField(entry.to_string()))?;
            let name = pair[0]
                .as_str()
                .ok_or_else(|| DataTypeError::MalformedField(entry.to_string()))?;
            let dtype_str = pair[1]
                .as_str()
                .ok_or_else(|| DataTypeError::MalformedField(entry.to_string()))?;
            if fields.iter().any(|f| f.name == name) {
                return Err(DataTypeError::DuplicateField(name.to_owned()));
            }
            fields.push(StructuredField {
                name: name.to_owned(),
                dtype: dtype_str.parse()?,
            });
        }
        Ok(Self::Structured(fields))
    }
}

impl From<ScalarType> for DataType {
    fn from(st: ScalarType) -> Self {
        Self::Scalar(st)
    }
}

impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Scalar(st) => serializer.serialize_str(&st.to_string()),
            Self::Structured(fields) => {
                let pairs: Vec<(&str, String)> = fields
                    .iter()
                    .map(|f| (f.name.as_str(), f.dtype.to_string()))
                    .collect();
                pairs.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::String(s) => {
                let st: ScalarType = s.parse().map_err(de::Error::custom)?;
                Ok(Self::Scalar(st))
            }
            serde_json::Value::Array(entries) => {
                Self::from_structured_json(entries).map_err(de::Error::custom)
            }
            other => Err(de::Error::custom(format!(
                "dtype must be a string or a list of [name, dtype] pairs, got {other}"
            ))),
        }
    }
}
