//! Property data types and their translators
//!
//! A [`PropertyDataType`] describes the shape of a property value and binds it to
//! a [`Translator`], the only boundary between the string-keyed namespace cache
//! and typed `serde_json::Value`s.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::CoreError;

/// Scalar value classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    /// Any JSON value
    Any,
    /// Plain text
    String,
    /// true / false
    Boolean,
    /// 64-bit signed integer
    Integer,
    /// Floating point number
    Float,
    /// Integer or float
    Number,
    /// Text with a scheme prefix
    Uri,
}

impl ScalarType {
    /// Whether a value of `other` can be stored where `self` is declared
    pub fn is_assignable_from(self, other: ScalarType) -> bool {
        use ScalarType::*;
        self == other
            || self == Any
            || (self == Number && matches!(other, Integer | Float))
            || (self == String && other == Uri)
    }

    fn as_str(self) -> &'static str {
        match self {
            ScalarType::Any => "any",
            ScalarType::String => "string",
            ScalarType::Boolean => "boolean",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Number => "number",
            ScalarType::Uri => "uri",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        let scalar = match token {
            "any" | "object" => ScalarType::Any,
            "string" | "text" => ScalarType::String,
            "boolean" | "bool" => ScalarType::Boolean,
            "integer" | "int" | "long" => ScalarType::Integer,
            "float" | "double" => ScalarType::Float,
            "number" => ScalarType::Number,
            "uri" | "url" => ScalarType::Uri,
            _ => return None,
        };
        Some(scalar)
    }
}

/// Serializer/deserializer pair bound to a data type
pub trait Translator: Send + Sync + fmt::Debug {
    /// Identifies the translator when two data types are compared
    fn name(&self) -> &str;

    /// Turn a typed value into its cached string form
    fn serialize(&self, data_type: &PropertyDataType, value: &Value) -> Result<String, CoreError>;

    /// Materialize a cached string
    fn deserialize(&self, data_type: &PropertyDataType, serialized: &str) -> Result<Value, CoreError>;

    /// Whether `serialized` would deserialize without error
    fn is_deserializable(&self, data_type: &PropertyDataType, serialized: &str) -> bool {
        self.deserialize(data_type, serialized).is_ok()
    }
}

/// Shape of a property value
#[derive(Debug, Clone, PartialEq)]
pub enum DataKind {
    /// Not declared yet; translates as a string and is refined by any merge
    Undefined,
    /// Single value
    Scalar(ScalarType),
    /// Ordered collection
    List(Box<PropertyDataType>),
    /// Collection without duplicates
    Set(Box<PropertyDataType>),
    /// Keyed collection
    Map {
        /// Key type (scalar)
        key: Box<PropertyDataType>,
        /// Value type
        element: Box<PropertyDataType>,
    },
    /// Structured object identified by a type name
    Nested(String),
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Undefined => f.write_str("undefined"),
            DataKind::Scalar(scalar) => f.write_str(scalar.as_str()),
            DataKind::List(element) => write!(f, "list<{}>", element.kind),
            DataKind::Set(element) => write!(f, "set<{}>", element.kind),
            DataKind::Map { key, element } => write!(f, "map<{},{}>", key.kind, element.kind),
            DataKind::Nested(name) => write!(f, "nested<{}>", name),
        }
    }
}

/// Data type of a property: a [`DataKind`] plus an optional custom translator
#[derive(Debug, Clone)]
pub struct PropertyDataType {
    kind: DataKind,
    translator: Option<Arc<dyn Translator>>,
}

impl PartialEq for PropertyDataType {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.translator_name() == other.translator_name()
    }
}

impl Default for PropertyDataType {
    fn default() -> Self {
        Self::undefined()
    }
}

impl PropertyDataType {
    /// Placeholder type
    pub fn undefined() -> Self {
        Self::from_kind(DataKind::Undefined)
    }

    /// Scalar type
    pub fn scalar(scalar: ScalarType) -> Self {
        Self::from_kind(DataKind::Scalar(scalar))
    }

    /// Plain text
    pub fn string() -> Self {
        Self::scalar(ScalarType::String)
    }

    /// Boolean
    pub fn boolean() -> Self {
        Self::scalar(ScalarType::Boolean)
    }

    /// Integer
    pub fn integer() -> Self {
        Self::scalar(ScalarType::Integer)
    }

    /// List of `element`; an absent element type stays undefined
    pub fn list(element: Option<PropertyDataType>) -> Self {
        Self::from_kind(DataKind::List(Box::new(element.unwrap_or_default())))
    }

    /// Set of `element`; an absent element type stays undefined
    pub fn set(element: Option<PropertyDataType>) -> Self {
        Self::from_kind(DataKind::Set(Box::new(element.unwrap_or_default())))
    }

    /// Map; absent key or element types default to string
    pub fn map(key: Option<PropertyDataType>, element: Option<PropertyDataType>) -> Self {
        Self::from_kind(DataKind::Map {
            key: Box::new(key.unwrap_or_else(Self::string)),
            element: Box::new(element.unwrap_or_else(Self::string)),
        })
    }

    /// Structured object named `type_name`
    pub fn nested(type_name: impl Into<String>) -> Self {
        Self::from_kind(DataKind::Nested(type_name.into()))
    }

    fn from_kind(kind: DataKind) -> Self {
        Self { kind, translator: None }
    }

    /// Bind a custom translator
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// The kind
    pub fn kind(&self) -> &DataKind {
        &self.kind
    }

    /// False only for the undefined placeholder
    pub fn is_defined(&self) -> bool {
        self.kind != DataKind::Undefined
    }

    /// Lists, sets and maps
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, DataKind::List(_) | DataKind::Set(_) | DataKind::Map { .. })
    }

    /// Maps only
    pub fn is_map(&self) -> bool {
        matches!(self.kind, DataKind::Map { .. })
    }

    /// Element type of a collection
    pub fn element_type(&self) -> Option<&PropertyDataType> {
        match &self.kind {
            DataKind::List(element) | DataKind::Set(element) => Some(element),
            DataKind::Map { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Key type of a map
    pub fn key_type(&self) -> Option<&PropertyDataType> {
        match &self.kind {
            DataKind::Map { key, .. } => Some(key),
            _ => None,
        }
    }

    fn translator_name(&self) -> Option<&str> {
        self.translator.as_deref().map(|t| t.name())
    }

    fn translator(&self) -> &dyn Translator {
        match &self.translator {
            Some(translator) => translator.as_ref(),
            None => &StandardTranslator,
        }
    }

    /// Serialize through the bound translator
    pub fn serialize(&self, value: &Value) -> Result<String, CoreError> {
        self.translator().serialize(self, value)
    }

    /// Deserialize through the bound translator
    pub fn deserialize(&self, serialized: &str) -> Result<Value, CoreError> {
        self.translator().deserialize(self, serialized)
    }

    /// Check a serialized value without keeping the result
    pub fn is_deserializable(&self, serialized: &str) -> bool {
        self.translator().is_deserializable(self, serialized)
    }

    /// Whether a materialized value has this shape
    pub fn conforms(&self, value: &Value) -> bool {
        match &self.kind {
            DataKind::Undefined => true,
            DataKind::Scalar(scalar) => scalar_conforms(*scalar, value),
            DataKind::List(element) | DataKind::Set(element) => value
                .as_array()
                .map_or(false, |items| items.iter().all(|item| element.conforms(item))),
            DataKind::Map { key, element } => value.as_object().map_or(false, |entries| {
                entries
                    .iter()
                    .all(|(k, v)| key.is_deserializable(k) && element.conforms(v))
            }),
            DataKind::Nested(_) => value.is_object(),
        }
    }

    /// Whether [`PropertyDataType::merge`] would succeed
    pub fn is_mergeable(&self, incoming: &PropertyDataType) -> bool {
        self.merge(incoming).is_ok()
    }

    /// Reconcile two declarations of the same property type.
    ///
    /// Undefined is refined by the other side, scalars rise to the more general
    /// class, collections merge their key and element types recursively. The
    /// existing translator is kept when both sides bind one.
    pub fn merge(&self, incoming: &PropertyDataType) -> Result<PropertyDataType, String> {
        let kind = merge_kind(&self.kind, &incoming.kind)?;
        Ok(PropertyDataType {
            kind,
            translator: self.translator.clone().or_else(|| incoming.translator.clone()),
        })
    }
}

fn merge_kind(existing: &DataKind, incoming: &DataKind) -> Result<DataKind, String> {
    match (existing, incoming) {
        (DataKind::Undefined, other) | (other, DataKind::Undefined) => Ok(other.clone()),
        (DataKind::Scalar(a), DataKind::Scalar(b)) => {
            if a.is_assignable_from(*b) {
                Ok(DataKind::Scalar(*a))
            } else if b.is_assignable_from(*a) {
                Ok(DataKind::Scalar(*b))
            } else {
                Err(format!("{} is not compatible with {}", existing, incoming))
            }
        }
        (DataKind::Scalar(ScalarType::Any), _) | (_, DataKind::Scalar(ScalarType::Any)) => {
            Ok(DataKind::Scalar(ScalarType::Any))
        }
        (DataKind::List(a), DataKind::List(b)) => Ok(DataKind::List(Box::new(a.merge(b)?))),
        (DataKind::Set(a), DataKind::Set(b)) => Ok(DataKind::Set(Box::new(a.merge(b)?))),
        (
            DataKind::Map { key: k1, element: e1 },
            DataKind::Map { key: k2, element: e2 },
        ) => Ok(DataKind::Map {
            key: Box::new(k1.merge(k2)?),
            element: Box::new(e1.merge(e2)?),
        }),
        (DataKind::Nested(a), DataKind::Nested(b)) if a == b => Ok(existing.clone()),
        _ => Err(format!("{} is not compatible with {}", existing, incoming)),
    }
}

fn scalar_conforms(scalar: ScalarType, value: &Value) -> bool {
    match scalar {
        ScalarType::Any => true,
        ScalarType::String => value.is_string(),
        ScalarType::Uri => value.as_str().map_or(false, is_uri),
        ScalarType::Boolean => value.is_boolean(),
        ScalarType::Integer => value.is_i64() || value.is_u64(),
        ScalarType::Float | ScalarType::Number => value.is_number(),
    }
}

fn is_uri(text: &str) -> bool {
    match text.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Translator used when a data type binds none.
///
/// Text scalars are cached verbatim, other scalars in their JSON text form,
/// collections and nested objects as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTranslator;

impl Translator for StandardTranslator {
    fn name(&self) -> &str {
        "standard"
    }

    fn serialize(&self, data_type: &PropertyDataType, value: &Value) -> Result<String, CoreError> {
        if !data_type.conforms(value) {
            return Err(CoreError::SerializationError(format!(
                "value {} is not a {}",
                value, data_type.kind
            )));
        }
        match (&data_type.kind, value) {
            (DataKind::Undefined, Value::String(text))
            | (DataKind::Scalar(ScalarType::String), Value::String(text))
            | (DataKind::Scalar(ScalarType::Uri), Value::String(text)) => Ok(text.clone()),
            (DataKind::Scalar(ScalarType::Any), _)
            | (DataKind::List(_), _)
            | (DataKind::Set(_), _)
            | (DataKind::Map { .. }, _)
            | (DataKind::Nested(_), _) => Ok(serde_json::to_string(value)?),
            _ => Ok(value.to_string()),
        }
    }

    fn deserialize(&self, data_type: &PropertyDataType, serialized: &str) -> Result<Value, CoreError> {
        let value = match &data_type.kind {
            DataKind::Undefined | DataKind::Scalar(ScalarType::String) => Value::String(serialized.to_string()),
            DataKind::Scalar(ScalarType::Uri) => Value::String(serialized.to_string()),
            DataKind::Scalar(ScalarType::Any) => serde_json::from_str(serialized)
                .unwrap_or_else(|_| Value::String(serialized.to_string())),
            DataKind::Scalar(ScalarType::Boolean) => match serialized.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => {
                    return Err(CoreError::SerializationError(format!("'{}' is not a boolean", other)));
                }
            },
            DataKind::Scalar(ScalarType::Integer) => {
                let trimmed = serialized.trim();
                match trimmed.parse::<i64>() {
                    Ok(int) => Value::from(int),
                    Err(err) => trimmed
                        .parse::<u64>()
                        .map(Value::from)
                        .map_err(|_| CoreError::SerializationError(format!("'{}': {}", serialized, err)))?,
                }
            }
            DataKind::Scalar(ScalarType::Float) | DataKind::Scalar(ScalarType::Number) => {
                let trimmed = serialized.trim();
                match trimmed.parse::<i64>() {
                    Ok(int) if data_type.kind == DataKind::Scalar(ScalarType::Number) => Value::from(int),
                    _ => trimmed
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(|| {
                            CoreError::SerializationError(format!("'{}' is not a number", serialized))
                        })?,
                }
            }
            DataKind::List(_) | DataKind::Map { .. } | DataKind::Nested(_) => serde_json::from_str(serialized)?,
            DataKind::Set(_) => match serde_json::from_str(serialized)? {
                Value::Array(items) => {
                    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                    for item in items {
                        if !unique.contains(&item) {
                            unique.push(item);
                        }
                    }
                    Value::Array(unique)
                }
                other => other,
            },
        };
        if data_type.conforms(&value) {
            Ok(value)
        } else {
            Err(CoreError::SerializationError(format!(
                "'{}' is not a {}",
                serialized, data_type.kind
            )))
        }
    }
}

impl FromStr for PropertyDataType {
    type Err = CoreError;

    /// Parses data-type tokens such as `integer`, `list<string>`,
    /// `map<string,list<integer>>` or `nested<flowTransition>`.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(Self::undefined());
        }
        let Some((head, rest)) = token.split_once('<') else {
            return ScalarType::from_token(token)
                .map(Self::scalar)
                .ok_or_else(|| CoreError::InvalidDefinition(format!("Unknown data type '{}'", token)));
        };
        let inner = rest
            .strip_suffix('>')
            .ok_or_else(|| CoreError::InvalidDefinition(format!("Unbalanced data type '{}'", token)))?;
        match head.trim() {
            "list" => Ok(Self::list(Some(inner.parse()?))),
            "set" => Ok(Self::set(Some(inner.parse()?))),
            "nested" => Ok(Self::nested(inner.trim())),
            "map" => match split_top_level(inner) {
                Some((key, element)) => Ok(Self::map(Some(key.parse()?), Some(element.parse()?))),
                None => Ok(Self::map(None, Some(inner.parse()?))),
            },
            other => Err(CoreError::InvalidDefinition(format!("Unknown collection '{}'", other))),
        }
    }
}

fn split_top_level(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (index, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&inner[..index], &inner[index + 1..])),
            _ => {}
        }
    }
    None
}

impl fmt::Display for PropertyDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}
