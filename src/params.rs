//! Named argument values exposed by stages and estimators for inspection and tuning.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Arguments keyed by name, ordered for stable enumeration.
pub type Params = BTreeMap<String, ParamValue>;

/// A single argument value. Deserializes from plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`, such as large seeds.
    UInt(u64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_usize(&self, name: &str) -> Result<usize> {
        let value = self.as_u64(name)?;
        usize::try_from(value).map_err(|_| {
            PipelineError::invalid(name, format!("{value} does not fit in a machine word"))
        })
    }

    pub fn as_u32(&self, name: &str) -> Result<u32> {
        let value = self.as_u64(name)?;
        u32::try_from(value)
            .map_err(|_| PipelineError::invalid(name, format!("{value} does not fit in 32 bits")))
    }

    pub fn as_u64(&self, name: &str) -> Result<u64> {
        match self {
            ParamValue::Int(value) if *value >= 0 => Ok(*value as u64),
            ParamValue::UInt(value) => Ok(*value),
            // 2^64 is the first float past u64::MAX.
            ParamValue::Float(value)
                if *value >= 0.0 && value.fract() == 0.0 && *value < u64::MAX as f64 =>
            {
                Ok(*value as u64)
            }
            other => Err(PipelineError::invalid(
                name,
                format!("expected a non-negative integer, got {other}"),
            )),
        }
    }

    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            ParamValue::Int(value) => Ok(*value as f64),
            ParamValue::UInt(value) => Ok(*value as f64),
            ParamValue::Float(value) => Ok(*value),
            other => Err(PipelineError::invalid(
                name,
                format!("expected a number, got {other}"),
            )),
        }
    }

    pub fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(value) => Ok(*value),
            other => Err(PipelineError::invalid(
                name,
                format!("expected a boolean, got {other}"),
            )),
        }
    }

    /// Reads an optional number where `null` means "unset".
    pub fn as_optional_f64(&self, name: &str) -> Result<Option<f64>> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_f64(name).map(Some),
        }
    }

    pub fn as_optional_usize(&self, name: &str) -> Result<Option<usize>> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_usize(name).map(Some),
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::UInt(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => write!(f, "\"{value}\""),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::from(value as u64)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(ParamValue::UInt(value), ParamValue::Int)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Float(value as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Builds a [`Params`] map from `(name, value)` pairs.
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}
