use std::collections::HashMap;

use crate::error::{MatMulError, Result};

/// A single operator attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
}

impl AttributeValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Float(_) => "Float",
            AttributeValue::Int(_) => "Int",
        }
    }
}

/// Attributes attached to an operator node.
#[derive(Debug, Clone, Default)]
pub struct NodeAttributes {
    pub entries: HashMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: AttributeValue) -> Self {
        self.entries.insert(key.to_string(), value);
        self
    }

    /// Retrieve a float attribute by key.
    pub fn get_f32(&self, key: &str) -> Result<f32> {
        match self.entries.get(key) {
            Some(AttributeValue::Float(v)) => Ok(*v),
            Some(other) => Err(MatMulError::AttributeType {
                key: key.to_string(),
                expected: "Float".to_string(),
                got: other.type_name().to_string(),
            }),
            None => Err(MatMulError::MissingAttribute(key.to_string())),
        }
    }

    /// Retrieve an integer attribute by key.
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        match self.entries.get(key) {
            Some(AttributeValue::Int(v)) => Ok(*v),
            Some(other) => Err(MatMulError::AttributeType {
                key: key.to_string(),
                expected: "Int".to_string(),
                got: other.type_name().to_string(),
            }),
            None => Err(MatMulError::MissingAttribute(key.to_string())),
        }
    }

    fn get_f32_or(&self, key: &str, default: f32) -> Result<f32> {
        match self.get_f32(key) {
            Err(MatMulError::MissingAttribute(_)) => Ok(default),
            other => other,
        }
    }

    fn get_i64_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_i64(key) {
            Err(MatMulError::MissingAttribute(_)) => Ok(default),
            other => other,
        }
    }
}

/// Configuration of a `MatMul` operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatMulConfig {
    /// Scale applied to every product.
    pub alpha: f32,
    /// Transpose the last two dimensions of the left operand.
    pub trans_a: bool,
    /// Transpose the last two dimensions of the right operand.
    pub trans_b: bool,
}

impl Default for MatMulConfig {
    fn default() -> Self {
        MatMulConfig {
            alpha: 1.0,
            trans_a: false,
            trans_b: false,
        }
    }
}

impl MatMulConfig {
    /// Reads the operator configuration from node attributes.
    ///
    /// - `alpha` (float, default 1.0)
    /// - `transA` (int, default 0; nonzero transposes)
    /// - `transB` (int, default 0; nonzero transposes)
    ///
    /// A present attribute of the wrong type is an error.
    pub fn from_attributes(attrs: &NodeAttributes) -> Result<MatMulConfig> {
        Ok(MatMulConfig {
            alpha: attrs.get_f32_or("alpha", 1.0)?,
            trans_a: attrs.get_i64_or("transA", 0)? != 0,
            trans_b: attrs.get_i64_or("transB", 0)? != 0,
        })
    }
}

/// Caller-supplied description of a constant operand offered for prepack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepackParam {
    /// Initializer name, used in diagnostics.
    pub name: String,
    /// Operand position; only 1 (the right operand) is eligible.
    pub input_index: usize,
    /// Whether the caller marked the initializer as 2:4 sparse.
    pub sparse_2x4: bool,
}

impl PrepackParam {
    pub fn new(name: impl Into<String>, input_index: usize, sparse_2x4: bool) -> Self {
        PrepackParam {
            name: name.into(),
            input_index,
            sparse_2x4,
        }
    }

    /// Right operand flagged as 2:4 sparse.
    pub fn is_sparse_weight(&self) -> bool {
        self.input_index == 1 && self.sparse_2x4
    }
}
