//! The `{function, arguments}` message envelope.
//!
//! Every payload crossing a bridge boundary is one JSON object with exactly
//! this shape: a `function` string naming the remote operation and an
//! `arguments` array, present even when empty. Anything else is rejected at
//! parse time and the receiving bridge drops it with a log line; nothing is
//! ever surfaced back to the sender.

// Rust guideline compliant 2026-04

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A parsed relay message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Remote operation name, matched against the receiver's command table.
    pub function: String,
    /// Positional arguments; mandatory on the wire, possibly empty.
    pub arguments: Vec<Value>,
}

/// Why a payload failed envelope validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Payload was not a JSON object.
    NotAnObject,
    /// No `function` field.
    MissingFunction,
    /// `function` present but not a string.
    FunctionNotString,
    /// No `arguments` field; senders must include an empty array.
    MissingArguments,
    /// `arguments` present but not an array.
    ArgumentsNotArray,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotAnObject => "payload is not an object",
            Self::MissingFunction => "missing 'function' field",
            Self::FunctionNotString => "'function' is not a string",
            Self::MissingArguments => "missing 'arguments' field",
            Self::ArgumentsNotArray => "'arguments' is not an array",
        };
        write!(f, "invalid envelope: {reason}")
    }
}

impl Error for EnvelopeError {}

impl Envelope {
    /// Build an envelope for sending.
    pub fn new(function: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            function: function.into(),
            arguments,
        }
    }

    /// An envelope with the default empty argument list.
    pub fn bare(function: impl Into<String>) -> Self {
        Self::new(function, Vec::new())
    }

    /// Validate and extract an envelope from a raw payload.
    pub fn parse(payload: &Value) -> Result<Self, EnvelopeError> {
        let object = payload.as_object().ok_or(EnvelopeError::NotAnObject)?;
        let function = object
            .get("function")
            .ok_or(EnvelopeError::MissingFunction)?
            .as_str()
            .ok_or(EnvelopeError::FunctionNotString)?;
        let arguments = object
            .get("arguments")
            .ok_or(EnvelopeError::MissingArguments)?
            .as_array()
            .ok_or(EnvelopeError::ArgumentsNotArray)?;
        Ok(Self {
            function: function.to_owned(),
            arguments: arguments.clone(),
        })
    }

    /// The wire form.
    pub fn to_value(&self) -> Value {
        json!({ "function": self.function, "arguments": self.arguments })
    }

    /// Argument at `index` as text. JSON scalars coerce the way they would
    /// in a dynamically typed sender; containers and `null` do not.
    pub fn text_arg(&self, index: usize) -> Option<String> {
        match self.arguments.get(index)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Raw argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index)
    }
}
