//! Attribute declarations
//!
//! Each model attribute is declared once with a name, a default and
//! whether it holds the object id.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Produces a fresh value for every new instance
pub type Generator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Default value of an attribute
#[derive(Clone)]
pub enum AttrDefault {
    /// Copied into every new instance
    Value(Value),

    /// Called once per new instance
    Generator(Generator),
}

impl AttrDefault {
    /// Evaluate the default for one new instance
    pub fn produce(&self) -> Value {
        match self {
            AttrDefault::Value(value) => value.clone(),
            AttrDefault::Generator(generate) => generate(),
        }
    }
}

impl fmt::Debug for AttrDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            AttrDefault::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// Declaration of one model attribute
#[derive(Debug, Clone)]
pub struct AttrSpec {
    name: String,
    default: Option<AttrDefault>,
    is_object_id: bool,
}

impl AttrSpec {
    /// A regular attribute defaulting to `null`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            is_object_id: false,
        }
    }

    /// The object-id attribute, defaulting to UUID v4 strings
    pub fn object_id(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            is_object_id: true,
        }
    }

    /// Constant default, copied into each new instance
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(AttrDefault::Value(value.into()));
        self
    }

    /// Generated default, evaluated once per new instance
    pub fn generator<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(AttrDefault::Generator(Arc::new(generate)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_object_id(&self) -> bool {
        self.is_object_id
    }

    pub fn default(&self) -> Option<&AttrDefault> {
        self.default.as_ref()
    }

    /// Value an unset attribute takes in a new instance
    pub fn default_for_new(&self) -> Value {
        match &self.default {
            Some(default) => default.produce(),
            None if self.is_object_id => uuid_v4(),
            None => Value::Null,
        }
    }
}

/// Random UUID v4 rendered as a JSON string
pub fn uuid_v4() -> Value {
    Value::String(uuid::Uuid::new_v4().to_string())
}
