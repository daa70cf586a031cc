//! Field and result shapes
//!
//! A [`Schema`] describes one tag of the protocol surface: either an object
//! constructor (optionally belonging to a polymorphic class) or a function
//! with its expected result type and admissibility.

use crate::admission::Admission;

/// Declared type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// 32-bit signed integer
    Int32,
    /// Integer exactly representable as a double
    Int53,
    /// 64-bit signed integer, JSON number or decimal string
    Int64,
    /// Floating point number
    Double,
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Base64-encoded bytes
    Bytes,
    /// Homogeneous array
    Vector(Box<FieldType>),
    /// Tagged object of a concrete constructor or a polymorphic class
    Object(String),
}

impl FieldType {
    /// Array of `element`
    pub fn vector(element: FieldType) -> Self {
        Self::Vector(Box::new(element))
    }

    /// Object of the given constructor tag or class name
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::Object(type_name.into())
    }

    /// Object type name this type refers to, looking through vectors
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            Self::Vector(inner) => inner.referenced_type(),
            Self::Object(name) => Some(name),
            _ => None,
        }
    }
}

/// One named field of a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: FieldType,
    /// Whether the field must be present and non-null
    pub required: bool,
}

/// What a tag denotes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    /// Object constructor
    Object {
        /// Polymorphic class this constructor belongs to
        class: Option<String>,
    },
    /// Callable function
    Function {
        /// Expected result: a constructor tag or a class name
        result: String,
        /// When the function may be sent
        admission: Admission,
        /// Whether the engine can answer it without a round trip
        local: bool,
    },
}

/// Shape of one tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    tag: String,
    fields: Vec<FieldSpec>,
    kind: SchemaKind,
}

impl Schema {
    /// Declare an object constructor
    pub fn object(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Vec::new(),
            kind: SchemaKind::Object { class: None },
        }
    }

    /// Declare a function returning `result`, admissible in any state
    pub fn function(tag: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: Vec::new(),
            kind: SchemaKind::Function {
                result: result.into(),
                admission: Admission::Always,
                local: false,
            },
        }
    }

    /// Place an object constructor in a polymorphic class
    pub fn of(mut self, class_name: impl Into<String>) -> Self {
        if let SchemaKind::Object { class } = &mut self.kind {
            *class = Some(class_name.into());
        }
        self
    }

    /// Add a required field
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            required: true,
        });
        self
    }

    /// Add an optional field
    pub fn optional(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    /// Restrict when a function may be sent
    pub fn admit(mut self, rule: Admission) -> Self {
        if let SchemaKind::Function { admission, .. } = &mut self.kind {
            *admission = rule;
        }
        self
    }

    /// Mark a function as answerable without a round trip
    pub fn local(mut self) -> Self {
        if let SchemaKind::Function { local, .. } = &mut self.kind {
            *local = true;
        }
        self
    }

    /// Tag this schema describes
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Field by name
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    /// Object or function
    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    /// Whether this is a function
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SchemaKind::Function { .. })
    }

    /// Class of an object constructor
    pub fn class(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Object { class } => class.as_deref(),
            SchemaKind::Function { .. } => None,
        }
    }

    /// Expected result of a function
    pub fn result(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Function { result, .. } => Some(result),
            SchemaKind::Object { .. } => None,
        }
    }

    /// Admissibility of a function
    pub fn admission(&self) -> Option<&Admission> {
        match &self.kind {
            SchemaKind::Function { admission, .. } => Some(admission),
            SchemaKind::Object { .. } => None,
        }
    }

    /// Whether a function can be executed locally
    pub fn is_local(&self) -> bool {
        matches!(self.kind, SchemaKind::Function { local: true, .. })
    }
}
