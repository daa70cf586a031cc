//! Type Registry
//!
//! Immutable map from tag to [`Schema`], plus the class index used to
//! resolve polymorphic fields and results. Built once through
//! [`RegistryBuilder`], which rejects duplicate tags and references to
//! types that were never declared.

use crate::errors::{CoreError, Result, SchemaError};
use crate::object::{json_kind, value_as_i64, TaggedObject, TYPE_KEY};
use crate::schema::{FieldType, Schema};
use base64::Engine as _;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Nested objects deeper than this are rejected
const MAX_DEPTH: usize = 32;

/// Largest integer a double represents exactly
const MAX_INT53: u64 = (1 << 53) - 1;

/// Tag → shape lookup for the whole protocol surface
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    schemas: HashMap<String, Schema>,
    classes: HashMap<String, BTreeSet<String>>,
}

/// Incremental registry construction
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    schemas: Vec<Schema>,
}

impl RegistryBuilder {
    /// Add one schema
    pub fn add(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Add many schemas
    pub fn extend(mut self, schemas: impl IntoIterator<Item = Schema>) -> Self {
        self.schemas.extend(schemas);
        self
    }

    /// Check consistency and freeze
    pub fn build(self) -> Result<TypeRegistry> {
        let mut registry = TypeRegistry::default();

        for schema in self.schemas {
            if let Some(class) = schema.class() {
                registry
                    .classes
                    .entry(class.to_string())
                    .or_default()
                    .insert(schema.tag().to_string());
            }
            let tag = schema.tag().to_string();
            if registry.schemas.insert(tag.clone(), schema).is_some() {
                return Err(CoreError::registry(format!("duplicate tag `{tag}`")));
            }
        }

        for class in registry.classes.keys() {
            if registry.schemas.contains_key(class) {
                return Err(CoreError::registry(format!(
                    "class `{class}` collides with a tag of the same name"
                )));
            }
        }

        for schema in registry.schemas.values() {
            for spec in schema.fields() {
                if let Some(name) = spec.ty.referenced_type() {
                    if !registry.is_object_type(name) {
                        return Err(CoreError::registry(format!(
                            "`{}.{}` refers to undeclared type `{name}`",
                            schema.tag(),
                            spec.name
                        )));
                    }
                }
            }
            if let Some(result) = schema.result() {
                if !registry.is_object_type(result) {
                    return Err(CoreError::registry(format!(
                        "`{}` returns undeclared type `{result}`",
                        schema.tag()
                    )));
                }
            }
        }

        Ok(registry)
    }
}

impl TypeRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding the built-in protocol surface.
    ///
    /// Fails if the catalog and the declared surface disagree.
    pub fn builtin() -> Result<Self> {
        let registry = Self::builder()
            .extend(crate::catalog::schemas())
            .build()?;
        registry.check_surface(crate::catalog::DECLARED_TAGS)?;
        Ok(registry)
    }

    /// Look up the schema of a tag
    pub fn resolve(&self, tag: &str) -> Result<&Schema> {
        self.schemas
            .get(tag)
            .ok_or_else(|| CoreError::not_found(tag))
    }

    /// Look up the schema of a tag, if any
    pub fn get(&self, tag: &str) -> Option<&Schema> {
        self.schemas.get(tag)
    }

    /// Number of registered tags
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// All registered tags
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    /// Constructors of a polymorphic class
    pub fn class_members(&self, class: &str) -> Option<&BTreeSet<String>> {
        self.classes.get(class)
    }

    /// Whether an object with `tag` is acceptable where `type_name` is
    /// declared: the same constructor, or a member of that class.
    pub fn conforms(&self, tag: &str, type_name: &str) -> bool {
        if tag == type_name {
            return self
                .schemas
                .get(tag)
                .is_some_and(|schema| !schema.is_function());
        }
        self.classes
            .get(type_name)
            .is_some_and(|members| members.contains(tag))
    }

    /// Check that every declared tag has exactly one entry and that no
    /// entry is missing from the declaration.
    pub fn check_surface(&self, declared: &[&str]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for tag in declared {
            if !seen.insert(*tag) {
                return Err(CoreError::registry(format!("tag `{tag}` declared twice")));
            }
        }
        let missing: Vec<&str> = seen
            .iter()
            .copied()
            .filter(|tag| !self.schemas.contains_key(*tag))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::registry(format!(
                "declared tags without a schema: {}",
                missing.join(", ")
            )));
        }
        let mut undeclared: Vec<&str> = self
            .tags()
            .filter(|tag| !seen.contains(tag))
            .collect();
        if !undeclared.is_empty() {
            undeclared.sort_unstable();
            return Err(CoreError::registry(format!(
                "schemas missing from the declared surface: {}",
                undeclared.join(", ")
            )));
        }
        Ok(())
    }

    /// Validate an outgoing request against its function schema
    pub fn validate(&self, request: &TaggedObject) -> Result<&Schema> {
        let schema = self.resolve(request.tag())?;
        if !schema.is_function() {
            return Err(CoreError::schema(
                TYPE_KEY,
                format!("`{}` is an object, not a function", request.tag()),
            ));
        }
        self.check_fields(schema, request.fields(), "", 0)?;
        Ok(schema)
    }

    fn is_object_type(&self, name: &str) -> bool {
        self.classes.contains_key(name)
            || self
                .schemas
                .get(name)
                .is_some_and(|schema| !schema.is_function())
    }

    fn check_fields(
        &self,
        schema: &Schema,
        fields: &serde_json::Map<String, Value>,
        prefix: &str,
        depth: usize,
    ) -> std::result::Result<(), SchemaError> {
        for spec in schema.fields() {
            let path = join(prefix, &spec.name);
            match fields.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(SchemaError::new(path, "missing required field"));
                }
                None | Some(Value::Null) => {}
                Some(value) => self.check_value(value, &spec.ty, &path, depth)?,
            }
        }
        for key in fields.keys() {
            if key != TYPE_KEY && schema.field_spec(key).is_none() {
                return Err(SchemaError::new(
                    join(prefix, key),
                    format!("unknown field of `{}`", schema.tag()),
                ));
            }
        }
        Ok(())
    }

    fn check_tagged(
        &self,
        tag: &str,
        fields: &serde_json::Map<String, Value>,
        type_name: &str,
        path: &str,
        depth: usize,
    ) -> std::result::Result<(), SchemaError> {
        if depth > MAX_DEPTH {
            return Err(SchemaError::new(field_or_type(path), "nesting too deep"));
        }
        let Some(schema) = self.schemas.get(tag) else {
            return Err(SchemaError::new(
                field_or_type(path),
                format!("unknown type `{tag}`"),
            ));
        };
        if !self.conforms(tag, type_name) {
            return Err(SchemaError::new(
                field_or_type(path),
                format!("`{tag}` is not a `{type_name}`"),
            ));
        }
        self.check_fields(schema, fields, path, depth + 1)
    }

    fn check_value(
        &self,
        value: &Value,
        ty: &FieldType,
        path: &str,
        depth: usize,
    ) -> std::result::Result<(), SchemaError> {
        let mismatch = |expected: &str| {
            SchemaError::new(
                path,
                format!("expected {expected}, found {}", json_kind(value)),
            )
        };

        match ty {
            FieldType::Int32 => {
                let n = value.as_i64().ok_or_else(|| mismatch("int32"))?;
                if i32::try_from(n).is_err() {
                    return Err(SchemaError::new(path, format!("{n} is out of int32 range")));
                }
            }
            FieldType::Int53 => {
                let n = value.as_i64().ok_or_else(|| mismatch("int53"))?;
                if n.unsigned_abs() > MAX_INT53 {
                    return Err(SchemaError::new(path, format!("{n} is out of int53 range")));
                }
            }
            FieldType::Int64 => {
                value_as_i64(value).ok_or_else(|| mismatch("int64"))?;
            }
            FieldType::Double => {
                if !value.is_number() {
                    return Err(mismatch("double"));
                }
            }
            FieldType::Bool => {
                if !value.is_boolean() {
                    return Err(mismatch("bool"));
                }
            }
            FieldType::String => {
                if !value.is_string() {
                    return Err(mismatch("string"));
                }
            }
            FieldType::Bytes => {
                let encoded = value.as_str().ok_or_else(|| mismatch("base64 bytes"))?;
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|err| SchemaError::new(path, format!("invalid base64: {err}")))?;
            }
            FieldType::Vector(element) => {
                let items = value.as_array().ok_or_else(|| mismatch("array"))?;
                for (index, item) in items.iter().enumerate() {
                    self.check_value(item, element, &format!("{path}[{index}]"), depth + 1)?;
                }
            }
            FieldType::Object(type_name) => {
                let map = value.as_object().ok_or_else(|| mismatch("object"))?;
                let tag = map
                    .get(TYPE_KEY)
                    .and_then(Value::as_str)
                    .ok_or_else(|| SchemaError::new(path, "nested object has no `@type`"))?;
                self.check_tagged(tag, map, type_name, path, depth)?;
            }
        }
        Ok(())
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn field_or_type(path: &str) -> &str {
    if path.is_empty() {
        TYPE_KEY
    } else {
        path
    }
}
