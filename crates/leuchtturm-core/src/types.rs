use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalogs::{PATH_SEPARATOR, TYPE_CATALOG};
use crate::error::LeuchtturmError;

/// A persisted row as seen by resolvers and the DAO collaborator.
pub type Record = serde_json::Map<String, Value>;

/// Resolver arguments, keyed by argument name.
pub type Args = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Model identifiers
// ---------------------------------------------------------------------------

/// Fully qualified model path, e.g. `app::models::User`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        match path.strip_prefix(PATH_SEPARATOR) {
            Some(stripped) => ModelId(stripped.to_string()),
            None => ModelId(path),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment (`app::models::User` → `User`).
    pub fn bare_name(&self) -> &str {
        self.0
            .rsplit_once(PATH_SEPARATOR)
            .map(|(_, name)| name)
            .unwrap_or(&self.0)
    }

    /// Everything before the last segment, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.0.rsplit_once(PATH_SEPARATOR).map(|(ns, _)| ns)
    }

    /// Qualify a type written next to this model against its namespace.
    ///
    /// `Login` → `app::models::Login`; already qualified paths and
    /// paths with a leading `::` are taken as they are.
    pub fn qualify(&self, ty: &str) -> ModelId {
        if let Some(absolute) = ty.strip_prefix(PATH_SEPARATOR) {
            return ModelId(absolute.to_string());
        }
        if ty.contains(PATH_SEPARATOR) {
            return ModelId(ty.to_string());
        }
        match self.namespace() {
            Some(ns) => ModelId(format!("{ns}{PATH_SEPARATOR}{ty}")),
            None => ModelId(ty.to_string()),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(value: &str) -> Self {
        ModelId::new(value)
    }
}

impl From<String> for ModelId {
    fn from(value: String) -> Self {
        ModelId::new(value)
    }
}

// ---------------------------------------------------------------------------
// Declared property types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Int,
    Float,
    Bool,
    /// A list-valued property. Only representable through a declared relation.
    Array,
}

impl PropertyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Int => "int",
            PropertyKind::Float => "float",
            PropertyKind::Bool => "bool",
            PropertyKind::Array => "array",
        }
    }
}

/// A property type as written in a descriptor: `string`, `?int`, `array`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeDecl {
    pub kind: PropertyKind,
    pub nullable: bool,
}

impl TypeDecl {
    pub fn new(kind: PropertyKind) -> Self {
        TypeDecl {
            kind,
            nullable: false,
        }
    }

    pub fn nullable(kind: PropertyKind) -> Self {
        TypeDecl {
            kind,
            nullable: true,
        }
    }
}

impl FromStr for TypeDecl {
    type Err = LeuchtturmError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (nullable, name) = match trimmed.strip_prefix('?') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let lowered = name.to_ascii_lowercase();
        if !TYPE_CATALOG.contains(lowered.as_str()) {
            return Err(LeuchtturmError::InvalidTypeDecl(raw.to_string()));
        }
        let kind = match lowered.as_str() {
            "string" => PropertyKind::String,
            "int" => PropertyKind::Int,
            "float" => PropertyKind::Float,
            "bool" => PropertyKind::Bool,
            _ => PropertyKind::Array,
        };
        Ok(TypeDecl { kind, nullable })
    }
}

impl TryFrom<String> for TypeDecl {
    type Error = LeuchtturmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TypeDecl> for String {
    fn from(value: TypeDecl) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            f.write_str("?")?;
        }
        f.write_str(self.kind.as_str())
    }
}

// ---------------------------------------------------------------------------
// Model descriptors (what a model supplies about itself)
// ---------------------------------------------------------------------------

/// Distinguishes an explicit `null` default from an absent one.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDecl,
    #[serde(default, deserialize_with = "present")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guards: Vec<String>,
}

impl PropertyDecl {
    pub fn new(name: impl Into<String>, ty: TypeDecl) -> Self {
        PropertyDecl {
            name: name.into(),
            ty,
            default: None,
            guards: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, TypeDecl::new(PropertyKind::String))
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, TypeDecl::new(PropertyKind::Int))
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, TypeDecl::new(PropertyKind::Float))
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, TypeDecl::new(PropertyKind::Bool))
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, TypeDecl::new(PropertyKind::Array))
    }

    pub fn nullable(mut self) -> Self {
        self.ty.nullable = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guards.push(guard.into());
        self
    }
}

/// A constructor parameter. Only its default value matters to introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    #[serde(default, deserialize_with = "present")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>) -> Self {
        ParameterDecl {
            name: name.into(),
            default: None,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Structured relation declaration. Takes precedence over a doc annotation
/// describing the same field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDecl {
    pub field: String,
    pub target: String,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

impl RelationDecl {
    pub fn has_one(field: impl Into<String>, target: impl Into<String>) -> Self {
        RelationDecl {
            field: field.into(),
            target: target.into(),
            many: false,
            nullable: false,
            foreign_key: None,
        }
    }

    pub fn has_many(field: impl Into<String>, target: impl Into<String>) -> Self {
        RelationDecl {
            many: true,
            ..Self::has_one(field, target)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

/// Everything a model states about its own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: ModelId,
    /// Type name override. Defaults to the bare model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Documentation block carrying `@property` / `@protect` annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor: Vec<ParameterDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationDecl>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<ModelId>) -> Self {
        ModelDescriptor {
            id: id.into(),
            name: None,
            description: None,
            doc: None,
            properties: Vec::new(),
            constructor: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn property(mut self, property: PropertyDecl) -> Self {
        self.properties.push(property);
        self
    }

    pub fn parameter(mut self, parameter: ParameterDecl) -> Self {
        self.constructor.push(parameter);
        self
    }

    pub fn relation(mut self, relation: RelationDecl) -> Self {
        self.relations.push(relation);
        self
    }

    /// Type name used for the derived output type.
    pub fn type_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.bare_name())
    }
}

// ---------------------------------------------------------------------------
// Introspection results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub nullable: bool,
    /// `Some(Value::Null)` is a real `null` default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guards: Vec<String>,
}

impl PropertyDescriptor {
    pub fn has_default_value(&self) -> bool {
        self.default_value.is_some()
    }

    pub fn is_array_type(&self) -> bool {
        self.kind == PropertyKind::Array
    }

    pub fn has_guards(&self) -> bool {
        !self.guards.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// The `-read` / `-write` suffix of a `@property` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyAccess {
    #[default]
    ReadWrite,
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationHint {
    pub field: String,
    pub target: ModelId,
    pub cardinality: Cardinality,
    pub nullable: bool,
    pub access: PropertyAccess,
    /// Column on the target holding this model's id, for one-to-many relations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guards: Vec<String>,
}

impl RelationHint {
    pub fn to_one(field: impl Into<String>, target: impl Into<ModelId>) -> Self {
        RelationHint {
            field: field.into(),
            target: target.into(),
            cardinality: Cardinality::ToOne,
            nullable: false,
            access: PropertyAccess::ReadWrite,
            foreign_key: None,
            guards: Vec::new(),
        }
    }

    pub fn to_many(field: impl Into<String>, target: impl Into<ModelId>) -> Self {
        RelationHint {
            cardinality: Cardinality::ToMany,
            ..Self::to_one(field, target)
        }
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

/// Introspected shape of one model: its scalar properties plus relation
/// hints split by cardinality. Declaration order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSchema {
    pub model: ModelId,
    pub properties: Vec<PropertyDescriptor>,
    pub has_one: Vec<RelationHint>,
    pub has_many: Vec<RelationHint>,
}

impl ModelSchema {
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn relation(&self, field: &str) -> Option<&RelationHint> {
        self.has_one
            .iter()
            .chain(self.has_many.iter())
            .find(|r| r.field == field)
    }
}

// ---------------------------------------------------------------------------
// CRUD operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    All,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::Delete,
        Operation::All,
    ];

    /// The CRUD letter (`C`, `R`, `U`, `D`, `A`).
    pub fn letter(self) -> char {
        match self {
            Operation::Create => 'C',
            Operation::Read => 'R',
            Operation::Update => 'U',
            Operation::Delete => 'D',
            Operation::All => 'A',
        }
    }

    /// Create, Update and Delete change data and belong on the mutation root.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete
        )
    }

    /// Whether the field takes an `id` argument.
    pub fn takes_id(self) -> bool {
        matches!(
            self,
            Operation::Read | Operation::Update | Operation::Delete
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::All => "all",
        };
        f.write_str(s)
    }
}
