//! GraphQL type-system primitives the factories assemble.
//!
//! Object and input object types are shared handles compared by identity.
//! Their field lists are attached once after construction, which lets two
//! models refer to each other: the second one receives the handle of a type
//! whose fields are still being built.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::auth::ResolveContext;
use crate::error::Result;
use crate::types::Args;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    String,
    Int,
    Float,
    Boolean,
}

impl Scalar {
    pub fn name(self) -> &'static str {
        match self {
            Scalar::String => "String",
            Scalar::Int => "Int",
            Scalar::Float => "Float",
            Scalar::Boolean => "Boolean",
        }
    }
}

#[derive(Clone, PartialEq)]
pub enum GraphType {
    Scalar(Scalar),
    NonNull(Box<GraphType>),
    List(Box<GraphType>),
    Object(ObjectType),
    InputObject(InputObjectType),
}

impl GraphType {
    pub fn non_null(inner: GraphType) -> Self {
        GraphType::NonNull(Box::new(inner))
    }

    pub fn list(inner: GraphType) -> Self {
        GraphType::List(Box::new(inner))
    }

    /// `[inner!]!`
    pub fn non_null_list_of(inner: GraphType) -> Self {
        Self::non_null(Self::list(Self::non_null(inner)))
    }

    /// The wrapped type of a `NonNull` or `List`.
    pub fn inner(&self) -> Option<&GraphType> {
        match self {
            GraphType::NonNull(inner) | GraphType::List(inner) => Some(inner),
            _ => None,
        }
    }

    /// The innermost named type.
    pub fn named(&self) -> &GraphType {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, GraphType::NonNull(_))
    }

    pub fn is_list(&self) -> bool {
        match self {
            GraphType::List(_) => true,
            GraphType::NonNull(inner) => inner.is_list(),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            GraphType::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_input_object(&self) -> Option<&InputObjectType> {
        match self {
            GraphType::InputObject(input) => Some(input),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            GraphType::Scalar(scalar) => Some(scalar.name()),
            GraphType::Object(object) => Some(object.name()),
            GraphType::InputObject(input) => Some(input.name()),
            GraphType::NonNull(_) | GraphType::List(_) => None,
        }
    }
}

impl From<Scalar> for GraphType {
    fn from(value: Scalar) -> Self {
        GraphType::Scalar(value)
    }
}

impl From<ObjectType> for GraphType {
    fn from(value: ObjectType) -> Self {
        GraphType::Object(value)
    }
}

impl From<InputObjectType> for GraphType {
    fn from(value: InputObjectType) -> Self {
        GraphType::InputObject(value)
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphType::NonNull(inner) => write!(f, "{inner}!"),
            GraphType::List(inner) => write!(f, "[{inner}]"),
            GraphType::Scalar(scalar) => f.write_str(scalar.name()),
            GraphType::Object(object) => f.write_str(object.name()),
            GraphType::InputObject(input) => f.write_str(input.name()),
        }
    }
}

// Object types can be cyclic, so never recurse into their fields here.
impl fmt::Debug for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphType({self})")
    }
}

// ---------------------------------------------------------------------------
// Fields and arguments
// ---------------------------------------------------------------------------

/// Resolves one field: `(context, parent value, arguments) -> value`.
pub type Resolver = Arc<dyn Fn(&ResolveContext<'_>, &Value, &Args) -> Result<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldArgument {
    pub name: String,
    pub ty: GraphType,
    pub default_value: Option<Value>,
}

impl FieldArgument {
    pub fn new(name: impl Into<String>, ty: GraphType) -> Self {
        FieldArgument {
            name: name.into(),
            ty,
            default_value: None,
        }
    }
}

#[derive(Clone)]
pub struct TypeField {
    pub name: String,
    pub description: Option<String>,
    pub ty: GraphType,
    pub args: Vec<FieldArgument>,
    pub default_value: Option<Value>,
    resolver: Option<Resolver>,
}

impl TypeField {
    pub fn new(name: impl Into<String>, ty: GraphType) -> Self {
        TypeField {
            name: name.into(),
            description: None,
            ty,
            args: Vec::new(),
            default_value: None,
            resolver: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn argument(mut self, argument: FieldArgument) -> Self {
        self.args.push(argument);
        self
    }

    pub fn default_value(mut self, value: Option<Value>) -> Self {
        self.default_value = value;
        self
    }

    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Run the field's resolver, or read the property of the same name
    /// from the parent object when it has none.
    pub fn resolve(&self, ctx: &ResolveContext<'_>, parent: &Value, args: &Args) -> Result<Value> {
        match &self.resolver {
            Some(resolver) => resolver(ctx, parent, args),
            None => Ok(parent.get(&self.name).cloned().unwrap_or(Value::Null)),
        }
    }
}

impl fmt::Debug for TypeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeField")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("args", &self.args)
            .field("default_value", &self.default_value)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputField {
    pub name: String,
    pub ty: GraphType,
    pub default_value: Option<Value>,
}

impl InputField {
    pub fn new(name: impl Into<String>, ty: GraphType) -> Self {
        InputField {
            name: name.into(),
            ty,
            default_value: None,
        }
    }

    pub fn default_value(mut self, value: Option<Value>) -> Self {
        self.default_value = value;
        self
    }
}

// ---------------------------------------------------------------------------
// Named types
// ---------------------------------------------------------------------------

struct ObjectInner {
    name: String,
    description: String,
    fields: OnceLock<Vec<TypeField>>,
}

/// Shared handle to an object type. Clones refer to the same type.
#[derive(Clone)]
pub struct ObjectType(Arc<ObjectInner>);

impl ObjectType {
    /// A type whose fields are attached later with [`ObjectType::set_fields`].
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        ObjectType(Arc::new(ObjectInner {
            name: name.into(),
            description: description.into(),
            fields: OnceLock::new(),
        }))
    }

    pub fn with_fields(
        name: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<TypeField>,
    ) -> Self {
        let object = Self::new(name, description);
        object.set_fields(fields);
        object
    }

    /// Attach the field list. Only the first call has an effect.
    pub fn set_fields(&self, fields: Vec<TypeField>) -> bool {
        self.0.fields.set(fields).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    /// Empty until the fields are attached.
    pub fn fields(&self) -> &[TypeField] {
        self.0.fields.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_complete(&self) -> bool {
        self.0.fields.get().is_some()
    }

    pub fn field(&self, name: &str) -> Option<&TypeField> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields().iter().map(|f| f.name.as_str()).collect()
    }

    pub fn ptr_eq(&self, other: &ObjectType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name())
            .field("fields", &self.field_names())
            .finish()
    }
}

struct InputObjectInner {
    name: String,
    description: String,
    fields: OnceLock<Vec<InputField>>,
}

/// Shared handle to an input object type. Clones refer to the same type.
#[derive(Clone)]
pub struct InputObjectType(Arc<InputObjectInner>);

impl InputObjectType {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        InputObjectType(Arc::new(InputObjectInner {
            name: name.into(),
            description: description.into(),
            fields: OnceLock::new(),
        }))
    }

    pub fn set_fields(&self, fields: Vec<InputField>) -> bool {
        self.0.fields.set(fields).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    pub fn fields(&self) -> &[InputField] {
        self.0.fields.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields().iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields().iter().map(|f| f.name.as_str()).collect()
    }

    pub fn ptr_eq(&self, other: &InputObjectType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for InputObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for InputObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputObjectType")
            .field("name", &self.name())
            .field("fields", &self.fields())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Schema root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Schema {
    query: ObjectType,
    mutation: Option<ObjectType>,
}

impl Schema {
    pub fn new(query: ObjectType, mutation: Option<ObjectType>) -> Self {
        Schema { query, mutation }
    }

    pub fn query(&self) -> &ObjectType {
        &self.query
    }

    pub fn mutation(&self) -> Option<&ObjectType> {
        self.mutation.as_ref()
    }

    /// A root field, looked up on the query type first.
    pub fn root_field(&self, name: &str) -> Option<&TypeField> {
        self.query
            .field(name)
            .or_else(|| self.mutation.as_ref().and_then(|m| m.field(name)))
    }

    /// Every named non-root type reachable from the roots, in discovery order.
    pub fn types(&self) -> Vec<GraphType> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut found: Vec<GraphType> = Vec::new();
        seen.insert(self.query.name().to_string());
        if let Some(mutation) = &self.mutation {
            seen.insert(mutation.name().to_string());
        }
        for root in std::iter::once(&self.query).chain(self.mutation.iter()) {
            for field in root.fields() {
                collect_types(&field.ty, &mut seen, &mut found);
                for arg in &field.args {
                    collect_types(&arg.ty, &mut seen, &mut found);
                }
            }
        }
        found
    }

    /// Render the schema in GraphQL SDL.
    pub fn sdl(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();
        for ty in self.types() {
            match ty {
                GraphType::Object(object) => blocks.push(render_object(&object)),
                GraphType::InputObject(input) => blocks.push(render_input(&input)),
                _ => {}
            }
        }
        blocks.push(render_object(&self.query));
        if let Some(mutation) = &self.mutation {
            blocks.push(render_object(mutation));
        }
        blocks.join("\n\n") + "\n"
    }
}

fn collect_types(ty: &GraphType, seen: &mut HashSet<String>, found: &mut Vec<GraphType>) {
    match ty.named() {
        GraphType::Object(object) => {
            if !seen.insert(object.name().to_string()) {
                return;
            }
            found.push(ty.named().clone());
            for field in object.fields() {
                collect_types(&field.ty, seen, found);
                for arg in &field.args {
                    collect_types(&arg.ty, seen, found);
                }
            }
        }
        GraphType::InputObject(input) => {
            if !seen.insert(input.name().to_string()) {
                return;
            }
            found.push(ty.named().clone());
            for field in input.fields() {
                collect_types(&field.ty, seen, found);
            }
        }
        _ => {}
    }
}

fn render_description(description: &str, indent: &str) -> String {
    if description.is_empty() {
        String::new()
    } else {
        format!("{indent}\"\"\"{description}\"\"\"\n")
    }
}

fn render_default(value: &Option<Value>) -> String {
    match value {
        Some(v) => format!(" = {v}"),
        None => String::new(),
    }
}

fn render_object(object: &ObjectType) -> String {
    let mut out = render_description(object.description(), "");
    out.push_str(&format!("type {} {{\n", object.name()));
    for field in object.fields() {
        if let Some(description) = &field.description {
            out.push_str(&render_description(description, "  "));
        }
        let args = if field.args.is_empty() {
            String::new()
        } else {
            let rendered: Vec<String> = field
                .args
                .iter()
                .map(|a| format!("{}: {}{}", a.name, a.ty, render_default(&a.default_value)))
                .collect();
            format!("({})", rendered.join(", "))
        };
        out.push_str(&format!("  {}{}: {}\n", field.name, args, field.ty));
    }
    out.push('}');
    out
}

fn render_input(input: &InputObjectType) -> String {
    let mut out = render_description(input.description(), "");
    out.push_str(&format!("input {} {{\n", input.name()));
    for field in input.fields() {
        out.push_str(&format!(
            "  {}: {}{}\n",
            field.name,
            field.ty,
            render_default(&field.default_value)
        ));
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wrapper_display() {
        let object = ObjectType::new("Login", "");
        let ty = GraphType::non_null_list_of(object.clone().into());
        assert_eq!(ty.to_string(), "[Login!]!");
        assert!(ty.is_list());
        assert_eq!(ty.named().as_object(), Some(&object));
    }

    #[test]
    fn identity_equality() {
        let a = ObjectType::new("User", "");
        let b = ObjectType::new("User", "");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn fields_attach_once() {
        let object = ObjectType::new("User", "");
        assert!(!object.is_complete());
        assert!(object.set_fields(vec![TypeField::new("id", GraphType::non_null(Scalar::Int.into()))]));
        assert!(!object.set_fields(Vec::new()));
        assert_eq!(object.field_names(), vec!["id"]);
    }

    #[test]
    fn renders_cyclic_schema() {
        let user = ObjectType::new("User", "");
        let login = ObjectType::with_fields(
            "Login",
            "",
            vec![TypeField::new("user", GraphType::non_null(user.clone().into()))],
        );
        user.set_fields(vec![
            TypeField::new("id", GraphType::non_null(Scalar::Int.into())),
            TypeField::new("logins", GraphType::non_null_list_of(login.into())),
        ]);
        let input = InputObjectType::new("UserInput", "");
        input.set_fields(vec![InputField::new("role", GraphType::non_null(Scalar::String.into()))
            .default_value(Some(Value::from("USER")))]);
        let query = ObjectType::with_fields(
            "Query",
            "Root Query",
            vec![TypeField::new("user", user.into())
                .argument(FieldArgument::new("id", GraphType::non_null(Scalar::Int.into())))
                .argument(FieldArgument::new("user", GraphType::non_null(input.into())))],
        );

        let expected = r#"type User {
  id: Int!
  logins: [Login!]!
}

type Login {
  user: User!
}

input UserInput {
  role: String! = "USER"
}

"""Root Query"""
type Query {
  user(id: Int!, user: UserInput!): User
}
"#;
        assert_eq!(Schema::new(query, None).sdl(), expected);
    }
}
