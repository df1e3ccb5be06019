//! Output and input type derivation for one model.
//!
//! A [`TypeFactory`] is configured once through [`TypeFactoryBuilder`] and
//! then only builds. Both built types are memoized: the output type handle is
//! stored before its fields are computed, so a related model that refers
//! back to this one while the fields are being built receives the same
//! handle instead of recursing.
//!
//! Output builds run inside a [`BuildSession`]. One thread at a time holds
//! the session; other threads wait until every type it built is published.

use std::mem;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::auth::ResolveContext;
use crate::catalogs::{foreign_key_of, strip_foreign_key, ID_FIELD, IGNORED_BY_DEFAULT, INPUT_SUFFIX};
use crate::dao::Dao;
use crate::error::{invalid_argument, LeuchtturmError, Result};
use crate::graph::{GraphType, InputField, InputObjectType, ObjectType, Resolver, Scalar, TypeField};
use crate::manager::Manager;
use crate::types::*;

/// Configuration of a [`TypeFactory`], collected before it is registered.
///
/// Obtained from [`Manager::type_factory`].
#[must_use = "a type factory builder does nothing until registered"]
pub struct TypeFactoryBuilder<'m> {
    manager: &'m Manager,
    model: ModelId,
    name: Option<String>,
    description: Option<String>,
    ignore: Vec<String>,
    relations: Vec<RelationHint>,
}

impl<'m> TypeFactoryBuilder<'m> {
    pub(crate) fn new(manager: &'m Manager, model: ModelId) -> Self {
        TypeFactoryBuilder {
            manager,
            model,
            name: None,
            description: None,
            ignore: Vec::new(),
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

    /// Leave these properties out of both derived types.
    pub fn ignore<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Declare a has-one relation. `target` is qualified against the model's namespace.
    pub fn has_one(self, field: impl Into<String>, target: impl AsRef<str>) -> Self {
        let target = self.model.qualify(target.as_ref());
        self.relation(RelationHint::to_one(field, target))
    }

    /// Declare a has-many relation. `target` is qualified against the model's namespace.
    pub fn has_many(self, field: impl Into<String>, target: impl AsRef<str>) -> Self {
        let target = self.model.qualify(target.as_ref());
        self.relation(RelationHint::to_many(field, target))
    }

    /// Declare a relation with full control over nullability and foreign key.
    pub fn relation(mut self, hint: RelationHint) -> Self {
        self.relations.push(hint);
        self
    }

    /// Freeze the configuration and register the factory with the manager.
    ///
    /// Fails when the model is unknown or already has a factory.
    pub fn register(self) -> Result<Arc<TypeFactory>> {
        let model = self.manager.model(&self.model)?;
        let schema = self.manager.inspector().schema(&model.descriptor);
        let factory = TypeFactory::new(
            &model.descriptor,
            model.dao.clone(),
            &schema,
            Config {
                name: self.name,
                description: self.description,
                ignore: self.ignore,
                relations: self.relations,
            },
        );
        self.manager.insert_factory(Arc::new(factory))
    }
}

#[derive(Default)]
pub(crate) struct Config {
    pub name: Option<String>,
    pub description: Option<String>,
    pub ignore: Vec<String>,
    pub relations: Vec<RelationHint>,
}

pub struct TypeFactory {
    model: ModelId,
    name: String,
    description: String,
    ignore: Vec<String>,
    properties: Vec<PropertyDescriptor>,
    has_one: Vec<RelationHint>,
    has_many: Vec<RelationHint>,
    dao: Arc<dyn Dao>,
    output: Mutex<OutputMemo>,
    input: Mutex<Option<InputObjectType>>,
}

/// The output handle and whether its build session has ended successfully.
#[derive(Default)]
struct OutputMemo {
    object: Option<ObjectType>,
    published: bool,
}

impl TypeFactory {
    /// Relations declared in `config` replace introspected ones of the same field.
    pub(crate) fn new(
        descriptor: &ModelDescriptor,
        dao: Arc<dyn Dao>,
        schema: &ModelSchema,
        config: Config,
    ) -> Self {
        let mut has_one = schema.has_one.clone();
        let mut has_many = schema.has_many.clone();
        for hint in config.relations {
            has_one.retain(|h| h.field != hint.field);
            has_many.retain(|h| h.field != hint.field);
            if hint.is_many() {
                has_many.push(hint);
            } else {
                has_one.push(hint);
            }
        }

        let mut ignore: Vec<String> = IGNORED_BY_DEFAULT.iter().map(|s| s.to_string()).collect();
        ignore.extend(config.ignore);

        TypeFactory {
            model: descriptor.id.clone(),
            name: config
                .name
                .unwrap_or_else(|| descriptor.type_name().to_string()),
            description: config
                .description
                .or_else(|| descriptor.description.clone())
                .unwrap_or_default(),
            ignore,
            properties: schema.properties.clone(),
            has_one,
            has_many,
            dao,
            output: Mutex::new(OutputMemo::default()),
            input: Mutex::new(None),
        }
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_name(&self) -> String {
        format!("{}{INPUT_SUFFIX}", self.name)
    }

    pub fn dao(&self) -> &Arc<dyn Dao> {
        &self.dao
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignore
    }

    pub fn has_one(&self) -> &[RelationHint] {
        &self.has_one
    }

    pub fn has_many(&self) -> &[RelationHint] {
        &self.has_many
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|i| i == name)
    }

    fn is_has_one(&self, field: &str) -> bool {
        self.has_one.iter().any(|h| h.field == field)
    }

    fn is_has_many(&self, field: &str) -> bool {
        self.has_many.iter().any(|h| h.field == field)
    }

    // -----------------------------------------------------------------------
    // Output type
    // -----------------------------------------------------------------------

    /// The output object type. Every call returns the same handle.
    ///
    /// Related models are built through `manager`. A model reached again
    /// while its own fields are being computed yields its pending handle.
    pub fn build(&self, manager: &Manager) -> Result<ObjectType> {
        manager.build(&self.model)
    }

    /// The output type, once the session that built it has been published.
    pub(crate) fn published(&self) -> Option<ObjectType> {
        let memo = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        memo.object.clone().filter(|_| memo.published)
    }

    /// Only called while holding a [`BuildSession`].
    pub(crate) fn build_output(&self, manager: &Manager) -> Result<ObjectType> {
        let object = {
            let mut memo = self.output.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(object) = &memo.object {
                return Ok(object.clone());
            }
            let object = ObjectType::new(&self.name, &self.description);
            memo.object = Some(object.clone());
            object
        };

        let fields = self.output_fields(manager)?;
        debug!(model = %self.model, ty = %self.name, fields = fields.len(), "built output type");
        object.set_fields(fields);
        Ok(object)
    }

    /// End of the outermost session: publish the handle, or forget it when
    /// any build of the session failed.
    fn settle(&self, failed: bool) {
        let mut memo = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if failed {
            *memo = OutputMemo::default();
        } else {
            memo.published = memo.object.is_some();
        }
    }

    fn output_fields(&self, manager: &Manager) -> Result<Vec<TypeField>> {
        let mut fields = Vec::new();

        for property in &self.properties {
            let base = strip_foreign_key(&property.name);
            if self.is_ignored(&property.name)
                || self.is_has_many(base)
                || self.is_has_one(base)
                || self.has_one.iter().any(|h| to_one_key(h) == property.name)
            {
                continue;
            }
            let mut field = TypeField::new(&property.name, self.scalar_type(property)?)
                .default_value(property.default_value.clone());
            if property.has_guards() {
                field = field.resolver(guarded_property(
                    property.name.clone(),
                    property.guards.clone(),
                ));
            }
            fields.push(field);
        }

        for hint in &self.has_one {
            let target = manager.model(&hint.target)?;
            let object = manager.build(&hint.target)?;
            let fk = to_one_key(hint);
            let fk_required = self
                .property(&fk)
                .is_some_and(|p| !p.nullable);
            let ty = if fk_required && !hint.nullable {
                GraphType::non_null(object.into())
            } else {
                GraphType::Object(object)
            };
            fields.push(
                TypeField::new(&hint.field, ty)
                    .resolver(has_one_resolver(hint, fk, target.dao.clone())),
            );
        }

        for hint in &self.has_many {
            let object = manager.build(&hint.target)?;
            fields.push(
                TypeField::new(&hint.field, GraphType::non_null_list_of(object.into()))
                    .resolver(has_many_resolver(hint, self.dao.clone())),
            );
        }

        Ok(fields)
    }

    // -----------------------------------------------------------------------
    // Input type
    // -----------------------------------------------------------------------

    /// The input object type. Every call returns the same handle.
    ///
    /// Has-one relations are written through their id and has-many relations
    /// through a list of ids, so no object type is ever embedded.
    pub fn build_input(&self) -> Result<InputObjectType> {
        let mut slot = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(input) = slot.as_ref() {
            return Ok(input.clone());
        }
        let input = InputObjectType::new(self.input_name(), &self.description);
        let fields = self.input_fields()?;
        debug!(model = %self.model, ty = %input.name(), fields = fields.len(), "built input type");
        input.set_fields(fields);
        *slot = Some(input.clone());
        Ok(input)
    }

    fn input_fields(&self) -> Result<Vec<InputField>> {
        let mut fields = Vec::new();

        for property in &self.properties {
            let name = property.name.as_str();
            if name == ID_FIELD || self.is_ignored(name) || self.is_has_many(strip_foreign_key(name)) {
                continue;
            }
            fields.push(
                InputField::new(name, self.scalar_type(property)?)
                    .default_value(property.default_value.clone()),
            );
        }

        for hint in &self.has_one {
            let fk = to_one_key(hint);
            if self.property(&fk).is_some() {
                continue;
            }
            let ty = if hint.nullable {
                GraphType::Scalar(Scalar::Int)
            } else {
                GraphType::non_null(Scalar::Int.into())
            };
            fields.push(InputField::new(fk, ty));
        }

        for hint in &self.has_many {
            fields.push(InputField::new(
                &hint.field,
                GraphType::list(GraphType::non_null(Scalar::Int.into())),
            ));
        }

        Ok(fields)
    }

    fn scalar_type(&self, property: &PropertyDescriptor) -> Result<GraphType> {
        let scalar = match property.kind {
            PropertyKind::String => Scalar::String,
            PropertyKind::Int => Scalar::Int,
            PropertyKind::Float => Scalar::Float,
            PropertyKind::Bool => Scalar::Boolean,
            PropertyKind::Array => {
                return Err(LeuchtturmError::UnsupportedArrayProperty {
                    model: self.model.clone(),
                    property: property.name.clone(),
                })
            }
        };
        Ok(if property.nullable {
            GraphType::Scalar(scalar)
        } else {
            GraphType::non_null(scalar.into())
        })
    }
}

impl std::fmt::Debug for TypeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeFactory")
            .field("model", &self.model)
            .field("name", &self.name)
            .field("ignore", &self.ignore)
            .field("has_one", &self.has_one)
            .field("has_many", &self.has_many)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Build sessions
// ---------------------------------------------------------------------------

/// Serializes output builds across threads. Re-entrant for the thread that
/// holds it, so a build can recurse into related models.
#[derive(Default)]
pub(crate) struct BuildLock {
    state: Mutex<BuildState>,
    released: Condvar,
}

#[derive(Default)]
struct BuildState {
    owner: Option<ThreadId>,
    depth: usize,
    failed: bool,
    touched: Vec<Arc<TypeFactory>>,
}

impl BuildLock {
    /// Wait until no other thread holds the lock, then take it.
    pub(crate) fn enter(&self, factory: &Arc<TypeFactory>) -> BuildSession<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.owner.is_some_and(|owner| owner != me) {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.owner = Some(me);
        state.depth += 1;
        state.touched.push(factory.clone());
        BuildSession { lock: self }
    }
}

/// One (possibly nested) output build. When the outermost session ends,
/// every factory it touched is settled before the lock is released.
pub(crate) struct BuildSession<'a> {
    lock: &'a BuildLock,
}

impl BuildSession<'_> {
    pub(crate) fn fail(&self) {
        self.lock
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failed = true;
    }
}

impl Drop for BuildSession<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().unwrap_or_else(PoisonError::into_inner);
        if thread::panicking() {
            state.failed = true;
        }
        state.depth -= 1;
        if state.depth > 0 {
            return;
        }

        let failed = mem::take(&mut state.failed);
        for factory in mem::take(&mut state.touched) {
            factory.settle(failed);
        }
        if failed {
            debug!("output build failed, pending types discarded");
        }
        state.owner = None;
        drop(state);
        self.lock.released.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Field resolvers
// ---------------------------------------------------------------------------

/// Column holding the id of a has-one target.
fn to_one_key(hint: &RelationHint) -> String {
    hint.foreign_key
        .clone()
        .unwrap_or_else(|| foreign_key_of(&hint.field))
}

fn any_guard_validates(ctx: &ResolveContext<'_>, guards: &[String]) -> bool {
    guards.iter().any(|g| ctx.validates(g))
}

fn check_guards(ctx: &ResolveContext<'_>, field: &str, guards: &[String]) -> Result<()> {
    if guards.is_empty() || any_guard_validates(ctx, guards) {
        Ok(())
    } else {
        warn!(field, ?guards, "field guard denied access");
        Err(LeuchtturmError::Unauthorized)
    }
}

fn guarded_property(name: String, guards: Vec<String>) -> Resolver {
    Arc::new(move |ctx, parent, _args| {
        check_guards(ctx, &name, &guards)?;
        Ok(parent.get(&name).cloned().unwrap_or(Value::Null))
    })
}

fn has_one_resolver(hint: &RelationHint, fk: String, target: Arc<dyn Dao>) -> Resolver {
    let field = hint.field.clone();
    let guards = hint.guards.clone();
    Arc::new(move |ctx, parent, _args| {
        trace!(field = %field, "resolving has-one relation");
        check_guards(ctx, &field, &guards)?;
        match parent.get(&fk) {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(raw) => {
                let id = raw
                    .as_i64()
                    .ok_or_else(|| invalid_argument(fk.as_str(), "expected an integer id"))?;
                Ok(Value::Object(target.get(id)?))
            }
        }
    })
}

fn has_many_resolver(hint: &RelationHint, dao: Arc<dyn Dao>) -> Resolver {
    let field = hint.field.clone();
    let guards = hint.guards.clone();
    Arc::new(move |ctx, parent, _args| {
        trace!(field = %field, "resolving has-many relation");
        check_guards(ctx, &field, &guards)?;
        let Some(record) = parent.as_object() else {
            return Ok(Value::Array(Vec::new()));
        };
        let related = dao.relationship(record, &field)?.get()?;
        Ok(Value::Array(related.into_iter().map(Value::Object).collect()))
    })
}
