//! Registry of models and their type factories.
//!
//! A [`Manager`] is the entry point of a schema-build session: models are
//! registered with their DAO, type factories are created on first use (or
//! explicitly through [`Manager::type_factory`]), and CRUD fields are handed
//! out preconfigured with the active vocabulary's names.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::catalogs::lower_first;
use crate::dao::{Dao, Detached};
use crate::error::{LeuchtturmError, Result};
use crate::field_factory::{FieldFactory, FieldSpec, ResolverField};
use crate::graph::{InputObjectType, ObjectType, Schema};
use crate::hooks::HookRegistry;
use crate::inspector::Inspector;
use crate::type_factory::{BuildLock, Config, TypeFactory, TypeFactoryBuilder};
use crate::types::{ModelDescriptor, ModelId, ModelSchema, Operation};
use crate::vocab::{English, Vocab};

/// A registered model and the persistence bound to it.
pub struct Model {
    pub descriptor: ModelDescriptor,
    pub dao: Arc<dyn Dao>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Models {
    order: Vec<ModelId>,
    entries: HashMap<ModelId, Arc<Model>>,
}

pub struct Manager {
    models: RwLock<Models>,
    factories: RwLock<HashMap<ModelId, Arc<TypeFactory>>>,
    builds: BuildLock,
    inspector: Inspector,
    vocab: RwLock<Arc<dyn Vocab>>,
    hooks: HookRegistry,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// A manager using the English vocabulary.
    pub fn new() -> Self {
        Manager {
            models: RwLock::new(Models::default()),
            factories: RwLock::new(HashMap::new()),
            builds: BuildLock::default(),
            inspector: Inspector::new(),
            vocab: RwLock::new(Arc::new(English::new())),
            hooks: HookRegistry::new(),
        }
    }

    pub fn with_vocab(self, vocab: impl Vocab + 'static) -> Self {
        self.set_vocab(vocab);
        self
    }

    /// Replace the active vocabulary. Fields already handed out keep their names.
    pub fn set_vocab(&self, vocab: impl Vocab + 'static) {
        self.set_vocab_arc(Arc::new(vocab));
    }

    pub fn set_vocab_arc(&self, vocab: Arc<dyn Vocab>) {
        debug!(vocab = vocab.id(), "vocabulary set");
        *self.vocab.write().unwrap_or_else(PoisonError::into_inner) = vocab;
    }

    pub fn vocab(&self) -> Arc<dyn Vocab> {
        self.vocab
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn inspector(&self) -> &Inspector {
        &self.inspector
    }

    // -----------------------------------------------------------------------
    // Models
    // -----------------------------------------------------------------------

    /// Register a model with its persistence.
    ///
    /// Registering the same id again replaces the DAO and descriptor, but
    /// factories and introspection results already derived from it stay.
    pub fn register(&self, descriptor: ModelDescriptor, dao: Arc<dyn Dao>) {
        let id = descriptor.id.clone();
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        if models.entries.contains_key(&id) {
            warn!(model = %id, "model registered twice, replacing it");
        } else {
            models.order.push(id.clone());
        }
        debug!(model = %id, "model registered");
        models.entries.insert(id, Arc::new(Model { descriptor, dao }));
    }

    /// Register a model without persistence, for schema derivation only.
    pub fn register_detached(&self, descriptor: ModelDescriptor) {
        let dao = Arc::new(Detached(descriptor.id.clone()));
        self.register(descriptor, dao);
    }

    pub fn model(&self, id: &ModelId) -> Result<Arc<Model>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| LeuchtturmError::UnknownModel(id.clone()))
    }

    /// Registered model ids in registration order.
    pub fn models(&self) -> Vec<ModelId> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// Introspected properties and relation hints of a registered model.
    pub fn schema_of(&self, id: &ModelId) -> Result<Arc<ModelSchema>> {
        let model = self.model(id)?;
        Ok(self.inspector.schema(&model.descriptor))
    }

    // -----------------------------------------------------------------------
    // Type factories
    // -----------------------------------------------------------------------

    /// Configure the type factory of a model before anything uses it.
    pub fn type_factory(&self, id: impl Into<ModelId>) -> TypeFactoryBuilder<'_> {
        TypeFactoryBuilder::new(self, id.into())
    }

    pub(crate) fn insert_factory(&self, factory: Arc<TypeFactory>) -> Result<Arc<TypeFactory>> {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(factory.model()) {
            return Err(LeuchtturmError::DuplicateTypeFactory(factory.model().clone()));
        }
        debug!(model = %factory.model(), ty = %factory.name(), "type factory registered");
        factories.insert(factory.model().clone(), factory.clone());
        Ok(factory)
    }

    /// The model's type factory, created with the introspected configuration
    /// on first use.
    pub fn factory(&self, id: &ModelId) -> Result<Arc<TypeFactory>> {
        if let Some(factory) = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            return Ok(factory.clone());
        }

        let model = self.model(id)?;
        let schema = self.inspector.schema(&model.descriptor);
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        let factory = factories.entry(id.clone()).or_insert_with(|| {
            debug!(model = %id, "type factory created");
            Arc::new(TypeFactory::new(
                &model.descriptor,
                model.dao.clone(),
                &schema,
                Config::default(),
            ))
        });
        Ok(factory.clone())
    }

    /// The model's output type.
    ///
    /// A thread calling this while another thread builds waits for that build
    /// to finish, so it never sees a type whose fields are not yet set.
    pub fn build(&self, id: &ModelId) -> Result<ObjectType> {
        let factory = self.factory(id)?;
        if let Some(object) = factory.published() {
            return Ok(object);
        }
        let session = self.builds.enter(&factory);
        let built = factory.build_output(self);
        if built.is_err() {
            session.fail();
        }
        built
    }

    /// The model's input type.
    pub fn build_input(&self, id: &ModelId) -> Result<InputObjectType> {
        self.factory(id)?.build_input()
    }

    // -----------------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------------

    /// A field factory for `operation` on the model, named by the active vocabulary.
    pub fn field(&self, operation: Operation, id: impl Into<ModelId>) -> Result<FieldFactory<'_>> {
        let factory = self.factory(&id.into())?;
        let pure_name = lower_first(factory.name());
        let name = self.vocab().operation_field_name(operation, &pure_name);
        Ok(FieldFactory::new(self)
            .operation(operation)
            .name(name)
            .pure_name(pure_name)
            .description(factory.description().to_string())
            .type_factory(factory))
    }

    pub fn create(&self, id: impl Into<ModelId>) -> Result<FieldFactory<'_>> {
        self.field(Operation::Create, id)
    }

    pub fn read(&self, id: impl Into<ModelId>) -> Result<FieldFactory<'_>> {
        self.field(Operation::Read, id)
    }

    pub fn update(&self, id: impl Into<ModelId>) -> Result<FieldFactory<'_>> {
        self.field(Operation::Update, id)
    }

    pub fn delete(&self, id: impl Into<ModelId>) -> Result<FieldFactory<'_>> {
        self.field(Operation::Delete, id)
    }

    pub fn all(&self, id: impl Into<ModelId>) -> Result<FieldFactory<'_>> {
        self.field(Operation::All, id)
    }

    /// Build a field again from its spec. Hooks are looked up by name.
    pub fn rebuild(&self, spec: &FieldSpec) -> Result<ResolverField> {
        let mut field = FieldFactory::new(self)
            .operation(spec.operation)
            .type_factory(self.factory(&spec.model)?)
            .name(spec.name.clone())
            .pure_name(spec.pure_name.clone())
            .description(spec.description.clone());
        if let Some(guard) = &spec.guardian {
            field = field.guardian(guard.clone());
        }
        if let Some(guard) = &spec.owner_guardian {
            field = field.only_owner(guard.clone());
        }
        if let Some(hook) = &spec.pre {
            field = field.pre(hook.clone());
        }
        if let Some(hook) = &spec.post {
            field = field.post(hook.clone());
        }
        field.build()
    }

    /// `Query` with Read and All of every registered model, `Mutation` with
    /// Create, Update and Delete. Fields are unguarded.
    pub fn schema(&self) -> Result<Schema> {
        let models = self.models();
        let mut query = Vec::new();
        let mut mutation = Vec::new();

        for operation in [Operation::Read, Operation::All] {
            for id in &models {
                query.push(self.field(operation, id.clone())?.build()?.into_field());
            }
        }
        for operation in [Operation::Create, Operation::Update, Operation::Delete] {
            for id in &models {
                mutation.push(self.field(operation, id.clone())?.build()?.into_field());
            }
        }

        let mutation = (!mutation.is_empty())
            .then(|| ObjectType::with_fields("Mutation", "Root Mutation", mutation));
        Ok(Schema::new(
            ObjectType::with_fields("Query", "Root Query", query),
            mutation,
        ))
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("models", &self.models())
            .field("vocab", &self.vocab().id())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
