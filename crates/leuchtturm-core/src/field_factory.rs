//! Resolver fields for one CRUD operation of one model.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::auth::ResolveContext;
use crate::catalogs::{foreign_key_of, lower_first, ID_FIELD};
use crate::dao::{Dao, RelationshipKind};
use crate::error::{invalid_argument, LeuchtturmError, Result};
use crate::graph::{FieldArgument, GraphType, Resolver, Scalar, TypeField};
use crate::hooks::{run_hook, HookPayload, PostHook, PreHook};
use crate::manager::Manager;
use crate::type_factory::TypeFactory;
use crate::types::{Args, ModelId, Operation, Record};

/// Plain-data description of a built field, enough to build it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub model: ModelId,
    pub operation: Operation,
    pub name: String,
    pub pure_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_guardian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
}

/// A finished field together with the spec it was built from.
#[derive(Debug, Clone)]
pub struct ResolverField {
    pub field: TypeField,
    pub spec: FieldSpec,
}

impl ResolverField {
    pub fn name(&self) -> &str {
        &self.field.name
    }

    /// Invoke the field as a root field.
    pub fn resolve(&self, ctx: &ResolveContext<'_>, args: &Args) -> Result<Value> {
        self.field.resolve(ctx, &Value::Null, args)
    }

    pub fn into_field(self) -> TypeField {
        self.field
    }
}

/// Fluent builder for a [`ResolverField`].
///
/// Usually obtained preconfigured from [`Manager::field`] or one of its
/// per-operation shorthands.
#[must_use = "a field factory does nothing until built"]
pub struct FieldFactory<'m> {
    manager: &'m Manager,
    operation: Option<Operation>,
    type_factory: Option<Arc<TypeFactory>>,
    dao: Option<Arc<dyn Dao>>,
    name: Option<String>,
    pure_name: Option<String>,
    description: String,
    guardian: Option<String>,
    owner_guardian: Option<String>,
    pre: Option<String>,
    post: Option<String>,
}

impl<'m> FieldFactory<'m> {
    /// An unconfigured factory. Operation, type factory and name are required.
    pub fn new(manager: &'m Manager) -> Self {
        FieldFactory {
            manager,
            operation: None,
            type_factory: None,
            dao: None,
            name: None,
            pure_name: None,
            description: String::new(),
            guardian: None,
            owner_guardian: None,
            pre: None,
            post: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn type_factory(mut self, factory: Arc<TypeFactory>) -> Self {
        self.type_factory = Some(factory);
        self
    }

    /// Persistence used by the resolver. Defaults to the type factory's DAO.
    pub fn dao(mut self, dao: Arc<dyn Dao>) -> Self {
        self.dao = Some(dao);
        self
    }

    /// Name of the input argument and of the foreign key column (`<pure_name>_id`).
    pub fn pure_name(mut self, pure_name: impl Into<String>) -> Self {
        self.pure_name = Some(pure_name.into());
        self
    }

    /// Only requests this guard validates may run the field.
    pub fn guardian(mut self, guard: impl Into<String>) -> Self {
        self.guardian = Some(guard.into());
        self
    }

    /// The authenticated user of this guard must own the record (`id` argument).
    /// Combined with [`FieldFactory::guardian`] it is the fallback when that guard fails.
    pub fn only_owner(mut self, guard: impl Into<String>) -> Self {
        self.owner_guardian = Some(guard.into());
        self
    }

    /// Name of a pre hook registered in [`Manager::hooks`].
    pub fn pre(mut self, hook: impl Into<String>) -> Self {
        self.pre = Some(hook.into());
        self
    }

    /// Name of a post hook registered in [`Manager::hooks`].
    pub fn post(mut self, hook: impl Into<String>) -> Self {
        self.post = Some(hook.into());
        self
    }

    pub fn build(self) -> Result<ResolverField> {
        let operation = self
            .operation
            .ok_or(LeuchtturmError::IncompleteField("operation"))?;
        let factory = self
            .type_factory
            .ok_or(LeuchtturmError::IncompleteField("type factory"))?;
        let name = self.name.ok_or(LeuchtturmError::IncompleteField("name"))?;
        let pure_name = self
            .pure_name
            .unwrap_or_else(|| lower_first(factory.name()));
        let dao = self.dao.unwrap_or_else(|| factory.dao().clone());

        let hooks = self.manager.hooks();
        let pre = self
            .pre
            .as_deref()
            .map(|n| hooks.pre(n).map(|h| (n.to_string(), h)))
            .transpose()?;
        let post = self
            .post
            .as_deref()
            .map(|n| hooks.post(n).map(|h| (n.to_string(), h)))
            .transpose()?;

        let ty: GraphType = match operation {
            Operation::Create | Operation::Read => factory.build(self.manager)?.into(),
            Operation::All => GraphType::non_null_list_of(factory.build(self.manager)?.into()),
            Operation::Update | Operation::Delete => GraphType::non_null(Scalar::Boolean.into()),
        };

        let mut field = TypeField::new(&name, ty).description(self.description.clone());
        if operation.takes_id() {
            field = field.argument(FieldArgument::new(
                ID_FIELD,
                GraphType::non_null(Scalar::Int.into()),
            ));
        }
        if matches!(operation, Operation::Create | Operation::Update) {
            field = field.argument(FieldArgument::new(
                &pure_name,
                GraphType::non_null(factory.build_input()?.into()),
            ));
        }

        let links = if matches!(operation, Operation::Create | Operation::Update) {
            factory
                .has_many()
                .iter()
                .map(|hint| {
                    Ok(Link {
                        field: hint.field.clone(),
                        target: self.manager.model(&hint.target)?.dao.clone(),
                        foreign_key: hint.foreign_key.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let body = Body {
            field: name.clone(),
            operation,
            pure_name: pure_name.clone(),
            dao,
            links,
            guardian: self.guardian.clone(),
            owner_guardian: self.owner_guardian.clone(),
            pre,
            post,
        };
        let resolver: Resolver = Arc::new(move |ctx, _parent, args| body.run(ctx, args));
        debug!(model = %factory.model(), field = %name, %operation, "built resolver field");

        Ok(ResolverField {
            field: field.resolver(resolver),
            spec: FieldSpec {
                model: factory.model().clone(),
                operation,
                name,
                pure_name,
                description: self.description,
                guardian: self.guardian,
                owner_guardian: self.owner_guardian,
                pre: self.pre,
                post: self.post,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Resolver body
// ---------------------------------------------------------------------------

/// A has-many relation written by Create and Update.
struct Link {
    field: String,
    target: Arc<dyn Dao>,
    foreign_key: Option<String>,
}

struct Body {
    field: String,
    operation: Operation,
    pure_name: String,
    dao: Arc<dyn Dao>,
    links: Vec<Link>,
    guardian: Option<String>,
    owner_guardian: Option<String>,
    pre: Option<(String, PreHook)>,
    post: Option<(String, PostHook)>,
}

impl Body {
    fn run(&self, ctx: &ResolveContext<'_>, args: &Args) -> Result<Value> {
        trace!(field = %self.field, operation = %self.operation, "resolving");
        let id = if self.operation.takes_id() {
            Some(id_argument(args)?)
        } else {
            None
        };

        self.authorize(ctx, id)?;
        if let Some((name, hook)) = &self.pre {
            run_hook(name, hook())?;
        }

        match (self.operation, id) {
            (Operation::Create, _) => self.create(args),
            (Operation::Read, Some(id)) => {
                let entry = self.dao.get(id)?;
                self.after(HookPayload::Record(&entry))?;
                Ok(Value::Object(entry))
            }
            (Operation::Update, Some(id)) => self.update(id, args),
            (Operation::Delete, Some(id)) => {
                let entry = self.dao.get(id)?;
                let success = self.dao.delete(&entry)?;
                self.after(HookPayload::Outcome {
                    record: &entry,
                    success,
                })?;
                Ok(Value::Bool(success))
            }
            (Operation::All, _) => {
                let entries = self.dao.all()?;
                self.after(HookPayload::Records(&entries))?;
                Ok(Value::Array(entries.into_iter().map(Value::Object).collect()))
            }
            (_, None) => Err(invalid_argument(ID_FIELD, "missing")),
        }
    }

    /// A registered plain guardian must validate. When it fails, or when
    /// only an owner guardian is configured, the owner guardian decides.
    /// Guards missing from the registry are not enforced.
    fn authorize(&self, ctx: &ResolveContext<'_>, id: Option<i64>) -> Result<()> {
        if let Some(guard) = &self.guardian {
            match ctx.guards.guardian(guard) {
                Some(guardian) if !guardian.validate(ctx.request) => {}
                Some(_) => return Ok(()),
                None => {
                    debug!(field = %self.field, guard = %guard, "guard is not registered, not enforced");
                    return Ok(());
                }
            }
            if self.owner_guardian.is_none() {
                warn!(field = %self.field, guard = %guard, "guard denied access");
                return Err(LeuchtturmError::Unauthorized);
            }
        }
        match &self.owner_guardian {
            Some(owner) => self.authorize_owner(ctx, owner, id),
            None => Ok(()),
        }
    }

    fn authorize_owner(&self, ctx: &ResolveContext<'_>, owner: &str, id: Option<i64>) -> Result<()> {
        if ctx.guards.guardian(owner).is_none() {
            debug!(field = %self.field, guard = %owner, "owner guard is not registered, not enforced");
            return Ok(());
        }
        if ctx.owns(owner, id) {
            Ok(())
        } else {
            warn!(field = %self.field, guard = %owner, ?id, "owner guard denied access");
            Err(LeuchtturmError::Unauthorized)
        }
    }

    fn after(&self, payload: HookPayload<'_>) -> Result<()> {
        match &self.post {
            Some((name, hook)) => run_hook(name, hook(&payload)),
            None => Ok(()),
        }
    }

    /// The input object with has-many id lists taken out.
    fn split_input(&self, args: &Args) -> Result<(Record, Vec<(&Link, Vec<i64>)>)> {
        let mut fields = args
            .get(&self.pure_name)
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| invalid_argument(self.pure_name.as_str(), "expected an input object"))?;
        let mut links = Vec::new();
        for link in &self.links {
            if let Some(raw) = fields.remove(&link.field) {
                links.push((link, id_list(&link.field, &raw)?));
            }
        }
        Ok((fields, links))
    }

    fn create(&self, args: &Args) -> Result<Value> {
        let (fields, links) = self.split_input(args)?;
        let entry = self.dao.create(&fields)?;

        for (link, ids) in links {
            let relationship = self.dao.relationship(&entry, &link.field)?;
            match relationship.kind() {
                RelationshipKind::OneToMany => {
                    for id in ids {
                        relationship.associate(&link.target.get(id)?)?;
                    }
                }
                RelationshipKind::ManyToMany => {
                    for id in ids {
                        relationship.attach(&link.target.get(id)?)?;
                    }
                }
                kind => warn!(field = %link.field, ?kind, "cannot link ids through this relationship kind"),
            }
        }

        self.after(HookPayload::Record(&entry))?;
        Ok(Value::Object(entry))
    }

    fn update(&self, id: i64, args: &Args) -> Result<Value> {
        let (fields, links) = self.split_input(args)?;
        let mut entry = self.dao.get(id)?;
        entry.extend(fields);

        for (link, ids) in links {
            let relationship = self.dao.relationship(&entry, &link.field)?;
            match relationship.kind() {
                RelationshipKind::OneToMany => {
                    let column = link
                        .foreign_key
                        .clone()
                        .unwrap_or_else(|| foreign_key_of(&self.pure_name));
                    let cleared = Record::from_iter([(column.clone(), Value::Null)]);
                    link.target.update_where(&column, &Value::from(id), &cleared)?;
                    for id in ids {
                        relationship.associate(&link.target.get(id)?)?;
                    }
                }
                RelationshipKind::ManyToMany => {
                    relationship.detach()?;
                    for id in ids {
                        relationship.attach(&link.target.get(id)?)?;
                    }
                }
                kind => warn!(field = %link.field, ?kind, "cannot link ids through this relationship kind"),
            }
        }

        let success = self.dao.update(&entry)?;
        self.after(HookPayload::Outcome {
            record: &entry,
            success,
        })?;
        Ok(Value::Bool(success))
    }
}

fn id_argument(args: &Args) -> Result<i64> {
    args.get(ID_FIELD)
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid_argument(ID_FIELD, "expected an integer"))
}

fn id_list(argument: &str, raw: &Value) -> Result<Vec<i64>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| invalid_argument(argument, "expected a list of integer ids"))
            })
            .collect(),
        _ => Err(invalid_argument(argument, "expected a list of integer ids")),
    }
}
