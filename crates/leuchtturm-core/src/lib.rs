pub mod auth;
pub mod catalogs;
pub mod dao;
pub mod error;
pub mod field_factory;
pub mod graph;
pub mod hooks;
pub mod inspector;
pub mod manager;
pub mod type_factory;
pub mod types;
pub mod vocab;

pub use auth::{Authenticatable, GuardRegistry, Guardian, Guards, Identity, Request, ResolveContext};
pub use dao::{record_id, Dao, Detached, Relationship, RelationshipKind};
pub use error::{DaoError, ErrorKind, LeuchtturmError, Result};
pub use field_factory::{FieldFactory, FieldSpec, ResolverField};
pub use graph::{GraphType, InputObjectType, ObjectType, Scalar, Schema, TypeField};
pub use hooks::{HookPayload, HookRegistry};
pub use inspector::Inspector;
pub use manager::{Manager, Model};
pub use type_factory::{TypeFactory, TypeFactoryBuilder};
pub use types::*;
pub use vocab::{English, German, Vocab};
