use thiserror::Error;

use crate::types::ModelId;

/// Error raised by the persistence collaborator. Passed through untouched.
#[derive(Debug, Error)]
pub enum DaoError {
    #[error("{model} with id {id} not found")]
    NotFound { model: ModelId, id: i64 },
    #[error("model {0} has no persistence bound")]
    Detached(ModelId),
    #[error("persistence error: {0}")]
    Backend(String),
}

/// Broad classification of a [`LeuchtturmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised while the schema is built. Aborts schema construction.
    Configuration,
    /// A guard rejected the request. Aborts one resolver invocation.
    Authorization,
    /// Arguments did not have the expected shape.
    Validation,
    /// Raised by the DAO collaborator.
    Persistence,
}

#[derive(Debug, Error)]
pub enum LeuchtturmError {
    #[error("the property {property} of {model} is of type array which correlates to a list, which is not supported in auto-generation")]
    UnsupportedArrayProperty { model: ModelId, property: String },
    #[error("invalid property type \"{0}\" (expected string, int, float or bool, optionally prefixed with ?)")]
    InvalidTypeDecl(String),
    #[error("model {0} is not registered")]
    UnknownModel(ModelId),
    #[error("a type factory for {0} is already registered")]
    DuplicateTypeFactory(ModelId),
    #[error("no {kind} hook named \"{name}\" is registered")]
    UnknownHook { kind: &'static str, name: String },
    #[error("field factory is missing its {0}")]
    IncompleteField(&'static str),
    #[error("Access denied")]
    Unauthorized,
    #[error("invalid argument \"{argument}\": {reason}")]
    InvalidArgument { argument: String, reason: String },
    #[error("hook \"{name}\" failed: {reason}")]
    Hook { name: String, reason: String },
    #[error(transparent)]
    Dao(#[from] DaoError),
}

impl LeuchtturmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeuchtturmError::UnsupportedArrayProperty { .. }
            | LeuchtturmError::InvalidTypeDecl(_)
            | LeuchtturmError::UnknownModel(_)
            | LeuchtturmError::DuplicateTypeFactory(_)
            | LeuchtturmError::UnknownHook { .. }
            | LeuchtturmError::IncompleteField(_) => ErrorKind::Configuration,
            LeuchtturmError::Unauthorized => ErrorKind::Authorization,
            LeuchtturmError::InvalidArgument { .. } | LeuchtturmError::Hook { .. } => {
                ErrorKind::Validation
            }
            LeuchtturmError::Dao(_) => ErrorKind::Persistence,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Authorization
    }
}

pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> LeuchtturmError {
    LeuchtturmError::InvalidArgument {
        argument: argument.into(),
        reason: reason.into(),
    }
}

pub type Result<T, E = LeuchtturmError> = std::result::Result<T, E>;
