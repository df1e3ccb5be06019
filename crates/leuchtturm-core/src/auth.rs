//! Guard collaborator boundary and the per-request resolve context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

/// The incoming request as far as guards are concerned.
#[derive(Debug, Clone, Default)]
pub struct Request {
    headers: HashMap<String, String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header names are case-insensitive.
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.get_header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
    }
}

/// The authenticated user a guard reports for a request.
pub trait Authenticatable: Send + Sync {
    fn identifier(&self) -> i64;
}

/// Plain identity carrying only the user's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub i64);

impl Authenticatable for Identity {
    fn identifier(&self) -> i64 {
        self.0
    }
}

pub trait Guardian: Send + Sync {
    fn validate(&self, request: &Request) -> bool;

    /// The user authenticated by this guard, if any.
    fn user(&self, request: &Request) -> Option<Box<dyn Authenticatable>>;
}

/// Resolves guards by name.
pub trait GuardRegistry: Send + Sync {
    fn guardian(&self, name: &str) -> Option<Arc<dyn Guardian>>;
}

/// Map-backed [`GuardRegistry`].
#[derive(Clone, Default)]
pub struct Guards {
    guards: HashMap<String, Arc<dyn Guardian>>,
}

impl Guards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, guardian: impl Guardian + 'static) -> Self {
        self.guards.insert(name.into(), Arc::new(guardian));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, guardian: Arc<dyn Guardian>) {
        self.guards.insert(name.into(), guardian);
    }
}

impl fmt::Debug for Guards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.guards.keys().collect();
        names.sort();
        f.debug_struct("Guards").field("names", &names).finish()
    }
}

impl GuardRegistry for Guards {
    fn guardian(&self, name: &str) -> Option<Arc<dyn Guardian>> {
        self.guards.get(name).cloned()
    }
}

/// Everything a resolver may consult about the request it runs for.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub request: &'a Request,
    pub guards: &'a dyn GuardRegistry,
}

impl<'a> ResolveContext<'a> {
    pub fn new(request: &'a Request, guards: &'a dyn GuardRegistry) -> Self {
        ResolveContext { request, guards }
    }

    /// Whether the named guard exists and validates the request.
    /// An unregistered guard never validates.
    pub fn validates(&self, guard: &str) -> bool {
        match self.guards.guardian(guard) {
            Some(guardian) => guardian.validate(self.request),
            None => {
                warn!(guard, "guard is not registered, treating request as invalid");
                false
            }
        }
    }

    /// Whether the named guard validates the request and its user's
    /// identifier equals `id`. Without an id there is nothing the user can
    /// own, so the check fails.
    pub fn owns(&self, guard: &str, id: Option<i64>) -> bool {
        let Some(guardian) = self.guards.guardian(guard) else {
            warn!(guard, "owner guard is not registered, treating request as invalid");
            return false;
        };
        if !guardian.validate(self.request) {
            return false;
        }
        match (guardian.user(self.request), id) {
            (Some(user), Some(id)) => user.identifier() == id,
            _ => false,
        }
    }
}

impl fmt::Debug for ResolveContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("request", self.request)
            .finish_non_exhaustive()
    }
}
