//! Named pre and post execution hooks.
//!
//! Fields reference hooks by name only, so a built field stays plain data
//! and can be rebuilt from its [`FieldSpec`](crate::field_factory::FieldSpec).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{LeuchtturmError, Result};
use crate::types::Record;

/// What a hook reports on failure. Surfaces as [`LeuchtturmError::Hook`].
pub type HookResult = std::result::Result<(), String>;

/// Runs after the guards, before the resolver body.
pub type PreHook = Arc<dyn Fn() -> HookResult + Send + Sync>;

/// Runs with the resolver's result, before it is returned.
pub type PostHook = Arc<dyn Fn(&HookPayload<'_>) -> HookResult + Send + Sync>;

/// The result handed to a post hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HookPayload<'a> {
    /// Create and Read.
    Record(&'a Record),
    /// All.
    Records(&'a [Record]),
    /// Update and Delete.
    Outcome { record: &'a Record, success: bool },
}

#[derive(Default)]
pub struct HookRegistry {
    pre: RwLock<HashMap<String, PreHook>>,
    post: RwLock<HashMap<String, PostHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre hook, replacing any hook of the same name.
    pub fn register_pre<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn() -> HookResult + Send + Sync + 'static,
    {
        self.pre
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(hook));
    }

    /// Register a post hook, replacing any hook of the same name.
    pub fn register_post<F>(&self, name: impl Into<String>, hook: F)
    where
        F: Fn(&HookPayload<'_>) -> HookResult + Send + Sync + 'static,
    {
        self.post
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(hook));
    }

    pub fn pre(&self, name: &str) -> Result<PreHook> {
        self.pre
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LeuchtturmError::UnknownHook {
                kind: "pre",
                name: name.to_string(),
            })
    }

    pub fn post(&self, name: &str) -> Result<PostHook> {
        self.post
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| LeuchtturmError::UnknownHook {
                kind: "post",
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pre: Vec<String> = self
            .pre
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        let mut post: Vec<String> = self
            .post
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        pre.sort();
        post.sort();
        f.debug_struct("HookRegistry")
            .field("pre", &pre)
            .field("post", &post)
            .finish()
    }
}

/// Turn a hook's failure into a [`LeuchtturmError::Hook`].
pub(crate) fn run_hook(name: &str, outcome: HookResult) -> Result<()> {
    outcome.map_err(|reason| LeuchtturmError::Hook {
        name: name.to_string(),
        reason,
    })
}
