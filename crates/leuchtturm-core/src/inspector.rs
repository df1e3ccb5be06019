//! Model introspection.
//!
//! Extracts the scalar properties and the relation hints of a
//! [`ModelDescriptor`]. Relation hints come from two places: `@property`
//! annotations in the model's documentation block and the structured
//! `relations` list. Results are cached per model for the lifetime of the
//! [`Inspector`]; descriptors are assumed not to change once registered.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;
use tracing::trace;

use crate::types::*;

/// `@property[-read|-write] [?]Type[[]] $name`
static RE_PROPERTY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"@property(?:-(read|write))?\s+(\?)?((?:::)?[A-Za-z_]\w*(?:::[A-Za-z_]\w*)*)(\[\])?\s+\$([A-Za-z_]\w*)",
    )
    .unwrap()
});

/// `@protect $name guard [guard...]`
static RE_PROTECT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@protect\s+\$([A-Za-z_]\w*)((?:[ \t]+[A-Za-z_][\w-]*)+)").unwrap()
});

type Cache<T> = RwLock<HashMap<ModelId, Arc<T>>>;

#[derive(Debug, Default)]
pub struct Inspector {
    properties: Cache<[PropertyDescriptor]>,
    relations: Cache<[RelationHint]>,
    schemas: Cache<ModelSchema>,
}

impl Inspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declared properties with defaults merged from constructor parameters.
    pub fn properties(&self, model: &ModelDescriptor) -> Arc<[PropertyDescriptor]> {
        cached(&self.properties, &model.id, || {
            trace!(model = %model.id, "collecting properties");
            collect_properties(model).into()
        })
    }

    /// Relation hints from the documentation block, overridden by structured
    /// declarations of the same field.
    pub fn relation_hints(&self, model: &ModelDescriptor) -> Arc<[RelationHint]> {
        cached(&self.relations, &model.id, || {
            trace!(model = %model.id, "collecting relation hints");
            collect_relation_hints(model).into()
        })
    }

    /// Properties and relation hints of a model, split by cardinality.
    pub fn schema(&self, model: &ModelDescriptor) -> Arc<ModelSchema> {
        cached(&self.schemas, &model.id, || {
            let hints = self.relation_hints(model);
            let (has_many, has_one): (Vec<RelationHint>, Vec<RelationHint>) =
                hints.iter().cloned().partition(RelationHint::is_many);
            Arc::new(ModelSchema {
                model: model.id.clone(),
                properties: self.properties(model).to_vec(),
                has_one,
                has_many,
            })
        })
    }
}

/// Check-then-insert under the write lock so each key is computed at most once.
fn cached<T: ?Sized>(cache: &Cache<T>, id: &ModelId, compute: impl FnOnce() -> Arc<T>) -> Arc<T> {
    if let Some(hit) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(id)
    {
        return hit.clone();
    }
    let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
    guard.entry(id.clone()).or_insert_with(compute).clone()
}

fn collect_properties(model: &ModelDescriptor) -> Vec<PropertyDescriptor> {
    let parameters: HashMap<&str, &ParameterDecl> = model
        .constructor
        .iter()
        .map(|p| (p.name.as_str(), p))
        .collect();
    let protected = model
        .doc
        .as_deref()
        .map(parse_protect_tags)
        .unwrap_or_default();

    model
        .properties
        .iter()
        .map(|decl| {
            let default_value = decl.default.clone().or_else(|| {
                parameters
                    .get(decl.name.as_str())
                    .and_then(|parameter| parameter.default.clone())
            });
            let mut guards = decl.guards.clone();
            if let Some(extra) = protected.get(&decl.name) {
                guards.extend(extra.iter().cloned());
            }
            PropertyDescriptor {
                name: decl.name.clone(),
                kind: decl.ty.kind,
                nullable: decl.ty.nullable,
                default_value,
                guards,
            }
        })
        .collect()
}

fn collect_relation_hints(model: &ModelDescriptor) -> Vec<RelationHint> {
    let mut hints = model
        .doc
        .as_deref()
        .map(|doc| parse_property_tags(doc, &model.id))
        .unwrap_or_default();

    for decl in &model.relations {
        let hint = RelationHint {
            field: decl.field.clone(),
            target: model.id.qualify(&decl.target),
            cardinality: if decl.many {
                Cardinality::ToMany
            } else {
                Cardinality::ToOne
            },
            nullable: decl.nullable,
            access: PropertyAccess::ReadWrite,
            foreign_key: decl.foreign_key.clone(),
            guards: Vec::new(),
        };
        match hints.iter_mut().find(|h| h.field == hint.field) {
            Some(existing) => *existing = hint,
            None => hints.push(hint),
        }
    }

    if let Some(doc) = model.doc.as_deref() {
        let protected = parse_protect_tags(doc);
        for hint in hints.iter_mut() {
            if let Some(guards) = protected.get(&hint.field) {
                hint.guards.extend(guards.iter().cloned());
            }
        }
    }

    hints
}

/// Parse `@property` tags, one per line. Lines that do not match are skipped.
pub fn parse_property_tags(doc: &str, owner: &ModelId) -> Vec<RelationHint> {
    let mut hints = Vec::new();

    for line in doc.lines() {
        let Some(caps) = RE_PROPERTY_TAG.captures(line) else {
            continue;
        };
        let access = match caps.get(1).map(|m| m.as_str()) {
            Some("read") => PropertyAccess::Read,
            Some("write") => PropertyAccess::Write,
            _ => PropertyAccess::ReadWrite,
        };
        let cardinality = if caps.get(4).is_some() {
            Cardinality::ToMany
        } else {
            Cardinality::ToOne
        };
        hints.push(RelationHint {
            field: caps[5].to_string(),
            target: owner.qualify(&caps[3]),
            cardinality,
            nullable: caps.get(2).is_some(),
            access,
            foreign_key: None,
            guards: Vec::new(),
        });
    }

    hints
}

/// Parse `@protect` tags into field name → guard names.
pub fn parse_protect_tags(doc: &str) -> HashMap<String, Vec<String>> {
    let mut protected: HashMap<String, Vec<String>> = HashMap::new();

    for line in doc.lines() {
        if let Some(caps) = RE_PROTECT_TAG.captures(line) {
            protected
                .entry(caps[1].to_string())
                .or_default()
                .extend(caps[2].split_whitespace().map(String::from));
        }
    }

    protected
}
