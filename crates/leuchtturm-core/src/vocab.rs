//! Naming rules for derived CRUD fields.
//!
//! A [`Vocab`] turns a model's pure name (`user`) into the field name of each
//! operation (`createUser`, `user`, `updateUser`, `deleteUser`, `allUsers`)
//! and owns the pluralization used by the list operation.

use crate::catalogs::upper_first;
use crate::types::Operation;

pub trait Vocab: Send + Sync {
    /// Short identifier, used by configuration files (`english`, `german`).
    fn id(&self) -> &str;

    fn pluralize(&self, word: &str) -> String;

    fn operation_field_name(&self, operation: Operation, word: &str) -> String;
}

/// One entry of a suffix-rewrite table: when a word ends with `suffix`,
/// drop `strip` bytes from its end and append `append`.
#[derive(Debug, Clone, Copy)]
struct SuffixRule {
    suffix: &'static str,
    strip: usize,
    append: &'static str,
}

const fn rule(suffix: &'static str, strip: usize, append: &'static str) -> SuffixRule {
    SuffixRule {
        suffix,
        strip,
        append,
    }
}

/// Apply the first matching rule, or `fallback` when none matches.
fn rewrite(word: &str, rules: &[SuffixRule], fallback: &str) -> String {
    let lowered = word.to_ascii_lowercase();
    for r in rules {
        if lowered.ends_with(r.suffix) {
            let keep = word.len().saturating_sub(r.strip);
            return format!("{}{}", &word[..keep], r.append);
        }
    }
    format!("{word}{fallback}")
}

// ---------------------------------------------------------------------------
// English
// ---------------------------------------------------------------------------

/// Checked top to bottom. Not an English-correct pluralizer: irregular nouns
/// (`child`, `person`) need [`English::with_irregular`].
const ENGLISH_RULES: &[SuffixRule] = &[
    rule("is", 2, "es"),
    rule("ss", 0, "es"),
    rule("sh", 0, "es"),
    rule("ch", 0, "es"),
    rule("x", 0, "es"),
    rule("z", 0, "es"),
    rule("s", 0, "es"),
    rule("fe", 2, "ves"),
    rule("f", 1, "ves"),
    rule("ay", 0, "s"),
    rule("ey", 0, "s"),
    rule("iy", 0, "s"),
    rule("oy", 0, "s"),
    rule("uy", 0, "s"),
    rule("y", 1, "ies"),
    rule("o", 0, "es"),
];

#[derive(Debug, Clone, Default)]
pub struct English {
    irregular: Vec<(String, String)>,
}

impl English {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a word whose plural the suffix table gets wrong.
    pub fn with_irregular(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.irregular.push((singular.into(), plural.into()));
        self
    }
}

impl Vocab for English {
    fn id(&self) -> &str {
        "english"
    }

    fn pluralize(&self, word: &str) -> String {
        if let Some((_, plural)) = self.irregular.iter().find(|(s, _)| s == word) {
            return plural.clone();
        }
        rewrite(word, ENGLISH_RULES, "s")
    }

    fn operation_field_name(&self, operation: Operation, word: &str) -> String {
        match operation {
            Operation::Create => format!("create{}", upper_first(word)),
            Operation::Read => word.to_string(),
            Operation::Update => format!("update{}", upper_first(word)),
            Operation::Delete => format!("delete{}", upper_first(word)),
            Operation::All => format!("all{}", upper_first(&self.pluralize(word))),
        }
    }
}

// ---------------------------------------------------------------------------
// German
// ---------------------------------------------------------------------------

// Loanwords (`Job`, `Login`) fall through to `+s`.
const GERMAN_RULES: &[SuffixRule] = &[
    rule("ung", 0, "en"),
    rule("heit", 0, "en"),
    rule("keit", 0, "en"),
    rule("schaft", 0, "en"),
    rule("um", 2, "en"),
    rule("e", 0, "n"),
    rule("el", 0, ""),
    rule("er", 0, ""),
    rule("en", 0, ""),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct German;

impl Vocab for German {
    fn id(&self) -> &str {
        "german"
    }

    fn pluralize(&self, word: &str) -> String {
        rewrite(word, GERMAN_RULES, "s")
    }

    // Field names must stay ASCII, hence `loesche` rather than `lösche`.
    fn operation_field_name(&self, operation: Operation, word: &str) -> String {
        match operation {
            Operation::Create => format!("erstelle{}", upper_first(word)),
            Operation::Read => word.to_string(),
            Operation::Update => format!("aktualisiere{}", upper_first(word)),
            Operation::Delete => format!("loesche{}", upper_first(word)),
            Operation::All => format!("alle{}", upper_first(&self.pluralize(word))),
        }
    }
}

/// Look up a built-in vocabulary by its [`Vocab::id`].
pub fn by_id(id: &str) -> Option<Box<dyn Vocab>> {
    match id.to_ascii_lowercase().as_str() {
        "english" | "en" => Some(Box::new(English::new())),
        "german" | "de" => Some(Box::new(German)),
        _ => None,
    }
}
