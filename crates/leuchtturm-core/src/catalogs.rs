use std::collections::HashSet;
use std::sync::LazyLock;

/// Properties every model carries for DAO bookkeeping. Never exposed in derived types.
pub const IGNORED_BY_DEFAULT: &[&str] = &["connector"];

/// Primary key property. Read and Update/Delete arguments use it, input types never contain it.
pub const ID_FIELD: &str = "id";

/// Suffix linking a scalar foreign key (`user_id`) to its has-one relation (`user`).
pub const FOREIGN_KEY_SUFFIX: &str = "_id";

/// Appended to a type name to name its input object (`User` → `UserInput`).
pub const INPUT_SUFFIX: &str = "Input";

/// Separator between a model's namespace and its bare name (`app::models::User`).
pub const PATH_SEPARATOR: &str = "::";

/// Declared property types accepted in model descriptors (case-insensitive).
/// Everything else is rejected while a descriptor is read.
pub static TYPE_CATALOG: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut s = HashSet::new();
    s.insert("string");
    s.insert("int");
    s.insert("float");
    s.insert("bool");
    // Accepted so the error names the offending property instead of the descriptor.
    s.insert("array");
    s
});

/// Strip the foreign key suffix, if present.
///
/// `user_id` → `user`, `user` → `user`.
pub fn strip_foreign_key(name: &str) -> &str {
    name.strip_suffix(FOREIGN_KEY_SUFFIX).unwrap_or(name)
}

/// Foreign key property name of a has-one relation field.
pub fn foreign_key_of(field: &str) -> String {
    format!("{field}{FOREIGN_KEY_SUFFIX}")
}

/// Uppercase the first character (`user` → `User`).
pub fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character (`User` → `user`).
pub fn lower_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
