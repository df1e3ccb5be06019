pub mod fields;
pub mod inspect;
pub mod schema;
