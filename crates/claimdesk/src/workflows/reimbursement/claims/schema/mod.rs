//! Runtime-configurable claim form: field definitions and submission validation.

mod field;
mod validate;

pub use field::{
    FieldConfigError, FieldDefinition, FieldKind, FieldSection, FieldSet, RemovalConfirmation,
};
pub use validate::{
    missing_required, validate, FieldIssue, InvalidFieldValues, MissingRequiredFields,
    SchemaViolation,
};
