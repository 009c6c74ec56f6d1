//! Embedded exception schemas
//!
//! The runtime raises exceptions typed by object schemas it installs at VM
//! creation. The type names and member layout mirror the base exception
//! types of the standard library; keeping them in sync is contractual, so
//! the names are fixed constants here.

use std::sync::Arc;
use xenon_core::{ObjectSchema, StringTable, ValueType};

/// Type-name prefix shared by every embedded exception schema. The prefix is
/// contractual and visible to scripts.
pub const EXCEPTION_TYPE_PREFIX: &str = "Xenon.System.Exception.";

/// Binding index of the `_message` member on every embedded exception.
pub(crate) const MESSAGE_MEMBER_INDEX: u32 = 0;

/// The standard exception kinds installed at VM creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardException {
    /// A generic runtime failure
    RuntimeError,
    /// An operand or operation type mismatch
    TypeError,
    /// Integer or float division by zero
    DivideByZeroError,
}

impl StandardException {
    /// The fully qualified schema type name.
    pub fn type_name(self) -> &'static str {
        match self {
            StandardException::RuntimeError => "Xenon.System.Exception.RuntimeError",
            StandardException::TypeError => "Xenon.System.Exception.TypeError",
            StandardException::DivideByZeroError => "Xenon.System.Exception.DivideByZeroError",
        }
    }
}

/// Build the schemas for the embedded exception types. Each carries a single
/// string member `_message` bound at index 0.
pub(crate) fn build_embedded_schemas(
    strings: &StringTable,
) -> Vec<(StandardException, Arc<ObjectSchema>)> {
    let message_member = strings.intern("_message");
    [
        StandardException::RuntimeError,
        StandardException::TypeError,
        StandardException::DivideByZeroError,
    ]
    .into_iter()
    .map(|kind| {
        let schema = ObjectSchema::new(
            strings.intern(kind.type_name()),
            vec![(Arc::clone(&message_member), ValueType::String)],
        );
        (kind, Arc::new(schema))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_carry_the_prefix() {
        for kind in [
            StandardException::RuntimeError,
            StandardException::TypeError,
            StandardException::DivideByZeroError,
        ] {
            assert!(kind.type_name().starts_with(EXCEPTION_TYPE_PREFIX));
        }
    }

    #[test]
    fn test_schemas_have_message_member() {
        let strings = StringTable::new();
        let schemas = build_embedded_schemas(&strings);
        assert_eq!(schemas.len(), 3);
        for (_, schema) in &schemas {
            assert_eq!(schema.member_count(), 1);
            let member = schema.member_by_index(MESSAGE_MEMBER_INDEX).unwrap();
            assert_eq!(member.name.as_str(), "_message");
            assert_eq!(member.value_type, ValueType::String);
        }
    }
}
