//! Object schemas and instances
//!
//! A schema is an immutable named type with an ordered member list; the
//! member insertion order fixes each member's binding index. Instances hold
//! a member-value array sized to the schema and reference the schema through
//! an `Arc`, so a schema always outlives its instances.

use crate::string::XString;
use crate::value::{Value, ValueType};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A single member definition within a schema.
#[derive(Debug, Clone)]
pub struct MemberDefinition {
    /// Member name
    pub name: Arc<XString>,
    /// Index into an instance's member array
    pub binding_index: u32,
    /// Declared value type
    pub value_type: ValueType,
}

/// An immutable object type definition.
#[derive(Debug)]
pub struct ObjectSchema {
    type_name: Arc<XString>,
    members: Vec<MemberDefinition>,
    by_name: FxHashMap<Arc<XString>, u32>,
}

impl ObjectSchema {
    /// Create a schema from an ordered member list. Binding indices follow
    /// insertion order: first member → 0.
    pub fn new(type_name: Arc<XString>, members: Vec<(Arc<XString>, ValueType)>) -> Self {
        let mut defs = Vec::with_capacity(members.len());
        let mut by_name = FxHashMap::default();
        for (binding_index, (name, value_type)) in members.into_iter().enumerate() {
            let binding_index = binding_index as u32;
            by_name.insert(Arc::clone(&name), binding_index);
            defs.push(MemberDefinition {
                name,
                binding_index,
                value_type,
            });
        }
        Self {
            type_name,
            members: defs,
            by_name,
        }
    }

    /// The fully qualified type name.
    pub fn type_name(&self) -> &Arc<XString> {
        &self.type_name
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Member definitions in binding-index order.
    pub fn members(&self) -> &[MemberDefinition] {
        &self.members
    }

    /// Look up a member definition by name.
    pub fn member_by_name(&self, name: &Arc<XString>) -> Option<&MemberDefinition> {
        self.by_name
            .get(name)
            .map(|&index| &self.members[index as usize])
    }

    /// Look up a member definition by binding index.
    pub fn member_by_index(&self, index: u32) -> Option<&MemberDefinition> {
        self.members.get(index as usize)
    }
}

/// A heap-resident instance of a schema.
#[derive(Debug)]
pub struct ObjectInstance {
    schema: Arc<ObjectSchema>,
    members: Vec<Value>,
}

impl ObjectInstance {
    /// Instantiate a schema; all members start null.
    pub fn new(schema: Arc<ObjectSchema>) -> Self {
        let members = vec![Value::Null; schema.member_count()];
        Self { schema, members }
    }

    /// The instantiated schema.
    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    /// Member values in binding-index order.
    pub fn members(&self) -> &[Value] {
        &self.members
    }

    /// Get a member value by binding index.
    pub fn member(&self, index: u32) -> Option<Value> {
        self.members.get(index as usize).copied()
    }

    /// Set a member value by binding index. Returns false when the index is
    /// outside the schema.
    pub fn set_member(&mut self, index: u32, value: Value) -> bool {
        match self.members.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::StringTable;

    fn schema(table: &StringTable) -> ObjectSchema {
        ObjectSchema::new(
            table.intern("Demo.Point"),
            vec![
                (table.intern("x"), ValueType::Int32),
                (table.intern("y"), ValueType::Int32),
            ],
        )
    }

    #[test]
    fn test_binding_indices_follow_insertion_order() {
        let table = StringTable::new();
        let schema = schema(&table);
        assert_eq!(schema.member_count(), 2);
        assert_eq!(schema.members()[0].binding_index, 0);
        assert_eq!(schema.members()[0].name.as_str(), "x");
        assert_eq!(schema.members()[1].binding_index, 1);
        assert_eq!(schema.members()[1].name.as_str(), "y");
    }

    #[test]
    fn test_member_lookup() {
        let table = StringTable::new();
        let schema = schema(&table);
        let y = schema.member_by_name(&table.intern("y")).unwrap();
        assert_eq!(y.binding_index, 1);
        assert_eq!(y.value_type, ValueType::Int32);
        assert!(schema.member_by_name(&table.intern("z")).is_none());
        assert!(schema.member_by_index(2).is_none());
    }

    #[test]
    fn test_instance_members_start_null() {
        let table = StringTable::new();
        let schema = Arc::new(schema(&table));
        let instance = ObjectInstance::new(Arc::clone(&schema));
        assert_eq!(instance.members().len(), 2);
        assert!(instance.member(0).unwrap().is_null());
        assert!(instance.member(2).is_none());
    }

    #[test]
    fn test_instance_set_member() {
        let table = StringTable::new();
        let schema = Arc::new(schema(&table));
        let mut instance = ObjectInstance::new(schema);
        assert!(instance.set_member(0, Value::Int32(7)));
        assert_eq!(instance.member(0).unwrap().get_int32(), 7);
        assert!(!instance.set_member(9, Value::Int32(1)));
    }
}
