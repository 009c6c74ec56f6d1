//! Native call interface
//!
//! Native and built-in function bodies receive a [`NativeCallArgs`] view:
//! a scratch copy of the I/O registers plus access to the VM's value
//! constructors. The interpreter releases the GC read lock before invoking
//! the callback, so a full collection cycle may run during the call; values
//! the callback creates stay auto-marked until they are written back into
//! the execution context.

use crate::exec::{Severity, IO_REGISTER_COUNT};
use crate::vm::{StandardException, VmState};
use std::sync::Arc;
use xenon_core::{ObjectSchema, Value, XString};

/// Argument and result exchange for one native function invocation.
pub struct NativeCallArgs<'a> {
    pub(crate) state: &'a VmState,
    pub(crate) io: &'a mut [Value; IO_REGISTER_COUNT],
    pub(crate) raised: Option<(Value, Severity)>,
}

impl NativeCallArgs<'_> {
    /// Read an I/O register. Out-of-range indices read as null.
    pub fn io_register(&self, index: usize) -> Value {
        self.io.get(index).copied().unwrap_or(Value::Null)
    }

    /// Write an I/O register. Out-of-range indices are ignored.
    pub fn set_io_register(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.io.get_mut(index) {
            *slot = value;
        }
    }

    /// Create a string value.
    pub fn create_string(&self, text: &str) -> Value {
        self.state.alloc_string(text)
    }

    /// Create an array value of nulls.
    pub fn create_array(&self, length: usize) -> Value {
        self.state.alloc_array(length)
    }

    /// Create an object instance of a schema.
    pub fn create_object(&self, schema: &Arc<ObjectSchema>) -> Value {
        self.state.alloc_object(schema)
    }

    /// Read the content of a string value.
    pub fn string_content(&self, value: Value) -> Option<Arc<XString>> {
        self.state.string_content(value)
    }

    /// Length of an array value.
    pub fn array_length(&self, value: Value) -> Option<usize> {
        let r = value.gc_ref()?;
        self.state.heap.lock().array(r).map(Vec::len)
    }

    /// The schema of an object value.
    pub fn object_schema_of(&self, value: Value) -> Option<Arc<ObjectSchema>> {
        let r = value.gc_ref()?;
        self.state.heap.lock().object(r).map(|o| Arc::clone(o.schema()))
    }

    /// Release a temporary the callback no longer roots.
    pub fn abandon(&self, value: Value) {
        if let Some(r) = value.gc_ref() {
            self.state.heap.lock().set_auto_mark(r, false);
        }
    }

    /// Raise a script exception from the native call. The raise takes
    /// effect when the callback returns.
    pub fn raise(&mut self, value: Value, severity: Severity) {
        self.raised = Some((value, severity));
    }

    /// Raise a standard exception with a message.
    pub fn raise_standard(
        &mut self,
        kind: StandardException,
        severity: Severity,
        message: &str,
    ) {
        let value = self.state.make_standard_exception(kind, message, true);
        self.raised = Some((value, severity));
    }

    /// Whether the callback has raised an exception.
    pub fn has_raised(&self) -> bool {
        self.raised.is_some()
    }
}
