//! Loaded program units

use crate::error::{VmError, VmResult};
use crate::function::Function;
use std::sync::Arc;
use xenon_bytecode::ByteOrder;
use xenon_core::{ObjectSchema, Value, XString};

/// A named unit admitted into the VM from a program image.
///
/// The program owns its constant table and the contiguous code buffer its
/// script functions execute from; the synthetic init function installs each
/// global's initial constant value.
pub struct Program {
    pub(crate) name: Arc<XString>,
    pub(crate) byte_order: ByteOrder,
    pub(crate) constants: Arc<Vec<Value>>,
    pub(crate) code: Arc<[u8]>,
    pub(crate) dependencies: Vec<Arc<XString>>,
    pub(crate) globals: Vec<(Arc<XString>, u32)>,
    pub(crate) functions: Vec<Arc<Function>>,
    pub(crate) schemas: Vec<Arc<ObjectSchema>>,
    pub(crate) init_function: Arc<Function>,
}

impl Program {
    /// The program name.
    pub fn name(&self) -> &Arc<XString> {
        &self.name
    }

    /// Byte order the program image declared.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// The constant table.
    pub fn constants(&self) -> &Arc<Vec<Value>> {
        &self.constants
    }

    /// Look up a constant by index.
    pub fn get_constant(&self, index: u32) -> VmResult<Value> {
        self.constants
            .get(index as usize)
            .copied()
            .ok_or(VmError::IndexOutOfRange {
                index: index as usize,
                limit: self.constants.len(),
            })
    }

    /// The program's code buffer.
    pub fn code(&self) -> &Arc<[u8]> {
        &self.code
    }

    /// Declared dependency program names.
    pub fn dependencies(&self) -> &[Arc<XString>] {
        &self.dependencies
    }

    /// Globals this program declared, as (name, constant index) pairs.
    pub fn globals(&self) -> &[(Arc<XString>, u32)] {
        &self.globals
    }

    /// Functions this program registered, in table order.
    pub fn functions(&self) -> &[Arc<Function>] {
        &self.functions
    }

    /// Object schemas this program registered.
    pub fn schemas(&self) -> &[Arc<ObjectSchema>] {
        &self.schemas
    }

    /// The synthetic initializer function that installs the program's
    /// globals. Not registered in the VM function registry.
    pub fn init_function(&self) -> &Arc<Function> {
        &self.init_function
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("byte_order", &self.byte_order)
            .field("constants", &self.constants.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}
