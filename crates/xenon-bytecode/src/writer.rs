//! Program builder
//!
//! `ProgramWriter` records constants, globals, functions, and object schemas,
//! then serializes them into the program image format. Constant insertion is
//! deduplicated per type; float dedup keys the raw bit pattern so `+0.0` and
//! `-0.0` stay distinct and NaN payloads are preserved.

use crate::format::{Constant, FUNCTION_ALIGNMENT, FILE_VERSION, MAGIC};
use crate::opcode::Opcode;
use crate::serializer::{ByteOrder, Serializer};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use xenon_core::ValueType;

/// Errors reported by the program builder.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A key (signature, global, local, type, or member name) already exists
    #[error("key already exists: {0}")]
    KeyAlreadyExists(String),

    /// A referenced key does not exist
    #[error("key does not exist: {0}")]
    KeyDoesNotExist(String),

    /// A constant index is out of range
    #[error("constant index out of range: {index} (table size {size})")]
    IndexOutOfRange {
        /// The referenced index
        index: u32,
        /// Current constant table size
        size: usize,
    },
}

#[derive(Default)]
struct FunctionData {
    bytecode: Vec<u8>,
    is_native: bool,
    num_params: u16,
    num_returns: u16,
    locals: Vec<(String, u32)>,
}

struct ObjectTypeData {
    name: String,
    members: Vec<(String, ValueType)>,
    member_names: FxHashSet<String>,
}

/// Builder for program images.
///
/// The first three constant slots are reserved at construction:
/// index 0 = null, 1 = `false`, 2 = `true`.
pub struct ProgramWriter {
    constants: Vec<Constant>,

    // One dedup map per type; float maps key the raw bit pattern.
    index_map_bool: FxHashMap<bool, u32>,
    index_map_int8: FxHashMap<i8, u32>,
    index_map_int16: FxHashMap<i16, u32>,
    index_map_int32: FxHashMap<i32, u32>,
    index_map_int64: FxHashMap<i64, u32>,
    index_map_uint8: FxHashMap<u8, u32>,
    index_map_uint16: FxHashMap<u16, u32>,
    index_map_uint32: FxHashMap<u32, u32>,
    index_map_uint64: FxHashMap<u64, u32>,
    index_map_float32: FxHashMap<u32, u32>,
    index_map_float64: FxHashMap<u64, u32>,
    index_map_string: FxHashMap<String, u32>,

    dependencies: Vec<String>,
    dependency_names: FxHashSet<String>,

    globals: Vec<(String, u32)>,
    global_names: FxHashSet<String>,

    function_order: Vec<String>,
    functions: FxHashMap<String, FunctionData>,

    object_types: Vec<ObjectTypeData>,
    object_type_names: FxHashSet<String>,
}

impl ProgramWriter {
    /// Create a new builder with the reserved constant slots in place.
    pub fn new() -> Self {
        let mut writer = Self {
            constants: Vec::new(),
            index_map_bool: FxHashMap::default(),
            index_map_int8: FxHashMap::default(),
            index_map_int16: FxHashMap::default(),
            index_map_int32: FxHashMap::default(),
            index_map_int64: FxHashMap::default(),
            index_map_uint8: FxHashMap::default(),
            index_map_uint16: FxHashMap::default(),
            index_map_uint32: FxHashMap::default(),
            index_map_uint64: FxHashMap::default(),
            index_map_float32: FxHashMap::default(),
            index_map_float64: FxHashMap::default(),
            index_map_string: FxHashMap::default(),
            dependencies: Vec::new(),
            dependency_names: FxHashSet::default(),
            globals: Vec::new(),
            global_names: FxHashSet::default(),
            function_order: Vec::new(),
            functions: FxHashMap::default(),
            object_types: Vec::new(),
            object_type_names: FxHashSet::default(),
        };

        writer.constants.push(Constant::Null);
        writer.constants.push(Constant::Bool(false));
        writer.index_map_bool.insert(false, 1);
        writer.constants.push(Constant::Bool(true));
        writer.index_map_bool.insert(true, 2);

        writer
    }

    /// Number of constants recorded so far.
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Add the null constant. Always returns the reserved index 0.
    pub fn add_constant_null(&mut self) -> u32 {
        0
    }

    /// Add a boolean constant. Returns one of the reserved indices 1 and 2.
    pub fn add_constant_bool(&mut self, value: bool) -> u32 {
        self.index_map_bool[&value]
    }

    /// Add a string constant. Equal byte content deduplicates to one entry.
    pub fn add_constant_string(&mut self, value: &str) -> u32 {
        if let Some(&index) = self.index_map_string.get(value) {
            return index;
        }
        let index = self.constants.len() as u32;
        self.index_map_string.insert(value.to_owned(), index);
        self.constants.push(Constant::String(value.to_owned()));
        index
    }

    /// Add a float32 constant, deduplicated on the raw bit pattern.
    pub fn add_constant_float32(&mut self, value: f32) -> u32 {
        let bits = value.to_bits();
        if let Some(&index) = self.index_map_float32.get(&bits) {
            return index;
        }
        let index = self.constants.len() as u32;
        self.index_map_float32.insert(bits, index);
        self.constants.push(Constant::Float32(value));
        index
    }

    /// Add a float64 constant, deduplicated on the raw bit pattern.
    pub fn add_constant_float64(&mut self, value: f64) -> u32 {
        let bits = value.to_bits();
        if let Some(&index) = self.index_map_float64.get(&bits) {
            return index;
        }
        let index = self.constants.len() as u32;
        self.index_map_float64.insert(bits, index);
        self.constants.push(Constant::Float64(value));
        index
    }

    /// Record a dependency on another program by name. Repeats are ignored.
    pub fn add_dependency(&mut self, name: &str) {
        if self.dependency_names.insert(name.to_owned()) {
            self.dependencies.push(name.to_owned());
        }
    }

    /// Register a global variable whose initial value is the given constant.
    pub fn add_global(&mut self, name: &str, constant_index: u32) -> Result<(), WriteError> {
        if constant_index as usize >= self.constants.len() {
            return Err(WriteError::IndexOutOfRange {
                index: constant_index,
                size: self.constants.len(),
            });
        }
        if !self.global_names.insert(name.to_owned()) {
            return Err(WriteError::KeyAlreadyExists(name.to_owned()));
        }
        self.globals.push((name.to_owned(), constant_index));
        Ok(())
    }

    /// Record a script function body under a unique signature.
    pub fn add_function(
        &mut self,
        signature: &str,
        bytecode: &[u8],
        num_params: u16,
        num_returns: u16,
    ) -> Result<(), WriteError> {
        if self.functions.contains_key(signature) {
            return Err(WriteError::KeyAlreadyExists(signature.to_owned()));
        }
        self.function_order.push(signature.to_owned());
        self.functions.insert(
            signature.to_owned(),
            FunctionData {
                bytecode: bytecode.to_vec(),
                is_native: false,
                num_params,
                num_returns,
                locals: Vec::new(),
            },
        );
        Ok(())
    }

    /// Record a function whose body is supplied at runtime by the host.
    pub fn add_native_function(
        &mut self,
        signature: &str,
        num_params: u16,
        num_returns: u16,
    ) -> Result<(), WriteError> {
        if self.functions.contains_key(signature) {
            return Err(WriteError::KeyAlreadyExists(signature.to_owned()));
        }
        self.function_order.push(signature.to_owned());
        self.functions.insert(
            signature.to_owned(),
            FunctionData {
                bytecode: Vec::new(),
                is_native: true,
                num_params,
                num_returns,
                locals: Vec::new(),
            },
        );
        Ok(())
    }

    /// Attach a local-variable → initial-constant mapping to a registered
    /// script function.
    pub fn add_local_variable(
        &mut self,
        function_signature: &str,
        local_name: &str,
        constant_index: u32,
    ) -> Result<(), WriteError> {
        if constant_index as usize >= self.constants.len() {
            return Err(WriteError::IndexOutOfRange {
                index: constant_index,
                size: self.constants.len(),
            });
        }
        let function = self
            .functions
            .get_mut(function_signature)
            .ok_or_else(|| WriteError::KeyDoesNotExist(function_signature.to_owned()))?;
        if function.locals.iter().any(|(name, _)| name == local_name) {
            return Err(WriteError::KeyAlreadyExists(local_name.to_owned()));
        }
        function.locals.push((local_name.to_owned(), constant_index));
        Ok(())
    }

    /// Register an object type schema.
    pub fn add_object_type(&mut self, type_name: &str) -> Result<(), WriteError> {
        if !self.object_type_names.insert(type_name.to_owned()) {
            return Err(WriteError::KeyAlreadyExists(type_name.to_owned()));
        }
        self.object_types.push(ObjectTypeData {
            name: type_name.to_owned(),
            members: Vec::new(),
            member_names: FxHashSet::default(),
        });
        Ok(())
    }

    /// Append a member to a registered object type. Insertion order assigns
    /// the binding index: first member → 0, and so on.
    pub fn add_object_member(
        &mut self,
        type_name: &str,
        member_name: &str,
        value_type: ValueType,
    ) -> Result<u32, WriteError> {
        let object_type = self
            .object_types
            .iter_mut()
            .find(|t| t.name == type_name)
            .ok_or_else(|| WriteError::KeyDoesNotExist(type_name.to_owned()))?;
        if !object_type.member_names.insert(member_name.to_owned()) {
            return Err(WriteError::KeyAlreadyExists(member_name.to_owned()));
        }
        let binding_index = object_type.members.len() as u32;
        object_type.members.push((member_name.to_owned(), value_type));
        Ok(binding_index)
    }

    /// Serialize the recorded program into image bytes.
    ///
    /// The version header holds table offsets that are unknown until each
    /// table has been written, so a placeholder header is emitted first, the
    /// tables follow while their offsets are recorded, and the real header is
    /// patched in over the placeholder.
    pub fn serialize(&self, byte_order: ByteOrder) -> Vec<u8> {
        // Lay out the contiguous bytecode buffer, padding each function body
        // to the alignment boundary.
        struct Binding<'a> {
            signature: &'a str,
            data: &'a FunctionData,
            offset_start: u32,
            offset_end: u32,
        }

        let mut bindings = Vec::with_capacity(self.function_order.len());
        let mut bytecode_length = 0usize;
        for signature in &self.function_order {
            let data = &self.functions[signature];
            if data.is_native {
                bindings.push(Binding {
                    signature,
                    data,
                    offset_start: 0,
                    offset_end: 0,
                });
                continue;
            }
            let offset_start = bytecode_length as u32;
            let offset_end = offset_start + data.bytecode.len() as u32;
            bytecode_length = aligned_size(offset_end as usize);
            bindings.push(Binding {
                signature,
                data,
                offset_start,
                offset_end,
            });
        }

        let mut bytecode = vec![0u8; bytecode_length];
        for binding in &bindings {
            if !binding.data.is_native {
                let start = binding.offset_start as usize;
                bytecode[start..start + binding.data.bytecode.len()]
                    .copy_from_slice(&binding.data.bytecode);
            }
        }

        let mut writer = Serializer::new(byte_order);

        // Common header.
        writer.write_bytes(&MAGIC);
        writer.write_u8(0); // reserved
        writer.write_u8(byte_order.flag());
        writer.write_u16(FILE_VERSION);

        // Placeholder version header; patched once the offsets are known.
        let header_position = writer.position();
        let mut offsets = [0u32; 12];
        write_version_header(&mut writer, &offsets);

        offsets[0] = writer.position() as u32;
        offsets[1] = self.dependencies.len() as u32;
        for name in &self.dependencies {
            writer.write_cstring(name);
        }

        offsets[2] = writer.position() as u32;
        offsets[3] = self.object_types.len() as u32;
        for object_type in &self.object_types {
            writer.write_cstring(&object_type.name);
            writer.write_u32(object_type.members.len() as u32);
            for (member_name, value_type) in &object_type.members {
                writer.write_cstring(member_name);
                writer.write_u8(value_type.to_u8());
            }
        }

        offsets[4] = writer.position() as u32;
        offsets[5] = self.constants.len() as u32;
        for constant in &self.constants {
            constant.encode(&mut writer);
        }

        offsets[6] = writer.position() as u32;
        offsets[7] = self.globals.len() as u32;
        for (name, constant_index) in &self.globals {
            writer.write_cstring(name);
            writer.write_u32(*constant_index);
        }

        offsets[8] = writer.position() as u32;
        offsets[9] = bindings.len() as u32;
        for binding in &bindings {
            writer.write_cstring(binding.signature);
            writer.write_bool(binding.data.is_native);
            writer.write_u16(binding.data.num_params);
            writer.write_u16(binding.data.num_returns);
            if !binding.data.is_native {
                writer.write_u32(binding.offset_start);
                writer.write_u32(binding.offset_end);
                writer.write_u32(binding.data.locals.len() as u32);
                for (name, constant_index) in &binding.data.locals {
                    writer.write_cstring(name);
                    writer.write_u32(*constant_index);
                }
            }
        }

        offsets[10] = writer.position() as u32;
        offsets[11] = bytecode.len() as u32;
        writer.write_bytes(&bytecode);

        // Second pass: overwrite the placeholder header.
        let end_position = writer.position();
        writer.set_position(header_position);
        write_version_header(&mut writer, &offsets);
        writer.set_position(end_position);

        writer.into_bytes()
    }
}

impl Default for ProgramWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn aligned_size(size: usize) -> usize {
    (size + (FUNCTION_ALIGNMENT - 1)) & !(FUNCTION_ALIGNMENT - 1)
}

fn write_version_header(writer: &mut Serializer, offsets: &[u32; 12]) {
    for value in offsets {
        writer.write_u32(*value);
    }
}

macro_rules! add_constant_int {
    ($(#[$doc:meta] $name:ident: $ty:ty => $map:ident, $variant:ident),+ $(,)?) => {
        impl ProgramWriter {
            $(
                #[$doc]
                pub fn $name(&mut self, value: $ty) -> u32 {
                    if let Some(&index) = self.$map.get(&value) {
                        return index;
                    }
                    let index = self.constants.len() as u32;
                    self.$map.insert(value, index);
                    self.constants.push(Constant::$variant(value));
                    index
                }
            )+
        }
    };
}

add_constant_int! {
    /// Add an int8 constant, deduplicated by value.
    add_constant_int8: i8 => index_map_int8, Int8,
    /// Add an int16 constant, deduplicated by value.
    add_constant_int16: i16 => index_map_int16, Int16,
    /// Add an int32 constant, deduplicated by value.
    add_constant_int32: i32 => index_map_int32, Int32,
    /// Add an int64 constant, deduplicated by value.
    add_constant_int64: i64 => index_map_int64, Int64,
    /// Add a uint8 constant, deduplicated by value.
    add_constant_uint8: u8 => index_map_uint8, Uint8,
    /// Add a uint16 constant, deduplicated by value.
    add_constant_uint16: u16 => index_map_uint16, Uint16,
    /// Add a uint32 constant, deduplicated by value.
    add_constant_uint32: u32 => index_map_uint32, Uint32,
    /// Add a uint64 constant, deduplicated by value.
    add_constant_uint64: u64 => index_map_uint64, Uint64,
}

/// Instruction emitter for function bodies.
///
/// Operands are written in the byte order the image will be serialized with.
pub struct BytecodeWriter {
    writer: Serializer,
}

impl BytecodeWriter {
    /// Create a new emitter for the given byte order.
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            writer: Serializer::new(byte_order),
        }
    }

    /// Current offset into the emitted body.
    pub fn offset(&self) -> usize {
        self.writer.len()
    }

    /// Consume the emitter, returning the body bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_bytes()
    }

    fn emit_opcode(&mut self, opcode: Opcode) {
        self.writer.write_u8(opcode.to_u8());
    }

    /// Emit `NOP`.
    pub fn emit_nop(&mut self) {
        self.emit_opcode(Opcode::Nop);
    }

    /// Emit `RETURN`.
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }

    /// Emit `YIELD`.
    pub fn emit_yield(&mut self) {
        self.emit_opcode(Opcode::Yield);
    }

    /// Emit `CALL c#`.
    pub fn emit_call(&mut self, constant_index: u32) {
        self.emit_opcode(Opcode::Call);
        self.writer.write_u32(constant_index);
    }

    /// Emit `LOAD_CONSTANT r#, c#`.
    pub fn emit_load_constant(&mut self, register_index: u32, constant_index: u32) {
        self.emit_opcode(Opcode::LoadConstant);
        self.writer.write_u32(register_index);
        self.writer.write_u32(constant_index);
    }

    /// Emit `LOAD_GLOBAL r#, c#`.
    pub fn emit_load_global(&mut self, register_index: u32, constant_index: u32) {
        self.emit_opcode(Opcode::LoadGlobal);
        self.writer.write_u32(register_index);
        self.writer.write_u32(constant_index);
    }

    /// Emit `LOAD_LOCAL r#, c#`.
    pub fn emit_load_local(&mut self, register_index: u32, constant_index: u32) {
        self.emit_opcode(Opcode::LoadLocal);
        self.writer.write_u32(register_index);
        self.writer.write_u32(constant_index);
    }

    /// Emit `LOAD_PARAM r#, p#`.
    pub fn emit_load_param(&mut self, register_index: u32, io_register_index: u32) {
        self.emit_opcode(Opcode::LoadParam);
        self.writer.write_u32(register_index);
        self.writer.write_u32(io_register_index);
    }

    /// Emit `STORE_GLOBAL c#, r#`.
    pub fn emit_store_global(&mut self, constant_index: u32, register_index: u32) {
        self.emit_opcode(Opcode::StoreGlobal);
        self.writer.write_u32(constant_index);
        self.writer.write_u32(register_index);
    }

    /// Emit `STORE_LOCAL c#, r#`.
    pub fn emit_store_local(&mut self, constant_index: u32, register_index: u32) {
        self.emit_opcode(Opcode::StoreLocal);
        self.writer.write_u32(constant_index);
        self.writer.write_u32(register_index);
    }

    /// Emit `STORE_PARAM p#, r#`.
    pub fn emit_store_param(&mut self, io_register_index: u32, register_index: u32) {
        self.emit_opcode(Opcode::StoreParam);
        self.writer.write_u32(io_register_index);
        self.writer.write_u32(register_index);
    }

    /// Emit `PULL_GLOBAL r#, c#`.
    pub fn emit_pull_global(&mut self, register_index: u32, constant_index: u32) {
        self.emit_opcode(Opcode::PullGlobal);
        self.writer.write_u32(register_index);
        self.writer.write_u32(constant_index);
    }

    /// Emit `PUSH r#`.
    pub fn emit_push(&mut self, register_index: u32) {
        self.emit_opcode(Opcode::Push);
        self.writer.write_u32(register_index);
    }

    /// Emit `POP r#`.
    pub fn emit_pop(&mut self, register_index: u32) {
        self.emit_opcode(Opcode::Pop);
        self.writer.write_u32(register_index);
    }

    /// Emit `INIT_OBJECT r#, c#`.
    pub fn emit_init_object(&mut self, register_index: u32, constant_index: u32) {
        self.emit_opcode(Opcode::InitObject);
        self.writer.write_u32(register_index);
        self.writer.write_u32(constant_index);
    }

    /// Emit `BRANCH #off`.
    pub fn emit_branch(&mut self, offset: i32) {
        self.emit_opcode(Opcode::Branch);
        self.writer.write_i32(offset);
    }

    /// Emit `BRANCH_IF_TRUE r#, #off`.
    pub fn emit_branch_if_true(&mut self, register_index: u32, offset: i32) {
        self.emit_opcode(Opcode::BranchIfTrue);
        self.writer.write_u32(register_index);
        self.writer.write_i32(offset);
    }

    /// Emit `BRANCH_IF_FALSE r#, #off`.
    pub fn emit_branch_if_false(&mut self, register_index: u32, offset: i32) {
        self.emit_opcode(Opcode::BranchIfFalse);
        self.writer.write_u32(register_index);
        self.writer.write_i32(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_constant_slots() {
        let mut writer = ProgramWriter::new();
        assert_eq!(writer.add_constant_null(), 0);
        assert_eq!(writer.add_constant_bool(false), 1);
        assert_eq!(writer.add_constant_bool(true), 2);
        assert_eq!(writer.constant_count(), 3);
    }

    #[test]
    fn test_integer_dedup() {
        let mut writer = ProgramWriter::new();
        let a = writer.add_constant_int32(123);
        let b = writer.add_constant_int32(123);
        assert_eq!(a, b);

        let c = writer.add_constant_int32(456);
        assert_ne!(a, c);

        // Equal numeric values of different types get distinct slots.
        let d = writer.add_constant_int64(123);
        assert_ne!(a, d);
    }

    #[test]
    fn test_float_dedup_keys_bit_pattern() {
        let mut writer = ProgramWriter::new();
        let pos = writer.add_constant_float32(0.0);
        let neg = writer.add_constant_float32(-0.0);
        assert_ne!(pos, neg);
        assert_eq!(writer.add_constant_float32(0.0), pos);

        let nan_a = writer.add_constant_float64(f64::NAN);
        let nan_b = writer.add_constant_float64(f64::NAN);
        assert_eq!(nan_a, nan_b);
    }

    #[test]
    fn test_string_dedup_keys_content() {
        let mut writer = ProgramWriter::new();
        let a = writer.add_constant_string("foo");
        let owned = String::from("foo");
        let b = writer.add_constant_string(&owned);
        assert_eq!(a, b);
        assert_ne!(writer.add_constant_string("bar"), a);
    }

    #[test]
    fn test_duplicate_function_signature() {
        let mut writer = ProgramWriter::new();
        writer.add_function("void A()", &[0x01], 0, 0).unwrap();
        assert!(matches!(
            writer.add_function("void A()", &[0x01], 0, 0),
            Err(WriteError::KeyAlreadyExists(_))
        ));
    }

    #[test]
    fn test_local_variable_requires_function() {
        let mut writer = ProgramWriter::new();
        let index = writer.add_constant_int32(5);
        assert!(matches!(
            writer.add_local_variable("void Missing()", "x", index),
            Err(WriteError::KeyDoesNotExist(_))
        ));
    }

    #[test]
    fn test_global_index_bounds() {
        let mut writer = ProgramWriter::new();
        assert!(matches!(
            writer.add_global("g", 999),
            Err(WriteError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_member_binding_order() {
        let mut writer = ProgramWriter::new();
        writer.add_object_type("Demo.Type").unwrap();
        assert_eq!(
            writer
                .add_object_member("Demo.Type", "first", ValueType::Int32)
                .unwrap(),
            0
        );
        assert_eq!(
            writer
                .add_object_member("Demo.Type", "second", ValueType::String)
                .unwrap(),
            1
        );
        assert!(matches!(
            writer.add_object_member("Demo.Type", "first", ValueType::Int32),
            Err(WriteError::KeyAlreadyExists(_))
        ));
    }
}
