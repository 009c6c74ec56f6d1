//! Program loader and linker
//!
//! Decodes a program image, then - under the exclusive GC lock so the
//! collector sees a consistent new population of tracked objects - resolves
//! constants through the string table, registers schemas, functions, and
//! globals into the VM registries, and synthesizes the program's init
//! function. Duplicate registry entries are non-fatal: the loader reports a
//! warning and keeps the first registration. Dependency requests fire after
//! the lock is released.

use crate::error::{VmError, VmResult};
use crate::function::Function;
use crate::program::Program;
use crate::vm::{Vm, VmState};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::Arc;
use xenon_bytecode::{BytecodeWriter, Constant, ProgramImage};
use xenon_core::{GcObject, ObjectSchema, Value, XString};

impl Vm {
    /// Load a program image from a file.
    pub fn load_program_from_file(&self, name: &str, path: impl AsRef<Path>) -> VmResult<Arc<Program>> {
        self.state.report.verbose(&format!(
            "Loading program \"{name}\" from file: \"{}\"",
            path.as_ref().display()
        ));
        let data = std::fs::read(path)?;
        self.load_program(name, &data)
    }

    /// Load a program image from an in-memory buffer.
    pub fn load_program(&self, name: &str, data: &[u8]) -> VmResult<Arc<Program>> {
        let image = ProgramImage::decode(data)?;

        let program = {
            let _exclusive = self.state.gc_lock.write();
            admit_program(&self.state, name, image)?
        };

        // Request every declared dependency that is not yet registered; the
        // host is responsible for loading them.
        if let Some(callback) = &self.state.on_dependency_request {
            for dependency in program.dependencies() {
                if !self.state.programs.read().contains_key(dependency) {
                    callback(dependency.as_str());
                }
            }
        }

        Ok(program)
    }
}

fn admit_program(state: &VmState, name: &str, image: ProgramImage) -> VmResult<Arc<Program>> {
    let program_name = state.intern(name);
    if state.programs.read().contains_key(&program_name) {
        return Err(VmError::KeyAlreadyExists(name.to_owned()));
    }

    // Validate constant references before any registration so a failed load
    // leaves no partial entries behind.
    let constant_count = image.constants.len();
    for (global_name, index) in &image.globals {
        if *index as usize >= constant_count {
            state.report.error(&format!(
                "Global variable references a bad constant: name=\"{global_name}\", index={index}"
            ));
            return Err(VmError::IndexOutOfRange {
                index: *index as usize,
                limit: constant_count,
            });
        }
    }
    for function in &image.functions {
        for (local_name, index) in &function.locals {
            if *index as usize >= constant_count {
                state.report.error(&format!(
                    "Local variable references a bad constant: name=\"{local_name}\", index={index}"
                ));
                return Err(VmError::IndexOutOfRange {
                    index: *index as usize,
                    limit: constant_count,
                });
            }
        }
    }

    // Resolve the constant table. String constants intern through the VM
    // string table; the resulting heap objects are rooted by the program,
    // so their auto-mark is cleared immediately.
    let mut constants: Vec<Value> = Vec::with_capacity(constant_count);
    let mut string_indices: FxHashMap<Arc<XString>, u32> = FxHashMap::default();
    {
        let mut heap = state.heap.lock();
        for constant in &image.constants {
            let value = match constant {
                Constant::Null => Value::Null,
                Constant::Bool(v) => Value::Bool(*v),
                Constant::Int8(v) => Value::Int8(*v),
                Constant::Int16(v) => Value::Int16(*v),
                Constant::Int32(v) => Value::Int32(*v),
                Constant::Int64(v) => Value::Int64(*v),
                Constant::Uint8(v) => Value::Uint8(*v),
                Constant::Uint16(v) => Value::Uint16(*v),
                Constant::Uint32(v) => Value::Uint32(*v),
                Constant::Uint64(v) => Value::Uint64(*v),
                Constant::Float32(v) => Value::Float32(*v),
                Constant::Float64(v) => Value::Float64(*v),
                Constant::String(text) => {
                    let interned = state.intern(text);
                    let r = heap.alloc(GcObject::Str(Arc::clone(&interned)));
                    heap.set_auto_mark(r, false);
                    string_indices
                        .entry(interned)
                        .or_insert(constants.len() as u32);
                    Value::String(r)
                }
            };
            constants.push(value);
        }

        // The init function stores globals by name, so every global name
        // must be reachable as a string constant; append any that are not.
        for (global_name, _) in &image.globals {
            let interned = state.intern(global_name);
            if !string_indices.contains_key(&interned) {
                let r = heap.alloc(GcObject::Str(Arc::clone(&interned)));
                heap.set_auto_mark(r, false);
                string_indices.insert(interned, constants.len() as u32);
                constants.push(Value::String(r));
            }
        }
    }
    let constants = Arc::new(constants);
    let code: Arc<[u8]> = image.bytecode.into();

    // Object schemas.
    let mut program_schemas = Vec::new();
    for entry in &image.object_types {
        let type_name = state.intern(&entry.name);
        if state.schemas.read().contains_key(&type_name) {
            state.report.warning(&format!(
                "Object type already registered; skipping: \"{}\"",
                entry.name
            ));
            continue;
        }
        let members = entry
            .members
            .iter()
            .map(|(member_name, value_type)| (state.intern(member_name), *value_type))
            .collect();
        let schema = Arc::new(ObjectSchema::new(Arc::clone(&type_name), members));
        state
            .schemas
            .write()
            .insert(type_name, Arc::clone(&schema));
        program_schemas.push(schema);
    }

    // Functions.
    let mut program_functions = Vec::new();
    for entry in &image.functions {
        let signature = state.intern(&entry.signature);
        if state.functions.read().contains_key(&signature) {
            state.report.warning(&format!(
                "Function already registered; skipping: \"{}\"",
                entry.signature
            ));
            continue;
        }

        let function = if entry.is_native {
            state.report.verbose(&format!(
                "Registering native function: signature=\"{}\"",
                entry.signature
            ));
            Function::new_native(
                Arc::clone(&signature),
                Some(Arc::clone(&program_name)),
                entry.num_params,
                entry.num_returns,
            )
        } else {
            state.report.verbose(&format!(
                "Registering script function: signature=\"{}\", offsetStart={:#x}, offsetEnd={:#x}",
                entry.signature, entry.offset_start, entry.offset_end
            ));
            let locals = entry
                .locals
                .iter()
                .map(|(local_name, index)| {
                    (state.intern(local_name), constants[*index as usize])
                })
                .collect();
            Function::new_script(
                Arc::clone(&signature),
                Some(Arc::clone(&program_name)),
                Arc::clone(&code),
                image.byte_order,
                entry.offset_start,
                entry.offset_end,
                Arc::clone(&constants),
                locals,
                entry.num_params,
                entry.num_returns,
            )
        };

        let function = Arc::new(function);
        state
            .functions
            .write()
            .insert(signature, Arc::clone(&function));
        program_functions.push(function);
    }

    // Globals, initialized from their constants.
    let mut program_globals = Vec::new();
    for (global_name, index) in &image.globals {
        let key = state.intern(global_name);
        if state.globals.read().contains_key(&key) {
            state.report.warning(&format!(
                "Global variable already registered; skipping: \"{global_name}\""
            ));
            continue;
        }
        state
            .globals
            .write()
            .insert(Arc::clone(&key), constants[*index as usize]);
        program_globals.push((key, *index));
    }

    // Synthesize the init function: one load/store pair per global, in the
    // program's byte order, executed from its own code buffer.
    let mut body = BytecodeWriter::new(image.byte_order);
    for (global_name, constant_index) in &program_globals {
        let name_index = string_indices[global_name];
        body.emit_load_constant(0, *constant_index);
        body.emit_store_global(name_index, 0);
    }
    body.emit_return();
    let init_code: Arc<[u8]> = body.into_bytes().into();
    let init_length = init_code.len() as u32;

    let init_signature = state.intern(&format!("void `.init-program-'{name}'()"));
    let init_function = Arc::new(Function::new_script(
        init_signature,
        Some(Arc::clone(&program_name)),
        init_code,
        image.byte_order,
        0,
        init_length,
        Arc::clone(&constants),
        Vec::new(),
        0,
        0,
    ));

    let program = Arc::new(Program {
        name: Arc::clone(&program_name),
        byte_order: image.byte_order,
        constants,
        code,
        dependencies: image
            .dependencies
            .iter()
            .map(|dependency| state.intern(dependency))
            .collect(),
        globals: program_globals,
        functions: program_functions,
        schemas: program_schemas,
        init_function,
    });
    state
        .programs
        .write()
        .insert(program_name, Arc::clone(&program));

    state
        .report
        .verbose(&format!("Loaded program \"{name}\""));
    Ok(program)
}
