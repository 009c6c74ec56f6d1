//! Xenon VM bytecode definitions
//!
//! This crate provides the opcode instruction set, the endian-aware
//! serializer, the on-disk program image format, and the program builder
//! used to produce it.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod format;
pub mod opcode;
pub mod serializer;
pub mod writer;

pub use format::{Constant, FunctionEntry, ObjectTypeEntry, ProgramImage, FILE_VERSION, MAGIC};
pub use opcode::{Opcode, TOTAL_OPCODES};
pub use serializer::{ByteOrder, DecodeError, Deserializer, Serializer};
pub use writer::{BytecodeWriter, ProgramWriter, WriteError};
