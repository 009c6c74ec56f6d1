//! Program-builder driver
//!
//! Takes no arguments; assembles a small demo program exercising constants,
//! globals, locals, yield, a native binding, and a built-in call, then
//! writes it to `test.xc`.

use anyhow::{Context, Result};
use xenon_bytecode::{ByteOrder, BytecodeWriter, ProgramWriter};
use xenon_engine::MessageKind;

fn report(kind: MessageKind, text: &str) {
    let tag = match kind {
        MessageKind::Verbose => "V",
        MessageKind::Info => "I",
        MessageKind::Warning => "W",
        MessageKind::Error => "E",
        MessageKind::Fatal => "!",
    };
    if kind >= MessageKind::Error {
        eprintln!("[{tag}] {text}");
    } else {
        println!("[{tag}] {text}");
    }
}

const MAIN_SIGNATURE: &str = "void Program.Main()";
const SUB_SIGNATURE: &str = "int32 Program.DoWork(float64)";
const NATIVE_SIGNATURE: &str = "void Program.PrintString(string)";
const BUILTIN_ADD_STRING: &str = "string Xenon.Builtin.AddString(string, string)";
const GLOBAL_NAME: &str = "globalTestVar";
const LOCAL_NAME: &str = "localTestVar";

fn build() -> Result<Vec<u8>> {
    let byte_order = ByteOrder::native();
    let mut writer = ProgramWriter::new();

    let c_null = writer.add_constant_null();
    let c_int = writer.add_constant_int32(123);
    let c_work = writer.add_constant_float64(1.2345);
    let _ = writer.add_constant_float64(2.3456);
    let c_hello = writer.add_constant_string("this is ");
    let c_world = writer.add_constant_string("a test string");
    let c_global_name = writer.add_constant_string(GLOBAL_NAME);
    let c_sub_sig = writer.add_constant_string(SUB_SIGNATURE);
    let c_native_sig = writer.add_constant_string(NATIVE_SIGNATURE);
    let c_local_name = writer.add_constant_string(LOCAL_NAME);
    let c_builtin_sig = writer.add_constant_string(BUILTIN_ADD_STRING);

    writer
        .add_global(GLOBAL_NAME, c_hello)
        .context("register global")?;

    // void Program.Main()
    {
        let mut body = BytecodeWriter::new(byte_order);
        body.emit_load_constant(0, c_null);
        body.emit_load_constant(1, c_int);
        body.emit_load_constant(2, c_work);
        body.emit_load_constant(3, c_hello);
        body.emit_load_constant(4, c_world);

        body.emit_load_global(5, c_global_name);
        body.emit_store_global(c_global_name, 4);

        body.emit_store_param(0, 2);
        body.emit_call(c_sub_sig);
        body.emit_load_param(6, 0);

        body.emit_return();
        writer
            .add_function(MAIN_SIGNATURE, &body.into_bytes(), 0, 0)
            .context("register main function")?;
    }

    // int32 Program.DoWork(float64)
    {
        let mut body = BytecodeWriter::new(byte_order);
        body.emit_load_param(0, 0);

        body.emit_load_local(1, c_local_name);
        body.emit_store_local(c_local_name, 0);

        body.emit_push(0);
        body.emit_yield();
        body.emit_pop(1);

        body.emit_load_constant(0, c_hello);
        body.emit_store_param(0, 0);
        body.emit_load_constant(1, c_world);
        body.emit_store_param(1, 1);

        body.emit_call(c_builtin_sig);
        body.emit_call(c_native_sig);

        body.emit_load_constant(0, c_int);
        body.emit_store_param(0, 0);

        body.emit_nop();
        body.emit_return();
        writer
            .add_function(SUB_SIGNATURE, &body.into_bytes(), 1, 1)
            .context("register work function")?;
        writer
            .add_local_variable(SUB_SIGNATURE, LOCAL_NAME, c_work)
            .context("register local variable")?;
    }

    // void Program.PrintString(string)
    writer
        .add_native_function(NATIVE_SIGNATURE, 1, 0)
        .context("register native function")?;

    Ok(writer.serialize(byte_order))
}

fn main() {
    let output_filename = "test.xc";

    let data = match build() {
        Ok(data) => data,
        Err(error) => {
            report(MessageKind::Fatal, &format!("Failed to build program: {error:#}"));
            std::process::exit(1);
        }
    };

    report(MessageKind::Info, &format!("Writing file: {output_filename}"));
    if let Err(error) = std::fs::write(output_filename, &data) {
        report(
            MessageKind::Fatal,
            &format!("Failed to write program file: {error}"),
        );
        std::process::exit(1);
    }
}
