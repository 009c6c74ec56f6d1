//! Runtime driver
//!
//! Loads a program binary, disassembles it at verbose level, binds the demo
//! `PrintString` native, and runs `void Program.Main()` to completion,
//! dumping the callstack if an unhandled exception surfaces.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use xenon_engine::{
    Execution, MessageKind, NativeCallArgs, RunMode, Vm, VmInit,
};

#[derive(Parser)]
#[command(name = "xenon-run")]
#[command(about = "Execute a Xenon program binary", long_about = None)]
struct Cli {
    /// Path to the program binary
    file: PathBuf,
}

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

fn print_string(args: &mut NativeCallArgs<'_>) {
    let param = args.io_register(0);
    let text = args
        .string_content(param)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_default();
    println!("> \"{text}\"");
}

fn disassemble(vm: &Vm) -> Result<()> {
    report(MessageKind::Verbose, "Disassembling ...");
    for program in vm.programs() {
        println!("[Program: \"{}\"]", program.name());
        for function in program.functions() {
            println!("\t{}", function.signature());
            if function.is_native() {
                println!("\t\t<native call>");
            } else {
                vm.disassemble_function(function, &mut |offset, line| {
                    println!("\t\t{offset:#010X}: {line}");
                })?;
            }
            println!();
        }
    }
    Ok(())
}

fn execute(vm: &Vm) -> Result<()> {
    let entry_point = "void Program.Main()";
    let entry = vm
        .get_function(entry_point)
        .context("entry point not found")?;

    if let Ok(native) = vm.get_function("void Program.PrintString(string)") {
        native
            .set_native_binding(Arc::new(print_string))
            .context("bind PrintString")?;
    }

    let exec = Execution::create(vm, &entry).context("create execution context")?;
    report(
        MessageKind::Verbose,
        &format!("Executing script function: \"{entry_point}\""),
    );

    loop {
        exec.run(RunMode::Continuous)
            .context("error occurred while executing script")?;

        if exec.has_exception() {
            report(MessageKind::Error, "Unhandled exception occurred");
            if let Some(value) = exec.exception_value() {
                if let Some(schema) = vm.object_schema_of(value) {
                    let message = vm
                        .object_member(value, 0)
                        .ok()
                        .and_then(|m| vm.string_content(m))
                        .map(|s| s.as_str().to_owned())
                        .unwrap_or_default();
                    report(
                        MessageKind::Error,
                        &format!("{}: {}", schema.type_name(), message),
                    );
                }
            }

            println!("\n<Callstack>");
            let mut is_top_frame = true;
            exec.resolve_frame_stack(|frame| {
                println!(
                    "{}{} [offset: {:#X}]",
                    if is_top_frame { "" } else { "... " },
                    frame.signature,
                    frame.bytecode_offset
                );
                is_top_frame = false;
            });
            println!();
            break;
        }

        if exec.is_completed() {
            report(MessageKind::Verbose, "Finished executing script");
            break;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let vm = Vm::create(VmInit {
        on_message: Some(Arc::new(report)),
        report_level: MessageKind::Verbose,
        on_dependency_request: Some(Arc::new(|name: &str| {
            report(
                MessageKind::Warning,
                &format!("Dependency requested but not loaded: \"{name}\""),
            );
        })),
        ..VmInit::default()
    });

    if let Err(error) = vm.load_program_from_file("test", &cli.file) {
        report(MessageKind::Fatal, &format!("Failed to load program: {error}"));
        std::process::exit(1);
    }

    if let Err(error) = disassemble(&vm).and_then(|_| execute(&vm)) {
        report(MessageKind::Fatal, &format!("{error:#}"));
        std::process::exit(1);
    }
}
