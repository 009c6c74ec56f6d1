//! Garbage collection through the engine: rooting via registries, I/O
//! registers, and suspended frames, plus auto-mark semantics for host-held
//! temporaries.

use xenon_bytecode::{ByteOrder, BytecodeWriter, ProgramWriter};
use xenon_core::Value;
use xenon_engine::{Execution, RunMode, Vm, VmInit};

fn vm_with_main() -> Vm {
    let mut writer = ProgramWriter::new();
    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_return();
    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();

    let vm = Vm::create(VmInit::default());
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();
    vm
}

#[test]
fn test_abandoned_temporary_is_collected() {
    let vm = vm_with_main();
    let baseline = vm.live_object_count();

    let temp = vm.create_string("temporary");
    assert_eq!(vm.live_object_count(), baseline + 1);

    vm.abandon(temp);
    vm.collect_garbage();
    assert_eq!(vm.live_object_count(), baseline);
}

#[test]
fn test_auto_marked_temporary_survives() {
    let vm = vm_with_main();
    let baseline = vm.live_object_count();

    // Freshly created values are auto-marked and survive collection even
    // though nothing else roots them.
    let temp = vm.create_string("still here");
    vm.collect_garbage();
    assert_eq!(vm.live_object_count(), baseline + 1);
    assert_eq!(vm.string_content(temp).unwrap().as_str(), "still here");
}

#[test]
fn test_io_register_roots_value() {
    let vm = vm_with_main();
    let entry = vm.get_function("void Program.Main()").unwrap();
    let exec = Execution::create(&vm, &entry).unwrap();

    let value = vm.create_string("rooted by io");
    exec.set_io_register(0, value).unwrap();

    // Attachment transfers rooting duty from auto-mark to the context.
    vm.collect_garbage();
    assert_eq!(
        vm.string_content(exec.get_io_register(0).unwrap())
            .unwrap()
            .as_str(),
        "rooted by io"
    );

    // Dropping the reference makes the value unreachable.
    let baseline = vm.live_object_count();
    exec.set_io_register(0, Value::Null).unwrap();
    vm.collect_garbage();
    assert_eq!(vm.live_object_count(), baseline - 1);
}

#[test]
fn test_program_constants_stay_rooted() {
    let mut writer = ProgramWriter::new();
    let c_value = writer.add_constant_string("constant payload");
    writer.add_global("g", c_value).unwrap();
    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_return();
    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();

    let vm = Vm::create(VmInit::default());
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    for _ in 0..3 {
        vm.collect_garbage();
    }

    let global = vm.get_global("g").unwrap();
    assert_eq!(
        vm.string_content(global).unwrap().as_str(),
        "constant payload"
    );
}

#[test]
fn test_values_survive_collection_across_yield() {
    // A string is pushed onto the frame stack, the script yields, a full
    // collection runs, and the resumed script exports the string intact.
    let mut writer = ProgramWriter::new();
    let c_sig = writer.add_constant_string("string Xenon.Builtin.AddString(string, string)");

    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_call(c_sig); // io0 = io0 + io1
    body.emit_load_param(0, 0); // r0 = result, io0 cleared
    body.emit_push(0);
    body.emit_yield();
    body.emit_pop(1);
    body.emit_store_param(0, 1);
    body.emit_return();
    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();

    let vm = Vm::create(VmInit::default());
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let entry = vm.get_function("void Program.Main()").unwrap();
    let exec = Execution::create(&vm, &entry).unwrap();
    exec.set_io_register(0, vm.create_string("left-")).unwrap();
    exec.set_io_register(1, vm.create_string("right")).unwrap();

    exec.run(RunMode::Continuous).unwrap();
    assert!(exec.is_yielded());
    assert_eq!(exec.value_stack_depth(), 1);

    // The concatenated result lives only on the suspended frame's stack.
    vm.collect_garbage();
    vm.collect_garbage();

    exec.run(RunMode::Continuous).unwrap();
    assert!(exec.is_completed());
    assert_eq!(
        vm.string_content(exec.get_io_register(0).unwrap())
            .unwrap()
            .as_str(),
        "left-right"
    );
}

#[test]
fn test_unreachable_object_graph_is_collected() {
    let vm = vm_with_main();
    let baseline = vm.live_object_count();

    // Build an array holding strings, then abandon the whole graph.
    let array = vm.create_array(2);
    let first = vm.create_string("first");
    let second = vm.create_string("second");
    vm.array_set(array, 0, first).unwrap();
    vm.array_set(array, 1, second).unwrap();
    assert_eq!(vm.live_object_count(), baseline + 3);

    // While the array is auto-marked, its elements survive through it.
    vm.collect_garbage();
    assert_eq!(vm.live_object_count(), baseline + 3);

    vm.abandon(array);
    vm.collect_garbage();
    assert_eq!(vm.live_object_count(), baseline);
}

#[test]
fn test_gc_stats_accumulate() {
    let vm = vm_with_main();
    let collections_before = vm.gc_stats().collections;

    let temp = vm.create_string("short lived");
    vm.abandon(temp);
    vm.collect_garbage();

    let stats = vm.gc_stats();
    assert!(stats.collections > collections_before);
    assert!(stats.objects_freed >= 1);
}

#[test]
fn test_background_collector_reclaims_garbage() {
    // The GC thread wakes every ~50 ms; give it a few periods to reclaim
    // an abandoned temporary without an explicit collect call.
    let vm = vm_with_main();
    let baseline = vm.live_object_count();

    let temp = vm.create_string("background garbage");
    vm.abandon(temp);

    let mut reclaimed = false;
    for _ in 0..40 {
        std::thread::sleep(std::time::Duration::from_millis(50));
        if vm.live_object_count() == baseline {
            reclaimed = true;
            break;
        }
    }
    assert!(reclaimed, "background GC never reclaimed the temporary");
}
