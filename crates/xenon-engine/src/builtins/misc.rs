//! String and array built-ins

use super::Registry;
use xenon_core::Value;

pub(crate) fn install(registry: &Registry<'_>) {
    registry.add(
        "string Xenon.Builtin.AddString(string, string)",
        2,
        1,
        |args| {
            let left = args.string_content(args.io_register(0));
            let right = args.string_content(args.io_register(1));

            let mut text = String::new();
            if let Some(left) = &left {
                text.push_str(left.as_str());
            }
            if let Some(right) = &right {
                text.push_str(right.as_str());
            }

            let value = args.create_string(&text);
            args.set_io_register(0, value);
        },
    );

    registry.add("int64 Xenon.Builtin.LengthArray(array)", 1, 1, |args| {
        let length = args.array_length(args.io_register(0)).unwrap_or(0);
        args.set_io_register(0, Value::Int64(length as i64));
    });
}
