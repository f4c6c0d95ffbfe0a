//! Checks on the fixture writer itself. The writer source is shared by the
//! other test binaries, the library's unit tests and the benches, so its own
//! tests live here and run once.
mod common;

use common::writer::{encode_value, DataWriter, Value};

#[test]
fn test_control_sizes() {
    assert_eq!(encode_value(&Value::string("")), vec![0x40]);
    assert_eq!(encode_value(&Value::Uint16(0)), vec![0xA0]);
    assert_eq!(encode_value(&Value::Bool(true)), vec![0x01, 0x07]);
    assert_eq!(encode_value(&Value::Uint64(1))[..2], [0x01, 0x02]);
}

#[test]
fn test_shared_keys_are_pointers() {
    let mut data = DataWriter::new(true);
    let a = data.add(&Value::map([("k", Value::Uint16(1))]));
    let b = data.add(&Value::map([("k", Value::Uint16(2))]));
    assert_ne!(a, b);
    // key "k" stored once at offset 0
    assert_eq!(&data.into_bytes()[..2], &[0x41, b'k']);
}
