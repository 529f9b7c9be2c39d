#![no_main]

use libfuzzer_sys::fuzz_target;

use pagestash::cache::fuzzing::parse_manifest;

fuzz_target!(|data: &[u8]| {
    let _ = parse_manifest(data);
});
