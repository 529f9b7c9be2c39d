#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use pagestash::cache::decode;

fuzz_target!(|data: &[u8]| {
    let _ = decode(Bytes::copy_from_slice(data));
});
