#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use pagestash::cache::decode_split;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // The first two bytes pick where the three parts are cut.
    let payload = &data[2..];
    let first = (data[0] as usize) % (payload.len() + 1);
    let (response, rest) = payload.split_at(first);
    let second = (data[1] as usize) % (rest.len() + 1);
    let (body, user_info) = rest.split_at(second);

    let _ = decode_split(response, Bytes::copy_from_slice(body), user_info);
});
