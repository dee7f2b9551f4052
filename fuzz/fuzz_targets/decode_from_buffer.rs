#![no_main]

use image_resizer::engine::{ImagingBackend, RustBackend};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let _ = image_resizer::inspect(data);
    let _ = RustBackend.decode(data);
});
