#![no_main]

//! Fuzz target for EXIF parsing paths in image-resizer.
//! Exercises Metadata::read() and detect_exif_orientation() on arbitrary data.

use image_resizer::engine::{detect_exif_orientation, Metadata};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Metadata::read(data);
    let _ = detect_exif_orientation(data);
});
