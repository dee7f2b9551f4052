#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use image::{DynamicImage, ImageFormat, RgbaImage};
use image_resizer::{Extend, Gravity, ImageType, Interpolator, Options};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;

#[derive(Arbitrary, Debug)]
struct OptionsSeed {
    width: u16,
    height: u16,
    area: (u16, u16, u16, u16),
    flags: u16,
    rotate: u16,
    zoom: u8,
    gravity: u8,
    extend: u8,
    interpolator: u8,
    output: u8,
    quality: u8,
    sigma: u8,
}

fn build_png(data: &[u8]) -> Vec<u8> {
    let width = data.first().copied().unwrap_or(0) as u32 % 64 + 1;
    let height = data.get(1).copied().unwrap_or(0) as u32 % 64 + 1;
    let mut buffer = vec![0u8; (width * height * 4) as usize];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = data.get(i % data.len().max(1)).copied().unwrap_or(0);
    }
    let rgba = RgbaImage::from_raw(width, height, buffer)
        .unwrap_or_else(|| RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])));
    let mut out = Vec::new();
    let _ = DynamicImage::ImageRgba8(rgba).write_to(&mut Cursor::new(&mut out), ImageFormat::Png);
    out
}

fn seed_to_options(seed: OptionsSeed) -> Options {
    let bit = |n: u16| seed.flags & (1 << n) != 0;
    Options {
        width: seed.width as u32 % 256,
        height: seed.height as u32 % 256,
        left: seed.area.0 as u32 % 128,
        top: seed.area.1 as u32 % 128,
        area_width: seed.area.2 as u32 % 128,
        area_height: seed.area.3 as u32 % 128,
        zoom: seed.zoom as u32 % 3,
        force: bit(0),
        crop: bit(1),
        enlarge: bit(2),
        embed: bit(3),
        trim: bit(4),
        smart_crop: bit(5),
        flip: bit(6),
        flop: bit(7),
        no_auto_rotate: bit(8),
        interlace: bit(9),
        strip_metadata: bit(10),
        rotate: seed.rotate as u32 % 720,
        gravity: match seed.gravity % 6 {
            0 => Gravity::Center,
            1 => Gravity::North,
            2 => Gravity::East,
            3 => Gravity::South,
            4 => Gravity::West,
            _ => Gravity::Smart,
        },
        extend: match seed.extend % 4 {
            0 => Extend::Black,
            1 => Extend::White,
            2 => Extend::Mirror,
            _ => Extend::Repeat,
        },
        interpolator: match seed.interpolator % 4 {
            0 => Interpolator::Bicubic,
            1 => Interpolator::Bilinear,
            2 => Interpolator::Nohalo,
            _ => Interpolator::Nearest,
        },
        image_type: match seed.output % 4 {
            0 => None,
            1 => Some(ImageType::Jpeg),
            2 => Some(ImageType::Webp),
            _ => Some(ImageType::Png),
        },
        quality: seed.quality % 101,
        gaussian_blur: image_resizer::GaussianBlur {
            sigma: (seed.sigma % 8) as f64 / 2.0,
            min_ampl: 0.0,
        },
        ..Options::default()
    }
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(seed) = OptionsSeed::arbitrary(&mut u) else {
        return;
    };
    let png = build_png(u.take_rest());
    let _ = image_resizer::resize(&png, &seed_to_options(seed));
});
