// src/engine/geometry.rs
//
// Geometry calculator: option normalization, scale factor, integral shrink,
// residual, crop offsets and rotation inference.
// Everything here is pure arithmetic over dimensions; no pixels are touched.

use crate::ops::{Angle, Gravity, Interpolator, Options};

/// Scale plan derived once per invocation from the input size and options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    /// input / output ratio
    pub factor: f64,
    /// integral pre-shrink, always >= 1
    pub shrink: u32,
    /// fine scale applied after the integral shrink
    pub residual: f64,
}

impl Geometry {
    /// Normalize `o` against the input size and compute the scale plan.
    ///
    /// Rewrites `o.width` / `o.height` into the authoritative target
    /// dimensions. Without `enlarge` or `force`, an input already smaller
    /// than the target on both axes becomes a no-op at its own size.
    pub fn compute(o: &mut Options, in_width: u32, in_height: u32) -> Self {
        normalize_operation(o, in_width, in_height);

        let factor = image_calculations(o, in_width, in_height);
        let shrink = calculate_shrink(factor, o.interpolator);
        let residual = calculate_residual(factor, shrink);

        if !o.enlarge && !o.force && in_width < o.width && in_height < o.height {
            o.width = in_width;
            o.height = in_height;
            return Geometry {
                factor: 1.0,
                shrink: 1,
                residual: 0.0,
            };
        }

        Geometry {
            factor,
            shrink,
            residual,
        }
    }

    pub fn shrink_on_load(&self) -> Option<ShrinkOnLoad> {
        plan_shrink_on_load(self.factor, self.shrink)
    }
}

/// Decoder-native downscale level and the factor left after it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShrinkOnLoad {
    /// 2, 4 or 8
    pub level: u32,
    pub factor: f64,
}

impl ShrinkOnLoad {
    /// Scale plan for the image produced by the scaled decode.
    pub fn geometry(&self) -> Geometry {
        let factor = self.factor.max(1.0);
        let shrink = factor.floor() as u32;
        Geometry {
            factor,
            shrink,
            residual: shrink as f64 / factor,
        }
    }
}

/// Pick the largest level in {2, 4, 8} not above `shrink`.
pub fn plan_shrink_on_load(factor: f64, shrink: u32) -> Option<ShrinkOnLoad> {
    let level = match shrink {
        s if s >= 8 => 8,
        s if s >= 4 => 4,
        s if s >= 2 => 2,
        _ => return None,
    };
    Some(ShrinkOnLoad {
        level,
        factor: factor / level as f64,
    })
}

/// Infer implicit force mode and clamp the target against Max*/Min* bounds.
pub fn normalize_operation(o: &mut Options, in_width: u32, in_height: u32) {
    if !o.force
        && !o.crop
        && !o.embed
        && !o.enlarge
        && o.rotate == 0
        && (o.width > 0 || o.height > 0)
    {
        o.force = true;
    }

    if o.max_width > 0 && in_width > o.max_width {
        o.width = if o.width > 0 {
            o.width.min(o.max_width)
        } else {
            o.max_width
        };
    }

    if o.max_height > 0 && in_height > o.max_height {
        o.height = if o.height > 0 {
            o.height.min(o.max_height)
        } else {
            o.max_height
        };
    }

    if o.min_width > 0 && in_width < o.min_width {
        o.width = if o.width > 0 {
            o.width.max(o.min_width)
        } else {
            o.min_width
        };
    }

    if o.min_height > 0 && in_height < o.min_height {
        o.height = if o.height > 0 {
            o.height.max(o.min_height)
        } else {
            o.min_height
        };
    }
}

/// Scale factor for the request, filling whichever target dimension is unset.
pub fn image_calculations(o: &mut Options, in_width: u32, in_height: u32) -> f64 {
    let in_w = in_width as f64;
    let in_h = in_height as f64;

    match (o.width > 0, o.height > 0) {
        (true, true) => {
            let xfactor = in_w / o.width as f64;
            let yfactor = in_h / o.height as f64;
            if o.crop {
                xfactor.min(yfactor)
            } else {
                xfactor.max(yfactor)
            }
        }
        (true, false) => {
            if o.crop {
                o.height = in_height;
                1.0
            } else {
                let factor = in_w / o.width as f64;
                o.height = auto_dimension(in_h / factor);
                factor
            }
        }
        (false, true) => {
            if o.crop {
                o.width = in_width;
                1.0
            } else {
                let factor = in_h / o.height as f64;
                o.width = auto_dimension(in_w / factor);
                factor
            }
        }
        (false, false) => {
            o.width = in_width;
            o.height = in_height;
            1.0
        }
    }
}

// An aspect-derived side never collapses to zero pixels.
fn auto_dimension(value: f64) -> u32 {
    round_float(value).clamp(1, u32::MAX as i64) as u32
}

/// Round half away from zero.
pub fn round_float(f: f64) -> i64 {
    if f < 0.0 {
        (f - 0.5).ceil() as i64
    } else {
        (f + 0.5).floor() as i64
    }
}

/// Integral box-shrink amount. Kernels wider than 3 taps shrink less and
/// leave more of the work to the resampler.
pub fn calculate_shrink(factor: f64, interpolator: Interpolator) -> u32 {
    let window = interpolator.window_size();
    let shrink = if factor >= 2.0 && window > 3.0 {
        (factor * 3.0 / window).floor()
    } else {
        factor.floor()
    };
    shrink.max(1.0) as u32
}

pub fn calculate_residual(factor: f64, shrink: u32) -> f64 {
    shrink as f64 / factor
}

/// Crop offsets for `gravity`. May be negative when the output is larger
/// than the input; callers clamp.
pub fn calculate_crop(
    in_width: u32,
    in_height: u32,
    out_width: u32,
    out_height: u32,
    gravity: Gravity,
) -> (i64, i64) {
    let (in_w, in_h) = (in_width as i64, in_height as i64);
    let (out_w, out_h) = (out_width as i64, out_height as i64);

    match gravity {
        Gravity::North => ((in_w - out_w + 1) / 2, 0),
        Gravity::East => (in_w - out_w, (in_h - out_h + 1) / 2),
        Gravity::South => ((in_w - out_w + 1) / 2, in_h - out_h),
        Gravity::West => (0, (in_h - out_h + 1) / 2),
        Gravity::Center | Gravity::Smart => ((in_w - out_w + 1) / 2, (in_h - out_h + 1) / 2),
    }
}

/// Map an EXIF orientation to (rotation, mirror). An explicit rotation
/// request disables metadata-derived rotation and mirroring entirely.
pub fn calculate_rotation_and_flip(orientation: Option<u16>, requested: u32) -> (Angle, bool) {
    if requested > 0 {
        return (Angle::D0, false);
    }

    match orientation {
        Some(6) => (Angle::D90, false),
        Some(3) => (Angle::D180, false),
        Some(8) => (Angle::D270, false),
        Some(2) => (Angle::D0, true),
        Some(7) => (Angle::D270, true),
        Some(4) => (Angle::D180, true),
        Some(5) => (Angle::D90, true),
        _ => (Angle::D0, false),
    }
}

/// Snap down to a multiple of 90, capped at 270.
pub fn get_angle(degrees: u32) -> Angle {
    match (degrees - degrees % 90).min(270) {
        0 => Angle::D0,
        90 => Angle::D90,
        180 => Angle::D180,
        _ => Angle::D270,
    }
}

pub fn should_transform_image(o: &Options, in_width: u32, in_height: u32) -> bool {
    o.force
        || (o.width > 0 && o.width != in_width)
        || (o.height > 0 && o.height != in_height)
        || o.area_width > 0
        || o.area_height > 0
        || o.trim
}

pub fn should_blur(o: &Options) -> bool {
    o.gaussian_blur.sigma > 0.0 || o.gaussian_blur.min_ampl > 0.0
}

// Y3 alone triggers sharpening regardless of radius.
#[allow(clippy::nonminimal_bool)]
pub fn should_sharpen(o: &Options) -> bool {
    o.sharpen.radius > 0 && o.sharpen.y2 > 0.0 || o.sharpen.y3 > 0.0
}

pub fn should_apply_effects(o: &Options) -> bool {
    should_blur(o) || should_sharpen(o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{GaussianBlur, Sharpen};

    fn opts(width: u32, height: u32) -> Options {
        Options {
            width,
            height,
            ..Options::default()
        }
    }

    mod normalize_tests {
        use super::*;

        #[test]
        fn bare_width_implies_force() {
            let mut o = opts(200, 0);
            normalize_operation(&mut o, 800, 600);
            assert!(o.force);
        }

        #[test]
        fn explicit_mode_or_rotation_keeps_force_off() {
            for mut o in [
                Options { crop: true, ..opts(200, 0) },
                Options { embed: true, ..opts(200, 0) },
                Options { enlarge: true, ..opts(200, 0) },
                Options { rotate: 90, ..opts(200, 0) },
            ] {
                normalize_operation(&mut o, 800, 600);
                assert!(!o.force, "{o:?}");
            }
        }

        #[test]
        fn no_target_keeps_force_off() {
            let mut o = Options::default();
            normalize_operation(&mut o, 800, 600);
            assert!(!o.force);
        }

        #[test]
        fn max_width_caps_target_but_never_raises_smaller() {
            let mut o = Options { max_width: 300, ..opts(500, 0) };
            normalize_operation(&mut o, 800, 600);
            assert_eq!(o.width, 300);

            let mut o = Options { max_width: 300, ..opts(100, 0) };
            normalize_operation(&mut o, 800, 600);
            assert_eq!(o.width, 100);

            let mut o = Options { max_width: 300, ..Options::default() };
            normalize_operation(&mut o, 800, 600);
            assert_eq!(o.width, 300);
        }

        #[test]
        fn max_ignored_when_input_within_bound() {
            let mut o = Options { max_height: 1000, ..Options::default() };
            normalize_operation(&mut o, 800, 600);
            assert_eq!(o.height, 0);
        }

        #[test]
        fn min_raises_target() {
            let mut o = Options { min_height: 400, ..opts(0, 100) };
            normalize_operation(&mut o, 100, 50);
            assert_eq!(o.height, 400);

            let mut o = Options { min_width: 400, ..Options::default() };
            normalize_operation(&mut o, 100, 50);
            assert_eq!(o.width, 400);

            let mut o = Options { min_width: 400, ..opts(500, 0) };
            normalize_operation(&mut o, 100, 50);
            assert_eq!(o.width, 500);
        }
    }

    mod calculation_tests {
        use super::*;

        #[test]
        fn both_dimensions_fit_uses_max_factor() {
            let mut o = opts(400, 400);
            let factor = image_calculations(&mut o, 800, 600);
            assert_eq!(factor, 2.0);
        }

        #[test]
        fn both_dimensions_crop_uses_min_factor() {
            let mut o = Options { crop: true, ..opts(400, 400) };
            let factor = image_calculations(&mut o, 800, 600);
            assert_eq!(factor, 1.5);
        }

        #[test]
        fn width_only_derives_height() {
            let mut o = opts(200, 0);
            let factor = image_calculations(&mut o, 1000, 750);
            assert_eq!(factor, 5.0);
            assert_eq!(o.height, 150);
        }

        #[test]
        fn width_only_rounds_half_away_from_zero() {
            // 333 / (1000 / 300) = 99.9 -> 100
            let mut o = opts(300, 0);
            image_calculations(&mut o, 1000, 333);
            assert_eq!(o.height, 100);
            // 5 / (4 / 2) = 2.5 -> 3
            let mut o = opts(2, 0);
            image_calculations(&mut o, 4, 5);
            assert_eq!(o.height, 3);
        }

        #[test]
        fn width_only_crop_keeps_input_height() {
            let mut o = Options { crop: true, ..opts(200, 0) };
            let factor = image_calculations(&mut o, 1000, 750);
            assert_eq!(factor, 1.0);
            assert_eq!(o.height, 750);
        }

        #[test]
        fn height_only_derives_width() {
            let mut o = opts(0, 300);
            let factor = image_calculations(&mut o, 800, 600);
            assert_eq!(factor, 2.0);
            assert_eq!(o.width, 400);
        }

        #[test]
        fn height_only_crop_keeps_input_width() {
            let mut o = Options { crop: true, ..opts(0, 300) };
            image_calculations(&mut o, 800, 600);
            assert_eq!(o.width, 800);
        }

        #[test]
        fn neither_dimension_is_identity() {
            let mut o = Options::default();
            let factor = image_calculations(&mut o, 640, 480);
            assert_eq!(factor, 1.0);
            assert_eq!((o.width, o.height), (640, 480));
        }

        #[test]
        fn extreme_aspect_never_yields_zero() {
            let mut o = opts(500, 0);
            image_calculations(&mut o, 4000, 1);
            assert_eq!(o.height, 1);
        }

        #[test]
        fn round_float_behaviour() {
            assert_eq!(round_float(2.5), 3);
            assert_eq!(round_float(2.4999), 2);
            assert_eq!(round_float(-2.5), -3);
            assert_eq!(round_float(-2.4), -2);
            assert_eq!(round_float(0.0), 0);
        }
    }

    mod shrink_tests {
        use super::*;

        #[test]
        fn wide_kernel_shrinks_conservatively() {
            // bicubic window 4: floor(8 * 3 / 4) = 6
            assert_eq!(calculate_shrink(8.0, Interpolator::Bicubic), 6);
            assert_eq!(calculate_shrink(2.0, Interpolator::Bicubic), 1);
        }

        #[test]
        fn narrow_kernel_shrinks_by_floor() {
            assert_eq!(calculate_shrink(8.0, Interpolator::Bilinear), 8);
            assert_eq!(calculate_shrink(3.7, Interpolator::Nearest), 3);
        }

        #[test]
        fn shrink_never_below_one() {
            assert_eq!(calculate_shrink(0.25, Interpolator::Bicubic), 1);
            assert_eq!(calculate_shrink(1.9, Interpolator::Bilinear), 1);
        }

        #[test]
        fn residual_is_shrink_over_factor() {
            assert_eq!(calculate_residual(8.0, 6), 0.75);
            assert_eq!(calculate_residual(0.5, 1), 2.0);
        }

        #[test]
        fn shrink_on_load_levels() {
            assert_eq!(plan_shrink_on_load(8.0, 1), None);
            assert_eq!(
                plan_shrink_on_load(8.0, 6),
                Some(ShrinkOnLoad { level: 4, factor: 2.0 })
            );
            assert_eq!(plan_shrink_on_load(20.0, 15).map(|s| s.level), Some(8));
            assert_eq!(plan_shrink_on_load(3.0, 2).map(|s| s.level), Some(2));
        }

        #[test]
        fn shrink_on_load_rederives_plan() {
            let plan = ShrinkOnLoad { level: 4, factor: 2.0 };
            assert_eq!(
                plan.geometry(),
                Geometry { factor: 2.0, shrink: 2, residual: 1.0 }
            );

            // factor below one after decode is floored to one
            let plan = ShrinkOnLoad { level: 8, factor: 0.9 };
            assert_eq!(
                plan.geometry(),
                Geometry { factor: 1.0, shrink: 1, residual: 1.0 }
            );
        }
    }

    mod compute_tests {
        use super::*;

        #[test]
        fn jpeg_4000x3000_to_width_500() {
            let mut o = opts(500, 0);
            let g = Geometry::compute(&mut o, 4000, 3000);
            assert!(o.force);
            assert_eq!((o.width, o.height), (500, 375));
            assert_eq!(g.factor, 8.0);
            assert_eq!(g.shrink, 6);
            assert_eq!(g.residual, 0.75);
            assert_eq!(g.shrink_on_load().map(|s| s.level), Some(4));
        }

        #[test]
        fn small_input_is_not_enlarged() {
            let mut o = Options { crop: true, ..opts(400, 400) };
            let g = Geometry::compute(&mut o, 100, 80);
            assert_eq!(g, Geometry { factor: 1.0, shrink: 1, residual: 0.0 });
            assert_eq!((o.width, o.height), (100, 80));
        }

        #[test]
        fn enlarge_allows_upscale() {
            let mut o = Options { enlarge: true, ..opts(400, 400) };
            let g = Geometry::compute(&mut o, 100, 80);
            assert_eq!(g.factor, 0.25);
            assert_eq!((o.width, o.height), (400, 400));
        }

        #[test]
        fn force_allows_upscale() {
            let mut o = opts(400, 400);
            let g = Geometry::compute(&mut o, 100, 80);
            assert!(o.force);
            assert_eq!(g.shrink, 1);
            assert_eq!((o.width, o.height), (400, 400));
        }
    }

    mod crop_tests {
        use super::*;

        #[test]
        fn center_crop_offset() {
            assert_eq!(calculate_crop(100, 100, 30, 30, Gravity::Center), (35, 35));
        }

        #[test]
        fn gravity_offsets() {
            assert_eq!(calculate_crop(100, 80, 30, 20, Gravity::North), (35, 0));
            assert_eq!(calculate_crop(100, 80, 30, 20, Gravity::East), (70, 30));
            assert_eq!(calculate_crop(100, 80, 30, 20, Gravity::South), (35, 60));
            assert_eq!(calculate_crop(100, 80, 30, 20, Gravity::West), (0, 30));
        }

        #[test]
        fn oversized_output_goes_negative() {
            let (left, top) = calculate_crop(10, 10, 30, 30, Gravity::Center);
            assert!(left < 0 && top < 0);
        }
    }

    mod rotation_tests {
        use super::*;

        #[test]
        fn orientation_mapping() {
            let cases = [
                (1, (Angle::D0, false)),
                (2, (Angle::D0, true)),
                (3, (Angle::D180, false)),
                (4, (Angle::D180, true)),
                (5, (Angle::D90, true)),
                (6, (Angle::D90, false)),
                (7, (Angle::D270, true)),
                (8, (Angle::D270, false)),
            ];
            for (orientation, expected) in cases {
                assert_eq!(
                    calculate_rotation_and_flip(Some(orientation), 0),
                    expected,
                    "orientation {orientation}"
                );
            }
            assert_eq!(calculate_rotation_and_flip(None, 0), (Angle::D0, false));
        }

        #[test]
        fn explicit_rotation_wins() {
            assert_eq!(calculate_rotation_and_flip(Some(6), 90), (Angle::D0, false));
            assert_eq!(calculate_rotation_and_flip(Some(2), 180), (Angle::D0, false));
        }

        #[test]
        fn get_angle_snaps_and_caps() {
            assert_eq!(get_angle(0), Angle::D0);
            assert_eq!(get_angle(45), Angle::D0);
            assert_eq!(get_angle(90), Angle::D90);
            assert_eq!(get_angle(100), Angle::D90);
            assert_eq!(get_angle(270), Angle::D270);
            assert_eq!(get_angle(370), Angle::D270);
            assert_eq!(get_angle(400), Angle::D270);
        }
    }

    mod predicate_tests {
        use super::*;

        #[test]
        fn transform_needed() {
            assert!(!should_transform_image(&opts(100, 50), 100, 50));
            assert!(should_transform_image(&opts(100, 40), 100, 50));
            assert!(should_transform_image(
                &Options { force: true, ..opts(100, 50) },
                100,
                50
            ));
            assert!(should_transform_image(
                &Options { area_width: 10, ..Options::default() },
                100,
                50
            ));
            assert!(should_transform_image(
                &Options { trim: true, ..Options::default() },
                100,
                50
            ));
        }

        #[test]
        fn sharpen_precedence() {
            let sharpen = |radius, y2, y3| Options {
                sharpen: Sharpen { radius, y2, y3, ..Sharpen::default() },
                ..Options::default()
            };
            assert!(should_sharpen(&sharpen(1, 1.0, 0.0)));
            assert!(!should_sharpen(&sharpen(1, 0.0, 0.0)));
            assert!(!should_sharpen(&sharpen(0, 1.0, 0.0)));
            assert!(should_sharpen(&sharpen(0, 0.0, 1.0)));
        }

        #[test]
        fn blur_triggers() {
            let blur = |sigma, min_ampl| Options {
                gaussian_blur: GaussianBlur { sigma, min_ampl },
                ..Options::default()
            };
            assert!(should_apply_effects(&blur(1.0, 0.0)));
            assert!(should_apply_effects(&blur(0.0, 0.2)));
            assert!(!should_apply_effects(&blur(0.0, 0.0)));
        }
    }
}
