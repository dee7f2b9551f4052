// src/engine/resizer.rs
//
// Single-shot entry point: bytes in, bytes out.
// decode -> limits -> defaults -> pipeline -> encode, with the backend's
// per-thread state released on every exit path.

use crate::engine::backend::{ImageHandle, ImagingBackend};
use crate::engine::decoder;
use crate::engine::io::{write_atomic, Source};
use crate::engine::limits::Limits;
use crate::engine::native::RustBackend;
use crate::engine::pipeline;
use crate::engine::pool;
use crate::error::{ResizeError, Result};
use crate::ops::{ImageType, Options};
use rayon::prelude::*;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Calls `thread_shutdown` when dropped.
pub(crate) struct ThreadShutdown<'a, B: ImagingBackend>(pub(crate) &'a B);

impl<B: ImagingBackend> Drop for ThreadShutdown<'_, B> {
    fn drop(&mut self) {
        self.0.thread_shutdown();
    }
}

/// Outcome of one file in [`Resizer::resize_files`].
#[derive(Clone, Debug)]
pub struct BatchResult {
    pub source: PathBuf,
    pub output_path: Option<PathBuf>,
    pub error: Option<ResizeError>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Resizer<B: ImagingBackend = RustBackend> {
    backend: B,
    limits: Limits,
}

impl<B: ImagingBackend> Resizer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            limits: Limits::disabled(),
        }
    }

    pub fn with_limits(backend: B, limits: Limits) -> Self {
        Self { backend, limits }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Transform `buf` according to `options` and encode the result.
    pub fn resize(&self, buf: &[u8], options: &Options) -> Result<Vec<u8>> {
        let _shutdown = ThreadShutdown(&self.backend);

        if buf.is_empty() {
            return Err(ResizeError::empty_buffer());
        }
        self.limits.enforce_source_len(buf.len())?;
        if let Some((width, height)) = decoder::read_dimensions(buf) {
            self.limits.enforce_pixels(width, height)?;
        }

        let (image, source_type) = self.backend.decode(buf)?;
        self.limits.enforce_pixels(image.width(), image.height())?;

        let options = options.clone().apply_defaults(source_type);
        let mut source = Cow::Borrowed(buf);
        let image = pipeline::process(&self.backend, image, source_type, &options, &mut source)?;

        debug!(
            target: "image_resizer::pipeline",
            width = image.width(),
            height = image.height(),
            output = %options.image_type.unwrap_or(source_type),
            "encode"
        );
        self.backend
            .encode(&image, &options.save_options(source_type))
    }

    /// Resize every buffer in `inputs` independently on the batch pool.
    /// Results keep the input order.
    pub fn resize_batch<T>(&self, inputs: &[T], options: &Options) -> Vec<Result<Vec<u8>>>
    where
        T: AsRef<[u8]> + Sync,
    {
        pool::install(|| {
            inputs
                .par_iter()
                .map(|buf| self.resize(buf.as_ref(), options))
                .collect()
        })
    }

    /// Resize files into `output_dir`, writing each result atomically.
    /// Output names keep the file stem with the output type's extension.
    pub fn resize_files<P>(
        &self,
        inputs: &[P],
        output_dir: impl AsRef<Path>,
        options: &Options,
    ) -> Vec<BatchResult>
    where
        P: AsRef<Path> + Sync,
    {
        let output_dir = output_dir.as_ref();
        pool::install(|| {
            inputs
                .par_iter()
                .map(|input| {
                    let input = input.as_ref();
                    match self.resize_file(input, output_dir, options) {
                        Ok(path) => BatchResult {
                            source: input.to_path_buf(),
                            output_path: Some(path),
                            error: None,
                        },
                        Err(err) => {
                            debug!(source = %input.display(), error = %err, "batch item failed");
                            BatchResult {
                                source: input.to_path_buf(),
                                output_path: None,
                                error: Some(err),
                            }
                        }
                    }
                })
                .collect()
        })
    }

    fn resize_file(&self, input: &Path, output_dir: &Path, options: &Options) -> Result<PathBuf> {
        let source = Source::map(input)?;
        let data = match source.as_bytes() {
            Some(bytes) => Cow::Borrowed(bytes),
            None => Cow::Owned(source.load()?.to_vec()),
        };

        let output_type = match options.image_type {
            Some(image_type) => image_type,
            None => decoder::detect_image_type(&data)
                .ok_or_else(|| ResizeError::unsupported_format("unknown"))?,
        };
        let encoded = self.resize(&data, options)?;

        let stem = input
            .file_stem()
            .ok_or_else(|| {
                ResizeError::invalid_argument(
                    "input",
                    input.display().to_string(),
                    "path has no file name",
                )
            })?;
        let output_path = output_dir
            .join(stem)
            .with_extension(extension_for(output_type));
        write_atomic(&output_path, &encoded)?;
        Ok(output_path)
    }
}

fn extension_for(image_type: ImageType) -> &'static str {
    match image_type {
        ImageType::Jpeg => "jpg",
        other => other.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encoder;
    use crate::engine::pipeline::tests::{MockBackend, RecordedOp};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::atomic::Ordering;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        encoder::encode_png(&create_test_image(width, height), 1, false).unwrap()
    }

    mod guard_tests {
        use super::*;

        #[test]
        fn shutdown_runs_on_success() {
            let resizer = Resizer::new(MockBackend::new());
            let options = Options {
                width: 32,
                ..Options::default()
            };
            resizer.resize(&[1, 2, 3], &options).unwrap();
            assert_eq!(resizer.backend().shutdowns.load(Ordering::SeqCst), 1);
            assert_eq!(resizer.backend().live_handles(), 0);
        }

        #[test]
        fn shutdown_runs_on_empty_buffer() {
            let resizer = Resizer::new(MockBackend::new());
            let err = resizer.resize(&[], &Options::default()).unwrap_err();
            assert!(matches!(err, ResizeError::EmptyBuffer));
            assert_eq!(resizer.backend().shutdowns.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn shutdown_runs_on_stage_failure() {
            let backend = MockBackend {
                fail_on: Some("affine"),
                ..MockBackend::default()
            };
            let resizer = Resizer::new(backend);
            let options = Options {
                width: 128,
                enlarge: true,
                ..Options::default()
            };
            let err = resizer.resize(&[1], &options).unwrap_err();
            assert!(matches!(err, ResizeError::OperationFailed { .. }));
            assert_eq!(resizer.backend().shutdowns.load(Ordering::SeqCst), 1);
            assert_eq!(resizer.backend().live_handles(), 0);
            assert!(resizer
                .backend()
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Affine(..))));
        }
    }

    mod limit_tests {
        use super::*;

        #[test]
        fn byte_limit_rejects_before_decode() {
            let resizer = Resizer::with_limits(MockBackend::new(), Limits::custom(None, Some(2)));
            let err = resizer.resize(&[1, 2, 3], &Options::default()).unwrap_err();
            assert!(matches!(err, ResizeError::LimitExceeded { .. }));
            assert_eq!(resizer.backend().live_handles(), 0);
        }

        #[test]
        fn pixel_limit_rejects_decoded_image() {
            let resizer =
                Resizer::with_limits(RustBackend, Limits::custom(Some(100), None));
            let err = resizer
                .resize(&png_bytes(20, 20), &Options::default())
                .unwrap_err();
            assert!(matches!(err, ResizeError::LimitExceeded { .. }));
        }
    }

    mod batch_tests {
        use super::*;

        #[test]
        fn batch_keeps_input_order() {
            let resizer = Resizer::new(RustBackend);
            let inputs = vec![png_bytes(40, 20), Vec::new(), png_bytes(20, 40)];
            let options = Options {
                width: 10,
                ..Options::default()
            };
            let results = resizer.resize_batch(&inputs, &options);
            assert_eq!(results.len(), 3);
            assert_eq!(
                decoder::read_dimensions(results[0].as_ref().unwrap()),
                Some((10, 5))
            );
            assert!(matches!(results[1], Err(ResizeError::EmptyBuffer)));
            assert_eq!(
                decoder::read_dimensions(results[2].as_ref().unwrap()),
                Some((10, 20))
            );
        }

        #[test]
        fn files_are_written_with_output_extension() {
            let input_dir = tempfile::tempdir().unwrap();
            let output_dir = tempfile::tempdir().unwrap();
            let good = input_dir.path().join("photo.png");
            std::fs::write(&good, png_bytes(40, 20)).unwrap();
            let missing = input_dir.path().join("missing.png");

            let resizer = Resizer::new(RustBackend);
            let options = Options {
                width: 20,
                image_type: Some(ImageType::Jpeg),
                ..Options::default()
            };
            let results = resizer.resize_files(&[good.clone(), missing.clone()], output_dir.path(), &options);

            assert!(results[0].is_success());
            let written = results[0].output_path.clone().unwrap();
            assert_eq!(written, output_dir.path().join("photo.jpg"));
            let bytes = std::fs::read(&written).unwrap();
            assert_eq!(decoder::detect_image_type(&bytes), Some(ImageType::Jpeg));
            assert_eq!(decoder::read_dimensions(&bytes), Some((20, 10)));

            assert!(!results[1].is_success());
            assert_eq!(results[1].source, missing);
            assert!(matches!(
                results[1].error,
                Some(ResizeError::FileNotFound { .. })
            ));
        }
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for(ImageType::Jpeg), "jpg");
        assert_eq!(extension_for(ImageType::Webp), "webp");
        assert_eq!(extension_for(ImageType::Tiff), "tiff");
    }
}
