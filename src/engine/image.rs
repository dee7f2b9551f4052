// src/engine/image.rs
//
// Long-lived image handle. Decodes once, then any number of process/save
// calls. The backend handle is released when the Image is dropped.

use crate::engine::backend::{ImageHandle, ImagingBackend};
use crate::engine::pipeline;
use crate::engine::resizer::ThreadShutdown;
use crate::error::{ResizeError, Result};
use crate::ops::{ImageType, Options};
use std::borrow::Cow;
use std::sync::Arc;

pub struct Image<B: ImagingBackend> {
    backend: B,
    handle: B::Image,
    source: Arc<Vec<u8>>,
    source_type: ImageType,
    /// The pixels still match `source`, so shrink-on-load may reread it.
    pristine: bool,
}

impl<B: ImagingBackend> Image<B> {
    pub fn new(backend: B, bytes: impl Into<Arc<Vec<u8>>>) -> Result<Self> {
        let source = bytes.into();
        if source.is_empty() {
            return Err(ResizeError::empty_buffer());
        }
        let (handle, source_type) = backend.decode(&source)?;
        Ok(Self {
            backend,
            handle,
            source,
            source_type,
            pristine: true,
        })
    }

    pub fn width(&self) -> u32 {
        self.handle.width()
    }

    pub fn height(&self) -> u32 {
        self.handle.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.handle.dimensions()
    }

    /// Type detected when the source was decoded.
    pub fn image_type(&self) -> ImageType {
        self.source_type
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn handle(&self) -> &B::Image {
        &self.handle
    }

    /// Encode the current pixels.
    pub fn save(&self, options: &Options) -> Result<Vec<u8>> {
        self.backend
            .encode(&self.handle, &options.save_options(self.source_type))
    }
}

impl<B> Image<B>
where
    B: ImagingBackend,
    B::Image: Clone,
{
    /// Run the pipeline over the current pixels. On failure the image is
    /// left exactly as it was.
    pub fn process(&mut self, options: &Options) -> Result<()> {
        let _shutdown = ThreadShutdown(&self.backend);
        let options = options.clone().apply_defaults(self.source_type);
        let mut buf = if self.pristine {
            Cow::Borrowed(self.source.as_slice())
        } else {
            Cow::Borrowed(&[][..])
        };
        let next = pipeline::process(
            &self.backend,
            self.handle.clone(),
            self.source_type,
            &options,
            &mut buf,
        )?;
        self.handle = next;
        self.pristine = false;
        Ok(())
    }
}

impl<B> Clone for Image<B>
where
    B: ImagingBackend + Clone,
    B::Image: Clone,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            handle: self.handle.clone(),
            source: Arc::clone(&self.source),
            source_type: self.source_type,
            pristine: self.pristine,
        }
    }
}
