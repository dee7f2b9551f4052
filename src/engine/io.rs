// src/engine/io.rs
//
// I/O operations: Source enum, file loading, metadata (ICC / EXIF)
// extraction and re-embedding, atomic output writes.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::error::ResizeError;
use crate::ops::ImageType;
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF, ImageICC};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Image source: in-memory data, a memory-mapped file, or a path read on demand.
#[derive(Clone, Debug)]
pub enum Source {
    Memory(Arc<Vec<u8>>),
    /// Zero-copy access to a file's contents.
    Mapped(Arc<Mmap>),
    Path(PathBuf),
}

impl Source {
    /// Memory-map `path`.
    pub fn map(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if !path.exists() {
            return Err(ResizeError::file_not_found(display));
        }
        let file = File::open(path).map_err(|e| ResizeError::file_read_failed(display.clone(), e))?;
        // Safety: the file must not be truncated by another process while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ResizeError::mmap_failed(display, e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    /// Load the bytes. Mapped sources are copied.
    pub fn load(&self) -> EngineResult<Arc<Vec<u8>>> {
        match self {
            Source::Memory(data) => Ok(data.clone()),
            Source::Mapped(mmap) => Ok(Arc::new(mmap.as_ref().to_vec())),
            Source::Path(path) => {
                let data = std::fs::read(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ResizeError::file_not_found(path.display().to_string())
                    } else {
                        ResizeError::file_read_failed(path.display().to_string(), e)
                    }
                })?;
                Ok(Arc::new(data))
            }
        }
    }

    /// Bytes without copying. None for Path sources, which must be loaded first.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(data.as_slice()),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }

    /// Length in bytes; 0 for unloaded Path sources.
    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
            Source::Path(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Container-level metadata carried from input to output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub icc: Option<Arc<Vec<u8>>>,
    /// TIFF-structured EXIF payload, without the JPEG `Exif\0\0` prefix.
    pub exif: Option<Arc<Vec<u8>>>,
}

impl Metadata {
    pub fn read(data: &[u8]) -> Self {
        Self {
            icc: extract_icc_profile(data).map(Arc::new),
            exif: extract_exif(data).map(Arc::new),
        }
    }
}

enum Container {
    Jpeg(Jpeg),
    Png(Png),
    WebP(WebP),
}

impl Container {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }
        let bytes = Bytes::copy_from_slice(data);
        if data.starts_with(&[0xFF, 0xD8]) {
            Jpeg::from_bytes(bytes).ok().map(Container::Jpeg)
        } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            Png::from_bytes(bytes).ok().map(Container::Png)
        } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            WebP::from_bytes(bytes).ok().map(Container::WebP)
        } else {
            None
        }
    }

    fn icc_profile(&self) -> Option<Bytes> {
        match self {
            Container::Jpeg(c) => c.icc_profile(),
            Container::Png(c) => c.icc_profile(),
            Container::WebP(c) => c.icc_profile(),
        }
    }

    fn exif(&self) -> Option<Bytes> {
        match self {
            Container::Jpeg(c) => c.exif(),
            Container::Png(c) => c.exif(),
            Container::WebP(c) => c.exif(),
        }
    }
}

/// ICC profile from JPEG (APP2), PNG (iCCP) or WebP (ICCP). Invalid profiles
/// are dropped.
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    let icc = Container::parse(data)?.icc_profile()?.to_vec();
    if !validate_icc_profile(&icc) {
        tracing::warn!(len = icc.len(), "dropping invalid ICC profile");
        return None;
    }
    Some(icc)
}

/// Raw EXIF payload from JPEG (APP1), PNG (eXIf) or WebP (EXIF).
pub fn extract_exif(data: &[u8]) -> Option<Vec<u8>> {
    let exif = Container::parse(data)?.exif()?;
    (!exif.is_empty()).then(|| exif.to_vec())
}

fn is_signature_byte(byte: u8) -> bool {
    (32..=126).contains(&byte) || byte == 0
}

/// Sanity-check an ICC header: declared size, printable signatures and a
/// plausible major version.
pub fn validate_icc_profile(icc_data: &[u8]) -> bool {
    if icc_data.len() < 128 {
        return false;
    }
    let profile_size =
        u32::from_be_bytes([icc_data[0], icc_data[1], icc_data[2], icc_data[3]]) as usize;
    if profile_size != icc_data.len() {
        return false;
    }
    if icc_data[8] > 10 {
        return false;
    }
    // CMM type, class, colour space, PCS
    [4..8, 12..16, 16..20, 20..24]
        .into_iter()
        .all(|range| icc_data[range].iter().copied().all(is_signature_byte))
}

/// Read and validate an ICC profile file for embedding.
pub fn load_icc_profile(path: &Path) -> EngineResult<Vec<u8>> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ResizeError::file_not_found(path.display().to_string())
        } else {
            ResizeError::file_read_failed(path.display().to_string(), e)
        }
    })?;
    if !validate_icc_profile(&data) {
        return Err(ResizeError::invalid_argument(
            "output_icc",
            path.display().to_string(),
            "not a valid ICC profile",
        ));
    }
    Ok(data)
}

const ORIENTATION_TAG: u16 = 0x0112;
const TYPE_SHORT: u16 = 3;

/// Copy of `exif` with the IFD0 Orientation tag set to 1 (top-left).
/// Payloads without the tag are returned unchanged; unparsable ones are None.
pub fn reset_exif_orientation(exif: &[u8]) -> Option<Vec<u8>> {
    let big_endian = match exif.get(0..4)? {
        [b'I', b'I', 42, 0] => false,
        [b'M', b'M', 0, 42] => true,
        _ => return None,
    };
    let read_u16 = |at: usize| -> Option<u16> {
        let b: [u8; 2] = exif.get(at..at + 2)?.try_into().ok()?;
        Some(if big_endian { u16::from_be_bytes(b) } else { u16::from_le_bytes(b) })
    };
    let read_u32 = |at: usize| -> Option<u32> {
        let b: [u8; 4] = exif.get(at..at + 4)?.try_into().ok()?;
        Some(if big_endian { u32::from_be_bytes(b) } else { u32::from_le_bytes(b) })
    };

    let ifd = read_u32(4)? as usize;
    let count = read_u16(ifd)? as usize;
    let mut out = exif.to_vec();
    for i in 0..count {
        let entry = ifd + 2 + i * 12;
        if read_u16(entry)? != ORIENTATION_TAG {
            continue;
        }
        if read_u16(entry + 2)? != TYPE_SHORT {
            return None;
        }
        let one = if big_endian { 1u16.to_be_bytes() } else { 1u16.to_le_bytes() };
        out[entry + 8..entry + 10].copy_from_slice(&one);
        break;
    }
    Some(out)
}

fn apply_metadata<T: ImageICC + ImageEXIF>(
    container: &mut T,
    icc: Option<&[u8]>,
    exif: Option<&[u8]>,
) {
    container.set_icc_profile(icc.map(Bytes::copy_from_slice));
    container.set_exif(exif.map(Bytes::copy_from_slice));
}

/// Replace the ICC profile and EXIF of an encoded JPEG, PNG or WebP.
/// Other formats are returned untouched.
pub fn embed_metadata(
    encoded: Vec<u8>,
    format: ImageType,
    icc: Option<&[u8]>,
    exif: Option<&[u8]>,
) -> EngineResult<Vec<u8>> {
    if icc.is_none() && exif.is_none() {
        return Ok(encoded);
    }
    run_with_panic_policy("encode:metadata", || {
        let parse_err =
            |e: img_parts::Error| ResizeError::encode_failed(format.name(), format!("failed to parse output for metadata: {e}"));
        let bytes = Bytes::from(encoded);
        let mut output = Vec::new();
        let written = match format {
            ImageType::Jpeg => {
                let mut jpeg = Jpeg::from_bytes(bytes).map_err(parse_err)?;
                apply_metadata(&mut jpeg, icc, exif);
                jpeg.encoder().write_to(&mut output)
            }
            ImageType::Png => {
                let mut png = Png::from_bytes(bytes).map_err(parse_err)?;
                apply_metadata(&mut png, icc, exif);
                png.encoder().write_to(&mut output)
            }
            ImageType::Webp => {
                let mut webp = WebP::from_bytes(bytes).map_err(parse_err)?;
                apply_metadata(&mut webp, icc, exif);
                webp.encoder().write_to(&mut output)
            }
            _ => return Ok(bytes.to_vec()),
        };
        written.map_err(|e| {
            ResizeError::encode_failed(format.name(), format!("failed to write metadata: {e}"))
        })?;
        Ok(output)
    })
}

/// Write `data` to `path` through a temp file in the same directory, so
/// readers never observe a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> EngineResult<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir)
        .map_err(|e| ResizeError::file_write_failed(dir.display().to_string(), e))?;
    let temp_path = temp_file.path().display().to_string();
    temp_file
        .write_all(data)
        .map_err(|e| ResizeError::file_write_failed(temp_path.clone(), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| ResizeError::file_write_failed(temp_path, e))?;
    temp_file
        .persist(path)
        .map_err(|e| ResizeError::file_write_failed(path.display().to_string(), e.error))?;
    Ok(())
}
