//! Pure Rust codec backend built on the `image` crate ecosystem.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff | `image::guess_format` on the first bytes |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate decoders |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1) + BT.601 YUV → RGB |
//! | EXIF orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Resize | `resize_exact` with `Lanczos3`, box computed by [`fit_inside`] |
//! | Encode → JPEG / PNG / TIFF | `image::codecs::*` encoders |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Encode → WebP | `webp` crate (libwebp; lossy and lossless) |

use super::backend::{BackendError, ImageBackend, ImageMetadata, TransformOutput};
use super::calculations::fit_inside;
use super::params::{EncodeOptions, PngOptions, Quality, TransformParams};
use super::source::ImageSource;
use image::codecs::png::{CompressionType, FilterType as PngFilter};
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::{BufRead, Cursor, Seek, Write};
use std::path::Path;

/// Bytes read when sniffing a payload's signature.
const SNIFF_LEN: usize = 64;

/// Pure Rust backend.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_err(e: image::ImageError) -> BackendError {
    BackendError::Decode(e.to_string())
}

fn decode<R: BufRead + Seek>(
    reader: ImageReader<R>,
    auto_orient: bool,
) -> Result<DynamicImage, BackendError> {
    let mut decoder = reader.with_guessed_format()?.into_decoder().map_err(decode_err)?;
    // A missing or malformed EXIF block just means "no rotation".
    let orientation = if auto_orient {
        decoder.orientation().ok()
    } else {
        None
    };
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    if let Some(orientation) = orientation {
        img.apply_orientation(orientation);
    }
    Ok(img)
}

/// Load and decode an image from a path or stream.
///
/// AVIF goes through [`decode_avif`]; its `irot`/`imir` transforms are not
/// applied, so `auto_orient` has no effect there.
fn load_image(source: &ImageSource, auto_orient: bool) -> Result<DynamicImage, BackendError> {
    if image::guess_format(&source.read_prefix(SNIFF_LEN)?).ok() == Some(ImageFormat::Avif) {
        return decode_avif(&source.read_all()?);
    }
    match source {
        ImageSource::Path(path) => decode(ImageReader::open(path)?, auto_orient),
        ImageSource::Stream(_) => {
            let bytes = source.read_all()?;
            decode(ImageReader::new(Cursor::new(bytes)), auto_orient)
        }
    }
}

fn dimensions<R: BufRead + Seek>(reader: ImageReader<R>) -> Result<(u32, u32), BackendError> {
    reader
        .with_guessed_format()?
        .into_dimensions()
        .map_err(decode_err)
}

/// Dimensions of an AVIF payload from its container metadata (no pixel decode).
fn identify_avif(bytes: &[u8]) -> Result<(u32, u32), BackendError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::Decode(format!("Failed to parse AVIF: {e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| BackendError::Decode(format!("Failed to read AVIF metadata: {e:?}")))?;
    Ok((meta.max_frame_width.get(), meta.max_frame_height.get()))
}

/// Decode an AVIF payload: avif-parse pulls the primary AV1 item out of the
/// container, rav1d decodes it, and the planes are converted to RGB8.
///
/// The `image` crate only ships the AVIF encoder without its C decoder.
fn decode_avif(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib::{
        dav1d_close, dav1d_data_create, dav1d_data_unref, dav1d_default_settings,
        dav1d_get_picture, dav1d_open, dav1d_picture_unref, dav1d_send_data,
    };
    use std::ptr::NonNull;

    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| BackendError::Decode(format!("Failed to parse AVIF: {e:?}")))?;
    let av1: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    // MaybeUninit<T> has the layout of T.
    unsafe { dav1d_default_settings(NonNull::from(&mut settings).cast()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let decoded = (|| -> Result<(u32, u32, Vec<u8>), BackendError> {
        let mut data = Dav1dData::default();
        let buf = unsafe { dav1d_data_create(NonNull::new(&mut data), av1.len()) };
        if buf.is_null() {
            return Err(BackendError::Decode("rav1d data_create failed".into()));
        }
        unsafe { std::ptr::copy_nonoverlapping(av1.as_ptr(), buf, av1.len()) };

        let rc = unsafe { dav1d_send_data(ctx, NonNull::new(&mut data)) };
        if rc.0 != 0 {
            unsafe { dav1d_data_unref(NonNull::new(&mut data)) };
            return Err(BackendError::Decode(format!("rav1d send_data failed ({})", rc.0)));
        }

        let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
        let rc = unsafe { dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
        if rc.0 != 0 {
            return Err(BackendError::Decode(format!("rav1d get_picture failed ({})", rc.0)));
        }
        let rgb = yuv_planes(&pic).map(|planes| planes.to_rgb());
        let (width, height) = (pic.p.w as u32, pic.p.h as u32);
        unsafe { dav1d_picture_unref(NonNull::new(&mut pic)) };
        Ok((width, height, rgb?))
    })();

    unsafe { dav1d_close(NonNull::new(&mut ctx)) };
    let (width, height, rgb) = decoded?;
    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::Decode("decoded AVIF planes do not fill the frame".into()))
}

fn yuv_planes(
    pic: &rav1d::include::dav1d::picture::Dav1dPicture,
) -> Result<YuvPlanes, BackendError> {
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };

    let plane = |i: usize| pic.data[i].map(|p| p.as_ptr() as *const u8);
    let missing = || BackendError::Decode("rav1d returned a picture without planes".into());
    let ss = match pic.p.layout {
        DAV1D_PIXEL_LAYOUT_I400 => None,
        DAV1D_PIXEL_LAYOUT_I420 => Some((true, true)),
        DAV1D_PIXEL_LAYOUT_I422 => Some((true, false)),
        DAV1D_PIXEL_LAYOUT_I444 => Some((false, false)),
        other => {
            return Err(BackendError::Decode(format!(
                "Unsupported AVIF pixel layout: {other}"
            )));
        }
    };
    let chroma = match ss {
        None => None,
        Some(ss) => Some(Chroma {
            u: plane(1).ok_or_else(missing)?,
            v: plane(2).ok_or_else(missing)?,
            stride: pic.stride[1],
            ss,
        }),
    };
    Ok(YuvPlanes {
        y: plane(0).ok_or_else(missing)?,
        chroma,
        y_stride: pic.stride[0],
        width: pic.p.w as u32,
        height: pic.p.h as u32,
        bpc: pic.p.bpc as u32,
    })
}

/// Chroma planes and their subsampling (horizontal, vertical).
struct Chroma {
    u: *const u8,
    v: *const u8,
    stride: isize,
    ss: (bool, bool),
}

/// Borrowed YUV planes of a decoded picture. Only valid until the picture
/// is released.
struct YuvPlanes {
    y: *const u8,
    /// `None` for monochrome (I400).
    chroma: Option<Chroma>,
    y_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
}

impl YuvPlanes {
    /// Interleaved RGB8 using BT.601 coefficients, scaled down from `bpc` bits.
    fn to_rgb(&self) -> Vec<u8> {
        let scale = 255.0 / ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;

        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for row in 0..self.height {
            for col in 0..self.width {
                let luma = sample(self.y, self.y_stride, col, row, self.bpc);
                match &self.chroma {
                    None => rgb.extend_from_slice(&[to_u8(luma); 3]),
                    Some(c) => {
                        let (cx, cy) = (col >> c.ss.0 as u32, row >> c.ss.1 as u32);
                        let cb = sample(c.u, c.stride, cx, cy, self.bpc) - center;
                        let cr = sample(c.v, c.stride, cx, cy, self.bpc) - center;
                        rgb.extend_from_slice(&[
                            to_u8(luma + 1.402 * cr),
                            to_u8(luma - 0.344136 * cb - 0.714136 * cr),
                            to_u8(luma + 1.772 * cb),
                        ]);
                    }
                }
            }
        }
        rgb
    }
}

/// One sample from a plane; above 8 bits per channel samples are stored as u16.
#[inline]
fn sample(plane: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    let row = y as isize * stride;
    if bpc <= 8 {
        (unsafe { *plane.offset(row + x as isize) }) as f32
    } else {
        let at = unsafe { plane.offset(row + x as isize * 2) } as *const u16;
        (unsafe { at.read_unaligned() }) as f32
    }
}

/// Flatten to 8-bit RGB(A), the layouts every encoder here accepts.
fn to_8bit(img: &DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

fn png_compression(options: &PngOptions) -> CompressionType {
    match options.compression_level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

/// Encode `img` to `path` with the given options. Returns bytes written.
fn save_image(img: &DynamicImage, path: &Path, encode: &EncodeOptions) -> Result<u64, BackendError> {
    let encode_err = |e: image::ImageError| {
        BackendError::Encode(format!("{} encode failed: {}", encode.format(), e))
    };

    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    match encode {
        EncodeOptions::Jpeg(o) => {
            let quality = Quality::new(o.quality).value() as u8;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality);
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(encode_err)?;
        }
        EncodeOptions::Png(o) => {
            let filter = if o.adaptive_filtering {
                PngFilter::Adaptive
            } else {
                PngFilter::Sub
            };
            let encoder = image::codecs::png::PngEncoder::new_with_quality(
                &mut writer,
                png_compression(o),
                filter,
            );
            match img {
                DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                    DynamicImage::ImageRgba16(img.to_rgba16()).write_with_encoder(encoder)
                }
                _ => img.write_with_encoder(encoder),
            }
            .map_err(encode_err)?;
        }
        EncodeOptions::Webp(o) => {
            let flat = to_8bit(img);
            let encoder = webp::Encoder::from_image(&flat)
                .map_err(|e| BackendError::Encode(format!("webp encode failed: {e}")))?;
            let memory = encoder
                .encode_simple(o.lossless, Quality::new(o.quality).value() as f32)
                .map_err(|e| BackendError::Encode(format!("webp encode failed: {e:?}")))?;
            writer.write_all(&memory)?;
        }
        EncodeOptions::Avif(o) => {
            let quality = Quality::new(o.quality).value() as u8;
            let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
                &mut writer,
                o.encoder_speed(),
                quality,
            );
            to_8bit(img).write_with_encoder(encoder).map_err(encode_err)?;
        }
        EncodeOptions::Tiff => {
            let encoder = image::codecs::tiff::TiffEncoder::new(&mut writer);
            to_8bit(img).write_with_encoder(encoder).map_err(encode_err)?;
        }
    }
    writer.flush()?;
    drop(writer);

    Ok(std::fs::metadata(path)?.len())
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &ImageSource) -> Result<Option<ImageFormat>, BackendError> {
        let prefix = source.read_prefix(SNIFF_LEN)?;
        Ok(image::guess_format(&prefix).ok())
    }

    fn verify(&self, source: &ImageSource) -> Result<(), BackendError> {
        match self.identify(source)? {
            None => Err(BackendError::Unrecognized),
            Some(_) => load_image(source, false).map(|_| ()),
        }
    }

    fn read_metadata(&self, source: &ImageSource) -> Result<ImageMetadata, BackendError> {
        let format = self.identify(source)?;
        let byte_size = source.byte_size()?;
        let (width, height) = match (format, source) {
            (Some(ImageFormat::Avif), _) => identify_avif(&source.read_all()?)?,
            (_, ImageSource::Path(path)) => dimensions(ImageReader::open(path)?)?,
            (_, ImageSource::Stream(_)) => {
                dimensions(ImageReader::new(Cursor::new(source.read_all()?)))?
            }
        };
        Ok(ImageMetadata {
            width,
            height,
            format,
            byte_size,
        })
    }

    fn transform(&self, params: &TransformParams) -> Result<TransformOutput, BackendError> {
        let img = load_image(&params.source, params.auto_orient)?;

        let img = match params.resize {
            Some(bounds) => {
                let (w, h) = fit_inside((img.width(), img.height()), (bounds.width, bounds.height));
                if (w, h) == (img.width(), img.height()) {
                    img
                } else {
                    img.resize_exact(w, h, FilterType::Lanczos3)
                }
            }
            None => img,
        };

        let byte_size = save_image(&img, &params.output, &params.encode)?;

        Ok(TransformOutput {
            width: img.width(),
            height: img.height(),
            byte_size,
            format: params.encode.format(),
        })
    }
}
