//! Pure Rust image engine.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP, BMP, TIFF) | `image` crate (pure Rust decoders) |
//! | Animated GIF/WebP frames | `image::AnimationDecoder`, stacked into one vertical strip |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Blur / sharpen | `image::imageops::blur` / `unsharpen` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless only) |
//! | EXIF / ICC / IPTC / XMP blobs | `img-parts` JPEG segments and PNG chunks |
//! | Flatten / watermark compositing | per-pixel, parallel over `rayon` |
//!
//! There is no colour management: pixels are assumed to be sRGB and the
//! ICC profile travels through untouched as a blob.

use super::backend::{BackendError, ImageBackend, ImageHandle};
use super::exif;
use super::params::{ImageData, ImageType, MetadataKind, Rgb};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::webp::WebPDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, Delay, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};
use img_parts::jpeg::{Jpeg, JpegSegment, markers};
use img_parts::png::Png;
use img_parts::{ImageEXIF, ImageICC};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Cursor;

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Pure Rust engine using the `image` crate ecosystem.
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

fn decoder_format(kind: ImageType) -> Option<ImageFormat> {
    match kind {
        ImageType::Jpeg => Some(ImageFormat::Jpeg),
        ImageType::Png => Some(ImageFormat::Png),
        ImageType::Webp => Some(ImageFormat::WebP),
        ImageType::Gif => Some(ImageFormat::Gif),
        ImageType::Bmp => Some(ImageFormat::Bmp),
        ImageType::Tiff => Some(ImageFormat::Tiff),
        _ => None,
    }
}

fn decode_failed(kind: ImageType, e: impl std::fmt::Display) -> BackendError {
    BackendError::ProcessingFailed(format!("Failed to decode {kind}: {e}"))
}

/// Decode up to `pages` animation frames, or `None` if the source is not
/// animated.
fn decode_frames(data: &ImageData, pages: u32) -> Result<Option<Vec<Frame>>, BackendError> {
    if pages <= 1 {
        return Ok(None);
    }
    let frames = match data.kind {
        ImageType::Gif => GifDecoder::new(Cursor::new(&data.data))
            .map_err(|e| decode_failed(data.kind, e))?
            .into_frames(),
        ImageType::Webp => {
            let decoder =
                WebPDecoder::new(Cursor::new(&data.data)).map_err(|e| decode_failed(data.kind, e))?;
            if !decoder.has_animation() {
                return Ok(None);
            }
            decoder.into_frames()
        }
        _ => return Ok(None),
    };
    let frames = frames
        .take(pages as usize)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| decode_failed(data.kind, e))?;
    Ok((frames.len() > 1).then_some(frames))
}

/// Pull embedded metadata blobs out of the container.
fn read_blobs(data: &ImageData) -> BTreeMap<MetadataKind, Vec<u8>> {
    let mut blobs = BTreeMap::new();
    match data.kind {
        ImageType::Jpeg => {
            let Ok(jpeg) = Jpeg::from_bytes(data.data.clone().into()) else {
                return blobs;
            };
            if let Some(exif) = jpeg.exif() {
                blobs.insert(MetadataKind::Exif, exif.to_vec());
            }
            if let Some(icc) = jpeg.icc_profile() {
                blobs.insert(MetadataKind::Icc, icc.to_vec());
            }
            for segment in jpeg.segments() {
                let contents = segment.contents();
                if segment.marker() == markers::APP13 && contents.starts_with(PHOTOSHOP_HEADER) {
                    blobs.insert(MetadataKind::Iptc, contents.to_vec());
                } else if segment.marker() == markers::APP1 {
                    if let Some(xmp) = contents.strip_prefix(XMP_HEADER) {
                        blobs.insert(MetadataKind::Xmp, xmp.to_vec());
                    }
                }
            }
        }
        ImageType::Png => {
            let Ok(png) = Png::from_bytes(data.data.clone().into()) else {
                return blobs;
            };
            if let Some(exif) = png.exif() {
                blobs.insert(MetadataKind::Exif, exif.to_vec());
            }
            if let Some(icc) = png.icc_profile() {
                blobs.insert(MetadataKind::Icc, icc.to_vec());
            }
        }
        _ => {}
    }
    blobs
}

/// Write blobs back into an encoded JPEG or PNG. Other containers are
/// returned unchanged.
fn write_blobs(
    format: ImageType,
    encoded: Vec<u8>,
    blobs: &BTreeMap<MetadataKind, Vec<u8>>,
) -> Result<Vec<u8>, BackendError> {
    if blobs.is_empty() {
        return Ok(encoded);
    }
    let exif = blobs
        .get(&MetadataKind::Exif)
        .map(|e| e.strip_prefix(EXIF_HEADER).unwrap_or(e).to_vec().into());
    let icc = blobs.get(&MetadataKind::Icc).map(|i| i.clone().into());

    match format {
        ImageType::Jpeg => {
            let mut jpeg = Jpeg::from_bytes(encoded.into())
                .map_err(|e| BackendError::ProcessingFailed(format!("JPEG rewrite failed: {e}")))?;
            jpeg.set_exif(exif);
            jpeg.set_icc_profile(icc);

            let mut extra = Vec::new();
            if let Some(iptc) = blobs.get(&MetadataKind::Iptc) {
                extra.push(JpegSegment::new_with_contents(
                    markers::APP13,
                    iptc.clone().into(),
                ));
            }
            if let Some(xmp) = blobs.get(&MetadataKind::Xmp) {
                let mut contents = XMP_HEADER.to_vec();
                contents.extend_from_slice(xmp);
                extra.push(JpegSegment::new_with_contents(markers::APP1, contents.into()));
            }
            // After the last APPn segment, before the tables
            let segments = jpeg.segments_mut();
            let at = segments
                .iter()
                .position(|s| !(markers::APP0..=markers::APP15).contains(&s.marker()))
                .unwrap_or(segments.len());
            for (i, segment) in extra.into_iter().enumerate() {
                segments.insert(at + i, segment);
            }

            Ok(jpeg.encoder().bytes().to_vec())
        }
        ImageType::Png => {
            let mut png = Png::from_bytes(encoded.into())
                .map_err(|e| BackendError::ProcessingFailed(format!("PNG rewrite failed: {e}")))?;
            png.set_exif(exif);
            png.set_icc_profile(icc);
            Ok(png.encoder().bytes().to_vec())
        }
        _ => Ok(encoded),
    }
}

/// Stack equally sized frames into one vertical strip.
fn stack(frames: &[RgbaImage]) -> Result<RgbaImage, BackendError> {
    let first = frames
        .first()
        .ok_or_else(|| BackendError::ProcessingFailed("No frames to stack".into()))?;
    let (w, h) = first.dimensions();
    let mut canvas = RgbaImage::new(w, h * frames.len() as u32);
    for (i, frame) in frames.iter().enumerate() {
        if frame.dimensions() != (w, h) {
            return Err(BackendError::ProcessingFailed(
                "Animation frames differ in size".into(),
            ));
        }
        imageops::replace(&mut canvas, frame, 0, (i as u32 * h) as i64);
    }
    Ok(canvas)
}

/// Blend a straight-alpha pixel over an opaque background.
fn blend_over(px: &mut [u8], bg: Rgb) {
    let a = px[3] as u32;
    let mix = |c: u8, b: u8| ((c as u32 * a + b as u32 * (255 - a) + 127) / 255) as u8;
    px[0] = mix(px[0], bg.r);
    px[1] = mix(px[1], bg.g);
    px[2] = mix(px[2], bg.b);
    px[3] = 255;
}

/// Decoded image: all frames stacked vertically in one RGBA canvas.
pub struct RustImage {
    canvas: RgbaImage,
    frames: u32,
    delays: Vec<Delay>,
    alpha: bool,
    blobs: BTreeMap<MetadataKind, Vec<u8>>,
}

impl RustImage {
    pub fn from_rgba(canvas: RgbaImage) -> Self {
        Self {
            canvas,
            frames: 1,
            delays: Vec::new(),
            alpha: true,
            blobs: BTreeMap::new(),
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.canvas
    }

    fn split_frames(&self) -> Vec<RgbaImage> {
        let ph = self.page_height();
        (0..self.frames)
            .map(|i| imageops::crop_imm(&self.canvas, 0, i * ph, self.canvas.width(), ph).to_image())
            .collect()
    }

    /// Apply `f` to every frame independently.
    fn map_frames<F>(&mut self, f: F) -> Result<(), BackendError>
    where
        F: Fn(&RgbaImage) -> RgbaImage + Sync,
    {
        if self.frames <= 1 {
            self.canvas = f(&self.canvas);
            return Ok(());
        }
        let frames: Vec<RgbaImage> = self.split_frames().par_iter().map(&f).collect();
        self.canvas = stack(&frames)?;
        Ok(())
    }

    fn first_frame(&self) -> DynamicImage {
        if self.frames <= 1 {
            return DynamicImage::ImageRgba8(self.canvas.clone());
        }
        let ph = self.page_height();
        DynamicImage::ImageRgba8(
            imageops::crop_imm(&self.canvas, 0, 0, self.canvas.width(), ph).to_image(),
        )
    }

    fn flattened_rgb(&self) -> DynamicImage {
        let mut frame = self.first_frame().into_rgba8();
        frame
            .par_chunks_exact_mut(4)
            .for_each(|px| blend_over(px, Rgb::WHITE));
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(frame).into_rgb8())
    }

    fn encode_gif(&self) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new_with_speed(&mut buf, 10);
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| BackendError::ProcessingFailed(format!("GIF encode failed: {e}")))?;
            let frames = self.split_frames().into_iter().enumerate().map(|(i, img)| {
                let delay = self
                    .delays
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| Delay::from_numer_denom_ms(100, 1));
                Frame::from_parts(img, 0, 0, delay)
            });
            encoder
                .encode_frames(frames)
                .map_err(|e| BackendError::ProcessingFailed(format!("GIF encode failed: {e}")))?;
        }
        Ok(buf)
    }
}

impl ImageHandle for RustImage {
    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn frames(&self) -> u32 {
        self.frames
    }

    fn has_alpha(&self) -> bool {
        self.alpha
    }

    fn blob(&self, kind: MetadataKind) -> Option<Vec<u8>> {
        self.blobs.get(&kind).cloned()
    }

    fn set_blob(&mut self, kind: MetadataKind, data: Vec<u8>) {
        self.blobs.insert(kind, data);
    }

    fn remove_blob(&mut self, kind: MetadataKind) {
        self.blobs.remove(&kind);
    }

    fn strip(&mut self, keep_copyright: bool) -> Result<(), BackendError> {
        let exif = if keep_copyright {
            self.blobs
                .get(&MetadataKind::Exif)
                .and_then(|e| exif::copyright_subset(e))
        } else {
            None
        };
        self.blobs.retain(|kind, _| *kind == MetadataKind::Icc);
        if let Some(exif) = exif {
            self.blobs.insert(MetadataKind::Exif, exif);
        }
        Ok(())
    }

    fn rgb_colourspace(&mut self) -> Result<(), BackendError> {
        // The canvas is always 8-bit RGBA.
        Ok(())
    }

    fn import_color_profile(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn resize(&mut self, wscale: f64, hscale: f64) -> Result<(), BackendError> {
        let w = ((self.width() as f64 * wscale).round() as u32).max(1);
        let h = ((self.page_height() as f64 * hscale).round() as u32).max(1);
        if (w, h) == (self.width(), self.page_height()) {
            return Ok(());
        }
        self.map_frames(|frame| imageops::resize(frame, w, h, FilterType::Lanczos3))
    }

    fn crop(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<(), BackendError> {
        if width == 0
            || height == 0
            || left + width > self.width()
            || top + height > self.page_height()
        {
            return Err(BackendError::ProcessingFailed(format!(
                "Crop {width}x{height}+{left}+{top} outside {}x{}",
                self.width(),
                self.page_height()
            )));
        }
        self.map_frames(|frame| imageops::crop_imm(frame, left, top, width, height).to_image())
    }

    fn embed(
        &mut self,
        width: u32,
        height: u32,
        left: i64,
        top: i64,
        background: Option<Rgb>,
    ) -> Result<(), BackendError> {
        let fill = match background {
            Some(bg) => Rgba([bg.r, bg.g, bg.b, 255]),
            None => {
                self.alpha = true;
                Rgba([0, 0, 0, 0])
            }
        };
        self.map_frames(|frame| {
            let mut canvas = RgbaImage::from_pixel(width, height, fill);
            imageops::replace(&mut canvas, frame, left, top);
            canvas
        })
    }

    fn replicate(&mut self, width: u32, height: u32) -> Result<(), BackendError> {
        let (tw, th) = self.canvas.dimensions();
        let mut canvas = RgbaImage::new(width, height);
        for y in (0..height).step_by(th.max(1) as usize) {
            for x in (0..width).step_by(tw.max(1) as usize) {
                imageops::replace(&mut canvas, &self.canvas, x as i64, y as i64);
            }
        }
        self.canvas = canvas;
        self.frames = 1;
        self.delays.clear();
        Ok(())
    }

    fn rotate(&mut self, angle: u16) -> Result<(), BackendError> {
        match angle % 360 {
            0 => Ok(()),
            90 => self.map_frames(imageops::rotate90),
            180 => self.map_frames(imageops::rotate180),
            270 => self.map_frames(imageops::rotate270),
            other => Err(BackendError::ProcessingFailed(format!(
                "Rotation angle must be a multiple of 90, got {other}"
            ))),
        }
    }

    fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<(), BackendError> {
        if horizontal {
            self.map_frames(imageops::flip_horizontal)?;
        }
        if vertical {
            self.map_frames(imageops::flip_vertical)?;
        }
        Ok(())
    }

    fn flatten(&mut self, background: Rgb) -> Result<(), BackendError> {
        self.canvas
            .par_chunks_exact_mut(4)
            .for_each(|px| blend_over(px, background));
        self.alpha = false;
        Ok(())
    }

    fn blur(&mut self, sigma: f32) -> Result<(), BackendError> {
        self.map_frames(|frame| imageops::blur(frame, sigma))
    }

    fn sharpen(&mut self, sigma: f32) -> Result<(), BackendError> {
        self.map_frames(|frame| imageops::unsharpen(frame, sigma, 0))
    }

    fn pixelate(&mut self, size: u32) -> Result<(), BackendError> {
        if size <= 1 {
            return Ok(());
        }
        self.map_frames(|frame| {
            let (w, h) = frame.dimensions();
            let small = imageops::resize(
                frame,
                w.div_ceil(size),
                h.div_ceil(size),
                FilterType::Triangle,
            );
            imageops::resize(&small, w, h, FilterType::Nearest)
        })
    }

    fn copy_memory(&mut self) -> Result<(), BackendError> {
        // Pixels always live in memory.
        Ok(())
    }

    fn apply_watermark(&mut self, watermark: &Self, opacity: f64) -> Result<(), BackendError> {
        if watermark.canvas.dimensions() != self.canvas.dimensions() {
            return Err(BackendError::ProcessingFailed(format!(
                "Watermark layer is {:?}, image is {:?}",
                watermark.canvas.dimensions(),
                self.canvas.dimensions()
            )));
        }
        let opacity = opacity.clamp(0.0, 1.0);
        self.canvas
            .par_chunks_exact_mut(4)
            .zip(watermark.canvas.par_chunks_exact(4))
            .for_each(|(dst, src)| {
                let a = src[3] as f64 / 255.0 * opacity;
                if a <= 0.0 {
                    return;
                }
                for c in 0..3 {
                    dst[c] = (src[c] as f64 * a + dst[c] as f64 * (1.0 - a)).round() as u8;
                }
                dst[3] = (dst[3] as f64 + (255.0 - dst[3] as f64) * a).round() as u8;
            });
        Ok(())
    }

    fn save(&self, format: ImageType, quality: u8) -> Result<Vec<u8>, BackendError> {
        let encode_err =
            |e: image::ImageError| BackendError::ProcessingFailed(format!("{format} encode failed: {e}"));
        let mut buf = Vec::new();
        match format {
            ImageType::Jpeg => {
                let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
                self.flattened_rgb()
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            ImageType::Png => {
                let encoder = image::codecs::png::PngEncoder::new(&mut buf);
                self.first_frame()
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            ImageType::Webp => {
                let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut buf);
                self.first_frame()
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            ImageType::Avif => {
                let encoder =
                    image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, 6, quality);
                self.first_frame()
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            ImageType::Gif => buf = self.encode_gif()?,
            ImageType::Bmp => {
                let encoder = image::codecs::bmp::BmpEncoder::new(&mut buf);
                self.first_frame()
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            ImageType::Tiff => {
                let encoder = image::codecs::tiff::TiffEncoder::new(Cursor::new(&mut buf));
                self.first_frame()
                    .write_with_encoder(encoder)
                    .map_err(encode_err)?;
            }
            other => return Err(BackendError::Unsupported(other)),
        }
        write_blobs(format, buf, &self.blobs)
    }
}

impl ImageBackend for RustBackend {
    type Image = RustImage;

    fn load(&self, data: &ImageData, shrink: u32, pages: u32) -> Result<RustImage, BackendError> {
        let format = decoder_format(data.kind).ok_or(BackendError::Unsupported(data.kind))?;

        let mut image = match decode_frames(data, pages)? {
            Some(frames) => {
                let delays = frames.iter().map(|f| f.delay()).collect();
                let buffers: Vec<RgbaImage> = frames.into_iter().map(Frame::into_buffer).collect();
                RustImage {
                    frames: buffers.len() as u32,
                    canvas: stack(&buffers)?,
                    delays,
                    alpha: true,
                    blobs: BTreeMap::new(),
                }
            }
            None => {
                let decoded = image::load_from_memory_with_format(&data.data, format)
                    .map_err(|e| decode_failed(data.kind, e))?;
                RustImage {
                    alpha: decoded.color().has_alpha(),
                    canvas: decoded.into_rgba8(),
                    frames: 1,
                    delays: Vec::new(),
                    blobs: BTreeMap::new(),
                }
            }
        };
        image.blobs = read_blobs(data);

        if shrink > 1 {
            let s = 1.0 / shrink as f64;
            image.resize(s, s)?;
        }
        Ok(image)
    }

    fn can_save(&self, format: ImageType) -> bool {
        matches!(
            format,
            ImageType::Jpeg
                | ImageType::Png
                | ImageType::Webp
                | ImageType::Avif
                | ImageType::Gif
                | ImageType::Bmp
                | ImageType::Tiff
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(img: &RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let dynamic = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img.clone()).into_rgb8())
        } else {
            DynamicImage::ImageRgba8(img.clone())
        };
        dynamic.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        })
    }

    fn animated_gif(width: u32, height: u32, frames: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let frames = (0..frames).map(|i| {
                let img = RgbaImage::from_pixel(width, height, Rgba([(i * 60) as u8, 0, 0, 255]));
                Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(50, 1))
            });
            encoder.encode_frames(frames).unwrap();
        }
        buf
    }

    #[test]
    fn load_png_dimensions() {
        let data = ImageData::new(encode(&gradient(40, 30), ImageFormat::Png));
        let img = RustBackend::new().load(&data, 1, 1).unwrap();
        assert_eq!((img.width(), img.height(), img.frames()), (40, 30, 1));
    }

    #[test]
    fn load_with_shrink() {
        let data = ImageData::new(encode(&gradient(40, 30), ImageFormat::Png));
        let img = RustBackend::new().load(&data, 2, 1).unwrap();
        assert_eq!((img.width(), img.height()), (20, 15));
    }

    #[test]
    fn load_unsupported_kind_errors() {
        let data = ImageData {
            data: b"<svg/>".to_vec(),
            kind: ImageType::Svg,
        };
        assert!(matches!(
            RustBackend::new().load(&data, 1, 1),
            Err(BackendError::Unsupported(ImageType::Svg))
        ));
    }

    #[test]
    fn load_animated_gif_stacks_frames() {
        let data = ImageData::new(animated_gif(8, 6, 3));
        assert_eq!(data.kind, ImageType::Gif);

        let img = RustBackend::new().load(&data, 1, 10).unwrap();
        assert_eq!(img.frames(), 3);
        assert_eq!((img.width(), img.height(), img.page_height()), (8, 18, 6));

        let single = RustBackend::new().load(&data, 1, 1).unwrap();
        assert_eq!((single.frames(), single.height()), (1, 6));
    }

    #[test]
    fn resize_applies_per_frame() {
        let data = ImageData::new(animated_gif(8, 6, 3));
        let mut img = RustBackend::new().load(&data, 1, 10).unwrap();
        img.resize(0.5, 0.5).unwrap();
        assert_eq!((img.width(), img.page_height(), img.height()), (4, 3, 9));
    }

    #[test]
    fn embed_offsets_can_be_negative() {
        let mut img = RustImage::from_rgba(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])));
        img.embed(6, 6, -2, 1, Some(Rgb::new(0, 0, 255))).unwrap();

        assert_eq!(img.pixels().dimensions(), (6, 6));
        assert_eq!(img.pixels().get_pixel(0, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.pixels().get_pixel(2, 1), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.pixels().get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn replicate_tiles_and_resets_frames() {
        let mut img = RustImage::from_rgba(RgbaImage::from_fn(2, 2, |x, _| {
            if x == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }));
        img.replicate(5, 3).unwrap();
        assert_eq!(img.pixels().dimensions(), (5, 3));
        assert_eq!(img.pixels().get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.pixels().get_pixel(3, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.frames(), 1);
    }

    #[test]
    fn crop_outside_bounds_errors() {
        let mut img = RustImage::from_rgba(gradient(10, 10));
        assert!(img.crop(5, 5, 6, 2).is_err());
        img.crop(2, 3, 4, 5).unwrap();
        assert_eq!(img.pixels().dimensions(), (4, 5));
    }

    #[test]
    fn flatten_blends_transparent_pixels() {
        let mut img = RustImage::from_rgba(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0])));
        img.flatten(Rgb::new(10, 20, 30)).unwrap();
        assert_eq!(img.pixels().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert!(!img.has_alpha());
    }

    #[test]
    fn watermark_composites_at_opacity() {
        let mut img = RustImage::from_rgba(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])));
        let wm = RustImage::from_rgba(RgbaImage::from_fn(2, 2, |x, _| {
            if x == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([255, 255, 255, 0])
            }
        }));
        img.apply_watermark(&wm, 0.5).unwrap();
        assert_eq!(img.pixels().get_pixel(0, 0), &Rgba([128, 128, 128, 255]));
        assert_eq!(img.pixels().get_pixel(1, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn watermark_size_mismatch_errors() {
        let mut img = RustImage::from_rgba(gradient(4, 4));
        let wm = RustImage::from_rgba(gradient(2, 2));
        assert!(img.apply_watermark(&wm, 1.0).is_err());
    }

    #[test]
    fn save_jpeg_and_reload() {
        let img = RustImage::from_rgba(gradient(16, 12));
        let bytes = img.save(ImageType::Jpeg, 80).unwrap();
        assert_eq!(ImageType::sniff(&bytes), ImageType::Jpeg);

        let reloaded = RustBackend::new().load(&ImageData::new(bytes), 1, 1).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (16, 12));
    }

    #[test]
    fn jpeg_metadata_blobs_round_trip() {
        let mut img = RustImage::from_rgba(gradient(8, 8));
        img.set_blob(MetadataKind::Iptc, b"Photoshop 3.0\08BIMtest".to_vec());
        img.set_blob(MetadataKind::Xmp, b"<x:xmpmeta/>".to_vec());

        let bytes = img.save(ImageType::Jpeg, 90).unwrap();
        let reloaded = RustBackend::new().load(&ImageData::new(bytes), 1, 1).unwrap();
        assert_eq!(
            reloaded.blob(MetadataKind::Iptc).as_deref(),
            Some(&b"Photoshop 3.0\08BIMtest"[..])
        );
        assert_eq!(
            reloaded.blob(MetadataKind::Xmp).as_deref(),
            Some(&b"<x:xmpmeta/>"[..])
        );
    }

    #[test]
    fn strip_keeps_icc_only() {
        let mut img = RustImage::from_rgba(gradient(2, 2));
        img.set_blob(MetadataKind::Icc, vec![1, 2, 3]);
        img.set_blob(MetadataKind::Iptc, vec![4]);
        img.set_blob(MetadataKind::Xmp, vec![5]);
        img.set_blob(MetadataKind::Exif, b"garbage".to_vec());

        img.strip(true).unwrap();
        assert_eq!(img.blob(MetadataKind::Icc), Some(vec![1, 2, 3]));
        assert_eq!(img.blob(MetadataKind::Iptc), None);
        assert_eq!(img.blob(MetadataKind::Xmp), None);
        assert_eq!(img.blob(MetadataKind::Exif), None);
    }

    #[test]
    fn save_animated_gif_keeps_frames() {
        let data = ImageData::new(animated_gif(8, 6, 3));
        let img = RustBackend::new().load(&data, 1, 10).unwrap();
        let bytes = img.save(ImageType::Gif, 0).unwrap();

        let reloaded = RustBackend::new().load(&ImageData::new(bytes), 1, 10).unwrap();
        assert_eq!(reloaded.frames(), 3);
    }

    #[test]
    fn can_save_excludes_svg() {
        let backend = RustBackend::new();
        assert!(backend.can_save(ImageType::Png));
        assert!(!backend.can_save(ImageType::Svg));
        assert!(!backend.can_save(ImageType::Unknown));
    }
}
