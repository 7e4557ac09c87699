//! Compositing and encoding primitives.

use std::io::Cursor;
use std::path::Path;

use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Delay, DynamicImage, Frame as GifFrame, RgbaImage};
use tracing::{debug, trace};

use crate::camera::Frame;
use crate::config::FrameSize;
use crate::error::RenderError;

/// JPEG quality for stills and collages.
pub const JPEG_QUALITY: u8 = 90;

/// Cell grid of a collage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub columns: u32,
    pub rows: u32,
    /// Size of one cell; frames of another size are scaled into it.
    pub cell: FrameSize,
}

impl GridLayout {
    pub const fn two_by_two(cell: FrameSize) -> Self {
        Self {
            columns: 2,
            rows: 2,
            cell,
        }
    }

    pub const fn cells(&self) -> usize {
        (self.columns * self.rows) as usize
    }

    pub const fn canvas(&self) -> FrameSize {
        FrameSize::new(self.cell.width * self.columns, self.cell.height * self.rows)
    }

    /// Top-left corner of a cell. Cells fill row by row: top-left, top-right,
    /// bottom-left, bottom-right for a 2x2 grid.
    pub const fn cell_origin(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        let column = index % self.columns;
        let row = index / self.columns;
        (column * self.cell.width, row * self.cell.height)
    }
}

/// Load an RGBA overlay or logo image.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, RenderError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| RenderError::Processing(format!("{}: {e}", path.display())))
}

/// Assemble frames into the grid, then alpha-blend the overlay on top.
pub fn composite_grid(
    frames: &[Frame],
    layout: &GridLayout,
    overlay: Option<&RgbaImage>,
) -> Result<Frame, RenderError> {
    if frames.len() != layout.cells() {
        return Err(RenderError::FrameCount {
            expected: layout.cells(),
            actual: frames.len(),
        });
    }

    let canvas_size = layout.canvas();
    let mut canvas = Frame::new(canvas_size.width, canvas_size.height);
    for (index, frame) in frames.iter().enumerate() {
        let (x, y) = layout.cell_origin(index);
        if frame.dimensions() == (layout.cell.width, layout.cell.height) {
            imageops::replace(&mut canvas, frame, i64::from(x), i64::from(y));
        } else {
            trace!(index, "Scaling frame into cell");
            let scaled = imageops::resize(
                frame,
                layout.cell.width,
                layout.cell.height,
                FilterType::Triangle,
            );
            imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
        }
    }

    let Some(overlay) = overlay else {
        return Ok(canvas);
    };
    let mut rgba = DynamicImage::ImageRgb8(canvas).into_rgba8();
    if overlay.dimensions() == rgba.dimensions() {
        imageops::overlay(&mut rgba, overlay, 0, 0);
    } else {
        let stretched = imageops::resize(
            overlay,
            canvas_size.width,
            canvas_size.height,
            FilterType::Triangle,
        );
        imageops::overlay(&mut rgba, &stretched, 0, 0);
    }
    debug!(canvas = %canvas_size, "Collage composited");
    Ok(DynamicImage::ImageRgba8(rgba).into_rgb8())
}

/// Stamp a logo in the bottom-right corner, scaled to `height` pixels.
pub fn stamp_logo(frame: Frame, logo: &RgbaImage, height: u32, padding: u32) -> Frame {
    let (logo_w, logo_h) = logo.dimensions();
    let scaled;
    let logo = if logo_h == height || logo_h == 0 {
        logo
    } else {
        let width = (u64::from(logo_w) * u64::from(height) / u64::from(logo_h)).max(1);
        scaled = imageops::resize(
            logo,
            u32::try_from(width).unwrap_or(u32::MAX),
            height,
            FilterType::Lanczos3,
        );
        &scaled
    };

    let (frame_w, frame_h) = frame.dimensions();
    let x = frame_w.saturating_sub(logo.width() + padding);
    let y = frame_h.saturating_sub(logo.height() + padding);

    let mut rgba = DynamicImage::ImageRgb8(frame).into_rgba8();
    imageops::overlay(&mut rgba, logo, i64::from(x), i64::from(y));
    DynamicImage::ImageRgba8(rgba).into_rgb8()
}

/// Encode frames as a GIF that loops forever.
pub fn encode_gif(frames: &[Frame], delay_ms: u64) -> Result<Vec<u8>, RenderError> {
    let delay_ms = u32::try_from(delay_ms)
        .map_err(|_| RenderError::Encode(format!("frame delay {delay_ms} ms too large")))?;
    let mut data = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut data, 10);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        for frame in frames {
            let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
            let gif_frame =
                GifFrame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));
            encoder
                .encode_frame(gif_frame)
                .map_err(|e| RenderError::Encode(e.to_string()))?;
        }
    }
    Ok(data)
}

pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, RenderError> {
    let mut data = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY)
        .encode_image(frame)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(data.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{AnimationDecoder, Rgb, Rgba};

    fn solid(w: u32, h: u32, value: u8) -> Frame {
        Frame::from_pixel(w, h, Rgb([value, value, value]))
    }

    #[test]
    fn test_grid_order() {
        let layout = GridLayout::two_by_two(FrameSize::new(4, 3));
        assert_eq!(layout.canvas(), FrameSize::new(8, 6));
        assert_eq!(layout.cell_origin(0), (0, 0));
        assert_eq!(layout.cell_origin(1), (4, 0));
        assert_eq!(layout.cell_origin(2), (0, 3));
        assert_eq!(layout.cell_origin(3), (4, 3));
    }

    #[test]
    fn test_composite_places_frames() {
        let layout = GridLayout::two_by_two(FrameSize::new(4, 3));
        let frames: Vec<Frame> = [10, 20, 30, 40].iter().map(|v| solid(4, 3, *v)).collect();

        let collage = composite_grid(&frames, &layout, None).unwrap();
        assert_eq!(collage.dimensions(), (8, 6));
        assert_eq!(collage.get_pixel(1, 1), &Rgb([10, 10, 10]));
        assert_eq!(collage.get_pixel(6, 1), &Rgb([20, 20, 20]));
        assert_eq!(collage.get_pixel(1, 5), &Rgb([30, 30, 30]));
        assert_eq!(collage.get_pixel(7, 5), &Rgb([40, 40, 40]));
    }

    #[test]
    fn test_overlay_drawn_on_top() {
        let layout = GridLayout::two_by_two(FrameSize::new(2, 2));
        let frames: Vec<Frame> = (0..4).map(|_| solid(2, 2, 0)).collect();
        let mut overlay = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        overlay.put_pixel(0, 0, Rgba([255, 0, 0, 255]));

        let collage = composite_grid(&frames, &layout, Some(&overlay)).unwrap();
        assert_eq!(collage.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(collage.get_pixel(3, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_composite_wrong_count() {
        let layout = GridLayout::two_by_two(FrameSize::new(2, 2));
        let err = composite_grid(&[solid(2, 2, 0)], &layout, None).unwrap_err();
        assert_eq!(err, RenderError::FrameCount { expected: 4, actual: 1 });
    }

    #[test]
    fn test_logo_bottom_right() {
        let frame = solid(20, 20, 0);
        let logo = RgbaImage::from_pixel(8, 4, Rgba([255, 255, 255, 255]));

        let stamped = stamp_logo(frame, &logo, 2, 1);
        // 8x4 scaled to 4x2, placed at (15, 17).
        assert!(stamped.get_pixel(16, 17).0.iter().all(|c| *c > 240));
        assert_eq!(stamped.get_pixel(19, 19), &Rgb([0, 0, 0]));
        assert_eq!(stamped.get_pixel(14, 17), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_gif_loops_with_all_frames() {
        let frames: Vec<Frame> = (0..3).map(|v| solid(6, 6, v * 80)).collect();
        let data = encode_gif(&frames, 50).unwrap();
        assert!(data.starts_with(b"GIF89a"));

        let decoder = image::codecs::gif::GifDecoder::new(Cursor::new(&data)).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 3);
        let (numer, denom) = decoded[0].delay().numer_denom_ms();
        assert_eq!(numer / denom, 50);
        // NETSCAPE2.0 application extension marks the loop.
        assert!(data.windows(11).any(|w| w == b"NETSCAPE2.0"));
    }

    #[test]
    fn test_jpeg_roundtrip_size() {
        let data = encode_jpeg(&solid(16, 8, 128)).unwrap();
        let decoded = image::load_from_memory(&data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
