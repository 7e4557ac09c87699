//! Software implementations of the camera image effects.
//!
//! Names and parameter shapes follow the camera firmware effects the booth
//! was designed around. The visuals are approximations.

use image::imageops;
use image::{GrayImage, Rgb};

use crate::camera::Frame;
use crate::config::{EffectParam, ImageEffect};
use crate::error::RenderError;

/// Effect names this backend can render.
pub const SUPPORTED_EFFECTS: [&str; 12] = [
    "none",
    "solarize",
    "oilpaint",
    "cartoon",
    "colorswap",
    "negative",
    "pastel",
    "posterise",
    "gpen",
    "sketch",
    "watercolor",
    "colorpoint",
];

pub fn is_supported(name: &str) -> bool {
    SUPPORTED_EFFECTS.contains(&name)
}

/// Apply one effect to a frame.
pub fn apply(frame: Frame, effect: &ImageEffect) -> Result<Frame, RenderError> {
    use EffectParam::{IntParam, NoParam, PairParam};

    let name = effect.name.as_str();
    let invalid = |reason: &str| RenderError::InvalidParam {
        effect: name.to_string(),
        reason: reason.to_string(),
    };

    let out = match (name, effect.params) {
        ("none", NoParam) => frame,
        ("negative", NoParam) => negative(frame),
        ("solarize", NoParam) => solarize(frame, 128),
        ("solarize", IntParam(t)) => {
            let threshold = channel(t).ok_or_else(|| invalid("threshold must be 0-255"))?;
            solarize(frame, threshold)
        }
        ("posterise", NoParam) => posterise(frame, 8),
        ("posterise", IntParam(levels)) if (2..=32).contains(&levels) => {
            posterise(frame, levels as u32)
        }
        ("posterise", IntParam(_)) => return Err(invalid("levels must be 2-32")),
        ("colorswap", NoParam | IntParam(0)) => swap_channels(frame, [1, 0, 2]),
        ("colorswap", IntParam(1)) => swap_channels(frame, [0, 2, 1]),
        ("colorswap", IntParam(_)) => return Err(invalid("variant must be 0 or 1")),
        ("pastel", NoParam) => pastel(frame),
        ("oilpaint", NoParam) => posterise(imageops::blur(&frame, 1.2), 6),
        ("cartoon", NoParam) => cartoon(frame),
        ("gpen", NoParam) => gpen(&frame),
        ("sketch", NoParam) => sketch(&frame),
        ("watercolor", NoParam) => watercolor(frame, 128, 128),
        ("watercolor", PairParam(u, v)) => {
            let u = channel(u).ok_or_else(|| invalid("u must be 0-255"))?;
            let v = channel(v).ok_or_else(|| invalid("v must be 0-255"))?;
            watercolor(frame, u, v)
        }
        ("colorpoint", NoParam) => colorpoint(frame, 0),
        ("colorpoint", IntParam(q)) if (0..=3).contains(&q) => colorpoint(frame, q as u32),
        ("colorpoint", IntParam(_)) => return Err(invalid("quadrant must be 0-3")),
        (known, _) if is_supported(known) => {
            return Err(invalid(&format!("unexpected parameter {:?}", effect.params)));
        }
        (unknown, _) => return Err(RenderError::UnsupportedEffect(unknown.to_string())),
    };
    Ok(out)
}

fn channel(value: i64) -> Option<u8> {
    u8::try_from(value).ok()
}

fn luma(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000) as u8
}

fn map_pixels(mut frame: Frame, f: impl Fn(Rgb<u8>) -> Rgb<u8>) -> Frame {
    for p in frame.pixels_mut() {
        *p = f(*p);
    }
    frame
}

fn negative(mut frame: Frame) -> Frame {
    imageops::invert(&mut frame);
    frame
}

fn solarize(frame: Frame, threshold: u8) -> Frame {
    map_pixels(frame, |p| Rgb(p.0.map(|c| if c > threshold { 255 - c } else { c })))
}

fn posterise(frame: Frame, levels: u32) -> Frame {
    let step = 255 / (levels - 1);
    map_pixels(frame, |p| {
        Rgb(p.0.map(|c| {
            let q = (u32::from(c) + step / 2) / step * step;
            q.min(255) as u8
        }))
    })
}

fn swap_channels(frame: Frame, order: [usize; 3]) -> Frame {
    map_pixels(frame, |p| Rgb([p.0[order[0]], p.0[order[1]], p.0[order[2]]]))
}

fn pastel(frame: Frame) -> Frame {
    map_pixels(frame, |p| {
        let gray = u32::from(luma(&p));
        Rgb(p.0.map(|c| {
            // 60% colour, 40% gray, then a third of the way to white.
            let muted = (u32::from(c) * 6 + gray * 4) / 10;
            (muted + (255 - muted) / 3) as u8
        }))
    })
}

/// Gradient magnitude of the luma channel.
fn edges(frame: &Frame) -> GrayImage {
    let gray = imageops::grayscale(frame);
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let at = |x: u32, y: u32| i32::from(gray.get_pixel(x, y).0[0]);
        let dx = at((x + 1).min(w - 1), y) - at(x.saturating_sub(1), y);
        let dy = at(x, (y + 1).min(h - 1)) - at(x, y.saturating_sub(1));
        image::Luma([(dx.abs() + dy.abs()).min(255) as u8])
    })
}

fn cartoon(frame: Frame) -> Frame {
    let outline = edges(&frame);
    let mut flat = posterise(imageops::blur(&frame, 1.0), 5);
    for (x, y, p) in flat.enumerate_pixels_mut() {
        if outline.get_pixel(x, y).0[0] > 60 {
            *p = Rgb([20, 20, 20]);
        }
    }
    flat
}

fn gpen(frame: &Frame) -> Frame {
    let outline = edges(frame);
    Frame::from_fn(frame.width(), frame.height(), |x, y| {
        let v = 255 - outline.get_pixel(x, y).0[0].saturating_mul(2);
        Rgb([v, v, v])
    })
}

fn sketch(frame: &Frame) -> Frame {
    let gray = imageops::grayscale(frame);
    let mut inverted = gray.clone();
    imageops::invert(&mut inverted);
    let blurred = imageops::blur(&inverted, 3.0);
    Frame::from_fn(frame.width(), frame.height(), |x, y| {
        let base = u32::from(gray.get_pixel(x, y).0[0]);
        let blend = u32::from(blurred.get_pixel(x, y).0[0]);
        // Colour dodge.
        let v = if blend >= 255 {
            255
        } else {
            (base * 255 / (255 - blend)).min(255)
        };
        let v = v as u8;
        Rgb([v, v, v])
    })
}

fn watercolor(frame: Frame, u: u8, v: u8) -> Frame {
    map_pixels(imageops::blur(&frame, 1.5), |p| {
        let [r, g, b] = p.0.map(f32::from);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let cu = ((b - y) * 0.565 + f32::from(u) - 128.0) / 2.0;
        let cv = ((r - y) * 0.713 + f32::from(v) - 128.0) / 2.0;
        let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
        Rgb([
            clamp(y + 1.403 * cv),
            clamp(y - 0.344 * cu - 0.714 * cv),
            clamp(y + 1.770 * cu),
        ])
    })
}

/// Keep colour in one hue quadrant, gray elsewhere.
fn colorpoint(frame: Frame, quadrant: u32) -> Frame {
    map_pixels(frame, |p| {
        let [r, g, b] = p.0.map(f32::from);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;
        if delta < 1.0 {
            return p;
        }
        let hue = if (max - r).abs() < f32::EPSILON {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if (max - g).abs() < f32::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        if (hue / 90.0) as u32 % 4 == quadrant {
            p
        } else {
            let l = luma(&p);
            Rgb([l, l, l])
        }
    })
}
