//! Colour conversion and contrast decisions

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Which text colour reads best on top of a painted cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextContrast {
    Light,
    Dark,
}

/// Parse `#rgb` / `#rrggbb` (leading `#` optional)
pub fn hex_to_rgb(hex: &str) -> Option<Rgb> {
    let h = hex.trim();
    let h = h.strip_prefix('#').unwrap_or(h);
    let expanded: String = if h.len() == 3 {
        h.chars().flat_map(|c| [c, c]).collect()
    } else {
        h.to_string()
    };
    if expanded.len() != 6 || !expanded.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).ok();
    Some(Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

pub fn rgb_to_hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb.r, rgb.g, rgb.b)
}

fn srgb_to_linear(c: u8) -> f64 {
    let v = c as f64 / 255.0;
    if v <= 0.03928 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// WCAG relative luminance in 0..=1
pub fn relative_luminance(rgb: Rgb) -> f64 {
    0.2126 * srgb_to_linear(rgb.r) + 0.7152 * srgb_to_linear(rgb.g) + 0.0722 * srgb_to_linear(rgb.b)
}

/// Unparseable colours are treated as mid-grey (luminance 0.5)
pub fn contrast_for(color: &str) -> TextContrast {
    let lum = hex_to_rgb(color).map(relative_luminance).unwrap_or(0.5);
    if lum < 0.5 {
        TextContrast::Light
    } else {
        TextContrast::Dark
    }
}

/// HSL (hue in degrees, saturation/lightness in percent) to `#rrggbb`
pub fn hsl_to_hex(hue: u32, sat: f64, light: f64) -> String {
    let hue = hue % 360;
    let c = (1.0 - (2.0 * light / 100.0 - 1.0).abs()) * (sat / 100.0);
    let x = c * (1.0 - ((hue as f64 / 60.0) % 2.0 - 1.0).abs());
    let m = light / 100.0 - c / 2.0;
    let (r, g, b) = match hue {
        0..60 => (c, x, 0.0),
        60..120 => (x, c, 0.0),
        120..180 => (0.0, c, x),
        180..240 => (0.0, x, c),
        240..300 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    rgb_to_hex(Rgb {
        r: to_channel(r),
        g: to_channel(g),
        b: to_channel(b),
    })
}

/// A pleasing saturated colour for new events
pub fn random_color() -> String {
    let hue = rand::thread_rng().gen_range(0..360);
    hsl_to_hex(hue, 70.0, 55.0)
}
