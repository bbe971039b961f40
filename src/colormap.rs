//! Reversed red-yellow-green scale shared by the map markers and the table.

use image::Rgb;

/// ColorBrewer RdYlGn stops, reversed so the low end is green.
const RD_YL_GN_R: [[u8; 3]; 11] = [
    [0x00, 0x68, 0x37],
    [0x1a, 0x98, 0x50],
    [0x66, 0xbd, 0x63],
    [0xa6, 0xd9, 0x6a],
    [0xd9, 0xef, 0x8b],
    [0xff, 0xff, 0xbf],
    [0xfe, 0xe0, 0x8b],
    [0xfd, 0xae, 0x61],
    [0xf4, 0x6d, 0x43],
    [0xd7, 0x30, 0x27],
    [0xa5, 0x00, 0x26],
];

/// Luminance below which table text switches to a light colour.
const TEXT_COLOR_THRESHOLD: f64 = 0.408;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f64,
    pub max: f64,
}

impl ColorScale {
    /// Spans the observed values. `None` for an empty input.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Self { min: v, max: v }),
            Some(s) => Some(Self { min: s.min.min(v), max: s.max.max(v) }),
        })
    }

    /// Position of `value` on the scale in [0, 1]. A degenerate scale
    /// (min == max) puts everything at the green end.
    pub fn position(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    pub fn color(&self, value: f64) -> Rgb<u8> {
        color_at(self.position(value))
    }
}

/// Linear interpolation between the neighbouring stops.
pub fn color_at(t: f64) -> Rgb<u8> {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (RD_YL_GN_R.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(RD_YL_GN_R.len() - 2);
    let frac = scaled - lower as f64;

    let (a, b) = (RD_YL_GN_R[lower], RD_YL_GN_R[lower + 1]);
    let mix = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

pub fn to_hex(color: Rgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// WCAG relative luminance of an sRGB colour.
pub fn relative_luminance(color: Rgb<u8>) -> f64 {
    let linear = |c: u8| {
        let c = c as f64 / 255.0;
        if c <= 0.03928 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * linear(color[0]) + 0.7152 * linear(color[1]) + 0.0722 * linear(color[2])
}

/// Text colour readable on top of `background`.
pub fn text_color_for(background: Rgb<u8>) -> &'static str {
    if relative_luminance(background) < TEXT_COLOR_THRESHOLD {
        "#f1f1f1"
    } else {
        "#000000"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn endpoints_are_green_and_red() {
        assert_eq!(color_at(0.0), Rgb([0x00, 0x68, 0x37]));
        assert_eq!(color_at(1.0), Rgb([0xa5, 0x00, 0x26]));
        assert_eq!(color_at(0.5), Rgb([0xff, 0xff, 0xbf]));
        assert_eq!(to_hex(color_at(1.0)), "#a50026");
    }

    #[test]
    fn degenerate_scale_is_green() {
        let scale = ColorScale::from_values([42.0]).unwrap();
        assert_eq!(scale.position(42.0), 0.0);
        assert_eq!(scale.color(42.0), color_at(0.0));
        assert!(ColorScale::from_values(std::iter::empty()).is_none());
    }

    #[test]
    fn text_color_follows_background() {
        assert_eq!(text_color_for(color_at(0.0)), "#f1f1f1");
        assert_eq!(text_color_for(color_at(0.5)), "#000000");
        assert_eq!(text_color_for(color_at(1.0)), "#f1f1f1");
    }

    proptest! {
        #[test]
        fn position_is_strictly_monotonic(
            a in 0.0f64..500.0,
            b in 0.0f64..500.0,
            lo in 0.0f64..1.0,
            extra in 1.0f64..500.0,
        ) {
            prop_assume!(b - a > 1e-6);
            let scale = ColorScale { min: a.min(lo), max: b + extra };
            prop_assert!(scale.position(a) < scale.position(b));
        }

        #[test]
        fn position_stays_in_unit_range(v in -1000.0f64..1000.0) {
            let scale = ColorScale { min: 0.0, max: 500.0 };
            let t = scale.position(v);
            prop_assert!((0.0..=1.0).contains(&t));
        }
    }
}
