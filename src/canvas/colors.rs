use serde::{Deserialize, Serialize};

/// Built-in palettes. Each maps a level in `[0, 1]` to RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorMapId {
    #[default]
    Green,
    WhiteOnBlack,
    BlackOnWhite,
    Sunset,
    Ice,
    Cherry,
    Wasp,
    Rainbow,
    Greyscale,
}

impl ColorMapId {
    pub const ALL: [ColorMapId; 9] = [
        ColorMapId::Green,
        ColorMapId::WhiteOnBlack,
        ColorMapId::BlackOnWhite,
        ColorMapId::Sunset,
        ColorMapId::Ice,
        ColorMapId::Cherry,
        ColorMapId::Wasp,
        ColorMapId::Rainbow,
        ColorMapId::Greyscale,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColorMapId::Green => "Green",
            ColorMapId::WhiteOnBlack => "White on Black",
            ColorMapId::BlackOnWhite => "Black on White",
            ColorMapId::Sunset => "Sunset",
            ColorMapId::Ice => "Ice",
            ColorMapId::Cherry => "Cherry",
            ColorMapId::Wasp => "Wasp",
            ColorMapId::Rainbow => "Rainbow",
            ColorMapId::Greyscale => "Greyscale",
        }
    }

    /// Palettes whose low end is near white; background pixels are drawn
    /// white instead of black for these.
    pub fn has_light_background(self) -> bool {
        matches!(self, ColorMapId::BlackOnWhite)
    }

    /// Color for `level` in `[0, 1]` (clamped).
    pub fn map(self, level: f64) -> [u8; 3] {
        let t = level.clamp(0.0, 1.0) as f32;
        match self {
            ColorMapId::Green => green(t),
            ColorMapId::WhiteOnBlack => {
                // sqrt lifts quiet detail above the black background
                let g = to_byte(t.sqrt());
                [g, g, g]
            }
            ColorMapId::BlackOnWhite => {
                let g = to_byte(1.0 - t.sqrt());
                [g, g, g]
            }
            ColorMapId::Sunset => interpolate_stops(&SUNSET, t),
            ColorMapId::Ice => interpolate_stops(&ICE, t),
            ColorMapId::Cherry => interpolate_stops(&CHERRY, t),
            ColorMapId::Wasp => wasp(t),
            ColorMapId::Rainbow => rainbow(t),
            ColorMapId::Greyscale => {
                let g = to_byte(t);
                [g, g, g]
            }
        }
    }
}

// ── Palette definitions ──────────────────────────────────────────────────────

const SUNSET: [(f32, [u8; 3]); 5] = [
    (0.0, [0, 0, 0]),
    (0.3, [80, 0, 100]),
    (0.6, [220, 40, 40]),
    (0.85, [255, 170, 20]),
    (1.0, [255, 255, 200]),
];

const ICE: [(f32, [u8; 3]); 4] = [
    (0.0, [0, 0, 0]),
    (0.4, [10, 40, 140]),
    (0.75, [60, 180, 230]),
    (1.0, [240, 255, 255]),
];

const CHERRY: [(f32, [u8; 3]); 4] = [
    (0.0, [0, 0, 0]),
    (0.35, [110, 0, 20]),
    (0.7, [230, 30, 60]),
    (1.0, [255, 230, 230]),
];

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Piecewise-linear blend between `(position, rgb)` stops sorted by position.
fn interpolate_stops(stops: &[(f32, [u8; 3])], t: f32) -> [u8; 3] {
    let Some(upper) = stops.iter().position(|(p, _)| *p >= t) else {
        return stops[stops.len() - 1].1;
    };
    if upper == 0 {
        return stops[0].1;
    }
    let (p0, c0) = stops[upper - 1];
    let (p1, c1) = stops[upper];
    let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 1.0 };
    let mut rgb = [0u8; 3];
    for i in 0..3 {
        rgb[i] = (c0[i] as f32 + f * (c1[i] as f32 - c0[i] as f32)).round() as u8;
    }
    rgb
}

/// Hermite smoothstep: smooth transition from 0 to 1 between edge0 and edge1.
fn smoothstep(x: f32, edge0: f32, edge1: f32) -> f32 {
    if edge1 <= edge0 {
        return if x >= edge0 { 1.0 } else { 0.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Dark green rising to bright green, whitening at the top.
fn green(t: f32) -> [u8; 3] {
    let white = smoothstep(t, 0.75, 1.0);
    [
        to_byte(white * 0.9),
        to_byte(0.1 + 0.9 * t.sqrt()),
        to_byte(0.05 + white * 0.8),
    ]
}

/// Black through amber to yellow, with dark stripes fading in at the top.
fn wasp(t: f32) -> [u8; 3] {
    let base = interpolate_stops(&[(0.0, [0, 0, 0]), (0.5, [200, 120, 0]), (1.0, [255, 230, 0])], t);
    let stripe = smoothstep(t, 0.6, 1.0) * (0.5 + 0.5 * (t * 40.0).sin()) * 0.3;
    base.map(|c| (c as f32 * (1.0 - stripe)).round() as u8)
}

/// Hue sweep from blue (quiet) to red (loud), darkening towards zero.
fn rainbow(t: f32) -> [u8; 3] {
    let hue = (1.0 - t) * 240.0;
    let value = smoothstep(t, 0.0, 0.15) * 0.8 + 0.2;
    hsv_to_rgb(hue, 1.0, value)
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let c = value * saturation;
    let h = (hue / 60.0).rem_euclid(6.0);
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = value - c;
    [to_byte(r + m), to_byte(g + m), to_byte(b + m)]
}
