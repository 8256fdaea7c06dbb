//! Fixed named-colour palette used to classify dominant colours.

/// A palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
    pub name: &'static str,
    pub rgb: [u8; 3],
}

const fn named(name: &'static str, r: u8, g: u8, b: u8) -> NamedColor {
    NamedColor {
        name,
        rgb: [r, g, b],
    }
}

/// Order matters: ties resolve to the earliest entry.
pub const PALETTE: [NamedColor; 14] = [
    named("black", 0, 0, 0),
    named("white", 255, 255, 255),
    named("red", 255, 0, 0),
    named("yellow", 255, 255, 0),
    named("blue", 0, 0, 255),
    named("orange", 255, 165, 0),
    named("green", 0, 128, 0),
    named("purple", 128, 0, 128),
    named("red-orange", 255, 69, 0),
    named("yellow-orange", 255, 200, 0),
    named("yellow-green", 154, 205, 50),
    named("blue-green", 0, 128, 128),
    named("blue-purple", 138, 43, 226),
    named("red-purple", 199, 21, 133),
];

/// Euclidean distance in RGB space.
pub fn distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Nearest palette entry and its distance.
pub fn nearest(rgb: [u8; 3]) -> (&'static NamedColor, f64) {
    let mut best = &PALETTE[0];
    let mut best_distance = distance(rgb, best.rgb);
    for entry in PALETTE.iter().skip(1) {
        let d = distance(rgb, entry.rgb);
        if d < best_distance {
            best = entry;
            best_distance = d;
        }
    }
    (best, best_distance)
}

pub fn by_name(name: &str) -> Option<&'static NamedColor> {
    PALETTE.iter().find(|entry| entry.name == name)
}
