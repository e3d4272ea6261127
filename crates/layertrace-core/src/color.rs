//! Color handling for block diagrams
//!
//! This module provides the [`Color`] type, a thin wrapper around the
//! `DynamicColor` type from the color crate, and the [`Palette`] that assigns
//! a fill color to every [`BlockKind`].

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    str::FromStr,
};

use color::DynamicColor;

use crate::block::BlockKind;

/// Wrapper around the `DynamicColor` type from the color crate
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Color {
    color: DynamicColor,
}

impl Eq for Color {}

impl Hash for Color {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

impl Color {
    /// Create a new `Color` from a string
    /// This will parse CSS color strings such as "#ff0000", "rgb(255, 0, 0)", "red", etc.
    ///
    /// # Examples
    ///
    /// ```
    /// use layertrace_core::color::Color;
    ///
    /// let red = Color::new("#ff0000").unwrap();
    /// let blue = Color::new("blue").unwrap();
    /// assert_ne!(red, blue);
    /// ```
    pub fn new(color_str: &str) -> Result<Self, String> {
        match DynamicColor::from_str(color_str) {
            Ok(color) => Ok(Self { color }),
            Err(err) => Err(format!("invalid color `{color_str}`: {err}")),
        }
    }

    /// Returns the color as 8-bit sRGB components.
    ///
    /// Renderers that define colors numerically (e.g. `rgb,255:red,..`) use this.
    pub fn to_rgb8(self) -> [u8; 3] {
        let rgba = self.color.to_alpha_color::<color::Srgb>().to_rgba8();
        [rgba.r, rgba.g, rgba.b]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new("black").expect("'black' is a valid CSS color")
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.color)
    }
}

/// Fill colors for every block kind plus the edge color.
///
/// Fused blocks are drawn with the fill of their transform kind and a band in
/// the [`BlockKind::Activation`] color.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    fills: HashMap<BlockKind, Color>,
    edge: Color,
}

impl Palette {
    /// Returns the fill color for `kind`.
    pub fn fill(&self, kind: BlockKind) -> Color {
        self.fills.get(&kind).copied().unwrap_or_default()
    }

    /// Returns the color of the band drawn on fused blocks.
    pub fn band(&self) -> Color {
        self.fill(BlockKind::Activation)
    }

    /// Returns the color used for connection arrows.
    pub fn edge(&self) -> Color {
        self.edge
    }

    /// Replaces the fill color for `kind`.
    pub fn set_fill(&mut self, kind: BlockKind, color: Color) {
        self.fills.insert(kind, color);
    }

    /// Replaces the connection color.
    pub fn set_edge(&mut self, color: Color) {
        self.edge = color;
    }

    /// Iterates over all fills in [`BlockKind::ALL`] order.
    pub fn fills(&self) -> impl Iterator<Item = (BlockKind, Color)> + '_ {
        BlockKind::ALL
            .into_iter()
            .map(|kind| (kind, self.fill(kind)))
    }
}

impl Default for Palette {
    fn default() -> Self {
        let defaults = [
            (BlockKind::Conv, "#ffd232"),
            (BlockKind::Norm, "#c40000"),
            (BlockKind::Pool, "#c80000"),
            (BlockKind::Linear, "#ff00ff"),
            (BlockKind::Recurrent, "#000080"),
            (BlockKind::Embedding, "#000080"),
            (BlockKind::Dropout, "#ff0000"),
            (BlockKind::Activation, "#ff6400"),
            (BlockKind::ImageInput, "#ffffff"),
            (BlockKind::VectorInput, "#008000"),
        ];

        let fills = defaults
            .into_iter()
            .map(|(kind, hex)| {
                (
                    kind,
                    Color::new(hex).expect("default palette colors are valid"),
                )
            })
            .collect();

        Self {
            fills,
            edge: Color::new("#555555").expect("default edge color is valid"),
        }
    }
}
