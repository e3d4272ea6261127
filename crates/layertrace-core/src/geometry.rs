//! Geometric primitives for block layout.
//!
//! Blocks live in a right-handed three-axis space:
//!
//! ```text
//!        +Y (height)
//!         │
//!         │
//!         └──────► +X (width, sequence direction)
//!        ╱
//!       ╱
//!     +Z (depth)
//! ```
//!
//! - **X / width**: The sequence axis. Consecutive blocks are placed one after
//!   another along it.
//! - **Y / height**: The perpendicular axis on which input blocks are offset.
//! - **Z / depth**: The trailing axis of a layer's output shape.
//!
//! The same [`Vec3`] type is used for raw sizes, rendered extents, positions
//! and per-axis scale factors.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// One of the three layout axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Width,
    Height,
    Depth,
}

impl Axis {
    /// All axes, in storage order.
    pub const ALL: [Axis; 3] = [Axis::Width, Axis::Height, Axis::Depth];

    /// The axis consecutive blocks are laid out along.
    pub const SEQUENCE: Axis = Axis::Width;

    /// Returns the position of this axis in a three-element array.
    pub fn index(self) -> usize {
        match self {
            Axis::Width => 0,
            Axis::Height => 1,
            Axis::Depth => 2,
        }
    }
}

/// A vector with one `f32` component per [`Axis`].
///
/// # Examples
///
/// ```
/// # use layertrace_core::geometry::{Axis, Vec3};
/// let size = Vec3::new(16.0, 32.0, 32.0);
/// let doubled = size.scale(2.0);
/// assert_eq!(doubled.get(Axis::Height), 64.0);
///
/// let moved = Vec3::zero().with(Axis::Width, 8.0) + size;
/// assert_eq!(moved.x(), 24.0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

impl Vec3 {
    /// Creates a vector from width, height and depth components.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Creates a vector with all three components set to `value`.
    pub fn splat(value: f32) -> Self {
        Self::new(value, value, value)
    }

    /// Returns the zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Creates a vector from an `[x, y, z]` array.
    pub fn from_array(values: [f32; 3]) -> Self {
        Self::new(values[0], values[1], values[2])
    }

    /// Returns the width component.
    pub fn x(self) -> f32 {
        self.x
    }

    /// Returns the height component.
    pub fn y(self) -> f32 {
        self.y
    }

    /// Returns the depth component.
    pub fn z(self) -> f32 {
        self.z
    }

    /// Returns the component along `axis`.
    pub fn get(self, axis: Axis) -> f32 {
        match axis {
            Axis::Width => self.x,
            Axis::Height => self.y,
            Axis::Depth => self.z,
        }
    }

    /// Returns a copy of this vector with the component along `axis` replaced.
    pub fn with(mut self, axis: Axis, value: f32) -> Self {
        match axis {
            Axis::Width => self.x = value,
            Axis::Height => self.y = value,
            Axis::Depth => self.z = value,
        }
        self
    }

    /// Returns the components as `[x, y, z]`.
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Checks if all components are zero
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// Multiplies two vectors component-wise.
    pub fn component_mul(self, other: Vec3) -> Self {
        self.zip_map(other, |a, b| a * b)
    }

    /// Multiplies every component by the given factor.
    pub fn scale(self, factor: f32) -> Self {
        self.map(|v| v * factor)
    }

    /// Component-wise maximum.
    pub fn max(self, other: Vec3) -> Self {
        self.zip_map(other, f32::max)
    }

    /// Clamps every component into `[min, max]`.
    ///
    /// Unlike [`f32::clamp`] this does not panic: inverted bounds yield `max`
    /// and a NaN bound is ignored.
    pub fn clamp(self, min: f32, max: f32) -> Self {
        self.map(|v| v.max(min).min(max))
    }

    /// Applies `f` to every component.
    pub fn map(self, mut f: impl FnMut(f32) -> f32) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }

    /// Combines two vectors component-wise with `f`.
    pub fn zip_map(self, other: Vec3, mut f: impl FnMut(f32, f32) -> f32) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, other: Vec3) -> Vec3 {
        self.zip_map(other, |a, b| a + b)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, other: Vec3) -> Vec3 {
        self.zip_map(other, |a, b| a - b)
    }
}
