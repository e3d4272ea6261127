//! Accumulated scale factor.
//!
//! Blocks whose raw size differs a lot from their predecessor are rescaled so
//! the diagram stays readable. For every real block after the first, the
//! per-axis ratio to the previous block's raw size is turned into a scale
//! delta and folded into a running factor that is clipped after every update.
//!
//! - Sequence axis: the delta replaces a zero factor, accumulates when signs
//!   agree and damps the factor towards zero when they disagree.
//! - Other axes: deltas accumulate, unless some ratio reaches
//!   `ratio_threshold`; then they are forced to `-shrink_factor`.

use layertrace_core::geometry::{Axis, Vec3};

use crate::config::LayoutConfig;

/// Running per-axis scale factor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScaleState {
    factor: Option<Vec3>,
}

impl ScaleState {
    /// The current factor, `None` until the first update.
    pub fn current(&self) -> Option<Vec3> {
        self.factor
    }

    /// Folds the size change from `previous` to `active` into the factor.
    ///
    /// `active` must have its non shape-driven axes zeroed.
    pub fn update(&mut self, active: Vec3, previous: Vec3, config: &LayoutConfig) {
        let ratio = active.zip_map(previous, |a, p| {
            if p == 0.0 {
                0.0
            } else {
                let r = a / p;
                if r == 1.0 { 0.0 } else { r }
            }
        });
        let exceeds = ratio
            .to_array()
            .iter()
            .any(|r| *r >= config.ratio_threshold);

        let coefficients = Vec3::new(
            -config.width_factor / 4.0,
            config.height_depth_factor,
            config.height_depth_factor,
        );
        let delta = ratio.component_mul(coefficients);

        let acc = self.factor.unwrap_or_default();
        let sequence = damp(
            acc.get(Axis::SEQUENCE),
            delta.get(Axis::SEQUENCE),
            config.damping,
        );

        let next = Axis::ALL
            .iter()
            .filter(|axis| **axis != Axis::SEQUENCE)
            .fold(acc.with(Axis::SEQUENCE, sequence), |next, axis| {
                let value = if exceeds {
                    -config.shrink_factor
                } else {
                    acc.get(*axis) + delta.get(*axis)
                };
                next.with(*axis, value)
            });

        let [low, high] = config.clip;
        self.factor = Some(next.clamp(low, high));
    }
}

fn damp(acc: f32, delta: f32, damping: f32) -> f32 {
    if delta == 0.0 {
        acc
    } else if acc == 0.0 {
        delta
    } else if acc.signum() == delta.signum() {
        acc + delta
    } else {
        acc * (1.0 - delta.abs() * damping).max(0.0)
    }
}
