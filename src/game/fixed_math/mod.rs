//! Deterministic fixed-point mathematics.
//!
//! Every quantity the simulation reasons about (positions, speeds, headings,
//! masses) goes through these types so that lockstep peers running on
//! different hardware compute bit-identical results.
//!
//! - **FixedNum**: the scalar type, I48F16
//! - **FixedVec2**: 2D vector on the ground plane (x, z)
//! - **heading**: 16-bit angle conversions without platform trig

use fixed::types::I48F16;

pub use heading::{heading_delta, heading_to_vec, vec_to_heading, HEADING_UNITS, MAX_HEADING};
pub use vec2::FixedVec2;

mod heading;
mod vec2;

#[cfg(test)]
mod tests;

/// Fixed-point number type used throughout the simulation.
///
/// I48F16: 48 integer bits and 16 fractional bits, a resolution of ~0.000015.
pub type FixedNum = I48F16;

/// Clamp helper that reads better at call sites than nested min/max.
#[inline]
pub fn clamp(v: FixedNum, lo: FixedNum, hi: FixedNum) -> FixedNum {
    v.max(lo).min(hi)
}

/// Square of a scalar.
#[inline]
pub fn sq(v: FixedNum) -> FixedNum {
    v * v
}

/// Sign as -1, 0 or 1.
#[inline]
pub fn sign(v: FixedNum) -> FixedNum {
    if v > FixedNum::ZERO {
        FixedNum::ONE
    } else if v < FixedNum::ZERO {
        -FixedNum::ONE
    } else {
        FixedNum::ZERO
    }
}
