//! 16-bit headings.
//!
//! A full turn is 65536 units; the value wraps, so `i16` arithmetic with
//! wrapping subtraction gives the signed shortest-turn delta for free.
//! Heading 0 faces +z and the facing vector is `(sin h, cos h)`.

use std::f64::consts::{FRAC_PI_2, PI};

use super::{FixedNum, FixedVec2};

/// Heading units per full revolution.
pub const HEADING_UNITS: i64 = 65536;
/// Half a revolution; the largest representable turn.
pub const MAX_HEADING: i64 = 32768;

const QUARTER: i64 = HEADING_UNITS / 4;

/// sin(r * pi/2 / QUARTER) for r in [0, QUARTER], Taylor series through x^9.
fn sin_quarter(r: i64) -> FixedNum {
    let x = FixedNum::from_num(r) * FixedNum::from_num(FRAC_PI_2) / FixedNum::from_num(QUARTER);
    let x2 = x * x;
    let one = FixedNum::ONE;
    let t = one - x2 / FixedNum::from_num(72);
    let t = one - x2 / FixedNum::from_num(42) * t;
    let t = one - x2 / FixedNum::from_num(20) * t;
    let t = one - x2 / FixedNum::from_num(6) * t;
    (x * t).min(one)
}

fn sin_units(angle: i64) -> FixedNum {
    let a = angle.rem_euclid(HEADING_UNITS);
    let r = a % QUARTER;
    match a / QUARTER {
        0 => sin_quarter(r),
        1 => sin_quarter(QUARTER - r),
        2 => -sin_quarter(r),
        _ => -sin_quarter(QUARTER - r),
    }
}

/// Unit facing vector for a heading.
pub fn heading_to_vec(heading: i16) -> FixedVec2 {
    let h = heading as i64;
    FixedVec2::new(sin_units(h), sin_units(h + QUARTER))
}

/// atan(z) for z in [0, 1], minimax polynomial (|err| < 1e-5).
fn atan_unit(z: FixedNum) -> FixedNum {
    let z2 = z * z;
    let p = FixedNum::from_num(0.0208351);
    let p = FixedNum::from_num(-0.0851330) + z2 * p;
    let p = FixedNum::from_num(0.1801410) + z2 * p;
    let p = FixedNum::from_num(-0.3302995) + z2 * p;
    let p = FixedNum::from_num(0.9998660) + z2 * p;
    z * p
}

/// Heading that faces along `dir`. A zero vector maps to heading 0.
pub fn vec_to_heading(dir: FixedVec2) -> i16 {
    let (dx, dz) = (dir.x, dir.y);
    let (ax, az) = (dx.abs(), dz.abs());
    if ax == FixedNum::ZERO && az == FixedNum::ZERO {
        return 0;
    }

    let mut angle = if ax <= az {
        atan_unit(ax / az)
    } else {
        FixedNum::from_num(FRAC_PI_2) - atan_unit(az / ax)
    };
    if dz < FixedNum::ZERO {
        angle = FixedNum::from_num(PI) - angle;
    }
    if dx < FixedNum::ZERO {
        angle = -angle;
    }

    let units = (angle * FixedNum::from_num(MAX_HEADING) / FixedNum::from_num(PI))
        .round()
        .to_num::<i64>();
    units.rem_euclid(HEADING_UNITS) as u16 as i16
}

/// Signed shortest turn from `from` to `to`.
#[inline]
pub fn heading_delta(to: i16, from: i16) -> i16 {
    to.wrapping_sub(from)
}
