use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use super::FixedNum;

/// A vector on the ground plane. `x` is world x, `y` is world z.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: FixedNum,
    pub y: FixedNum,
}

impl FixedVec2 {
    pub const ZERO: Self = Self { x: FixedNum::ZERO, y: FixedNum::ZERO };

    pub fn new(x: FixedNum, y: FixedNum) -> Self {
        Self { x, y }
    }

    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
        }
    }

    pub fn from_int(x: i32, y: i32) -> Self {
        Self {
            x: FixedNum::from_num(x),
            y: FixedNum::from_num(y),
        }
    }

    /// Lossy conversion for logging and presentation only.
    pub fn to_vec2(self) -> Vec2 {
        Vec2::new(self.x.to_num(), self.y.to_num())
    }

    pub fn length_squared(self) -> FixedNum {
        self.x * self.x + self.y * self.y
    }

    pub fn length(self) -> FixedNum {
        let len_sq = self.length_squared();
        if len_sq <= FixedNum::ZERO {
            return FixedNum::ZERO;
        }
        len_sq.sqrt()
    }

    pub fn distance_squared(self, other: Self) -> FixedNum {
        (self - other).length_squared()
    }

    pub fn distance(self, other: Self) -> FixedNum {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == FixedNum::ZERO {
            Self::ZERO
        } else {
            Self { x: self.x / len, y: self.y / len }
        }
    }

    pub fn dot(self, other: Self) -> FixedNum {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(self, other: Self) -> FixedNum {
        self.x * other.y - self.y * other.x
    }

    /// Right-hand side direction for a facing vector: `front x up` on the ground plane.
    pub fn right(self) -> Self {
        Self { x: -self.y, y: self.x }
    }

    /// Linear interpolation `self + (other - self) * alpha`.
    pub fn mix(self, other: Self, alpha: FixedNum) -> Self {
        self + (other - self) * alpha
    }

    pub fn is_zero(self) -> bool {
        self.x == FixedNum::ZERO && self.y == FixedNum::ZERO
    }

    /// Component-wise clamp into `[min, max]`.
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self {
            x: self.x.max(min.x).min(max.x),
            y: self.y.max(min.y).min(max.y),
        }
    }
}

impl Add for FixedVec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl AddAssign for FixedVec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for FixedVec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl SubAssign for FixedVec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<FixedNum> for FixedVec2 {
    type Output = Self;
    fn mul(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

impl MulAssign<FixedNum> for FixedVec2 {
    fn mul_assign(&mut self, rhs: FixedNum) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

impl Div<FixedNum> for FixedVec2 {
    type Output = Self;
    fn div(self, rhs: FixedNum) -> Self::Output {
        Self { x: self.x / rhs, y: self.y / rhs }
    }
}

impl Neg for FixedVec2 {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self { x: -self.x, y: -self.y }
    }
}
