use crate::game::fixed_math::{FixedNum, FixedVec2};

/// Oriented footprint rectangle on the ground plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub front: FixedVec2,
    pub right: FixedVec2,
    /// Half extents along `right` (x) and `front` (y).
    pub half_extents: FixedVec2,
}

impl Footprint {
    pub fn new(front: FixedVec2, half_extents: FixedVec2) -> Self {
        Self { front, right: front.right(), half_extents }
    }
}

fn separating_dist(axis: FixedVec2, zdir: FixedVec2, xdir: FixedVec2, sep: FixedVec2, size: FixedVec2) -> FixedNum {
    let axis_dist = axis.dot(sep).abs();
    let xdir_dist = (axis.dot(xdir) * size.x).abs();
    let zdir_dist = (axis.dot(zdir) * size.y).abs();
    axis_dist - zdir_dist - xdir_dist
}

/// True when one of the four footprint axes separates the rectangles.
pub fn have_separating_axis(collider: &Footprint, collidee: &Footprint, separation: FixedVec2) -> bool {
    let (a, b) = (collider, collidee);
    separating_dist(a.front, b.front, b.right, separation, b.half_extents) > a.half_extents.y
        || separating_dist(a.right, b.front, b.right, separation, b.half_extents) > a.half_extents.x
        || separating_dist(b.front, a.front, a.right, separation, a.half_extents) > b.half_extents.y
        || separating_dist(b.right, a.front, a.right, separation, a.half_extents) > b.half_extents.x
}

pub fn circles_overlap(separation: FixedVec2, radius_sum_sq: FixedNum) -> bool {
    separation.length_squared() - radius_sum_sq <= FixedNum::from_num(0.01)
}

/// Circle test, refined by the separating-axis test when `use_sat` is set.
pub fn check_collision(
    separation: FixedVec2,
    radius_sum_sq: FixedNum,
    collider: &Footprint,
    collidee: &Footprint,
    use_sat: bool,
) -> bool {
    if !circles_overlap(separation, radius_sum_sq) {
        return false;
    }
    !use_sat || !have_separating_axis(collider, collidee, separation)
}
