use crate::game::fixed_math::{clamp, sign, FixedNum, FixedVec2};
use crate::game::terrain::SQUARE_SIZE;

/// What the push computation needs to know about one party.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PushBody {
    pub speed: FixedNum,
    pub radius: FixedNum,
    pub mass: FixedNum,
    pub front: FixedVec2,
}

/// Keeps either party from taking all or none of a push.
fn scale_range(v: FixedNum) -> FixedNum {
    clamp(v, FixedNum::from_num(0.01), FixedNum::from_num(0.99))
}

/// Misalignment factor: 1 when `front` is parallel to `dir`, 6 when broadside.
fn misalignment(front: FixedVec2, dir: FixedVec2) -> FixedNum {
    FixedNum::ONE + (FixedNum::ONE - front.dot(dir).abs()) * FixedNum::from_num(5)
}

/// The collider's share of separating two overlapping bodies, plus a small
/// sideways slide. `separation` points from the collidee to the collider.
///
/// Each side's share falls with its momentum score `mass * max(1, speed) *
/// misalignment`, so a unit driving straight at another is pushed less than
/// one sliding past broadside.
pub fn calculate_push_vector(
    collider: &PushBody,
    collidee: &PushBody,
    allow_overlap: bool,
    separation: FixedVec2,
) -> FixedVec2 {
    let radius_sum = collider.radius + collidee.radius;
    let collider_rel = collider.radius / radius_sum;
    let collidee_rel = collidee.radius / radius_sum;
    let collision_radius_sum = if allow_overlap {
        collider.radius * collider_rel + collidee.radius * collidee_rel
    } else {
        radius_sum
    };

    let sep_distance = separation.length() + FixedNum::from_num(0.1);
    let pen_distance = (collision_radius_sum - sep_distance).max(FixedNum::ONE);
    let sep_response = FixedNum::from_num(SQUARE_SIZE * 2).min(pen_distance / FixedNum::from_num(2));
    let sep_direction = separation / sep_distance;
    let response_vec = sep_direction * sep_response;

    let s1 = collider.mass * collider.speed.max(FixedNum::ONE) * misalignment(collider.front, -sep_direction);
    let s2 = collidee.mass * collidee.speed.max(FixedNum::ONE) * misalignment(collidee.front, sep_direction);
    let total = s1 + s2 + FixedNum::ONE;
    let r1 = s1 / total;
    let r2 = s2 / total;

    let mut mass_scale = scale_range(FixedNum::ONE - r1);
    if allow_overlap {
        mass_scale /= collider_rel;
    }

    let right = collider.front.right();
    let slide_sign = sign(separation.dot(right));
    response_vec * mass_scale + right * (slide_sign / pen_distance * r2)
}

/// Push between a unit and a moving feature. Features weigh 10000 times
/// their mass. Returns the unit's displacement and the feature's.
pub fn feature_push(
    collider: &PushBody,
    feature_radius: FixedNum,
    feature_mass: FixedNum,
    separation: FixedVec2,
) -> (FixedVec2, FixedVec2) {
    let sep_distance = separation.length() + FixedNum::from_num(0.1);
    let pen_distance = ((collider.radius + feature_radius) - sep_distance).max(FixedNum::ONE);
    let sep_response = FixedNum::from_num(SQUARE_SIZE * 2).min(pen_distance / FixedNum::from_num(2));
    let sep_direction = separation / sep_distance;
    let response_vec = sep_direction * sep_response;

    let five = FixedNum::from_num(5);
    let m1 = collider.mass;
    let m2 = feature_mass * FixedNum::from_num(10000);
    let v1 = collider.speed.max(FixedNum::ONE);
    let c1 = (FixedNum::ONE - collider.front.dot(-sep_direction).abs()) * five;
    let c2 = (FixedNum::ONE - (-collider.front).dot(sep_direction).abs()) * five;
    let s1 = m1 * v1 * c1;
    let s2 = m2 * c2;
    let total = s1 + s2 + FixedNum::ONE;

    let collider_scale = scale_range(FixedNum::ONE - s1 / total);
    let feature_scale = scale_range(FixedNum::ONE - s2 / total);
    (response_vec * collider_scale, -response_vec * feature_scale)
}
