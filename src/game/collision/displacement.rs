use crate::game::fixed_math::{sq, FixedNum, FixedVec2};
use crate::game::movement::MovableBody;
use crate::game::terrain::{MoveClass, TerrainMap, SQUARE_SIZE};

/// Quarter of the compass a heading points into: 0 = +z, 1 = +x, 2 = -z, 3 = -x.
pub fn facing_from_heading(heading: i16) -> i32 {
    ((heading as u16 as i32 + 8192) / 16384) % 4
}

/// How much of `move_dir` the unit may take from its current position.
///
/// Moves inside the current square pass through untouched unless the unit is
/// stuck. Moves into a blocked square are slid sideways along the unit's
/// right axis, one world unit at a time up to a full square, and the result
/// never exceeds the length of `move_dir`. Diagonal corner cutting between
/// two blocked squares is refused.
pub fn update_pos(
    terrain: &TerrainMap,
    mc: &MoveClass,
    body: &MovableBody,
    position_stuck: bool,
    move_dir: FixedVec2,
) -> FixedVec2 {
    let prev_pos = body.pos;
    let new_pos = prev_pos + move_dir;
    let prev_square = terrain.world_to_square(prev_pos);
    let new_square = terrain.world_to_square(new_pos);

    if !position_stuck && prev_square == new_square {
        return move_dir;
    }

    let is_open = |pos: FixedVec2| terrain.is_square_open(mc, pos);
    let square_point = |(x, z): (i32, i32)| FixedVec2::from_int(x * SQUARE_SIZE + 1, z * SQUARE_SIZE + 1);

    if is_open(new_pos) {
        let (dx, dz) = (new_square.0 - prev_square.0, new_square.1 - prev_square.1);
        if dx != 0 && dz != 0 {
            let check_x = (new_square.0 - dx.signum(), new_square.1);
            let check_z = (new_square.0, new_square.1 - dz.signum());
            if !is_open(square_point(check_x)) && !is_open(square_point(check_z)) {
                return FixedVec2::ZERO;
            }
        }
        return move_dir;
    }

    let speed = move_dir.length();
    let try_to_move = |target: FixedVec2, offset: FixedVec2, max_disp: FixedNum| -> Option<FixedVec2> {
        let mut from_prev = (target + offset) - prev_pos;
        if max_disp > FixedNum::ZERO && from_prev.length_squared() > sq(max_disp) {
            from_prev = from_prev.normalize() * max_disp;
        }
        let test_pos = prev_pos + from_prev;
        (terrain.world_to_square(test_pos) != new_square && is_open(test_pos)).then_some(from_prev)
    };

    let right = body.right();
    let slid = (1..=SQUARE_SIZE).find_map(|n| {
        let offset = right * FixedNum::from_num(n);
        try_to_move(new_pos, offset, FixedNum::ZERO).or_else(|| try_to_move(new_pos, -offset, FixedNum::ZERO))
    });
    let Some(resultant) = slid else {
        return FixedVec2::ZERO;
    };

    let open_square = terrain.world_to_square(prev_pos + resultant);
    let (dx, dz) = (open_square.0 - prev_square.0, open_square.1 - prev_square.1);

    if dx != 0 && dz != 0 {
        // slide along the axis closest to the facing instead of cutting the corner
        let (axis, displacement) = if facing_from_heading(body.heading) % 2 == 0 {
            (FixedVec2::new(FixedNum::ONE, FixedNum::ZERO), resultant.x)
        } else {
            (FixedVec2::new(FixedNum::ZERO, FixedNum::ONE), resultant.y)
        };
        let side = if displacement < FixedNum::ZERO { -FixedNum::ONE } else { FixedNum::ONE };
        let offset = axis * ((displacement * side).min(speed) * side);
        return if is_open(prev_pos + offset) { offset } else { FixedVec2::ZERO };
    }

    if resultant.length_squared() > sq(speed) {
        return try_to_move(prev_pos, resultant, speed).unwrap_or(FixedVec2::ZERO);
    }
    resultant
}
