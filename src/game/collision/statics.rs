use crate::game::fixed_math::{sign, FixedNum, FixedVec2};
use crate::game::movement::{MovableBody, MovementController};
use crate::game::terrain::{MoveClass, TerrainMap};

/// Half diagonal of one map square.
const SQUARE_RADIUS: f64 = 5.656854;

/// A contact the collider cannot push out of the way.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticContact {
    pub collidee_pos: FixedVec2,
    pub collider_radius: FixedNum,
    pub collidee_radius: FixedNum,
    /// Collider position minus collidee position.
    pub separation: FixedVec2,
    pub can_request_path: bool,
    /// Respond to the structure squares around the collider instead of the object.
    pub check_yardmap: bool,
    /// Respond to impassable terrain squares around the collider.
    pub check_terrain: bool,
}

impl StaticContact {
    pub fn terrain(collider_pos: FixedVec2, collider_radius: FixedNum, can_request_path: bool) -> Self {
        Self {
            collidee_pos: collider_pos,
            collider_radius,
            collidee_radius: FixedNum::ZERO,
            separation: FixedVec2::ZERO,
            can_request_path,
            check_yardmap: false,
            check_terrain: true,
        }
    }
}

impl MovementController {
    /// Slides the unit along a static obstacle. Adds to `force_from_static`
    /// and returns whether the caller should schedule a repath.
    pub fn handle_static_object_collision(
        &mut self,
        body: &MovableBody,
        mc: &MoveClass,
        terrain: &TerrainMap,
        contact: &StaticContact,
    ) -> bool {
        let check_terrain = contact.check_terrain && body.state.moving && !body.state.off_ground();
        if contact.check_yardmap || check_terrain {
            return self.square_collision(body, mc, terrain, contact, check_terrain);
        }
        if contact.check_terrain {
            return false;
        }

        let right = body.right();
        let sep_distance = contact.separation.length() + FixedNum::from_num(0.1);
        let pen_distance = (sep_distance - (contact.collider_radius + contact.collidee_radius)).min(FixedNum::ZERO);
        let slide_sign = -sign(contact.collidee_pos.dot(right) - body.pos.dot(right));

        let strafe = self.current_speed.min((-pen_distance / FixedNum::from_num(2)).max(FixedNum::ZERO));
        let bounce = self.current_speed.min((-pen_distance).max(FixedNum::ZERO));

        self.force_from_static += right * (slide_sign * strafe) + contact.separation / sep_distance * bounce;
        self.limit_speed_for_turning = 2;

        contact.can_request_path && pen_distance < FixedNum::ZERO
    }

    /// Square-by-square response around the collider's next position.
    fn square_collision(
        &mut self,
        body: &MovableBody,
        mc: &MoveClass,
        terrain: &TerrainMap,
        contact: &StaticContact,
        check_terrain: bool,
    ) -> bool {
        let pos = body.pos;
        let vel = body.velocity;
        let right = body.right();
        let collider_radius = contact.collider_radius;

        let (xmid, zmid) = terrain.world_to_square(pos + vel);
        let (xsquare, zsquare) = terrain.world_to_square(pos);
        let xsizeh = mc.xsize >> 1;
        let zsizeh = mc.zsize >> 1;

        let widen = contact.check_yardmap || (check_terrain && mc.allow_terrain_collisions);
        let (xsh, zsh) = if widen { (xsizeh, zsizeh) } else { (0, 0) };

        let in_footprint = |x: i32, z: i32| {
            (xsquare - xsizeh..=xsquare + xsizeh).contains(&x) && (zsquare - zsizeh..=zsquare + zsizeh).contains(&z)
        };

        let mut intersect_distance = FixedNum::ZERO;
        let mut intersect_sum = FixedVec2::ZERO;
        let mut intersect_count = 0;

        let mut bounce_vec = FixedVec2::ZERO;
        let mut sum_pos = FixedVec2::ZERO;
        let mut pen_sum = FixedNum::ZERO;
        let mut pen_count = 0;

        for z in (-1).min(-zsh)..=1.max(zsh) {
            for x in (-1).min(-xsh)..=1.max(xsh) {
                let (xabs, zabs) = (xmid + x, zmid + z);

                if check_terrain && terrain.square_speed_mod(xabs, zabs) > FixedNum::ZERO {
                    continue;
                }
                if contact.check_yardmap && !(terrain.in_bounds(xabs, zabs) && terrain.is_structure_blocked(xabs, zabs)) {
                    continue;
                }

                let square_pos = terrain.square_center(xabs, zabs);
                let square_vec = pos - square_pos;
                let sep_distance = square_vec.length() + FixedNum::from_num(0.1);
                let pen_distance =
                    (sep_distance - (collider_radius + FixedNum::from_num(SQUARE_RADIUS))).min(FixedNum::ZERO);

                if in_footprint(xabs, zabs) {
                    if mc.xsize > 1 {
                        intersect_distance = intersect_distance.min(pen_distance);
                        intersect_sum += square_pos;
                        intersect_count += 1;
                    }
                    if contact.check_yardmap {
                        self.flags.position_stuck = true;
                    }
                }

                // squares the unit is already moving away from
                if square_vec.dot(vel) > FixedNum::ZERO {
                    continue;
                }

                bounce_vec += right * right.dot(square_vec / sep_distance);
                pen_sum += pen_distance;
                pen_count += 1;
                sum_pos += square_pos;
            }
        }

        if intersect_count > 0 {
            let avg = intersect_sum / FixedNum::from_num(intersect_count);
            let push_speed = (-intersect_distance).min(self.max_speed);
            self.force_from_static += (pos - avg).normalize() * push_speed;
        }

        if pen_count == 0 {
            return false;
        }

        let count = FixedNum::from_num(pen_count);
        let avg_pos = sum_pos / count;
        let avg_pen = pen_sum / count;

        let strafe_sign = -sign(avg_pos.dot(right) - pos.dot(right));
        let bounce_sign = sign(right.dot(bounce_vec));
        let scale = self
            .max_speed
            .min((-avg_pen / FixedNum::from_num(2)).max(FixedNum::from_num(0.1)));

        let summed = right * (strafe_sign * scale) + right * (bounce_sign * scale);
        self.force_from_static += summed;
        self.limit_speed_for_turning = 2;

        contact.can_request_path && !summed.is_zero()
    }
}
