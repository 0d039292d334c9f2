use bevy::prelude::*;

use super::displacement::update_pos;
use super::push::{calculate_push_vector, feature_push, PushBody};
use super::sat::{check_collision, Footprint};
use super::statics::StaticContact;
use crate::game::fixed_math::{sq, FixedNum, FixedVec2};
use crate::game::movement::{MoveContext, MoveEvent, MovableBody, MovementController, ProgressState};
use crate::game::solid::SolidObject;
use crate::game::terrain::MoveClass;

/// Footprints stretched past this use the separating-axis test.
const STRETCH_SAT_THRESHOLD: f64 = 0.1;
/// Goal radius widening for blocked followers: roughly sqrt(2) plus slack.
const TRAFFIC_DIAG_SCALE: f64 = 1.45;

/// Limits `force` to `limit` world units.
fn limit_push(force: FixedVec2, limit: FixedNum) -> FixedVec2 {
    if force.length_squared() > sq(limit) {
        force.normalize() * limit
    } else {
        force
    }
}

/// What every neighbour test needs to know about the collider.
struct Collider {
    speed: FixedNum,
    radius: FixedNum,
    footprint: Footprint,
    force_sat: bool,
}

impl Collider {
    fn push_body(&self, body: &MovableBody) -> PushBody {
        PushBody { speed: self.speed, radius: self.radius, mass: body.mass, front: body.front }
    }
}

impl MovementController {
    /// Physics step: reacts to overlapping units, features and terrain and
    /// stores the displacement for the resolve step in `resultant_force`.
    ///
    /// Reads neighbours from the snapshot only. Effects on other objects go
    /// to the outbox.
    pub fn handle_object_collisions(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext) {
        self.resultant_force = FixedVec2::ZERO;
        self.force_from_moving = FixedVec2::ZERO;
        self.force_from_static = FixedVec2::ZERO;

        if body.state.off_ground() {
            return;
        }

        let collider = Collider {
            speed: body.speed(),
            radius: mc.max_interior_radius(),
            footprint: Footprint::new(body.front, mc.half_extents()),
            force_sat: mc.axis_stretch() > FixedNum::from_num(STRETCH_SAT_THRESHOLD),
        };

        self.handle_unit_collisions(body, mc, ctx, &collider);
        self.handle_feature_collisions(body, mc, ctx, &collider);

        if mc.allow_terrain_collisions {
            let can_request = !self.flags.at_end_of_path && !self.flags.at_goal;
            let contact = StaticContact::terrain(body.pos, collider.radius, can_request);
            if self.handle_static_object_collision(body, mc, ctx.terrain, &contact) {
                self.mark_repath(ctx.frame);
            }
        }

        if self.flags.force_static_object_check {
            self.flags.position_stuck |= !ctx.terrain.test_move_square(mc, body.pos);
            self.flags.force_static_object_check = false;
        }

        let limit = self.max_speed * ctx.config.max_collision_push_multiplier;
        let try_force = limit_push(self.force_from_static + self.force_from_moving, limit);
        let mut resultant = update_pos(ctx.terrain, mc, body, self.flags.position_stuck, try_force);

        // stuck units are let through squares they are already partly in
        if resultant.is_zero() && self.flags.position_stuck {
            resultant = limit_push(self.force_from_static, limit);
        }
        self.resultant_force = resultant;
    }

    fn handle_unit_collisions(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext, collider: &Collider) {
        let config = ctx.config;
        let owner = ctx.owner;

        let impulse_sign = if self.flags.reversing { -FixedNum::ONE } else { FixedNum::ONE };
        let crush_impulse = body.velocity * (body.mass * impulse_sign);
        let collider_sep = if mc.push_resistant && !body.state.moving {
            FixedNum::ZERO
        } else {
            mc.separation_distance
        };
        let search_radius =
            collider.speed + collider.radius + ctx.move_classes.largest_footprint_half() + collider_sep;

        let neighbours = ctx.quad_field.units_in_radius(body.pos, search_radius, ctx.solids);
        for &entity in neighbours.iter() {
            if entity == owner {
                continue;
            }
            let Some(collidee) = ctx.solids.get(entity) else {
                continue;
            };
            if collidee.state.off_ground() || !collidee.state.blocking {
                continue;
            }

            let collidee_radius = collidee.half_extents.x.max(collidee.half_extents.y);
            let separation = body.pos - collidee.pos;
            let use_sat = config.allow_sep_axis_collision_test
                && (collider.force_sat
                    || (collidee.mobile && collidee.axis_stretch > FixedNum::from_num(STRETCH_SAT_THRESHOLD)));
            let collidee_footprint = Footprint::new(collidee.front, collidee.half_extents);
            let is_collision = check_collision(
                separation,
                sq(collider.radius + collidee_radius),
                &collider.footprint,
                &collidee_footprint,
                use_sat,
            );

            let mut separation_dist = FixedNum::ZERO;
            if !is_collision {
                if !collidee.mobile {
                    continue;
                }
                separation_dist = collider_sep.max(collidee.separation_distance);
                let reach = collider.radius + collidee_radius + separation_dist;
                if separation.length_squared() > sq(reach) {
                    continue;
                }
            }

            let allied = collidee.faction == body.faction;

            if is_collision {
                let may_crush = !allied || config.allow_crushing_allied_units;
                if may_crush
                    && collider.speed * body.mass > collidee.speed * collidee.mass
                    && !collidee.resists_crush(mc.crush_strength)
                {
                    trace!("[COLLISION] {:?} crushes {:?}", owner, entity);
                    self.outbox.push(MoveEvent::UnitCrushed { collidee: entity, impulse: crush_impulse });
                }
                // each pair reports once
                if owner < entity {
                    self.outbox.push(MoveEvent::UnitCollided { collidee: entity });
                }
            }

            if collidee.mobile {
                self.traffic_heuristics(body, mc, collidee);
            }

            let may_push = allied || config.allow_pushing_enemy_units;
            let push_collider = may_push && !mc.push_resistant;
            let push_collidee = collidee.mobile && may_push && !collidee.state.push_resistant;
            let is_static = !collidee.mobile || (!push_collider && !push_collidee);

            if is_collision && is_static {
                let contact = StaticContact {
                    collidee_pos: collidee.pos,
                    collider_radius: collider.radius,
                    collidee_radius,
                    separation,
                    can_request_path: !self.flags.at_end_of_path && !self.flags.at_goal,
                    check_yardmap: push_collider || push_collidee,
                    check_terrain: false,
                };
                if self.handle_static_object_collision(body, mc, ctx.terrain, &contact) {
                    self.mark_repath(ctx.frame);
                }
                continue;
            }

            if !push_collider && push_collidee {
                continue;
            }

            let mut mine = collider.push_body(body);
            let mut theirs = PushBody {
                speed: collidee.speed,
                radius: collidee_radius,
                mass: collidee.mass,
                front: collidee.front,
            };
            if !is_collision {
                let half = separation_dist / FixedNum::from_num(2);
                mine.radius += half;
                theirs.radius += half;
            }
            self.force_from_moving +=
                calculate_push_vector(&mine, &theirs, config.allow_unit_collision_overlap, separation);
        }
    }

    fn handle_feature_collisions(&mut self, body: &MovableBody, mc: &MoveClass, ctx: &MoveContext, collider: &Collider) {
        let impulse_sign = if self.flags.reversing { -FixedNum::ONE } else { FixedNum::ONE };
        let crush_impulse = body.velocity * (body.mass * impulse_sign);
        let search_radius = collider.speed + collider.radius * FixedNum::from_num(2);

        let features = ctx.quad_field.features_in_radius(body.pos, search_radius, ctx.solids);
        for &entity in features.iter() {
            let Some(feature) = ctx.solids.get(entity) else {
                continue;
            };

            let feature_radius = feature.half_extents.x.max(feature.half_extents.y);
            let separation = body.pos - feature.pos;
            let use_sat = ctx.config.allow_sep_axis_collision_test
                && (collider.force_sat || feature.axis_stretch > FixedNum::from_num(STRETCH_SAT_THRESHOLD));
            let feature_footprint = Footprint::new(feature.front, feature.half_extents);
            if !check_collision(
                separation,
                sq(collider.radius + feature_radius),
                &collider.footprint,
                &feature_footprint,
                use_sat,
            ) {
                continue;
            }
            if !feature.state.blocking {
                continue;
            }

            if !feature.resists_crush(mc.crush_strength) {
                self.outbox.push(MoveEvent::FeatureCrushed { feature: entity, impulse: crush_impulse });
            }
            self.outbox.push(MoveEvent::FeatureCollided { feature: entity });

            if !feature.state.moving {
                let contact = StaticContact {
                    collidee_pos: feature.pos,
                    collider_radius: collider.radius,
                    collidee_radius: feature_radius,
                    separation,
                    can_request_path: !self.flags.at_end_of_path && !self.flags.at_goal,
                    check_yardmap: true,
                    check_terrain: false,
                };
                if self.handle_static_object_collision(body, mc, ctx.terrain, &contact) {
                    self.mark_repath(ctx.frame);
                }
                continue;
            }

            let (mine, theirs) = feature_push(&collider.push_body(body), feature_radius, feature.mass, separation);
            self.force_from_moving += mine;
            self.outbox.push(MoveEvent::FeatureMoved { feature: entity, displacement: theirs });
        }
    }

    /// Lets a follower give up on waypoints or goals that another unit is
    /// standing on, so crowds do not queue forever for one spot.
    fn traffic_heuristics(&mut self, body: &MovableBody, mc: &MoveClass, collidee: &SolidObject) {
        if !body.state.moving || self.progress != ProgressState::Active {
            return;
        }
        let Some(mover) = collidee.mover else {
            return;
        };

        let sep = mc.separation_distance.max(collidee.separation_distance);
        let blocker_reach = mover.owner_radius + sep;

        match mover.progress {
            ProgressState::Done => {
                if collidee.state.moving {
                    return;
                }
                if self.is_at_goal_pos(collidee.pos, blocker_reach) {
                    self.trigger_call_arrived();
                } else if self.curr_waypoint.pos.distance_squared(collidee.pos) <= sq(blocker_reach) {
                    self.trigger_skip_waypoint();
                }
            }
            ProgressState::Active => {
                if mover.curr_waypoint == self.next_waypoint.pos {
                    self.trigger_skip_waypoint();
                    return;
                }
                let scale = FixedNum::from_num(TRAFFIC_DIAG_SCALE);
                let own_reach = (self.owner_radius + sep) * scale;
                let blocker_reach = blocker_reach * scale;
                if self.is_at_goal_pos(body.pos, own_reach) || self.is_at_goal_pos(collidee.pos, blocker_reach) {
                    self.trigger_call_arrived();
                } else if self.curr_waypoint.pos.distance_squared(collidee.pos) <= sq(blocker_reach) {
                    self.trigger_skip_waypoint();
                }
            }
            ProgressState::Idle | ProgressState::Failed => {}
        }
    }
}
