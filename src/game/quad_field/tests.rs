use super::*;
use crate::game::quad_field::scratch::QueryScratchPool;
use crate::game::solid::{ObjectKind, PhysicalState, SolidFilter, SolidObject, SolidTable};
use rustc_hash::FxHashSet;

fn v(x: f32, z: f32) -> FixedVec2 {
    FixedVec2::from_f32(x, z)
}

fn n(x: f32) -> FixedNum {
    FixedNum::from_num(x)
}

fn field() -> QuadField {
    QuadField::new(1024, 1024, 128, 4).unwrap()
}

fn unit_at(pos: FixedVec2, radius: f32) -> SolidObject {
    SolidObject {
        kind: ObjectKind::Unit,
        pos,
        radius: n(radius),
        mobile: true,
        ..Default::default()
    }
}

#[test]
fn test_init_rejects_bad_dimensions() {
    assert_eq!(QuadField::new(1000, 1024, 128, 1).unwrap_err(), QuadFieldError::NotDivisible { extent: 1000, quad_size: 128 });
    assert_eq!(QuadField::new(1024, 1024, 0, 1).unwrap_err(), QuadFieldError::InvalidQuadSize(0));
    assert_eq!(QuadField::new(1024, 1024, 128, 0).unwrap_err(), QuadFieldError::NoFactions);

    let qf = field();
    assert_eq!(qf.num_quads_x(), 8);
    assert_eq!(qf.num_quads(), 64);
}

#[test]
fn test_ray_inside_single_quad_returns_one_index() {
    let qf = field();
    let quads = qf.quads_on_ray(v(10.0, 10.0), v(1.0, 0.0), n(10.0));
    assert_eq!(quads.as_slice(), &[qf.world_pos_to_quad_idx(v(10.0, 10.0))]);
}

#[test]
fn test_ray_along_z_walks_rows() {
    let qf = field();
    let quads = qf.quads_on_ray(v(10.0, 10.0), v(0.0, 1.0), n(300.0));
    assert_eq!(quads.as_slice(), &[0, 8, 16]);
}

#[test]
fn test_ray_along_x_stays_in_row() {
    let qf = field();
    let quads = qf.quads_on_ray(v(500.0, 140.0), v(-1.0, 0.0), n(300.0));
    // x from 500 down to 200: columns 1..=3 of row 1.
    assert_eq!(quads.as_slice(), &[9, 10, 11]);
}

#[test]
fn test_diagonal_ray_covers_both_ends() {
    let qf = field();
    let dir = v(1.0, 1.0).normalize();
    let start = v(10.0, 10.0);
    let len = n(400.0);
    let quads = qf.quads_on_ray(start, dir, len);

    assert_eq!(quads[0], qf.world_pos_to_quad_idx(start));
    assert!(quads.contains(&qf.world_pos_to_quad_idx(start + dir * len)));
    // Row-major and strictly increasing for a ray heading +x/+z.
    assert!(quads.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_ray_leaving_map_is_clamped() {
    let qf = field();
    let quads = qf.quads_on_ray(v(1000.0, 1000.0), v(0.0, 1.0), n(500.0));
    assert!(quads.iter().all(|&q| q < qf.num_quads()));
    assert_eq!(*quads.last().unwrap(), 63);
}

#[test]
fn test_wide_ray_without_row_change_is_padded_rectangle() {
    let qf = field();
    let wide = qf.quads_on_wide_ray(v(200.0, 200.0), v(1.0, 0.0), n(100.0), n(80.0));
    let rect = qf.quads_in_rectangle(v(120.0, 120.0), v(380.0, 280.0));
    assert_eq!(wide.as_slice(), rect.as_slice());
}

#[test]
fn test_wide_ray_is_superset_of_thin_ray() {
    let qf = field();
    let dir = v(0.6, 0.8);
    let start = v(100.0, 50.0);
    let thin = qf.quads_on_ray(start, dir, n(600.0));
    let wide = qf.quads_on_wide_ray(start, dir, n(600.0), n(40.0));
    for q in thin.iter() {
        assert!(wide.contains(q), "wide ray lost quad {}", q);
    }
    assert!(wide.len() >= thin.len());
}

#[test]
fn test_circle_query_is_idempotent_and_row_major() {
    let qf = field();
    let a = qf.quads_in_circle(v(300.0, 300.0), n(150.0)).take();
    let b = qf.quads_in_circle(v(300.0, 300.0), n(150.0)).take();
    assert_eq!(a, b);
    assert!(a.windows(2).all(|w| w[0] < w[1]));
    assert!(a.contains(&qf.world_pos_to_quad_idx(v(300.0, 300.0))));
}

#[test]
fn test_circle_query_clamps_off_map_positions() {
    let qf = field();
    let quads = qf.quads_in_circle(v(-500.0, -500.0), n(1.0));
    assert_eq!(quads.as_slice(), &[0]);
}

#[test]
fn test_rectangle_is_inclusive() {
    let qf = field();
    let quads = qf.quads_in_rectangle(v(0.0, 0.0), v(128.0, 0.0));
    assert_eq!(quads.as_slice(), &[0, 1]);
}

#[test]
fn test_membership_matches_circle_query() {
    let mut qf = field();
    let mut rng = fastrand::Rng::with_seed(7);
    let units: Vec<Entity> = (1..=40).map(Entity::from_bits).collect();
    let mut occupied = vec![OccupiedQuads::default(); units.len()];

    for _round in 0..25 {
        for (i, &e) in units.iter().enumerate() {
            let pos = v(rng.f32() * 1100.0 - 40.0, rng.f32() * 1100.0 - 40.0);
            let radius = n(4.0 + rng.f32() * 90.0);
            qf.moved_unit(e, (i % 4) as u8, pos, radius, &mut occupied[i]);

            let expected = qf.quads_in_circle(pos, radius);
            assert_eq!(occupied[i].0.as_slice(), expected.as_slice());
        }
        for (i, &e) in units.iter().enumerate() {
            for qi in 0..qf.num_quads() {
                let listed = qf.quad(qi).units.contains(&e);
                let in_faction = qf.quad(qi).faction_units[i % 4].contains(&e);
                let cached = occupied[i].0.contains(&qi);
                assert_eq!(listed, cached);
                assert_eq!(in_faction, cached);
            }
        }
    }
}

#[test]
fn test_insert_remove_round_trip_restores_quads() {
    let mut qf = field();
    let mut occ_a = OccupiedQuads::default();
    let mut occ_b = OccupiedQuads::default();
    qf.insert_unit(Entity::from_bits(1), 0, v(200.0, 200.0), n(60.0), &mut occ_a);
    qf.add_feature(Entity::from_bits(2), v(250.0, 260.0), n(30.0));

    let before: Vec<Quad> = qf.quads().to_vec();
    qf.insert_unit(Entity::from_bits(3), 1, v(230.0, 210.0), n(90.0), &mut occ_b);
    assert_ne!(qf.quads(), before.as_slice());
    qf.remove_unit(Entity::from_bits(3), 1, &mut occ_b);
    assert_eq!(qf.quads(), before.as_slice());

    qf.add_feature(Entity::from_bits(4), v(10.0, 900.0), n(12.0));
    qf.remove_feature(Entity::from_bits(4), v(10.0, 900.0), n(12.0));
    assert_eq!(qf.quads(), before.as_slice());
}

#[test]
fn test_insert_and_remove_are_idempotent() {
    let mut qf = field();
    let e = Entity::from_bits(9);
    let mut occ = OccupiedQuads::default();
    assert!(qf.insert_unit(e, 0, v(64.0, 64.0), n(8.0), &mut occ));
    assert!(!qf.insert_unit(e, 0, v(64.0, 64.0), n(8.0), &mut occ));
    assert_eq!(qf.total_entries(), 1);

    qf.add_feature(Entity::from_bits(10), v(64.0, 64.0), n(8.0));
    qf.add_feature(Entity::from_bits(10), v(64.0, 64.0), n(8.0));
    assert_eq!(qf.total_entries(), 2);

    qf.remove_unit(e, 0, &mut occ);
    qf.remove_unit(e, 0, &mut occ);
    qf.remove_feature(Entity::from_bits(11), v(64.0, 64.0), n(8.0));
    assert_eq!(qf.total_entries(), 1);
    assert_eq!(qf.non_empty_quads(), 1);

    let quad = qf.quad_contents(0).unwrap();
    assert_eq!(quad.features, vec![Entity::from_bits(10)]);
    assert!(quad.units.is_empty());
    assert!(qf.quad_contents(qf.num_quads()).is_none());
}

#[test]
fn test_units_in_radius_is_exact_and_deduplicated() {
    let mut qf = field();
    let mut table = SolidTable::default();
    let near = Entity::from_bits(1);
    let wide = Entity::from_bits(2);
    let far = Entity::from_bits(3);

    for (e, pos, r) in [(near, v(130.0, 130.0), 5.0), (wide, v(256.0, 256.0), 100.0), (far, v(400.0, 130.0), 5.0)] {
        let mut occ = OccupiedQuads::default();
        qf.insert_unit(e, 0, pos, n(r), &mut occ);
        table.insert(e, unit_at(pos, r));
    }

    let found = qf.units_in_radius(v(150.0, 150.0), n(60.0), &table);
    assert_eq!(found.as_slice(), &[near, wide]);

    let all = qf.units_in_quads(v(150.0, 150.0), n(60.0));
    assert_eq!(all.iter().filter(|e| **e == wide).count(), 1);

    let rect = qf.units_in_rectangle(v(100.0, 100.0), v(300.0, 300.0), &table);
    assert_eq!(rect.len(), 2);
}

#[test]
fn test_faction_query_only_returns_faction() {
    let mut qf = field();
    let mut table = SolidTable::default();
    for (bits, faction) in [(1u64, 0u8), (2, 1), (3, 1)] {
        let e = Entity::from_bits(bits);
        let pos = v(300.0 + bits as f32, 300.0);
        let mut occ = OccupiedQuads::default();
        qf.insert_unit(e, faction, pos, n(8.0), &mut occ);
        table.insert(e, SolidObject { faction, ..unit_at(pos, 8.0) });
    }
    let found = qf.faction_units_in_radius(v(300.0, 300.0), n(20.0), 1, &table);
    assert_eq!(found.as_slice(), &[Entity::from_bits(2), Entity::from_bits(3)]);
}

#[test]
fn test_solids_filter_and_no_solids() {
    let mut qf = field();
    let mut table = SolidTable::default();
    let ghost = Entity::from_bits(1);
    let rock = Entity::from_bits(2);

    let mut occ = OccupiedQuads::default();
    qf.insert_unit(ghost, 0, v(500.0, 500.0), n(10.0), &mut occ);
    table.insert(ghost, SolidObject { state: PhysicalState::default(), ..unit_at(v(500.0, 500.0), 10.0) });
    qf.add_feature(rock, v(520.0, 500.0), n(10.0));
    table.insert(rock, SolidObject { kind: ObjectKind::Feature, mobile: false, ..unit_at(v(520.0, 500.0), 10.0) });

    let any = qf.solids_in_radius(v(510.0, 500.0), n(5.0), SolidFilter::ANY, &table);
    assert_eq!(any.as_slice(), &[ghost, rock]);
    let blocking = qf.solids_in_radius(v(510.0, 500.0), n(5.0), SolidFilter::BLOCKING, &table);
    assert_eq!(blocking.as_slice(), &[rock]);

    assert!(!qf.no_solids_in_radius(v(510.0, 500.0), n(5.0), SolidFilter::BLOCKING, &table));
    assert!(qf.no_solids_in_radius(v(800.0, 800.0), n(5.0), SolidFilter::ANY, &table));
}

#[test]
fn test_projectile_membership() {
    let mut qf = field();
    let mut table = SolidTable::default();
    let shell = Entity::from_bits(1);
    let beam = Entity::from_bits(2);
    let mut shell_occ = OccupiedQuads::default();
    let mut beam_occ = OccupiedQuads::default();

    qf.add_projectile(shell, v(10.0, 10.0), v(1.0, 0.0), n(5.0), false, &mut shell_occ);
    qf.add_projectile(beam, v(10.0, 10.0), v(0.0, 1.0), n(300.0), true, &mut beam_occ);
    assert_eq!(shell_occ.0.as_slice(), &[0]);
    assert_eq!(beam_occ.0.as_slice(), &[0, 8, 16]);

    qf.moved_projectile(shell, v(140.0, 10.0), false, &mut shell_occ);
    assert_eq!(shell_occ.0.as_slice(), &[1]);
    assert!(!qf.quad(0).projectiles.contains(&shell));

    qf.moved_projectile(beam, v(900.0, 900.0), true, &mut beam_occ);
    assert_eq!(beam_occ.0.len(), 3);

    table.insert(shell, SolidObject { kind: ObjectKind::Projectile, ..unit_at(v(140.0, 10.0), 1.0) });
    let hits = qf.projectiles_in_radius(v(142.0, 10.0), n(3.0), &table);
    assert_eq!(hits.as_slice(), &[shell]);

    qf.remove_projectile(beam, &mut beam_occ);
    assert!(qf.quad(8).projectiles.is_empty());
}

#[test]
fn test_repulser_membership_tracks_moves() {
    let mut qf = field();
    let shield = Entity::from_bits(5);
    let mut occ = OccupiedQuads::default();
    assert!(qf.moved_repulser(shield, v(64.0, 64.0), n(20.0), &mut occ));
    assert!(!qf.moved_repulser(shield, v(64.0, 64.0), n(20.0), &mut occ));
    assert!(qf.moved_repulser(shield, v(700.0, 700.0), n(20.0), &mut occ));
    assert!(qf.quad(0).repulsers.is_empty());
    qf.remove_repulser(shield, &mut occ);
    assert_eq!(qf.total_entries(), 0);
}

#[test]
fn test_scratch_leases_are_balanced() {
    let qf = field();
    let table = SolidTable::default();
    {
        let _a = qf.quads_in_circle(v(10.0, 10.0), n(300.0));
        let _b = qf.units_in_radius(v(10.0, 10.0), n(300.0), &table);
        assert_eq!(QueryScratchPool::in_use::<Vec<usize>>(), 1);
        assert_eq!(QueryScratchPool::in_use::<Vec<Entity>>(), 1);
    }
    assert_eq!(QueryScratchPool::in_use::<Vec<usize>>(), 0);
    assert_eq!(QueryScratchPool::in_use::<Vec<Entity>>(), 0);
    assert_eq!(QueryScratchPool::in_use::<FxHashSet<Entity>>(), 0);
    assert!(QueryScratchPool::parked::<Vec<usize>>() >= 1);
}
