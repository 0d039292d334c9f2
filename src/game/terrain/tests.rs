use super::*;

fn pos(x: f32, z: f32) -> FixedVec2 {
    FixedVec2::from_f32(x, z)
}

#[test]
fn test_world_to_square_floors() {
    let map = TerrainMap::new(16, 16);
    assert_eq!(map.world_to_square(pos(7.9, 8.0)), (0, 1));
    assert_eq!(map.world_to_square(pos(-0.5, 3.0)), (-1, 0));
}

#[test]
fn test_off_map_squares_are_impassable() {
    let map = TerrainMap::new(4, 4);
    assert!(map.square_block(-1, 0).impassable);
    assert!(map.square_block(4, 0).impassable);
    assert!(map.square_block(3, 3).is_open());
    assert_eq!(map.pos_speed_mod(pos(40.0, 4.0)), FixedNum::ZERO);
}

#[test]
fn test_footprint_claims_are_counted() {
    let mut map = TerrainMap::new(16, 16);
    let at = map.square_center(5, 5);
    map.block_footprint(at, 2, 2);
    map.block_footprint(at, 2, 2);
    assert!(map.is_structure_blocked(5, 5));

    map.unblock_footprint(at, 2, 2);
    assert!(map.is_structure_blocked(5, 5), "second claim still holds the square");

    map.unblock_footprint(at, 2, 2);
    assert!(!map.is_structure_blocked(5, 5));
}

#[test]
fn test_move_square_respects_footprint() {
    let mut map = TerrainMap::new(16, 16);
    let mc = MoveClass { xsize: 3, zsize: 3, ..Default::default() };
    map.block_footprint(map.square_center(8, 8), 1, 1);

    // Centre two squares away: the 3x3 footprint does not reach square 8.
    assert!(map.test_move_square(&mc, map.square_center(6, 8)));
    // One square away: footprint overlaps the blocked square.
    assert!(!map.test_move_square(&mc, map.square_center(7, 8)));
}

#[test]
fn test_raw_line_clear_detects_wall() {
    let mut map = TerrainMap::new(32, 32);
    let mc = MoveClass { xsize: 1, zsize: 1, ..Default::default() };
    map.set_impassable_rect(10, 0, 10, 31);

    let from = map.square_center(5, 5);
    assert!(map.raw_line_clear(&mc, from, map.square_center(9, 20)));
    assert!(!map.raw_line_clear(&mc, from, map.square_center(15, 5)));
}

#[test]
fn test_move_class_geometry() {
    let mc = MoveClass { xsize: 4, zsize: 2, ..Default::default() };
    assert_eq!(mc.max_interior_radius(), FixedNum::from_num(16));
    let ext = mc.min_exterior_radius().to_num::<f64>();
    assert!((ext - 20f64.sqrt() * 4.0).abs() < 1e-3);
    assert_eq!(mc.axis_stretch(), FixedNum::from_num(2) / FixedNum::from_num(6));
    assert_eq!(mc.half_extents(), FixedVec2::from_int(16, 8));
}

#[test]
fn test_sanitize_clamps_rates() {
    let mc = MoveClass {
        turn_rate: 0,
        acc_rate: FixedNum::ZERO,
        dec_rate: FixedNum::from_num(-1),
        mass: FixedNum::ZERO,
        ..Default::default()
    }
    .sanitized();
    assert_eq!(mc.turn_rate, 1);
    assert_eq!(mc.acc_rate, FixedNum::from_num(0.01));
    assert_eq!(mc.dec_rate, FixedNum::from_num(0.01));
    assert_eq!(mc.mass, FixedNum::ONE);
}

#[test]
fn test_registry_largest_footprint() {
    let mut reg = MoveClassRegistry::default();
    reg.register(MoveClass { name: "big".into(), xsize: 6, zsize: 4, ..Default::default() });
    assert_eq!(reg.largest_footprint_half(), FixedNum::from_num(24));
    assert_eq!(reg.find("big"), Some(MoveClassId(1)));
    assert_eq!(reg.get(MoveClassId(99)).name, "tank2x2");
}
