use super::*;

fn approx(a: FixedNum, b: f64, tol: f64) -> bool {
    (a.to_num::<f64>() - b).abs() <= tol
}

#[test]
fn test_cardinal_headings() {
    let north = heading_to_vec(0);
    assert!(approx(north.x, 0.0, 1e-4) && approx(north.y, 1.0, 1e-4));

    let east = heading_to_vec(16384);
    assert!(approx(east.x, 1.0, 1e-4) && approx(east.y, 0.0, 1e-4));

    let south = heading_to_vec(i16::MIN);
    assert!(approx(south.x, 0.0, 1e-4) && approx(south.y, -1.0, 1e-4));

    let west = heading_to_vec(-16384);
    assert!(approx(west.x, -1.0, 1e-4) && approx(west.y, 0.0, 1e-4));
}

#[test]
fn test_heading_vector_roundtrip_is_stable() {
    // Sweep the circle; converting back must land within a couple of units.
    for h in (i16::MIN as i32..=i16::MAX as i32).step_by(997) {
        let h = h as i16;
        let back = vec_to_heading(heading_to_vec(h));
        let err = heading_delta(back, h).unsigned_abs();
        assert!(err <= 2, "heading {} came back as {}", h, back);
    }
}

#[test]
fn test_heading_vectors_are_unit_length() {
    for h in [-30000i16, -12345, -1, 0, 1, 777, 8192, 20000, 32767] {
        let len = heading_to_vec(h).length();
        assert!(approx(len, 1.0, 2e-4), "len {} for heading {}", len, h);
    }
}

#[test]
fn test_heading_delta_wraps() {
    assert_eq!(heading_delta(-32000, 32000), 1536);
    assert_eq!(heading_delta(32000, -32000), -1536);
    assert_eq!(heading_delta(100, 50), 50);
}

#[test]
fn test_right_is_clockwise_perpendicular() {
    let front = FixedVec2::from_f32(0.0, 1.0);
    let right = front.right();
    assert_eq!(front.dot(right), FixedNum::ZERO);
    assert_eq!(right, FixedVec2::from_f32(-1.0, 0.0));
}

#[test]
fn test_normalize_zero_is_zero() {
    assert_eq!(FixedVec2::ZERO.normalize(), FixedVec2::ZERO);
    let v = FixedVec2::from_f32(3.0, 4.0).normalize();
    assert!(approx(v.x, 0.6, 1e-4) && approx(v.y, 0.8, 1e-4));
}
