//! Property-based tests for rig math and config handling using proptest.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rigsmith-tests --test proptest_rig
//! ```

use glam::DVec3;
use proptest::prelude::*;

use rigsmith_core::fkik::{
    create_fkik_accessories, create_fkik_switch, AccessoryOptions, SwitchControl,
};
use rigsmith_core::scene::{Attr, Plug};
use rigsmith_core::snap::{check_bend, pole_vector_target, pole_vector_target_with_factor};
use rigsmith_core::topology::mirror_marker;
use rigsmith_core::{LimbMode, Marker, MemoryScene, NodeId, RigConfig, SceneAdapter};

fn coordinate() -> impl Strategy<Value = f64> {
    -500.0..500.0f64
}

fn point() -> impl Strategy<Value = DVec3> {
    (coordinate(), coordinate(), coordinate()).prop_map(|(x, y, z)| DVec3::new(x, y, z))
}

fn limb_mode() -> impl Strategy<Value = LimbMode> {
    prop_oneof![Just(LimbMode::Fk), Just(LimbMode::Ik), Just(LimbMode::FkIk)]
}

// ============================================================================
// 1. Marker mirroring
// ============================================================================

proptest! {
    /// Mirroring twice restores the position.
    #[test]
    fn mirror_twice_restores_position(position in point(), base in "[a-z]{1,8}") {
        let marker = Marker::new(format!("{}_l", base), position);
        let once = mirror_marker(&marker);
        prop_assert_eq!(once.name, format!("{}_r", base));
        prop_assert_eq!(once.position.x, -position.x);
        prop_assert_eq!(once.position.y, position.y);
        let twice = mirror_marker(&mirror_marker(&marker));
        prop_assert_eq!(twice.position, position);
    }
}

// ============================================================================
// 2. FK/IK switch weights
// ============================================================================

fn switched_leg(scene: &mut MemoryScene) -> SwitchControl {
    let mut leg: Vec<NodeId> = Vec::new();
    for (name, position) in [
        ("thigh_l", DVec3::new(9.0, 95.0, 1.0)),
        ("knee_l", DVec3::new(14.0, 55.0, 6.0)),
        ("foot_l", DVec3::new(15.5, 15.5, -6.0)),
    ] {
        let joint = scene.create_joint(name, position).unwrap();
        if let Some(parent) = leg.last().copied() {
            scene.set_parent(joint, Some(parent)).unwrap();
            scene.orient_joint(parent).unwrap();
        }
        leg.push(joint);
    }
    let acc = create_fkik_accessories(scene, &leg, "leg_l", &AccessoryOptions::new(13.0)).unwrap();
    create_fkik_switch(scene, &acc, &leg, "leg_l_switch").unwrap()
}

proptest! {
    /// Every orient constraint under the switch weighs IK by the switch value
    /// and FK by its complement.
    #[test]
    fn switch_splits_weights_between_fk_and_ik(value in 0.0..=1.0f64) {
        let mut scene = MemoryScene::new();
        let switch = switched_leg(&mut scene);
        scene.set_attr(&switch.attr, value).unwrap();
        prop_assert_eq!(switch.constraints.len(), 3);
        for constraint in &switch.constraints {
            let fk = scene.get_attr(&Plug::new(*constraint, Attr::Weight(0))).unwrap();
            let ik = scene.get_attr(&Plug::new(*constraint, Attr::Weight(1))).unwrap();
            prop_assert!((fk - (1.0 - value)).abs() < 1e-12);
            prop_assert_eq!(ik, value);
        }
    }
}

// ============================================================================
// 3. Pole vector placement
// ============================================================================

proptest! {
    /// The pole sits on the ray from the chord midpoint through the bend.
    #[test]
    fn pole_target_extends_the_bend(p0 in point(), p1 in point(), p2 in point()) {
        let target = pole_vector_target(p0, p1, p2);
        let mean = (p0 + p2) / 2.0;
        let expected = p1 + (p1 - mean) * 2.0;
        prop_assert!(target.abs_diff_eq(expected, 1e-9));
        prop_assert!(pole_vector_target_with_factor(p0, p1, p2, 0.0).abs_diff_eq(p1, 1e-12));
    }

    /// Points on one line are always reported as a straight chain.
    #[test]
    fn collinear_points_are_degenerate(
        start in point(),
        direction in point(),
        t in 0.1..0.9f64,
    ) {
        prop_assume!(direction.length() > 1.0);
        let end = start + direction;
        let mid = start + direction * t;
        let diagnostic = check_bend(start, mid, end);
        prop_assert!(diagnostic.is_some());
    }

    /// A clear sideways offset is never reported as straight.
    #[test]
    fn bent_points_are_not_degenerate(
        start in point(),
        length in 10.0..200.0f64,
        bend in 1.0..100.0f64,
    ) {
        let end = start + DVec3::new(0.0, -length, 0.0);
        let mid = start + DVec3::new(0.0, -length / 2.0, bend);
        prop_assert!(check_bend(start, mid, end).is_none());
    }
}

// ============================================================================
// 4. Config round trips and names
// ============================================================================

proptest! {
    /// Names matching the rig name pattern validate and survive JSON.
    #[test]
    fn valid_names_round_trip(
        first in "[A-Za-z_]",
        rest in "[A-Za-z0-9_]{0,40}",
        arms in limb_mode(),
        legs in limb_mode(),
        uniform_scale in any::<bool>(),
    ) {
        let config = RigConfig::new()
            .with_name(format!("{}{}", first, rest))
            .with_arms(arms)
            .with_legs(legs)
            .with_uniform_scale(uniform_scale);
        prop_assert!(config.validate().is_ok());
        let parsed = RigConfig::from_json(&config.to_json().unwrap()).unwrap();
        prop_assert_eq!(parsed, config);
    }

    /// Names with characters outside the pattern are rejected.
    #[test]
    fn names_with_separators_fail(
        head in "[a-z]{1,10}",
        separator in "[ |:.\\-]",
        tail in "[a-z]{1,10}",
    ) {
        let config = RigConfig::new().with_name(format!("{}{}{}", head, separator, tail));
        prop_assert!(config.validate().is_err());
    }
}
