//! End-to-end workflow tests: whole rigs built from default markers.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rigsmith-tests --test e2e_workflow
//! ```

use glam::DVec3;
use pretty_assertions::assert_eq;

use rigsmith_core::scene::{Attr, Plug};
use rigsmith_core::{
    BodyKind, LimbMode, LimbRig, MemoryScene, NodeKind, RigConfig, RigError, RigWorkflow,
    SceneAdapter, Side, SpineKind, SpineRig, Stage,
};
use rigsmith_tests::{built_rig, hops};

fn every_mode_config() -> RigConfig {
    RigConfig::new()
        .with_name("hero")
        .with_spine(SpineKind::Spline)
        .with_arms(LimbMode::FkIk)
        .with_legs(LimbMode::Ik)
}

#[test]
fn every_joint_lives_under_the_rig_group() {
    let workflow = built_rig(every_mode_config());
    let scene = workflow.scene();
    let group = workflow.rig().rig_group.expect("cleanup creates a group");
    assert_eq!(scene.name(group).unwrap(), "hero");

    let skeleton = workflow.rig().skeleton.as_ref().unwrap();
    for (name, joint) in &skeleton.joints {
        assert!(
            hops(scene, *joint, group).is_some(),
            "joint {} is outside the rig group",
            name
        );
    }
    // Leftover markers are gone once the skeleton exists.
    assert!(scene.find("MarkersGrp").is_none());
}

#[test]
fn uniform_scale_leaves_one_child_in_the_group() {
    let scaled = built_rig(every_mode_config());
    let group = scaled.rig().rig_group.unwrap();
    let children = scaled.scene().children(group).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(scaled.scene().name(children[0]).unwrap(), "ctrl_root_parent");

    let loose = built_rig(every_mode_config().with_uniform_scale(false));
    let group = loose.rig().rig_group.unwrap();
    let names: Vec<String> = loose
        .scene()
        .children(group)
        .unwrap()
        .into_iter()
        .map(|child| loose.scene().name(child).unwrap())
        .collect();
    for expected in ["ctrl_root_parent", "root", "arm_l_switch", "leg_ik_r"] {
        assert!(names.iter().any(|n| n == expected), "{} not in {:?}", expected, names);
    }
}

#[test]
fn switch_drives_weights_and_visibility() {
    let workflow = built_rig(RigConfig::new().with_arms(LimbMode::FkIk));
    let (accessories, switch) = match workflow.rig().arms.get(&Side::Left) {
        Some(LimbRig::FkIk {
            accessories,
            switch,
        }) => (accessories.clone(), switch.clone()),
        other => panic!("expected an FK/IK arm, got {:?}", other),
    };
    let scene = workflow.scene();
    assert_eq!(accessories.fk_controllers.len(), accessories.fk_chain.len());
    assert_eq!(accessories.ik_offset, 1);
    assert_eq!(scene.get_attr(&switch.attr).unwrap(), 0.0);

    let fk_visible = Plug::new(accessories.fk_controllers[0].shape, Attr::Visibility);
    let ik_visible = Plug::new(accessories.ik_controller.shape, Attr::Visibility);
    assert_eq!(scene.get_attr(&fk_visible).unwrap(), 1.0);
    assert_eq!(scene.get_attr(&ik_visible).unwrap(), 0.0);

    let mut scene = workflow.into_scene();
    scene.set_attr(&switch.attr, 1.0).unwrap();
    for constraint in &switch.constraints {
        let fk_weight = scene.get_attr(&Plug::new(*constraint, Attr::Weight(0))).unwrap();
        let ik_weight = scene.get_attr(&Plug::new(*constraint, Attr::Weight(1))).unwrap();
        assert_eq!((fk_weight, ik_weight), (0.0, 1.0));
    }
    assert_eq!(scene.get_attr(&fk_visible).unwrap(), 0.0);
    assert_eq!(scene.get_attr(&ik_visible).unwrap(), 1.0);
}

#[test]
fn half_body_walks_every_stage() {
    let config = RigConfig::new()
        .with_body(BodyKind::Half)
        .with_spine(SpineKind::Spline)
        .with_legs(LimbMode::FkIk);
    let mut workflow = RigWorkflow::new(MemoryScene::new(), config).unwrap();
    let mut seen = vec![workflow.stage()];

    // Mirroring copies the moved position.
    workflow
        .move_marker("knee_l", DVec3::new(11.0, 50.0, 8.0))
        .unwrap();
    let mirrored = workflow.mirror_markers().unwrap();
    assert!(mirrored > 0);
    seen.push(workflow.stage());

    workflow.build_skeleton().unwrap();
    seen.push(workflow.stage());
    workflow.build_root().unwrap();
    seen.push(workflow.stage());
    workflow.build_spine().unwrap();
    seen.push(workflow.stage());
    workflow.build_head().unwrap();
    seen.push(workflow.stage());
    workflow.build_arms().unwrap();
    seen.push(workflow.stage());
    workflow.build_legs().unwrap();
    seen.push(workflow.stage());
    assert_eq!(seen, Stage::ALL.to_vec());

    let rig = workflow.rig();
    assert!(matches!(rig.spine, Some(SpineRig::Spline { .. })));
    assert_eq!(rig.legs.len(), 2);
    let skeleton = rig.skeleton.as_ref().unwrap();
    let knee_r = skeleton.joint("knee_r").unwrap();
    assert!(workflow
        .scene()
        .world_position(knee_r)
        .unwrap()
        .abs_diff_eq(DVec3::new(-11.0, 50.0, 8.0), 1e-6));

    let handle = workflow.scene().find("spine_ik").unwrap();
    assert_eq!(workflow.scene().kind(handle).unwrap(), NodeKind::IkHandle);
}

#[test]
fn finished_workflow_refuses_more_steps() {
    let mut workflow = built_rig(RigConfig::default());
    let err = workflow.build_arms().unwrap_err();
    assert!(matches!(
        err,
        RigError::StageOrder {
            expected: Stage::Done,
            actual: Stage::Arms
        }
    ));
    assert!(matches!(
        workflow.move_marker("knee_l", DVec3::ZERO),
        Err(RigError::StageOrder { .. })
    ));
}

#[test]
fn builds_are_deterministic() {
    let first = built_rig(every_mode_config());
    let second = built_rig(every_mode_config());
    let outline = |w: &RigWorkflow<MemoryScene>| {
        serde_json::to_string(&w.scene().outline().unwrap()).unwrap()
    };
    assert_eq!(outline(&first), outline(&second));
    assert_eq!(first.rig(), second.rig());
}
