//! End-to-end riding scenarios
//!
//! Exercises the full pipeline across module boundaries:
//! - Driver pointer input → orientation → sync channel → replica
//! - Late-joining observers get a full baseline update
//! - Mount/dismount events tear state down through the ECS
//! - Return-to-upright transition after free orientation disengages

use bevy::prelude::*;

use ride_core::behaviour::{BirdBehaviour, RideBehaviourState, RidePolicy};
use ride_core::config::RideConfig;
use ride_core::events::{DismountOccurred, MountOccurred, SimTick};
use ride_core::input::{gather_driver_intent, DriverInputAdapter, DriverKeys};
use ride_core::orientation::OrientationController;
use ride_core::rider::DriverRotationOffset;
use ride_core::events::RotationRequested;
use ride_core::sync::{
    DriverChannel, InboundSyncMessage, OrientationUpdate, OutboundSyncMessage, Replicated,
    RideStateUpdate, SyncChannel, VehicleSnapshot, VehicleSyncMessage,
};
use ride_core::transition::{ReturnEasing, RideActivity, RidePhase};
use ride_core::RideCorePlugin;

// ============================================================
// Helpers
// ============================================================

fn test_app() -> App {
    let mut app = App::new();
    app.add_plugins(RideCorePlugin);
    app
}

fn run_tick(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

fn drain_outbound(app: &mut App) -> Vec<OutboundSyncMessage> {
    app.world_mut()
        .resource_mut::<Events<OutboundSyncMessage>>()
        .drain()
        .collect()
}

fn bird_vehicle(app: &mut App, vehicle_id: u64, active: bool) -> Entity {
    let mut controller = OrientationController::default();
    if active {
        controller.set_active(true);
        controller.initialize(0.0, 0.0);
    }
    app.world_mut()
        .spawn((
            controller,
            RideActivity::default(),
            RidePolicy::new(BirdBehaviour::default()),
            RideBehaviourState::default(),
            Replicated { vehicle_id },
        ))
        .id()
}

// ============================================================
// Driver input through to a replica
// ============================================================

#[test]
fn driver_bank_reaches_remote_replica() {
    let config = RideConfig::default();
    let policy = RidePolicy::new(BirdBehaviour::default());
    let mut state = RideBehaviourState::default();
    let mut adapter = DriverInputAdapter::default();
    let mut offset = DriverRotationOffset::default();

    let mut controller = OrientationController::default();
    controller.set_active(true);
    controller.initialize(0.0, 0.0);
    controller.local_authority = true;

    // Hold the pointer right: the bird banks, then the bank turns it
    for _ in 0..10 {
        adapter.on_pointer_delta(
            &config,
            &policy,
            &mut state,
            &mut controller,
            &mut offset,
            60.0,
            0.0,
            0.05,
            false,
            true,
        );
        adapter.apply_angular_velocity(&config, &policy, &state, &mut controller, 0.05);
    }
    assert!(
        controller.roll() > 1.0 && controller.roll() < 120.0,
        "sustained input must roll the bird without wrapping, roll = {}",
        controller.roll()
    );
    assert!(controller.yaw() > 0.0, "the bank must pull the heading around");

    // Replicate to one observer and apply on a fresh replica
    let mut channel = SyncChannel::default();
    channel.subscribe(1, 100);
    let snapshot = VehicleSnapshot::capture(1, &controller, "air/bird", &state);
    let mut messages = channel.collect(5, &snapshot, |a, b| a != b);
    assert_eq!(messages.len(), 1);
    let (_, message) = messages.remove(0);
    let update = message.orientation.expect("first update carries orientation");

    let mut replica = OrientationController::default();
    replica.set_active(update.active);
    replica.set_orientation(update.matrix());
    assert!((replica.yaw() - controller.yaw()).abs() < 1e-3);
    assert!((replica.roll() - controller.roll()).abs() < 1e-3);
}

#[test]
fn idle_driver_generates_no_traffic() {
    let mut controller = OrientationController::default();
    controller.set_active(true);
    controller.initialize(20.0, -5.0);
    let state = RideBehaviourState::default();

    let mut channel = SyncChannel::default();
    channel.subscribe(1, 100);
    let snapshot = VehicleSnapshot::capture(1, &controller, "air/bird", &state);
    assert_eq!(channel.collect(1, &snapshot, |a, b| a != b).len(), 1);
    for tick in 2..20 {
        assert!(
            channel.collect(tick, &snapshot, |a, b| a != b).is_empty(),
            "an unchanged vehicle must stay silent"
        );
    }

    let mut driver = DriverChannel::default();
    let intent = gather_driver_intent(DriverKeys::default());
    driver.queue_intent(1, intent);
    driver.queue_intent(1, intent);
    assert_eq!(driver.drain_intents().len(), 1, "only the initial zero intent sends");
}

#[test]
fn late_observer_gets_full_baseline() {
    let mut controller = OrientationController::default();
    controller.set_active(true);
    controller.initialize(45.0, 0.0);
    let state = RideBehaviourState::default();

    let mut channel = SyncChannel::default();
    channel.subscribe(1, 100);
    let snapshot = VehicleSnapshot::capture(1, &controller, "air/bird", &state);
    channel.collect(1, &snapshot, |a, b| a != b);

    channel.subscribe(1, 200);
    let out = channel.collect(2, &snapshot, |a, b| a != b);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0, 200);
    assert!(out[0].1.orientation.is_some());
    assert!(out[0].1.ride_state.is_some());
}

// ============================================================
// ECS pipeline
// ============================================================

#[test]
fn replication_runs_in_fixed_update() {
    let mut app = test_app();
    bird_vehicle(&mut app, 7, true);
    app.world_mut()
        .resource_mut::<SyncChannel>()
        .subscribe(7, 100);

    run_tick(&mut app);
    let messages = drain_outbound(&mut app);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].observer, 100);
    assert_eq!(messages[0].message.vehicle_id, 7);
    assert_eq!(messages[0].message.tick, app.world().resource::<SimTick>().0);

    // Nothing changed since; the next tick is silent
    run_tick(&mut app);
    assert!(drain_outbound(&mut app).is_empty());
}

#[test]
fn message_survives_the_wire() {
    let mut app = test_app();
    bird_vehicle(&mut app, 9, true);
    app.world_mut()
        .resource_mut::<SyncChannel>()
        .subscribe(9, 1);

    run_tick(&mut app);
    let messages = drain_outbound(&mut app);
    let bytes = messages[0].message.encode().unwrap();
    let decoded = VehicleSyncMessage::decode(&bytes).unwrap();
    assert_eq!(decoded, messages[0].message);
}

#[test]
fn dismount_tears_down_ride_state() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 3, true);
    let rider = app
        .world_mut()
        .spawn(DriverRotationOffset {
            ride_x_rot: 12.0,
            ride_y_rot: -30.0,
            ..Default::default()
        })
        .id();

    app.world_mut().send_event(DismountOccurred { vehicle, rider });
    run_tick(&mut app);

    let offset = app.world().get::<DriverRotationOffset>(rider).unwrap();
    assert!(offset.is_centred());
    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!(!controller.is_active());
    assert!(controller.orientation().is_none());
    let activity = app.world().get::<RideActivity>(vehicle).unwrap();
    assert_eq!(activity.phase, RidePhase::Inactive);
}

#[test]
fn configured_render_damping_reaches_controllers() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 8, true);
    app.world_mut().resource_mut::<RideConfig>().render_damping = 0.25;

    run_tick(&mut app);

    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!((controller.render_damping - 0.25).abs() < f32::EPSILON);
}

#[test]
fn mount_aligns_look_offset_to_vehicle() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 4, true);
    {
        let mut controller = app
            .world_mut()
            .get_mut::<OrientationController>(vehicle)
            .unwrap();
        controller.rotate(30.0, 0.0, 0.0);
    }
    let rider = app.world_mut().spawn(DriverRotationOffset::default()).id();

    app.world_mut().send_event(MountOccurred {
        vehicle,
        rider,
        rider_pitch_deg: 0.0,
        rider_yaw_deg: 50.0,
    });
    run_tick(&mut app);

    let offset = app.world().get::<DriverRotationOffset>(rider).unwrap();
    assert!(
        (offset.ride_y_rot - 20.0).abs() < 1e-2,
        "the camera holds its world direction across activation, offset = {}",
        offset.ride_y_rot
    );
}

// ============================================================
// Replica application
// ============================================================

fn orientation_message(vehicle_id: u64, yaw_deg: f32) -> VehicleSyncMessage {
    VehicleSyncMessage {
        tick: 1,
        vehicle_id,
        orientation: Some(OrientationUpdate {
            vehicle_id,
            rotation: Mat3::from_euler(EulerRot::YXZ, yaw_deg.to_radians(), 0.0, 0.0)
                .to_cols_array_2d(),
            active: true,
        }),
        ride_state: None,
    }
}

#[test]
fn inbound_orientation_applies_to_replica() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 5, false);

    app.world_mut()
        .send_event(InboundSyncMessage(orientation_message(5, 40.0)));
    run_tick(&mut app);

    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!(controller.is_active());
    assert!((controller.yaw() - 40.0).abs() < 1e-2, "yaw = {}", controller.yaw());
}

#[test]
fn inbound_orientation_skips_local_authority() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 5, true);
    {
        let mut controller = app
            .world_mut()
            .get_mut::<OrientationController>(vehicle)
            .unwrap();
        controller.local_authority = true;
        controller.rotate(10.0, 0.0, 0.0);
    }

    app.world_mut()
        .send_event(InboundSyncMessage(orientation_message(5, 40.0)));
    run_tick(&mut app);

    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!(
        (controller.yaw() - 10.0).abs() < 1e-2,
        "the driving client's own echo must not move it, yaw = {}",
        controller.yaw()
    );
}

#[test]
fn inbound_update_for_unknown_vehicle_is_dropped() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 5, false);

    app.world_mut()
        .send_event(InboundSyncMessage(orientation_message(999, 40.0)));
    run_tick(&mut app);

    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!(!controller.is_active(), "an unaddressed update must change nothing");
    assert!(controller.orientation().is_none());
}

#[test]
fn inbound_state_blob_requires_matching_behaviour() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 5, true);
    let mut incoming = RideBehaviourState::default();
    incoming.stamina = 0.1;

    let mismatched = VehicleSyncMessage {
        tick: 1,
        vehicle_id: 5,
        orientation: None,
        ride_state: Some(RideStateUpdate {
            vehicle_id: 5,
            behaviour_id: "air/hover".to_string(),
            state_blob: incoming.to_blob(),
        }),
    };
    app.world_mut().send_event(InboundSyncMessage(mismatched));
    run_tick(&mut app);
    let state = app.world().get::<RideBehaviourState>(vehicle).unwrap();
    assert!((state.stamina - 1.0).abs() < f32::EPSILON, "mismatched blob must be dropped");

    let matching = VehicleSyncMessage {
        tick: 2,
        vehicle_id: 5,
        orientation: None,
        ride_state: Some(RideStateUpdate {
            vehicle_id: 5,
            behaviour_id: "air/bird".to_string(),
            state_blob: incoming.to_blob(),
        }),
    };
    app.world_mut().send_event(InboundSyncMessage(matching));
    run_tick(&mut app);
    let state = app.world().get::<RideBehaviourState>(vehicle).unwrap();
    assert!((state.stamina - 0.1).abs() < 1e-6, "matching blob must apply");
}

#[test]
fn rotation_requests_route_to_the_vehicle() {
    let mut app = test_app();
    let vehicle = bird_vehicle(&mut app, 5, true);

    app.world_mut().send_event(RotationRequested {
        vehicle,
        delta: Vec3::new(25.0, 0.0, 0.0),
    });
    run_tick(&mut app);
    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!((controller.yaw() - 25.0).abs() < 1e-2, "yaw = {}", controller.yaw());

    // A request for a despawned entity is dropped without touching others
    let ghost = app.world_mut().spawn_empty().id();
    app.world_mut().despawn(ghost);
    app.world_mut().send_event(RotationRequested {
        vehicle: ghost,
        delta: Vec3::new(90.0, 0.0, 0.0),
    });
    run_tick(&mut app);
    let controller = app.world().get::<OrientationController>(vehicle).unwrap();
    assert!((controller.yaw() - 25.0).abs() < 1e-2);
}

// ============================================================
// Return-to-upright transition
// ============================================================

#[test]
fn disengaging_unwinds_roll_over_the_window() {
    let mut activity = RideActivity::default();
    let mut controller = OrientationController::default();

    activity.update(
        true,
        &mut controller,
        0.0,
        0.0,
        None,
        20.0,
        ReturnEasing::Linear,
    );
    controller.rotate(0.0, 0.0, 60.0);
    assert_eq!(activity.phase, RidePhase::Active);

    activity.update(
        false,
        &mut controller,
        0.0,
        0.0,
        Some(15.0),
        20.0,
        ReturnEasing::Linear,
    );
    assert_eq!(activity.phase, RidePhase::Returning);

    let mut ticks = 0;
    let mut last_roll = f32::MAX;
    while activity.phase == RidePhase::Returning {
        if let Some(t) = &activity.transition {
            let roll = t.sample_roll(0.0).abs();
            assert!(roll <= last_roll + 1e-4);
            last_roll = roll;
        }
        activity.update(
            false,
            &mut controller,
            0.0,
            0.0,
            Some(15.0),
            20.0,
            ReturnEasing::Linear,
        );
        ticks += 1;
        assert!(ticks <= 21);
    }
    assert_eq!(activity.phase, RidePhase::Inactive);
    assert!(controller.orientation().is_none());
}
