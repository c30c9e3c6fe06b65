//! Ride lifecycle events and tick scheduling.
//!
//! The simulation runs on `FixedUpdate` in four chained phases: phase-machine
//! updates, orientation ticks, sync collection, then post-tick bookkeeping.
//! Mount/dismount events from the host embedding enter here and fan out to
//! the other modules' components.

use bevy::prelude::*;
use tracing::trace;

use crate::config::RideConfig;
use crate::input::DriverInputAdapter;
use crate::orientation::OrientationController;
use crate::rider::DriverRotationOffset;
use crate::sync::{DriverChannel, Replicated, SyncChannel};
use crate::transition::RideActivity;

pub struct EventsPlugin;

impl Plugin for EventsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimTick>()
            .add_event::<MountOccurred>()
            .add_event::<DismountOccurred>()
            .add_event::<RotationRequested>()
            .add_event::<PreRideTick>()
            .add_event::<PostRideTick>()
            .configure_sets(
                FixedUpdate,
                (
                    RideSet::PreTick,
                    RideSet::Tick,
                    RideSet::Sync,
                    RideSet::PostTick,
                )
                    .chain(),
            )
            .add_systems(
                FixedUpdate,
                (advance_sim_tick, handle_mounts, handle_dismounts)
                    .chain()
                    .in_set(RideSet::PreTick),
            )
            .add_systems(FixedUpdate, apply_rotation_requests.in_set(RideSet::Tick))
            .add_systems(FixedUpdate, emit_post_tick.in_set(RideSet::PostTick));
    }
}

/// Execution phases of one riding simulation tick
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RideSet {
    PreTick,
    Tick,
    Sync,
    PostTick,
}

/// Monotonic simulation tick counter, stamped onto outbound sync messages
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimTick(pub u64);

/// A rider took the driver seat of a vehicle. Carries the rider's current
/// look angles so the look offset can be seeded without a camera query.
#[derive(Event, Debug, Clone, Copy)]
pub struct MountOccurred {
    pub vehicle: Entity,
    pub rider: Entity,
    pub rider_pitch_deg: f32,
    pub rider_yaw_deg: f32,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct DismountOccurred {
    pub vehicle: Entity,
    pub rider: Entity,
}

/// External rotation request (scripted manoeuvres, knockback). Delta is
/// (yaw, pitch, roll) in degrees, applied in the vehicle's local frame.
#[derive(Event, Debug, Clone, Copy)]
pub struct RotationRequested {
    pub vehicle: Entity,
    pub delta: Vec3,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct PreRideTick {
    pub tick: u64,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct PostRideTick {
    pub tick: u64,
}

fn advance_sim_tick(mut tick: ResMut<SimTick>, mut pre: EventWriter<PreRideTick>) {
    tick.0 = tick.0.wrapping_add(1);
    pre.send(PreRideTick { tick: tick.0 });
}

fn emit_post_tick(tick: Res<SimTick>, mut post: EventWriter<PostRideTick>) {
    post.send(PostRideTick { tick: tick.0 });
}

fn apply_rotation_requests(
    mut requests: EventReader<RotationRequested>,
    mut vehicles: Query<&mut OrientationController>,
) {
    for request in requests.read() {
        match vehicles.get_mut(request.vehicle) {
            Ok(mut controller) => {
                controller.rotate(request.delta.x, request.delta.y, request.delta.z);
            }
            Err(_) => {
                trace!(vehicle = ?request.vehicle, "rotation request for unknown vehicle, dropped");
            }
        }
    }
}

pub(crate) fn handle_mounts(
    config: Res<RideConfig>,
    mut mounts: EventReader<MountOccurred>,
    mut vehicles: Query<(&OrientationController, Option<&mut RideActivity>)>,
    mut riders: Query<&mut DriverRotationOffset>,
) {
    for mount in mounts.read() {
        if let Ok((_, Some(mut activity))) = vehicles.get_mut(mount.vehicle) {
            activity.mounted = true;
        }
        let Ok(mut offset) = riders.get_mut(mount.rider) else {
            trace!(rider = ?mount.rider, "mount event for rider without look offset");
            continue;
        };
        offset.reset();
        offset.pitch_clamp_deg = config.pitch_clamp_deg;
        offset.yaw_clamp_deg = config.yaw_clamp_deg;
        offset.decay_rate = config.offset_decay_rate;
        if let Ok((controller, _)) = vehicles.get_mut(mount.vehicle) {
            if controller.is_active() {
                offset.align_to_vehicle(
                    mount.rider_pitch_deg,
                    mount.rider_yaw_deg,
                    controller.pitch(),
                    controller.yaw(),
                );
            }
        }
    }
}

pub(crate) fn handle_dismounts(
    mut dismounts: EventReader<DismountOccurred>,
    mut vehicles: Query<(
        &mut OrientationController,
        Option<&mut RideActivity>,
        Option<&Replicated>,
    )>,
    mut riders: Query<&mut DriverRotationOffset>,
    mut adapter: ResMut<DriverInputAdapter>,
    mut driver_channel: ResMut<DriverChannel>,
    mut sync_channel: ResMut<SyncChannel>,
) {
    for dismount in dismounts.read() {
        if let Ok(mut offset) = riders.get_mut(dismount.rider) {
            offset.reset();
        }
        if let Ok((mut controller, activity, replicated)) = vehicles.get_mut(dismount.vehicle) {
            match activity {
                Some(mut activity) => activity.abandon(&mut controller),
                None => controller.reset(),
            }
            if let Some(replicated) = replicated {
                sync_channel.drop_vehicle(replicated.vehicle_id);
            }
        }
        adapter.reset();
        driver_channel.reset();
    }
}
