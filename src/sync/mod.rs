//! Client/server state synchronization for mounted vehicles.
//!
//! The server tracks, per (vehicle, observer) pair, which replicated fields
//! have changed since the observer last heard about them, and emits one
//! compact message per vehicle per tick at most. The reverse path carries
//! driver intent and look offsets from the controlling client to the server,
//! change-suppressed so an idle driver stays silent.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::behaviour::{RideBehaviourState, RidePolicy};
use crate::events::{RideSet, SimTick};
use crate::orientation::OrientationController;

pub struct SyncPlugin;

impl Plugin for SyncPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SyncChannel>()
            .init_resource::<DriverChannel>()
            .add_event::<OutboundSyncMessage>()
            .add_event::<InboundSyncMessage>()
            .add_systems(
                FixedUpdate,
                (replicate_vehicles, apply_inbound_sync, drop_despawned_vehicles)
                    .chain()
                    .in_set(RideSet::Sync),
            );
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to encode sync message: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode sync message: {0}")]
    Decode(#[source] bincode::Error),
}

/// Stable wire identifier for an entity
pub type VehicleId = u64;
/// Stable wire identifier for an observing client
pub type ObserverId = u64;

// =====================================================
// Wire types
// =====================================================

/// Server -> client orientation replication payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientationUpdate {
    pub vehicle_id: VehicleId,
    /// Column-major rotation matrix
    pub rotation: [[f32; 3]; 3],
    pub active: bool,
}

impl OrientationUpdate {
    pub fn matrix(&self) -> Mat3 {
        Mat3::from_cols_array_2d(&self.rotation)
    }
}

/// Server -> client behaviour state replication payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideStateUpdate {
    pub vehicle_id: VehicleId,
    /// Behaviour key; a mismatch on the receiver drops the blob
    pub behaviour_id: String,
    pub state_blob: Vec<u8>,
}

/// Client -> server digital movement intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverIntentUpdate {
    pub vehicle_id: VehicleId,
    pub intent: [f32; 3],
}

/// Client -> server rider look offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRotationUpdate {
    pub vehicle_id: VehicleId,
    pub ride_x_rot: f32,
    pub ride_y_rot: f32,
    pub ride_eye_pos: [f32; 3],
}

/// One vehicle's replication delta for one observer, at most one per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSyncMessage {
    pub tick: u64,
    pub vehicle_id: VehicleId,
    pub orientation: Option<OrientationUpdate>,
    pub ride_state: Option<RideStateUpdate>,
}

impl VehicleSyncMessage {
    pub fn is_empty(&self) -> bool {
        self.orientation.is_none() && self.ride_state.is_none()
    }

    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        bincode::serialize(self).map_err(SyncError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        bincode::deserialize(bytes).map_err(SyncError::Decode)
    }
}

// =====================================================
// Dirty tracking
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FieldPhase {
    /// Baseline matches the live value, nothing to send
    Idle,
    /// Live value diverged from the observer's baseline
    #[default]
    Dirty,
    /// Sent this value; waiting for the next refresh to confirm it held
    Sent,
}

/// Change tracker for one replicated field of one (vehicle, observer) pair.
/// Starts dirty so a fresh subscription always gets a full first update.
#[derive(Debug, Clone)]
struct DirtyField<T> {
    baseline: Option<T>,
    phase: FieldPhase,
}

// Manual impl: the derive would demand T: Default, and snapshot types have
// no meaningful default value.
impl<T> Default for DirtyField<T> {
    fn default() -> Self {
        Self {
            baseline: None,
            phase: FieldPhase::default(),
        }
    }
}

impl<T: Clone + PartialEq> DirtyField<T> {
    fn refresh(&mut self, current: &T) {
        self.refresh_with(current, |a, b| a != b);
    }

    fn refresh_with(&mut self, current: &T, changed: impl FnOnce(&T, &T) -> bool) {
        match &self.baseline {
            None => self.phase = FieldPhase::Dirty,
            Some(baseline) => {
                if changed(baseline, current) {
                    self.phase = FieldPhase::Dirty;
                } else if self.phase == FieldPhase::Sent {
                    self.phase = FieldPhase::Idle;
                }
            }
        }
    }

    fn take(&mut self, current: &T) -> Option<T> {
        if self.phase != FieldPhase::Dirty {
            return None;
        }
        self.baseline = Some(current.clone());
        self.phase = FieldPhase::Sent;
        Some(current.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OrientationSnapshot {
    rotation: [[f32; 3]; 3],
    active: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct RideStateSnapshot {
    behaviour_id: String,
    state_blob: Vec<u8>,
}

/// Everything replicable about one vehicle at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    vehicle_id: VehicleId,
    orientation: OrientationSnapshot,
    ride_state: RideStateSnapshot,
}

impl VehicleSnapshot {
    pub fn capture(
        vehicle_id: VehicleId,
        controller: &OrientationController,
        behaviour_id: &str,
        state: &RideBehaviourState,
    ) -> Self {
        Self {
            vehicle_id,
            orientation: OrientationSnapshot {
                rotation: controller
                    .orientation()
                    .unwrap_or(Mat3::IDENTITY)
                    .to_cols_array_2d(),
                active: controller.is_active(),
            },
            ride_state: RideStateSnapshot {
                behaviour_id: behaviour_id.to_owned(),
                state_blob: state.to_blob(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct ObserverEntry {
    orientation: DirtyField<OrientationSnapshot>,
    ride_state: DirtyField<RideStateSnapshot>,
}

/// Server-side replication channel. One entry per (vehicle, observer) pair;
/// subscriptions are explicit so rejoining observers get a fresh baseline.
#[derive(Resource, Debug, Default)]
pub struct SyncChannel {
    entries: HashMap<(VehicleId, ObserverId), ObserverEntry>,
}

impl SyncChannel {
    /// Register an observer for a vehicle. Re-subscribing resets the
    /// baseline, so the next collect emits a full update.
    pub fn subscribe(&mut self, vehicle: VehicleId, observer: ObserverId) {
        self.entries
            .insert((vehicle, observer), ObserverEntry::default());
    }

    pub fn drop_vehicle(&mut self, vehicle: VehicleId) {
        self.entries.retain(|(v, _), _| *v != vehicle);
    }

    pub fn drop_observer(&mut self, observer: ObserverId) {
        self.entries.retain(|(_, o), _| *o != observer);
    }

    pub fn observer_count(&self, vehicle: VehicleId) -> usize {
        self.entries.keys().filter(|(v, _)| *v == vehicle).count()
    }

    /// Diff one vehicle snapshot against every subscribed observer and emit
    /// the non-empty deltas, ordered by observer id. `state_changed` gates
    /// the ride-state field (behaviour `should_sync` policy); orientation
    /// always syncs on value change.
    pub fn collect(
        &mut self,
        tick: u64,
        snapshot: &VehicleSnapshot,
        state_changed: impl Fn(&[u8], &[u8]) -> bool,
    ) -> Vec<(ObserverId, VehicleSyncMessage)> {
        let mut out = Vec::new();
        for ((vehicle, observer), entry) in self.entries.iter_mut() {
            if *vehicle != snapshot.vehicle_id {
                continue;
            }
            entry.orientation.refresh(&snapshot.orientation);
            entry.ride_state.refresh_with(&snapshot.ride_state, |a, b| {
                a.behaviour_id != b.behaviour_id || state_changed(&a.state_blob, &b.state_blob)
            });

            let message = VehicleSyncMessage {
                tick,
                vehicle_id: snapshot.vehicle_id,
                orientation: entry.orientation.take(&snapshot.orientation).map(|o| {
                    OrientationUpdate {
                        vehicle_id: snapshot.vehicle_id,
                        rotation: o.rotation,
                        active: o.active,
                    }
                }),
                ride_state: entry.ride_state.take(&snapshot.ride_state).map(|s| {
                    RideStateUpdate {
                        vehicle_id: snapshot.vehicle_id,
                        behaviour_id: s.behaviour_id,
                        state_blob: s.state_blob,
                    }
                }),
            };
            if !message.is_empty() {
                out.push((*observer, message));
            }
        }
        out.sort_by_key(|(observer, _)| *observer);
        out
    }
}

// =====================================================
// Driver -> server channel
// =====================================================

/// Outbound queue on the controlling client. Change-suppressed: a value is
/// queued only when it differs from the last one queued, so holding a key
/// or an offset steady produces no traffic.
#[derive(Resource, Debug, Default)]
pub struct DriverChannel {
    last_intent: Option<DriverIntentUpdate>,
    last_rotation: Option<DriverRotationUpdate>,
    pending_intents: Vec<DriverIntentUpdate>,
    pending_rotations: Vec<DriverRotationUpdate>,
}

impl DriverChannel {
    pub fn queue_intent(&mut self, vehicle_id: VehicleId, intent: Vec3) {
        let update = DriverIntentUpdate {
            vehicle_id,
            intent: intent.to_array(),
        };
        if self.last_intent.as_ref() == Some(&update) {
            return;
        }
        self.last_intent = Some(update.clone());
        self.pending_intents.push(update);
    }

    pub fn queue_rotation(&mut self, update: DriverRotationUpdate) {
        if self.last_rotation.as_ref() == Some(&update) {
            return;
        }
        self.last_rotation = Some(update.clone());
        self.pending_rotations.push(update);
    }

    pub fn drain_intents(&mut self) -> Vec<DriverIntentUpdate> {
        std::mem::take(&mut self.pending_intents)
    }

    pub fn drain_rotations(&mut self) -> Vec<DriverRotationUpdate> {
        std::mem::take(&mut self.pending_rotations)
    }

    /// Forget the suppression baselines; the next queue always sends.
    /// Called on dismount.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =====================================================
// ECS integration
// =====================================================

/// Vehicles carrying this marker are replicated through the sync channel
#[derive(Component, Debug, Clone, Copy)]
pub struct Replicated {
    pub vehicle_id: VehicleId,
}

#[derive(Event, Debug, Clone)]
pub struct OutboundSyncMessage {
    pub observer: ObserverId,
    pub message: VehicleSyncMessage,
}

#[derive(Event, Debug, Clone)]
pub struct InboundSyncMessage(pub VehicleSyncMessage);

fn replicate_vehicles(
    tick: Res<SimTick>,
    mut channel: ResMut<SyncChannel>,
    mut outbound: EventWriter<OutboundSyncMessage>,
    vehicles: Query<(
        &Replicated,
        &OrientationController,
        &RidePolicy,
        &RideBehaviourState,
    )>,
) {
    for (replicated, controller, policy, state) in &vehicles {
        let snapshot =
            VehicleSnapshot::capture(replicated.vehicle_id, controller, policy.0.key(), state);
        let behaviour = &policy.0;
        let messages = channel.collect(tick.0, &snapshot, |prev, current| {
            match (
                RideBehaviourState::from_blob(prev),
                RideBehaviourState::from_blob(current),
            ) {
                (Some(a), Some(b)) => behaviour.should_sync(&a, &b),
                _ => true,
            }
        });
        for (observer, message) in messages {
            outbound.send(OutboundSyncMessage { observer, message });
        }
    }
}

fn apply_inbound_sync(
    mut inbound: EventReader<InboundSyncMessage>,
    mut vehicles: Query<(
        &Replicated,
        &mut OrientationController,
        &mut RideBehaviourState,
        &RidePolicy,
    )>,
) {
    for InboundSyncMessage(message) in inbound.read() {
        let mut found = false;
        for (replicated, mut controller, mut state, policy) in &mut vehicles {
            if replicated.vehicle_id != message.vehicle_id {
                continue;
            }
            found = true;
            if let Some(orientation) = &message.orientation {
                // The driving client already has the freshest orientation;
                // its own echo must not fight the local simulation.
                if !controller.local_authority {
                    controller.set_active(orientation.active);
                    controller.set_orientation(orientation.matrix());
                }
            }
            if let Some(ride_state) = &message.ride_state {
                if ride_state.behaviour_id != policy.0.key() {
                    debug!(
                        vehicle = message.vehicle_id,
                        expected = policy.0.key(),
                        got = %ride_state.behaviour_id,
                        "behaviour mismatch in ride state update, dropped"
                    );
                } else if let Some(decoded) = RideBehaviourState::from_blob(&ride_state.state_blob)
                {
                    *state = decoded;
                } else {
                    debug!(vehicle = message.vehicle_id, "undecodable ride state blob, dropped");
                }
            }
            break;
        }
        if !found {
            trace!(vehicle = message.vehicle_id, "sync update for unknown vehicle, dropped");
        }
    }
}

fn drop_despawned_vehicles(
    mut removed: RemovedComponents<Replicated>,
    mut channel: ResMut<SyncChannel>,
    despawned: Query<&Replicated>,
) {
    // RemovedComponents only yields entities; without the component we can
    // no longer look up the wire id, so fall back to retaining only live ids.
    if removed.read().next().is_none() {
        return;
    }
    let live: Vec<VehicleId> = despawned.iter().map(|r| r.vehicle_id).collect();
    channel
        .entries
        .retain(|(vehicle, _), _| live.contains(vehicle));
}
