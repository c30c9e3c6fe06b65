//! Ride behaviour policies.
//!
//! A behaviour is a stateless capability set shared by every vehicle of a
//! species/mode. The riding core never branches on what a vehicle *is*,
//! only on what its behaviour answers here. Mutable per-ride values live in
//! [`RideBehaviourState`], which is replicated and torn down on dismount.

use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::orientation::OrientationController;

/// Capability queries consumed by the input adapter, the activity state
/// machine, and the sync channel.
pub trait RideBehaviour: Send + Sync {
    /// Stable identifier, replicated alongside the state blob
    fn key(&self) -> &'static str;

    /// Whether this vehicle uses free orientation (roll and arbitrary pitch)
    fn should_roll(&self, state: &RideBehaviourState) -> bool;

    fn can_jump(&self, _state: &RideBehaviourState) -> bool {
        false
    }

    fn should_rotate_rider_head(&self, _state: &RideBehaviourState) -> bool {
        true
    }

    /// Per-axis routing of pointer input: `(pitch, yaw)` flags, true when
    /// that axis moves the rider's look offset instead of the vehicle.
    fn mouse_modifies_driver_rotation(&self, _state: &RideBehaviourState) -> (bool, bool) {
        (false, false)
    }

    /// Base angular rate (yaw, pitch, roll in degrees per second) applied
    /// every input tick, e.g. banking during forward flight.
    fn ang_roll_vel(
        &self,
        _state: &RideBehaviourState,
        _controller: &OrientationController,
        _dt: f32,
    ) -> Vec3 {
        Vec3::ZERO
    }

    /// Whether the angular rate is fed through the low-pass smoothers
    fn use_ang_vel_smoothing(&self, _state: &RideBehaviourState) -> bool {
        false
    }

    /// Convert pre-scaled pointer deltas into vehicle rotation deltas
    /// (yaw, pitch, roll in degrees).
    fn rotation_on_mouse_xy(
        &self,
        state: &mut RideBehaviourState,
        mouse_x: f32,
        mouse_y: f32,
        dt: f32,
    ) -> Vec3;

    /// Gate for replicating the ride state blob; behaviours can suppress
    /// high-frequency but visually unimportant changes.
    fn should_sync(&self, previous: &RideBehaviourState, current: &RideBehaviourState) -> bool {
        previous != current
    }
}

/// Shared handle to the behaviour of one vehicle entity
#[derive(Component, Clone)]
pub struct RidePolicy(pub Arc<dyn RideBehaviour>);

impl RidePolicy {
    pub fn new(behaviour: impl RideBehaviour + 'static) -> Self {
        Self(Arc::new(behaviour))
    }
}

/// Mutable per-ride state, replicated server to observers while mounted.
/// Destroyed (reset) on dismount, never persisted.
#[derive(Component, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideBehaviourState {
    /// Velocity in the vehicle's local frame
    pub ride_velocity: [f32; 3],
    /// 0..1, drained by demanding manoeuvres
    pub stamina: f32,
    /// Seconds since pointer input last drove the roll axis
    pub no_input_time_roll: f32,
    /// Seconds since pointer input last drove the pitch axis
    pub no_input_time_pitch: f32,
}

impl Default for RideBehaviourState {
    fn default() -> Self {
        Self {
            ride_velocity: [0.0; 3],
            stamina: 1.0,
            no_input_time_roll: 0.0,
            no_input_time_pitch: 0.0,
        }
    }
}

impl RideBehaviourState {
    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.ride_velocity)
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.ride_velocity = velocity.to_array();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Compact wire encoding for the sync channel
    pub fn to_blob(&self) -> Vec<u8> {
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        bincode::deserialize(blob).ok()
    }
}

/// Free-flight behaviour: pointer input pitches and rolls the vehicle, and
/// roll banks the heading around the world vertical. Angular rates go
/// through the smoothers.
#[derive(Debug, Clone)]
pub struct BirdBehaviour {
    /// Peak banking turn rate at 90 degrees of roll, degrees per second
    pub handling_deg_per_sec: f32,
}

impl Default for BirdBehaviour {
    fn default() -> Self {
        Self {
            handling_deg_per_sec: 45.0,
        }
    }
}

impl RideBehaviour for BirdBehaviour {
    fn key(&self) -> &'static str {
        "air/bird"
    }

    fn should_roll(&self, _state: &RideBehaviourState) -> bool {
        true
    }

    fn use_ang_vel_smoothing(&self, _state: &RideBehaviourState) -> bool {
        true
    }

    fn ang_roll_vel(
        &self,
        _state: &RideBehaviourState,
        controller: &OrientationController,
        _dt: f32,
    ) -> Vec3 {
        let roll = controller.roll().to_radians();
        let pitch = controller.pitch().to_radians();
        // Bank-to-turn: yaw rate follows the roll angle, fading out as the
        // nose points vertical. Inverted flight damps the turn instead of
        // reversing it.
        let yaw_rate = self.handling_deg_per_sec * roll.sin() * pitch.cos().abs();
        let inverted_damp = 1.0 - roll.cos().min(0.0).abs();
        Vec3::new(yaw_rate * inverted_damp, 0.0, 0.0)
    }

    fn rotation_on_mouse_xy(
        &self,
        state: &mut RideBehaviourState,
        mouse_x: f32,
        mouse_y: f32,
        dt: f32,
    ) -> Vec3 {
        if mouse_x.abs() < 1.0 {
            state.no_input_time_roll += dt;
        } else {
            state.no_input_time_roll = 0.0;
        }
        if mouse_y.abs() < 1.0 {
            state.no_input_time_pitch += dt;
        } else {
            state.no_input_time_pitch = 0.0;
        }
        // Horizontal pointer rolls, vertical pitches; heading comes from
        // banking, not from the pointer.
        Vec3::new(0.0, mouse_y, mouse_x)
    }
}

/// Hovering behaviour: upright yaw-only steering, no roll. Vertical pointer
/// input goes to the rider's look offset rather than the vehicle.
#[derive(Debug, Clone, Default)]
pub struct HoverBehaviour;

impl RideBehaviour for HoverBehaviour {
    fn key(&self) -> &'static str {
        "air/hover"
    }

    fn should_roll(&self, _state: &RideBehaviourState) -> bool {
        false
    }

    fn can_jump(&self, _state: &RideBehaviourState) -> bool {
        true
    }

    fn mouse_modifies_driver_rotation(&self, _state: &RideBehaviourState) -> (bool, bool) {
        (true, false)
    }

    fn rotation_on_mouse_xy(
        &self,
        _state: &mut RideBehaviourState,
        mouse_x: f32,
        _mouse_y: f32,
        _dt: f32,
    ) -> Vec3 {
        Vec3::new(mouse_x, 0.0, 0.0)
    }
}
