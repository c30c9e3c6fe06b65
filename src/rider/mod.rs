//! Rider look offsets relative to the vehicle.
//!
//! While a vehicle's free orientation is active, the rider's look direction
//! is stored relative to the vehicle frame rather than in world space. The
//! offsets absorb free-look pointer input and recentre smoothly once the
//! input stops driving them.

use bevy::prelude::*;

use crate::constants::{
    OFFSET_DECAY_RATE, OFFSET_SNAP_EPSILON_DEG, POINTER_DEG_PER_COUNT, RIDE_PITCH_CLAMP_DEG,
    RIDE_YAW_CLAMP_DEG,
};
use crate::orientation::wrap_degrees;

/// Per-passenger look offset, applied only while that passenger controls a
/// vehicle with an active orientation controller. Reset on dismount, never
/// persisted.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct DriverRotationOffset {
    /// Pitch relative to the vehicle, degrees
    pub ride_x_rot: f32,
    /// Yaw relative to the vehicle, degrees
    pub ride_y_rot: f32,
    /// World-space eye position override for first-person rendering
    pub ride_eye_pos: Vec3,
    pub pitch_clamp_deg: f32,
    pub yaw_clamp_deg: f32,
    pub decay_rate: f32,
}

impl Default for DriverRotationOffset {
    fn default() -> Self {
        Self {
            ride_x_rot: 0.0,
            ride_y_rot: 0.0,
            ride_eye_pos: Vec3::ZERO,
            pitch_clamp_deg: RIDE_PITCH_CLAMP_DEG,
            yaw_clamp_deg: RIDE_YAW_CLAMP_DEG,
            decay_rate: OFFSET_DECAY_RATE,
        }
    }
}

impl DriverRotationOffset {
    /// Accumulate raw pointer counts into the offset, vanilla-style
    /// (0.15 degrees per count), clamping to the configured ranges.
    pub fn apply_pointer(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        self.ride_x_rot = (self.ride_x_rot + dy * POINTER_DEG_PER_COUNT)
            .clamp(-self.pitch_clamp_deg, self.pitch_clamp_deg);
        self.ride_y_rot = (self.ride_y_rot + dx * POINTER_DEG_PER_COUNT)
            .clamp(-self.yaw_clamp_deg, self.yaw_clamp_deg);
    }

    /// Seed the offsets from the difference between the rider's and the
    /// vehicle's current look angles so the camera holds its world direction
    /// the instant free orientation activates.
    pub fn align_to_vehicle(
        &mut self,
        rider_pitch_deg: f32,
        rider_yaw_deg: f32,
        vehicle_pitch_deg: f32,
        vehicle_yaw_deg: f32,
    ) {
        self.ride_x_rot = wrap_degrees(rider_pitch_deg - vehicle_pitch_deg)
            .clamp(-self.pitch_clamp_deg, self.pitch_clamp_deg);
        self.ride_y_rot = wrap_degrees(rider_yaw_deg - vehicle_yaw_deg)
            .clamp(-self.yaw_clamp_deg, self.yaw_clamp_deg);
    }

    /// Recentre the pitch axis toward zero. Exponential-style lerp with the
    /// factor capped at 1, so the offset never overshoots; a zero `dt` is a
    /// no-op.
    pub fn decay_pitch(&mut self, dt: f32) {
        self.ride_x_rot = decay_axis(self.ride_x_rot, self.decay_rate, dt);
    }

    /// Recentre the yaw axis toward zero.
    pub fn decay_yaw(&mut self, dt: f32) {
        self.ride_y_rot = decay_axis(self.ride_y_rot, self.decay_rate, dt);
    }

    pub fn is_centred(&self) -> bool {
        self.ride_x_rot == 0.0 && self.ride_y_rot == 0.0
    }

    /// Clear to inert defaults. Called on dismount; mid-frame dismounts
    /// abandon the offsets without further interpolation.
    pub fn reset(&mut self) {
        self.ride_x_rot = 0.0;
        self.ride_y_rot = 0.0;
        self.ride_eye_pos = Vec3::ZERO;
    }
}

fn decay_axis(value_deg: f32, rate: f32, dt: f32) -> f32 {
    if !dt.is_finite() || dt <= 0.0 {
        return value_deg;
    }
    let factor = (rate * dt).clamp(0.0, 1.0);
    let decayed = wrap_degrees(value_deg) * (1.0 - factor);
    if decayed.abs() < OFFSET_SNAP_EPSILON_DEG {
        0.0
    } else {
        decayed
    }
}
