//! Driver input translation.
//!
//! Converts raw pointer deltas and digital movement keys into vehicle
//! rotations, rider look offsets, and driver intent vectors, honouring the
//! per-behaviour routing flags and the player's sensitivity options.

use bevy::prelude::*;

use crate::behaviour::{RideBehaviourState, RidePolicy};
use crate::config::RideConfig;
use crate::constants::{ANG_VEL_SCALE, SMOOTHED_ANG_VEL_SCALE};
use crate::orientation::OrientationController;
use crate::rider::DriverRotationOffset;

pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DriverInputAdapter>();
    }
}

/// Vanilla-style cubic sensitivity response: an option in [0, 1] maps to a
/// multiplier in [0.008, 0.512].
pub fn riding_sensitivity(option: f32) -> f32 {
    let base = option.clamp(0.0, 1.0) * 0.6 + 0.2;
    base * base * base
}

/// Collapse an analog axis to a digital -1/0/+1 intent
pub fn digital(value: f32) -> f32 {
    if value == 0.0 || !value.is_finite() {
        0.0
    } else {
        value.signum()
    }
}

/// Movement keys pressed by the driver this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub sneak: bool,
}

/// Digital movement intent in the vehicle's local frame: x is strafe (left
/// positive), y is vertical, z is forward.
pub fn gather_driver_intent(keys: DriverKeys) -> Vec3 {
    let strafe = digital(f32::from(keys.left) - f32::from(keys.right));
    let vertical = digital(f32::from(keys.jump) - f32::from(keys.sneak));
    let forward = digital(f32::from(keys.forward) - f32::from(keys.backward));
    Vec3::new(strafe, vertical, forward)
}

/// Single-pole low-pass filter over one angular rate axis
#[derive(Debug, Clone, Copy, Default)]
pub struct MouseSmoother {
    value: f32,
}

impl MouseSmoother {
    /// Pull the filtered value toward `target`; returns the new value.
    /// A non-positive `dt` contributes no velocity this tick but keeps the
    /// accumulated filter state.
    pub fn smooth(&mut self, target: f32, dt: f32, responsiveness: f32) -> f32 {
        if !dt.is_finite() || dt <= 0.0 || !target.is_finite() {
            return 0.0;
        }
        let alpha = 1.0 - (-responsiveness.max(0.0) * dt).exp();
        self.value += (target - self.value) * alpha;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Per-client adapter between the pointer/keyboard and the mounted vehicle.
/// Holds the angular velocity smoothers, which carry state across ticks and
/// must be reset when the ride ends.
#[derive(Resource, Debug, Default)]
pub struct DriverInputAdapter {
    yaw_smoother: MouseSmoother,
    pitch_smoother: MouseSmoother,
    roll_smoother: MouseSmoother,
}

impl DriverInputAdapter {
    /// Route one pointer delta. Free-look and non-driver passengers only move
    /// their own look offset; the driver's input is split per axis between
    /// the vehicle and the offset according to the behaviour's routing
    /// flags, with undriven offset axes decaying back to centre.
    #[allow(clippy::too_many_arguments)]
    pub fn on_pointer_delta(
        &mut self,
        config: &RideConfig,
        policy: &RidePolicy,
        state: &mut RideBehaviourState,
        controller: &mut OrientationController,
        offset: &mut DriverRotationOffset,
        dx: f32,
        dy: f32,
        dt: f32,
        free_looking: bool,
        is_driver: bool,
    ) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        if free_looking || !is_driver {
            offset.apply_pointer(dx, dy);
            return;
        }

        let sensitivity = riding_sensitivity(config.pointer_sensitivity);
        let mut mouse_x = dx * sensitivity * config.x_axis_sensitivity;
        let mut mouse_y = dy * sensitivity * config.y_axis_sensitivity;
        if config.invert_yaw {
            mouse_x = -mouse_x;
        }
        if config.invert_pitch {
            mouse_y = -mouse_y;
        }
        if config.swap_axes {
            std::mem::swap(&mut mouse_x, &mut mouse_y);
        }

        let (pitch_to_rider, yaw_to_rider) = policy.0.mouse_modifies_driver_rotation(state);
        let mut vehicle_x = mouse_x;
        let mut vehicle_y = mouse_y;
        if yaw_to_rider {
            offset.apply_pointer(dx, 0.0);
            vehicle_x = 0.0;
        } else {
            offset.decay_yaw(dt);
        }
        if pitch_to_rider {
            offset.apply_pointer(0.0, dy);
            vehicle_y = 0.0;
        } else {
            offset.decay_pitch(dt);
        }

        let rotation = policy.0.rotation_on_mouse_xy(state, vehicle_x, vehicle_y, dt);
        controller.rotate(rotation.x, rotation.y, rotation.z);
    }

    /// Apply the behaviour's continuous angular rate for this tick. Smoothed
    /// behaviours run through the low-pass filters at a reduced scale;
    /// unsmoothed ones integrate the raw rate directly.
    pub fn apply_angular_velocity(
        &mut self,
        config: &RideConfig,
        policy: &RidePolicy,
        state: &RideBehaviourState,
        controller: &mut OrientationController,
        dt: f32,
    ) {
        if !controller.is_active() {
            return;
        }
        let base = policy.0.ang_roll_vel(state, controller, dt);
        if policy.0.use_ang_vel_smoothing(state) {
            // Rates, not deltas: both branches integrate over dt so the
            // turn covered in a second is tick-rate independent.
            let k = config.smoothing_responsiveness;
            let yaw = self.yaw_smoother.smooth(base.x, dt, k) * SMOOTHED_ANG_VEL_SCALE * dt;
            let pitch = self.pitch_smoother.smooth(base.y, dt, k) * SMOOTHED_ANG_VEL_SCALE * dt;
            let roll = self.roll_smoother.smooth(base.z, dt, k) * SMOOTHED_ANG_VEL_SCALE * dt;
            controller.apply_global_yaw(yaw);
            controller.apply_global_pitch(pitch);
            controller.rotate_roll(roll);
        } else {
            let scaled = base * ANG_VEL_SCALE * dt;
            controller.apply_global_yaw(scaled.x);
            controller.apply_global_pitch(scaled.y);
            controller.rotate_roll(scaled.z);
        }
    }

    /// Drop smoother state when the ride ends so the next mount starts cold
    pub fn reset(&mut self) {
        self.yaw_smoother.reset();
        self.pitch_smoother.reset();
        self.roll_smoother.reset();
    }
}
