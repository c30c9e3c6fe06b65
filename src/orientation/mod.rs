//! Free orientation control for rideable vehicles.
//!
//! A vehicle carrying a controlling rider in a free-orientation mode (flight,
//! swimming) owns an [`OrientationController`]: an orthonormal 3x3 rotation
//! that replaces the default upright yaw-only orientation while active. The
//! controller also maintains a damped render orientation pair so observing
//! clients can interpolate between discrete network updates without jitter.

use bevy::prelude::*;

use crate::constants::RENDER_DAMPING;
use crate::events::RideSet;

pub struct OrientationPlugin;

impl Plugin for OrientationPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            tick_orientation_controllers.in_set(RideSet::Tick),
        );
    }
}

/// Forward basis vector of an unrotated vehicle
pub const FORWARDS: Vec3 = Vec3::NEG_Z;
/// Up basis vector of an unrotated vehicle
pub const UP: Vec3 = Vec3::Y;
/// Left basis vector of an unrotated vehicle
pub const LEFT: Vec3 = Vec3::NEG_X;

/// Wrap an angle in degrees into [-180, 180)
pub fn wrap_degrees(deg: f32) -> f32 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Free orientation state of one vehicle entity.
///
/// `orientation` is `None` until seeded via [`initialize`](Self::initialize)
/// or [`set_orientation`](Self::set_orientation); every mutation keeps it
/// orthonormal. Deactivating retains the matrix so a return-to-upright
/// transition can animate from it; only [`reset`](Self::reset) discards.
#[derive(Component, Debug, Clone)]
pub struct OrientationController {
    active: bool,
    orientation: Option<Mat3>,
    render_prev: Option<Quat>,
    render_current: Option<Quat>,
    /// True on the client that drives this vehicle. The driver reads the
    /// immediate orientation instead of the smoothed pair so input never
    /// feels lagged.
    pub local_authority: bool,
    /// Per-tick slerp factor for the smoothed render orientation
    pub render_damping: f32,
}

impl Default for OrientationController {
    fn default() -> Self {
        Self {
            active: false,
            orientation: None,
            render_prev: None,
            render_current: None,
            local_authority: false,
            render_damping: RENDER_DAMPING,
        }
    }
}

impl OrientationController {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn orientation(&self) -> Option<Mat3> {
        self.orientation
    }

    /// Enable or disable free-orientation mode. Deactivating does NOT clear
    /// the matrix; the return transition needs it. Use [`reset`](Self::reset)
    /// to discard.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Seed the orientation from the vehicle's current look angles (degrees).
    pub fn initialize(&mut self, yaw_deg: f32, pitch_deg: f32) {
        if !yaw_deg.is_finite() || !pitch_deg.is_finite() {
            return;
        }
        let m = Mat3::from_euler(
            EulerRot::YXZ,
            yaw_deg.to_radians(),
            pitch_deg.to_radians(),
            0.0,
        );
        self.orientation = Some(orthonormalized(m));
    }

    /// Replace the orientation wholesale (replica update path). Non-finite
    /// input is dropped.
    pub fn set_orientation(&mut self, m: Mat3) {
        if !m.is_finite() {
            return;
        }
        self.orientation = Some(orthonormalized(m));
    }

    /// Compose an incremental local-frame rotation: yaw, then pitch, then
    /// roll (degrees). No-op while inactive or before the orientation has
    /// been seeded. The result is re-orthonormalized so repeated small
    /// rotations cannot drift the matrix.
    pub fn rotate(&mut self, yaw_deg: f32, pitch_deg: f32, roll_deg: f32) {
        if !self.active {
            return;
        }
        if !yaw_deg.is_finite() || !pitch_deg.is_finite() || !roll_deg.is_finite() {
            return;
        }
        let Some(m) = self.orientation else {
            return;
        };
        let composed = m
            * Mat3::from_rotation_y(yaw_deg.to_radians())
            * Mat3::from_rotation_x(pitch_deg.to_radians())
            * Mat3::from_rotation_z(roll_deg.to_radians());
        self.orientation = Some(orthonormalized(composed));
    }

    pub fn rotate_yaw(&mut self, yaw_deg: f32) {
        self.rotate(yaw_deg, 0.0, 0.0);
    }

    pub fn rotate_pitch(&mut self, pitch_deg: f32) {
        self.rotate(0.0, pitch_deg, 0.0);
    }

    pub fn rotate_roll(&mut self, roll_deg: f32) {
        self.rotate(0.0, 0.0, roll_deg);
    }

    /// Rotate about the world Y axis (banking turns change heading globally,
    /// not in the rolled local frame).
    pub fn apply_global_yaw(&mut self, yaw_deg: f32) {
        if !self.active || !yaw_deg.is_finite() {
            return;
        }
        let Some(m) = self.orientation else {
            return;
        };
        self.orientation = Some(orthonormalized(Mat3::from_rotation_y(yaw_deg.to_radians()) * m));
    }

    /// Rotate about the horizontal projection of the local pitch axis, so a
    /// positive angle tilts the nose up regardless of the current roll.
    /// Falls back to a no-op when the pitch axis has gone vertical and the
    /// projection degenerates.
    pub fn apply_global_pitch(&mut self, pitch_deg: f32) {
        if !self.active || !pitch_deg.is_finite() {
            return;
        }
        let Some(m) = self.orientation else {
            return;
        };
        let pitch_axis = m * -LEFT;
        let horizontal = Vec3::new(pitch_axis.x, 0.0, pitch_axis.z);
        if horizontal.length_squared() < 1e-8 {
            return;
        }
        let q = Quat::from_axis_angle(horizontal.normalize(), pitch_deg.to_radians());
        self.orientation = Some(orthonormalized(Mat3::from_quat(q) * m));
    }

    /// Advance the smoothed render pair. Must run exactly once per simulation
    /// tick; the render loop interpolates between the two states it leaves
    /// behind.
    pub fn tick(&mut self) {
        if !self.active {
            return;
        }
        let Some(m) = self.orientation else {
            return;
        };
        let target = Quat::from_mat3(&m);
        self.render_prev = self.render_current;
        let current = self.render_current.unwrap_or(target);
        self.render_current = Some(current.slerp(target, self.render_damping));
    }

    /// Interpolated orientation for presentation, parameterized by the
    /// sub-tick fraction. Pure: repeated calls within a frame are safe. The
    /// driving client bypasses smoothing and gets the immediate orientation.
    pub fn render_orientation(&self, partial_tick: f32) -> Quat {
        let authoritative = self.orientation.map(|m| Quat::from_mat3(&m));
        if self.local_authority {
            return authoritative.unwrap_or(Quat::IDENTITY);
        }
        let new = self.render_current.or(authoritative);
        let old = self.render_prev.or(new);
        match (old, new) {
            (Some(old), Some(new)) => old.slerp(new, partial_tick.clamp(0.0, 1.0)),
            _ => Quat::IDENTITY,
        }
    }

    /// Clear everything back to inert defaults. Called on dismount.
    pub fn reset(&mut self) {
        self.active = false;
        self.orientation = None;
        self.render_prev = None;
        self.render_current = None;
    }

    fn euler_yxz_deg(&self) -> (f32, f32, f32) {
        let Some(m) = self.orientation else {
            return (0.0, 0.0, 0.0);
        };
        let (y, x, z) = Quat::from_mat3(&m).to_euler(EulerRot::YXZ);
        if !y.is_finite() || !x.is_finite() || !z.is_finite() {
            return (0.0, 0.0, 0.0);
        }
        (
            wrap_degrees(y.to_degrees()),
            wrap_degrees(x.to_degrees()),
            wrap_degrees(z.to_degrees()),
        )
    }

    /// Heading in degrees, decomposed in YXZ order. Zero when unseeded.
    pub fn yaw(&self) -> f32 {
        self.euler_yxz_deg().0
    }

    pub fn pitch(&self) -> f32 {
        self.euler_yxz_deg().1
    }

    pub fn roll(&self) -> f32 {
        self.euler_yxz_deg().2
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation.map_or(FORWARDS, |m| m * FORWARDS)
    }

    pub fn left(&self) -> Vec3 {
        self.orientation.map_or(LEFT, |m| m * LEFT)
    }

    pub fn up(&self) -> Vec3 {
        self.orientation.map_or(UP, |m| m * UP)
    }
}

/// Rebuild the nearest orthonormal matrix via a normalized quaternion
/// round-trip; identity when the input has degenerated past recovery.
fn orthonormalized(m: Mat3) -> Mat3 {
    if !m.is_finite() {
        return Mat3::IDENTITY;
    }
    let q = Quat::from_mat3(&m).normalize();
    if q.is_finite() {
        Mat3::from_quat(q)
    } else {
        Mat3::IDENTITY
    }
}

fn tick_orientation_controllers(mut query: Query<&mut OrientationController>) {
    for mut controller in &mut query {
        controller.tick();
    }
}
