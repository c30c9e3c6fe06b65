//! Centralized riding constants.
//!
//! Eliminates magic numbers duplicated across the input adapter, rider
//! offsets, and orientation controller. Per-behaviour tuning (handling rates,
//! stamina curves) stays in the behaviour implementations as the single
//! source of truth.

// =====================================================
// Rider rotation offsets
// =====================================================

/// Maximum pitch of the rider's look offset relative to the vehicle (degrees)
pub const RIDE_PITCH_CLAMP_DEG: f32 = 90.0;

/// Maximum yaw of the rider's look offset relative to the vehicle (degrees)
pub const RIDE_YAW_CLAMP_DEG: f32 = 105.0;

/// Degrees of look rotation per raw pointer count
pub const POINTER_DEG_PER_COUNT: f32 = 0.15;

/// Recentre rate for idle offset axes: lerp factor = min(rate * dt, 1)
pub const OFFSET_DECAY_RATE: f32 = 5.0;

/// Offsets inside this band snap to exactly zero while decaying (degrees)
pub const OFFSET_SNAP_EPSILON_DEG: f32 = 1e-3;

// =====================================================
// Orientation controller
// =====================================================

/// Per-tick slerp factor pulling the smoothed render orientation toward the
/// authoritative matrix
pub const RENDER_DAMPING: f32 = 0.66;

/// Orthonormality tolerance for the orientation matrix
pub const ORTHONORMAL_EPSILON: f32 = 1e-5;

// =====================================================
// Angular velocity
// =====================================================

/// Scale on behaviour angular rates when smoothing is disabled (per second)
pub const ANG_VEL_SCALE: f32 = 10.0;

/// Scale on behaviour angular rates fed through the low-pass smoothers
/// (per second, integrated over dt like the unsmoothed path)
pub const SMOOTHED_ANG_VEL_SCALE: f32 = 0.5;

/// Responsiveness of the single-pole angular velocity smoothers
pub const SMOOTHING_RESPONSIVENESS: f32 = 10.0;

// =====================================================
// Return-to-upright transition
// =====================================================

/// Length of the return-to-upright window, in simulation ticks
pub const RETURN_WINDOW_TICKS: f32 = 20.0;

/// Roll magnitude below which the return transition completes immediately
/// (degrees)
pub const ROLL_DONE_EPSILON_DEG: f32 = 0.5;
