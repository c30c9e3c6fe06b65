//! Runtime riding configuration.
//!
//! One resource carrying every player-facing tunable: pointer sensitivity
//! and axis options, smoothing responsiveness, offset decay, and the
//! return-to-upright policy. Serializable so a host process can load it
//! from settings and ship it across an embedding boundary as JSON.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    OFFSET_DECAY_RATE, RENDER_DAMPING, RETURN_WINDOW_TICKS, RIDE_PITCH_CLAMP_DEG,
    RIDE_YAW_CLAMP_DEG, SMOOTHING_RESPONSIVENESS,
};
use crate::transition::ReturnEasing;

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RideConfig>();
    }
}

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RideConfig {
    /// Pointer sensitivity option in [0, 1], vanilla-style cubic response
    pub pointer_sensitivity: f32,
    /// Extra per-axis multiplier on the horizontal pointer axis
    pub x_axis_sensitivity: f32,
    /// Extra per-axis multiplier on the vertical pointer axis
    pub y_axis_sensitivity: f32,
    pub invert_yaw: bool,
    pub invert_pitch: bool,
    /// Route horizontal pointer input to pitch and vertical to yaw/roll
    pub swap_axes: bool,
    /// Accessibility switch: forces every behaviour upright
    pub disable_roll: bool,
    pub smoothing_responsiveness: f32,
    pub offset_decay_rate: f32,
    /// Look offset clamp relative to the vehicle, degrees
    pub pitch_clamp_deg: f32,
    pub yaw_clamp_deg: f32,
    pub return_window_ticks: f32,
    pub return_easing: ReturnEasing,
    pub render_damping: f32,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            pointer_sensitivity: 0.5,
            x_axis_sensitivity: 1.0,
            y_axis_sensitivity: 1.0,
            invert_yaw: false,
            invert_pitch: false,
            swap_axes: false,
            disable_roll: false,
            smoothing_responsiveness: SMOOTHING_RESPONSIVENESS,
            offset_decay_rate: OFFSET_DECAY_RATE,
            pitch_clamp_deg: RIDE_PITCH_CLAMP_DEG,
            yaw_clamp_deg: RIDE_YAW_CLAMP_DEG,
            return_window_ticks: RETURN_WINDOW_TICKS,
            return_easing: ReturnEasing::default(),
            render_damping: RENDER_DAMPING,
        }
    }
}

impl RideConfig {
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Parse a config from JSON, falling back to defaults on malformed input
    /// rather than aborting the ride layer.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str(json) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "malformed ride config, using defaults");
                Self::default()
            }
        }
    }

    /// Strict parse for callers that want to surface the error
    pub fn try_from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RideConfig::default();
        assert!((config.pointer_sensitivity - 0.5).abs() < f32::EPSILON);
        assert!(!config.invert_yaw);
        assert!(!config.disable_roll);
        assert_eq!(config.return_easing, ReturnEasing::Linear);
        assert!((config.return_window_ticks - 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = RideConfig::default();
        config.invert_pitch = true;
        config.return_easing = ReturnEasing::SmoothStep;
        config.pointer_sensitivity = 0.8;
        let json = config.to_json().unwrap();
        let restored = RideConfig::from_json(&json);
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = RideConfig::from_json(r#"{"disable_roll": true}"#);
        assert!(config.disable_roll);
        assert!((config.offset_decay_rate - OFFSET_DECAY_RATE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_malformed_json_falls_back() {
        let config = RideConfig::from_json("not json {");
        assert_eq!(config, RideConfig::default());
        assert!(RideConfig::try_from_json("not json {").is_err());
    }
}
