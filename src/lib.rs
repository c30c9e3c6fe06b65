//! Ride Core - Mounted Vehicle Control Library
//!
//! Deterministic core for rideable vehicles with free orientation:
//! - Orientation controller (orthonormal rotation, render smoothing)
//! - Rider look offsets relative to the vehicle frame
//! - Pluggable ride behaviours (bird flight, hovering)
//! - Driver input translation (pointer routing, sensitivity, smoothing)
//! - Client/server state synchronization with per-observer dirty tracking
//! - Return-to-upright transitions when free orientation disengages

pub mod behaviour;
pub mod config;
pub mod constants;
pub mod events;
pub mod input;
pub mod logging;
pub mod orientation;
pub mod rider;
pub mod sync;
pub mod transition;

use bevy::prelude::*;

/// Everything the riding core needs on a Bevy app: resources, events, and
/// the `FixedUpdate` tick pipeline.
pub struct RideCorePlugin;

impl Plugin for RideCorePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            logging::LoggingPlugin,
            config::ConfigPlugin,
            events::EventsPlugin,
            input::InputPlugin,
            orientation::OrientationPlugin,
            transition::TransitionPlugin,
            sync::SyncPlugin,
        ));
    }
}
