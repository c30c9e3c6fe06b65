//! Orientation activity state machine.
//!
//! A ride moves through `Inactive -> Active -> Returning -> Inactive`. The
//! `Returning` phase is a short timed window that unwinds any roll back to
//! upright before the vehicle hands orientation control back to the default
//! yaw-only behaviour. Camera consumers sample the transition per frame; the
//! simulation advances it once per tick.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::behaviour::{RideBehaviourState, RidePolicy};
use crate::config::RideConfig;
use crate::constants::ROLL_DONE_EPSILON_DEG;
use crate::events::RideSet;
use crate::orientation::{wrap_degrees, OrientationController};

pub struct TransitionPlugin;

impl Plugin for TransitionPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            update_ride_phases
                .in_set(RideSet::PreTick)
                .after(crate::events::handle_mounts)
                .after(crate::events::handle_dismounts),
        );
    }
}

/// Easing applied to the return-to-upright window. Kept configurable; the
/// right curve is a feel decision, not a correctness one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReturnEasing {
    #[default]
    Linear,
    SmoothStep,
    ExpDecay,
}

impl ReturnEasing {
    /// Monotone map of progress `t` in [0, 1] onto eased progress in [0, 1]
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            ReturnEasing::Linear => t,
            ReturnEasing::SmoothStep => t * t * (3.0 - 2.0 * t),
            ReturnEasing::ExpDecay => {
                let k = 4.0;
                (1.0 - (-k * t).exp()) / (1.0 - (-k).exp())
            }
        }
    }
}

/// One in-flight return-to-upright window
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnTransition {
    elapsed_ticks: f32,
    window_ticks: f32,
    pub roll_start_deg: f32,
    pub yaw_start_deg: f32,
    /// Heading the yaw converges on, typically the forward-velocity heading
    pub yaw_target_deg: f32,
    pub easing: ReturnEasing,
}

impl ReturnTransition {
    pub fn new(
        roll_start_deg: f32,
        yaw_start_deg: f32,
        yaw_target_deg: f32,
        window_ticks: f32,
        easing: ReturnEasing,
    ) -> Self {
        Self {
            elapsed_ticks: 0.0,
            window_ticks: window_ticks.max(1.0),
            roll_start_deg,
            yaw_start_deg,
            yaw_target_deg,
            easing,
        }
    }

    /// Advance by a number of simulation ticks; returns true once complete
    pub fn advance(&mut self, ticks: f32) -> bool {
        self.elapsed_ticks = (self.elapsed_ticks + ticks).min(self.window_ticks);
        self.finished()
    }

    pub fn finished(&self) -> bool {
        self.elapsed_ticks >= self.window_ticks
    }

    pub fn progress(&self) -> f32 {
        self.elapsed_ticks / self.window_ticks
    }

    fn eased_at(&self, partial_tick: f32) -> f32 {
        let t = (self.elapsed_ticks + partial_tick.clamp(0.0, 1.0)) / self.window_ticks;
        self.easing.apply(t)
    }

    /// Roll at the given sub-tick fraction; strictly shrinks toward zero
    pub fn sample_roll(&self, partial_tick: f32) -> f32 {
        self.roll_start_deg * (1.0 - self.eased_at(partial_tick))
    }

    /// Yaw converging from the captured start onto the target heading
    pub fn sample_yaw(&self, partial_tick: f32) -> f32 {
        let diff = wrap_degrees(self.yaw_target_deg - self.yaw_start_deg);
        wrap_degrees(self.yaw_start_deg + diff * self.eased_at(partial_tick))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RidePhase {
    #[default]
    Inactive,
    Active,
    Returning,
}

/// Drives one vehicle's activity phase from its behaviour policy. Lives next
/// to the [`OrientationController`] on the vehicle entity.
#[derive(Component, Debug, Default)]
pub struct RideActivity {
    pub phase: RidePhase,
    pub transition: Option<ReturnTransition>,
    /// Set while a controlling rider occupies the driver seat; free
    /// orientation never engages without one.
    pub mounted: bool,
}

impl RideActivity {
    /// One simulation step of the phase machine.
    ///
    /// `seed_yaw`/`seed_pitch` initialize the orientation on first
    /// activation; `heading_yaw` is the convergence target for the return
    /// window (falls back to the current yaw when the vehicle is not
    /// moving).
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        should_roll: bool,
        controller: &mut OrientationController,
        seed_yaw_deg: f32,
        seed_pitch_deg: f32,
        heading_yaw_deg: Option<f32>,
        window_ticks: f32,
        easing: ReturnEasing,
    ) {
        match self.phase {
            RidePhase::Inactive => {
                if should_roll {
                    controller.set_active(true);
                    if controller.orientation().is_none() {
                        controller.initialize(seed_yaw_deg, seed_pitch_deg);
                    }
                    self.transition = None;
                    self.phase = RidePhase::Active;
                }
            }
            RidePhase::Active => {
                if !should_roll {
                    controller.set_active(false);
                    let roll = controller.roll();
                    if roll.abs() <= ROLL_DONE_EPSILON_DEG {
                        // Nothing to unwind
                        controller.reset();
                        self.phase = RidePhase::Inactive;
                    } else {
                        let yaw = controller.yaw();
                        self.transition = Some(ReturnTransition::new(
                            roll,
                            yaw,
                            heading_yaw_deg.unwrap_or(yaw),
                            window_ticks,
                            easing,
                        ));
                        self.phase = RidePhase::Returning;
                    }
                }
            }
            RidePhase::Returning => {
                if should_roll {
                    // Re-engaged before the unwind finished: the retained
                    // orientation picks up exactly where it left off.
                    controller.set_active(true);
                    self.transition = None;
                    self.phase = RidePhase::Active;
                    return;
                }
                let finished = match self.transition.as_mut() {
                    Some(t) => t.advance(1.0),
                    None => true,
                };
                if finished {
                    controller.reset();
                    self.transition = None;
                    self.phase = RidePhase::Inactive;
                }
            }
        }
    }

    /// Immediate cancellation: dismount or vehicle destruction. The pending
    /// transition is abandoned, not completed.
    pub fn abandon(&mut self, controller: &mut OrientationController) {
        self.transition = None;
        self.phase = RidePhase::Inactive;
        self.mounted = false;
        controller.reset();
    }
}

/// Heading of a velocity vector in our yaw convention (forward = -Z),
/// `None` when there is no meaningful horizontal motion.
pub fn heading_yaw_deg(velocity: Vec3) -> Option<f32> {
    if Vec3::new(velocity.x, 0.0, velocity.z).length_squared() < 1e-6 {
        return None;
    }
    Some((-velocity.x).atan2(-velocity.z).to_degrees())
}

fn update_ride_phases(
    config: Res<RideConfig>,
    mut vehicles: Query<(
        &mut RideActivity,
        &mut OrientationController,
        &RidePolicy,
        &RideBehaviourState,
    )>,
) {
    for (mut activity, mut controller, policy, state) in &mut vehicles {
        controller.render_damping = config.render_damping;
        let should_roll =
            activity.mounted && !config.disable_roll && policy.0.should_roll(state);
        let seed_yaw = controller.yaw();
        let seed_pitch = controller.pitch();
        let heading = heading_yaw_deg(state.velocity());
        activity.update(
            should_roll,
            &mut controller,
            seed_yaw,
            seed_pitch,
            heading,
            config.return_window_ticks,
            config.return_easing,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rolled_controller(roll_deg: f32) -> OrientationController {
        let mut c = OrientationController::default();
        c.set_active(true);
        c.initialize(0.0, 0.0);
        c.rotate(0.0, 0.0, roll_deg);
        c
    }

    #[test]
    fn test_activation_seeds_orientation() {
        let mut activity = RideActivity::default();
        let mut c = OrientationController::default();
        activity.update(true, &mut c, 30.0, -10.0, None, 20.0, ReturnEasing::Linear);
        assert_eq!(activity.phase, RidePhase::Active);
        assert!(c.is_active());
        assert!((c.yaw() - 30.0).abs() < 1e-2);
        assert!((c.pitch() + 10.0).abs() < 1e-2);
    }

    #[test]
    fn test_roll_flip_enters_returning_and_unwinds() {
        let mut activity = RideActivity::default();
        let mut c = rolled_controller(45.0);
        activity.phase = RidePhase::Active;

        activity.update(false, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
        assert_eq!(activity.phase, RidePhase::Returning);
        assert!(!c.is_active());
        assert!(c.orientation().is_some(), "matrix is retained for the unwind");

        let mut last_roll = 45.0_f32;
        let mut steps = 0;
        while activity.phase == RidePhase::Returning {
            let roll = activity.transition.as_ref().unwrap().sample_roll(0.0);
            assert!(
                roll <= last_roll + 1e-5,
                "roll must shrink monotonically, {} > {}",
                roll,
                last_roll
            );
            last_roll = roll;
            activity.update(false, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
            steps += 1;
            assert!(steps <= 21, "transition must complete within its window");
        }
        assert_eq!(activity.phase, RidePhase::Inactive);
        assert!(c.orientation().is_none(), "reset after the window elapses");
    }

    #[test]
    fn test_zero_roll_completes_immediately() {
        let mut activity = RideActivity::default();
        let mut c = rolled_controller(0.0);
        activity.phase = RidePhase::Active;
        activity.update(false, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
        assert_eq!(activity.phase, RidePhase::Inactive);
        assert!(c.orientation().is_none());
    }

    #[test]
    fn test_reactivation_mid_return_keeps_rotation() {
        let mut activity = RideActivity::default();
        let mut c = rolled_controller(45.0);
        let before = c.orientation().unwrap();
        activity.phase = RidePhase::Active;

        activity.update(false, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
        activity.update(false, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
        assert_eq!(activity.phase, RidePhase::Returning);

        activity.update(true, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
        assert_eq!(activity.phase, RidePhase::Active);
        assert!(c.is_active());
        assert_eq!(c.orientation().unwrap(), before, "in-flight rotation must survive");
    }

    #[test]
    fn test_abandon_cancels_transition() {
        let mut activity = RideActivity::default();
        let mut c = rolled_controller(45.0);
        activity.phase = RidePhase::Active;
        activity.update(false, &mut c, 0.0, 0.0, None, 20.0, ReturnEasing::Linear);
        assert_eq!(activity.phase, RidePhase::Returning);

        activity.abandon(&mut c);
        assert_eq!(activity.phase, RidePhase::Inactive);
        assert!(activity.transition.is_none());
        assert!(c.orientation().is_none());
    }

    #[test]
    fn test_yaw_converges_on_heading() {
        let t = ReturnTransition::new(45.0, 10.0, 90.0, 20.0, ReturnEasing::Linear);
        let mut t = t;
        assert!((t.sample_yaw(0.0) - 10.0).abs() < 1e-4);
        while !t.advance(1.0) {}
        assert!((t.sample_yaw(0.0) - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_easing_curves_monotone_and_bounded() {
        for easing in [
            ReturnEasing::Linear,
            ReturnEasing::SmoothStep,
            ReturnEasing::ExpDecay,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-6);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-5);
            let mut last = 0.0;
            for step in 0..=20 {
                let v = easing.apply(step as f32 / 20.0);
                assert!(v >= last - 1e-6, "{easing:?} must be monotone");
                last = v;
            }
        }
    }

    #[test]
    fn test_heading_yaw() {
        assert!(heading_yaw_deg(Vec3::ZERO).is_none());
        // Moving along -Z is our zero heading
        let yaw = heading_yaw_deg(Vec3::new(0.0, 0.0, -1.0)).unwrap();
        assert!(yaw.abs() < 1e-4);
        // Moving along -X is +90 degrees
        let yaw = heading_yaw_deg(Vec3::new(-1.0, 0.0, 0.0)).unwrap();
        assert!((yaw - 90.0).abs() < 1e-4);
    }
}
