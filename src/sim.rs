//! In-process movement collaborator for tests and dry runs
//!
//! Models a character on a flat plane. Local movement (`move_to`) can be
//! blocked to simulate walls or collision snags; travel actions teleport
//! the character unless told to fail.

use crate::actions::MovementController;
use crate::clock::ManualClock;
use crate::recovery::RecoveryAction;
use crate::types::Position;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Distance a navmesh travel moves the character
pub const NAVMESH_HOP: f64 = 60.0;

/// Distance a shuttle moves the character
pub const SHUTTLE_HOP: f64 = 500.0;

#[derive(Default)]
struct SimState {
    position: Option<Position>,
    reports_position: bool,
    movement_blocked: bool,
    unblock_on: Option<RecoveryAction>,
    failing: HashSet<RecoveryAction>,
    delay: Option<Duration>,
    clock: Option<(ManualClock, i64)>,
    mounted: bool,
    logged_out: bool,
    calls: Vec<String>,
}

/// Scriptable [`MovementController`]
#[derive(Clone, Default)]
pub struct SimulatedMovement {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedMovement {
    /// Character standing at `position`
    pub fn at(position: Position) -> Self {
        let sim = Self::default();
        {
            let mut s = sim.lock();
            s.position = Some(position);
            s.reports_position = true;
        }
        sim
    }

    /// Character whose position the client cannot read back
    pub fn without_position() -> Self {
        Self::default()
    }

    /// Make `move_to` accept the call without moving
    pub fn block_movement(&self, blocked: bool) {
        self.lock().movement_blocked = blocked;
    }

    /// Free blocked movement once `action`'s first collaborator call runs
    pub fn unblock_on(&self, action: RecoveryAction) {
        self.lock().unblock_on = Some(action);
    }

    /// Make the collaborator call behind `action` report failure
    ///
    /// `MicroPathJitter` stands for every `move_to`, so it also fails the
    /// nudge step of mount and camera actions.
    pub fn fail_action(&self, action: RecoveryAction, fail: bool) {
        let mut s = self.lock();
        if fail {
            s.failing.insert(action);
        } else {
            s.failing.remove(&action);
        }
    }

    /// Sleep this long inside every collaborator call
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Advance `clock` by `secs` on every collaborator call
    pub fn with_clock(self, clock: ManualClock, secs: i64) -> Self {
        self.lock().clock = Some((clock, secs));
        self
    }

    pub fn set_position(&self, position: Position) {
        let mut s = self.lock();
        s.position = Some(position);
        s.reports_position = true;
    }

    /// True position, regardless of whether it is reported
    pub fn position(&self) -> Option<Position> {
        self.lock().position
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    pub fn is_logged_out(&self) -> bool {
        self.lock().logged_out
    }

    /// Collaborator calls in order, e.g. `move_to 103.0 101.0`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    async fn enter(&self, call: String, action: RecoveryAction) -> bool {
        let delay = {
            let mut s = self.lock();
            s.calls.push(call);
            if let Some((clock, secs)) = &s.clock {
                clock.advance_secs(*secs);
            }
            if s.unblock_on == Some(action) {
                s.movement_blocked = false;
            }
            s.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        !self.lock().failing.contains(&action)
    }

    fn hop(&self, distance: f64) {
        let mut s = self.lock();
        let from = s.position.unwrap_or_default();
        s.position = Some(Position::new(from.x + distance, from.y));
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MovementController for SimulatedMovement {
    async fn current_position(&self) -> Option<Position> {
        let s = self.lock();
        if s.reports_position {
            s.position
        } else {
            None
        }
    }

    async fn move_to(&self, x: f64, y: f64) -> bool {
        if !self
            .enter(
                format!("move_to {:.1} {:.1}", x, y),
                RecoveryAction::MicroPathJitter,
            )
            .await
        {
            return false;
        }
        let mut s = self.lock();
        if !s.movement_blocked {
            s.position = Some(Position::new(x, y));
        }
        true
    }

    async fn toggle_mount(&self) -> bool {
        if !self
            .enter("toggle_mount".to_string(), RecoveryAction::MountToggle)
            .await
        {
            return false;
        }
        let mut s = self.lock();
        s.mounted = !s.mounted;
        true
    }

    async fn rotate_camera(&self, degrees: f64) -> bool {
        self.enter(
            format!("rotate_camera {:.0}", degrees),
            RecoveryAction::FaceCameraRescan,
        )
        .await
    }

    async fn travel_to_navmesh_waypoint(&self, id: &str) -> bool {
        if !self
            .enter(
                format!("travel_to_navmesh_waypoint {}", id),
                RecoveryAction::NavmeshWaypoint,
            )
            .await
        {
            return false;
        }
        self.hop(NAVMESH_HOP);
        true
    }

    async fn invoke_shuttle(&self) -> bool {
        if !self
            .enter("invoke_shuttle".to_string(), RecoveryAction::ShuttleFallback)
            .await
        {
            return false;
        }
        self.hop(SHUTTLE_HOP);
        true
    }

    async fn logout(&self) -> bool {
        if !self
            .enter("logout".to_string(), RecoveryAction::SafeLogout)
            .await
        {
            return false;
        }
        self.lock().logged_out = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_and_block() {
        let sim = SimulatedMovement::at(Position::new(0.0, 0.0));
        assert!(sim.move_to(3.0, 4.0).await);
        assert_eq!(sim.position(), Some(Position::new(3.0, 4.0)));

        sim.block_movement(true);
        assert!(sim.move_to(10.0, 10.0).await);
        assert_eq!(sim.position(), Some(Position::new(3.0, 4.0)));
        assert_eq!(sim.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unblock_on_mount() {
        let sim = SimulatedMovement::at(Position::new(0.0, 0.0));
        sim.block_movement(true);
        sim.unblock_on(RecoveryAction::MountToggle);

        assert!(sim.toggle_mount().await);
        assert!(sim.is_mounted());
        sim.move_to(5.0, 0.0).await;
        assert_eq!(sim.position(), Some(Position::new(5.0, 0.0)));
    }

    #[tokio::test]
    async fn test_failing_travel_stays_put() {
        let sim = SimulatedMovement::at(Position::new(0.0, 0.0));
        sim.fail_action(RecoveryAction::ShuttleFallback, true);
        assert!(!sim.invoke_shuttle().await);
        assert_eq!(sim.position(), Some(Position::new(0.0, 0.0)));

        assert!(sim.travel_to_navmesh_waypoint("wp").await);
        assert_eq!(sim.position(), Some(Position::new(NAVMESH_HOP, 0.0)));
    }

    #[tokio::test]
    async fn test_clock_advances_per_call() {
        let clock = ManualClock::starting_now();
        let start = crate::clock::Clock::now(&clock);
        let sim = SimulatedMovement::at(Position::default()).with_clock(clock.clone(), 10);

        sim.logout().await;
        sim.logout().await;
        assert_eq!(crate::clock::Clock::now(&clock) - start, chrono::Duration::seconds(20));
        assert!(sim.is_logged_out());
    }

    #[tokio::test]
    async fn test_hidden_position() {
        let sim = SimulatedMovement::without_position();
        assert!(sim.current_position().await.is_none());
        sim.move_to(1.0, 1.0).await;
        assert!(sim.current_position().await.is_none());
        assert_eq!(sim.position(), Some(Position::new(1.0, 1.0)));
    }
}
