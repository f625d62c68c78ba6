//! Recovery action execution against the movement collaborator
//!
//! The collaborator (input injection + position read-back) lives outside
//! this crate. [`ActionRunner`] turns one ladder rung into collaborator
//! calls, bounds them (position reads included) with the action timeout,
//! and judges success from the position before and after.

use crate::config::{ActionProfile, NavmeshWaypoint};
use crate::recovery::RecoveryAction;
use crate::types::Position;
use async_trait::async_trait;
use serde_json::json;
use std::f64::consts::TAU;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

/// Movement/input collaborator contract
///
/// Each call returns whether the collaborator believes it succeeded. The
/// engine never trusts that alone for movement actions; it compares
/// positions.
#[async_trait]
pub trait MovementController: Send + Sync {
    /// Latest position read back from the client, if available
    async fn current_position(&self) -> Option<Position>;

    async fn move_to(&self, x: f64, y: f64) -> bool;

    async fn toggle_mount(&self) -> bool;

    async fn rotate_camera(&self, degrees: f64) -> bool;

    async fn travel_to_navmesh_waypoint(&self, id: &str) -> bool;

    async fn invoke_shuttle(&self) -> bool;

    async fn logout(&self) -> bool;
}

/// Outcome of one action run
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub success: bool,

    /// Failure reason when `success` is false
    pub error: Option<String>,

    /// Action-specific payload for the attempt record
    pub result: serde_json::Value,

    /// Position read after the action, if any
    pub position_after: Option<Position>,
}

impl ActionReport {
    fn failed(error: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            result,
            position_after: None,
        }
    }
}

/// Executes ladder rungs through a movement collaborator
pub struct ActionRunner {
    movement: Arc<dyn MovementController>,
    waypoints: Vec<NavmeshWaypoint>,
    success_displacement: f64,
}

impl ActionRunner {
    /// Create runner
    pub fn new(
        movement: Arc<dyn MovementController>,
        waypoints: Vec<NavmeshWaypoint>,
        success_displacement: f64,
    ) -> Self {
        Self {
            movement,
            waypoints,
            success_displacement,
        }
    }

    /// Run one action under its timeout
    ///
    /// `fallback_position` stands in when the collaborator cannot report a
    /// position before the action (typically the detection's coordinates).
    pub async fn run(
        &self,
        profile: &ActionProfile,
        fallback_position: Option<Position>,
    ) -> ActionReport {
        // Reads, the action and the post-check share one deadline
        let deadline = Instant::now() + profile.timeout;

        let before = timeout_at(deadline, self.movement.current_position())
            .await
            .ok()
            .flatten()
            .or(fallback_position);

        let call = self.invoke(profile, before);
        let invoked = match timeout_at(deadline, call).await {
            Ok(invoked) => invoked,
            Err(_) => return Self::timed_out(profile, before),
        };

        let (ok, mut details) = match invoked {
            Ok(pair) => pair,
            Err(reason) => return ActionReport::failed(reason, json!({ "from": before })),
        };

        if !ok {
            return ActionReport::failed(
                format!("{} rejected by movement collaborator", profile.action),
                json!({ "from": before, "details": details }),
            );
        }

        if !profile.action.verifies_movement() {
            return ActionReport {
                success: true,
                error: None,
                result: details,
                position_after: None,
            };
        }

        let after = match timeout_at(deadline, self.movement.current_position()).await {
            Ok(after) => after,
            Err(_) => return Self::timed_out(profile, before),
        };
        let displacement = match (before, after) {
            (Some(b), Some(a)) => Some(b.distance_to(&a)),
            _ => None,
        };

        if let serde_json::Value::Object(map) = &mut details {
            map.insert("from".to_string(), json!(before));
            map.insert("to".to_string(), json!(after));
            map.insert("displacement".to_string(), json!(displacement));
        }

        debug!(action = %profile.action, ?before, ?after, ?displacement, "Action post-check");

        match displacement {
            Some(d) if d >= self.success_displacement => ActionReport {
                success: true,
                error: None,
                result: details,
                position_after: after,
            },
            Some(d) => ActionReport {
                success: false,
                error: Some(format!(
                    "position changed {:.2} units, below {:.2}",
                    d, self.success_displacement
                )),
                result: details,
                position_after: after,
            },
            None => ActionReport {
                success: false,
                error: Some("position unavailable for post-action check".to_string()),
                result: details,
                position_after: after,
            },
        }
    }

    fn timed_out(profile: &ActionProfile, before: Option<Position>) -> ActionReport {
        ActionReport::failed(
            format!(
                "{} timed out after {:.1}s",
                profile.action,
                profile.timeout.as_secs_f64()
            ),
            json!({ "from": before, "timed_out": true }),
        )
    }

    /// Collaborator calls for one action; `Err` means it could not be attempted
    async fn invoke(
        &self,
        profile: &ActionProfile,
        before: Option<Position>,
    ) -> std::result::Result<(bool, serde_json::Value), String> {
        let m = &self.movement;
        match profile.action {
            RecoveryAction::MicroPathJitter => {
                let origin = before.ok_or("no known position to jitter around")?;
                let target = origin.offset(random_angle(), profile.jitter_radius);
                let ok = m.move_to(target.x, target.y).await;
                Ok((ok, json!({ "target": target })))
            }
            RecoveryAction::MountToggle => {
                let origin = before.ok_or("no known position to nudge from")?;
                if !m.toggle_mount().await {
                    return Ok((false, json!({ "stage": "toggle_mount" })));
                }
                let target = origin.offset(random_angle(), profile.nudge_distance);
                let ok = m.move_to(target.x, target.y).await;
                Ok((ok, json!({ "target": target })))
            }
            RecoveryAction::FaceCameraRescan => {
                let origin = before.ok_or("no known position to nudge from")?;
                if !m.rotate_camera(profile.camera_degrees).await {
                    return Ok((false, json!({ "stage": "rotate_camera" })));
                }
                let target = origin.offset(random_angle(), profile.nudge_distance);
                let ok = m.move_to(target.x, target.y).await;
                Ok((
                    ok,
                    json!({ "camera_degrees": profile.camera_degrees, "target": target }),
                ))
            }
            RecoveryAction::NavmeshWaypoint => {
                let waypoint = nearest_waypoint(&self.waypoints, before)
                    .ok_or("no navmesh waypoints configured")?;
                let ok = m.travel_to_navmesh_waypoint(&waypoint.id).await;
                Ok((ok, json!({ "waypoint": waypoint.id })))
            }
            RecoveryAction::ShuttleFallback => {
                let ok = m.invoke_shuttle().await;
                Ok((ok, json!({})))
            }
            RecoveryAction::SafeLogout => {
                let ok = m.logout().await;
                Ok((ok, json!({ "logged_out": ok })))
            }
        }
    }
}

/// Closest waypoint to `from`; the first one when position is unknown
pub fn nearest_waypoint<'a>(
    waypoints: &'a [NavmeshWaypoint],
    from: Option<Position>,
) -> Option<&'a NavmeshWaypoint> {
    match from {
        None => waypoints.first(),
        Some(pos) => waypoints.iter().min_by(|a, b| {
            let da = pos.distance_to(&Position::new(a.x, a.y));
            let db = pos.distance_to(&Position::new(b.x, b.y));
            da.total_cmp(&db)
        }),
    }
}

fn random_angle() -> f64 {
    rand::random::<f64>() * TAU
}
