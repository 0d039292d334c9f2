//! Path-planning service as seen by the movement controller.
//!
//! The controller never looks inside a route. It requests one, receives an
//! opaque [`PathHandle`], pulls waypoints from it one at a time and deletes it
//! exactly once when the order ends. Providers must tolerate waypoint pulls
//! from the parallel steering phase; requests, deletions and terrain repair
//! only ever come from serial phases.
//!
//! - **PathProvider**: the handle-based request/poll/delete contract
//! - **Waypoint**: a position plus an explicit kind instead of a magic y value
//! - **GridPathProvider**: deterministic 8-neighbour A* over the terrain grid

use std::num::NonZeroU32;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::game::fixed_math::{FixedNum, FixedVec2};
use crate::game::terrain::{MoveClass, TerrainMap};

mod grid;

pub use grid::GridPathProvider;


/// Lookahead radius floor used when pulling waypoints.
pub const WAYPOINT_RADIUS: i32 = 10;

/// Opaque identifier of one route issued by a provider. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathHandle(NonZeroU32);

impl PathHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaypointKind {
    #[default]
    Resolved,
    /// The route is still being searched; the position is a placeholder.
    Temporary,
    /// The provider asks the follower to move past this point.
    SkipRequested,
    /// No route exists from here.
    Unreachable,
}

/// One step of a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waypoint {
    pub pos: FixedVec2,
    pub kind: WaypointKind,
}

impl Waypoint {
    pub fn resolved(pos: FixedVec2) -> Self {
        Self { pos, kind: WaypointKind::Resolved }
    }

    pub fn temporary(pos: FixedVec2) -> Self {
        Self { pos, kind: WaypointKind::Temporary }
    }

    pub fn skip_requested(pos: FixedVec2) -> Self {
        Self { pos, kind: WaypointKind::SkipRequested }
    }

    /// Position is `(-1, -1)`, matching the legacy all-components marker.
    pub fn unreachable() -> Self {
        Self {
            pos: FixedVec2::new(-FixedNum::ONE, -FixedNum::ONE),
            kind: WaypointKind::Unreachable,
        }
    }

    /// Legacy y-coordinate encoding: -1 for unresolved, -2 for skip requests.
    pub fn sentinel_y(&self) -> Option<i32> {
        match self.kind {
            WaypointKind::Resolved => None,
            WaypointKind::Temporary | WaypointKind::Unreachable => Some(-1),
            WaypointKind::SkipRequested => Some(-2),
        }
    }

    /// True for anything carrying the -1 sentinel.
    pub fn is_unresolved(&self) -> bool {
        self.sentinel_y() == Some(-1)
    }

    pub fn is_skip_request(&self) -> bool {
        self.kind == WaypointKind::SkipRequested
    }

    pub fn is_unreachable(&self) -> bool {
        self.kind == WaypointKind::Unreachable
    }
}

/// Everything a provider needs to plan one route.
#[derive(Clone, Copy, Debug)]
pub struct PathRequest<'a> {
    pub owner: Entity,
    pub move_class: &'a MoveClass,
    pub start: FixedVec2,
    pub goal: FixedVec2,
    pub goal_radius: FixedNum,
}

pub trait PathProvider: Send + Sync + 'static {
    /// Plans a route. `None` is an immediate rejection, not an error.
    fn request_path(&self, terrain: &TerrainMap, request: &PathRequest) -> Option<PathHandle>;

    /// Pops the next waypoint farther than `lookahead` from `from`. An
    /// exhausted route keeps returning its final point.
    fn next_waypoint(&self, handle: PathHandle, from: FixedVec2, lookahead: FixedNum) -> Waypoint;

    fn path_updated(&self, handle: PathHandle) -> bool;

    fn clear_path_updated(&self, handle: PathHandle);

    /// The route ends short of its goal and the last issued waypoint is that end.
    fn current_waypoint_unreachable(&self, _handle: PathHandle) -> bool {
        false
    }

    fn delete_path(&self, handle: PathHandle);

    /// Drops every route still owned by a despawned unit. Returns how many.
    fn delete_owner_paths(&self, owner: Entity) -> usize;

    /// Order-independent digest of all planned routes, for desync checks.
    fn path_checksum(&self) -> u32;

    /// Runs deferred searches. Called once per tick from a serial phase.
    fn update(&self, _terrain: &TerrainMap) {}

    /// Static blocking changed inside the inclusive square rectangle.
    fn terrain_changed(&self, _terrain: &TerrainMap, _min: (i32, i32), _max: (i32, i32)) {}

    fn live_paths(&self) -> usize;
}

/// The provider used by this simulation.
#[derive(Resource)]
pub struct PathService(pub Box<dyn PathProvider>);

impl Default for PathService {
    fn default() -> Self {
        Self(Box::new(GridPathProvider::default()))
    }
}

impl std::ops::Deref for PathService {
    type Target = dyn PathProvider;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}
