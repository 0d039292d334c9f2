use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use bevy::prelude::*;
use parking_lot::{Mutex, RwLock};

use super::{PathHandle, PathProvider, PathRequest, Waypoint};
use crate::game::fixed_math::{sq, FixedNum, FixedVec2};
use crate::game::terrain::{square_size, MoveClass, TerrainMap};

/// Straight runs longer than this many squares still emit a waypoint.
const MAX_RUN: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RouteState {
    Pending,
    Ready,
    Dead,
}

struct PathRecord {
    owner: Entity,
    move_class: MoveClass,
    goal: FixedVec2,
    goal_radius: FixedNum,
    /// Where the follower was last seen pulling from; repairs start here.
    last_from: FixedVec2,
    state: RouteState,
    waypoints: VecDeque<FixedVec2>,
    last: FixedVec2,
    reached: bool,
    exhausted: bool,
    updated: bool,
    digest: u32,
}

/// Grid A* reference provider.
///
/// Routes are square centres of an 8-neighbour search where a square is
/// passable when the move class may stand on it. Step cost is distance over
/// the square's speed modifier. Goals that cannot be reached yield a partial
/// route to the closest reachable square.
///
/// With a search budget, requests are queued and answered with temporary
/// waypoints until [`PathProvider::update`] gets to them, in handle order.
pub struct GridPathProvider {
    records: RwLock<BTreeMap<u32, Mutex<PathRecord>>>,
    next_id: Mutex<u32>,
    checksum: AtomicU32,
    max_iterations: usize,
    searches_per_update: Option<usize>,
}

impl Default for GridPathProvider {
    fn default() -> Self {
        Self::new(65_536)
    }
}

impl GridPathProvider {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: Mutex::new(0),
            checksum: AtomicU32::new(0),
            max_iterations,
            searches_per_update: None,
        }
    }

    /// Defers searches to `update`, at most `budget` per call.
    pub fn with_search_budget(mut self, budget: usize) -> Self {
        self.searches_per_update = Some(budget.max(1));
        self
    }

    fn allocate_handle(&self) -> Option<PathHandle> {
        let mut next = self.next_id.lock();
        *next = next.wrapping_add(1);
        if *next == 0 {
            *next = 1;
        }
        PathHandle::new(*next)
    }

    fn with_record<R>(&self, handle: PathHandle, f: impl FnOnce(&mut PathRecord) -> R) -> Option<R> {
        let records = self.records.read();
        records.get(&handle.get()).map(|cell| f(&mut cell.lock()))
    }

    /// Runs the search for a record and stores its outcome.
    fn resolve(&self, handle: u32, record: &mut PathRecord, terrain: &TerrainMap) {
        match search(
            terrain,
            &record.move_class,
            record.last_from,
            record.goal,
            record.goal_radius,
            self.max_iterations,
        ) {
            Some(route) => {
                let digest = route_digest(handle, &route.waypoints);
                self.checksum.fetch_add(digest.wrapping_sub(record.digest), AtomicOrdering::Relaxed);
                record.digest = digest;
                record.last = route.waypoints.back().copied().unwrap_or(record.goal);
                record.waypoints = route.waypoints;
                record.reached = route.reached;
                record.exhausted = false;
                record.state = RouteState::Ready;
            }
            None => {
                debug!("[PATH] Route {} for {:?} has no reachable squares", handle, record.owner);
                record.waypoints.clear();
                record.state = RouteState::Dead;
            }
        }
    }
}

impl PathProvider for GridPathProvider {
    fn request_path(&self, terrain: &TerrainMap, request: &PathRequest) -> Option<PathHandle> {
        if !terrain.pos_in_bounds(request.start) {
            return None;
        }
        let handle = self.allocate_handle()?;
        let mut record = PathRecord {
            owner: request.owner,
            move_class: request.move_class.clone(),
            goal: terrain.clamp_in_bounds(request.goal),
            goal_radius: request.goal_radius,
            last_from: request.start,
            state: RouteState::Pending,
            waypoints: VecDeque::new(),
            last: request.goal,
            reached: false,
            exhausted: false,
            updated: false,
            digest: 0,
        };

        if self.searches_per_update.is_none() {
            self.resolve(handle.get(), &mut record, terrain);
            if record.state == RouteState::Dead {
                return None;
            }
        }

        self.records.write().insert(handle.get(), Mutex::new(record));
        Some(handle)
    }

    fn next_waypoint(&self, handle: PathHandle, from: FixedVec2, lookahead: FixedNum) -> Waypoint {
        self.with_record(handle, |record| {
            match record.state {
                RouteState::Pending => return Waypoint::temporary(from),
                RouteState::Dead => return Waypoint::unreachable(),
                RouteState::Ready => {}
            }
            record.last_from = from;
            let reach_sq = sq(lookahead);
            while let Some(p) = record.waypoints.pop_front() {
                if !record.waypoints.is_empty() && p.distance_squared(from) <= reach_sq {
                    continue;
                }
                record.exhausted = record.waypoints.is_empty();
                return Waypoint::resolved(p);
            }
            record.exhausted = true;
            Waypoint::resolved(record.last)
        })
        .unwrap_or_else(Waypoint::unreachable)
    }

    fn path_updated(&self, handle: PathHandle) -> bool {
        self.with_record(handle, |r| r.updated).unwrap_or(false)
    }

    fn clear_path_updated(&self, handle: PathHandle) {
        self.with_record(handle, |r| r.updated = false);
    }

    fn current_waypoint_unreachable(&self, handle: PathHandle) -> bool {
        self.with_record(handle, |r| r.state == RouteState::Dead || (!r.reached && r.exhausted))
            .unwrap_or(true)
    }

    fn delete_path(&self, handle: PathHandle) {
        if let Some(cell) = self.records.write().remove(&handle.get()) {
            let digest = cell.lock().digest;
            self.checksum.fetch_sub(digest, AtomicOrdering::Relaxed);
        }
    }

    fn delete_owner_paths(&self, owner: Entity) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, cell| {
            let record = cell.lock();
            if record.owner == owner {
                self.checksum.fetch_sub(record.digest, AtomicOrdering::Relaxed);
                false
            } else {
                true
            }
        });
        before - records.len()
    }

    fn path_checksum(&self) -> u32 {
        self.checksum.load(AtomicOrdering::Relaxed)
    }

    fn update(&self, terrain: &TerrainMap) {
        let Some(budget) = self.searches_per_update else {
            return;
        };
        let records = self.records.read();
        let mut done = 0;
        for (&handle, cell) in records.iter() {
            if done >= budget {
                break;
            }
            let mut record = cell.lock();
            if record.state == RouteState::Pending {
                self.resolve(handle, &mut record, terrain);
                done += 1;
            }
        }
    }

    fn terrain_changed(&self, terrain: &TerrainMap, min: (i32, i32), max: (i32, i32)) {
        let records = self.records.read();
        let mut repaired = 0;
        for (&handle, cell) in records.iter() {
            let mut record = cell.lock();
            if record.state != RouteState::Ready || !route_touches(terrain, &record, min, max) {
                continue;
            }
            self.resolve(handle, &mut record, terrain);
            record.updated = true;
            repaired += 1;
        }
        if repaired > 0 {
            debug!("[PATH] Repaired {} routes after terrain change {:?}..{:?}", repaired, min, max);
        }
    }

    fn live_paths(&self) -> usize {
        self.records.read().len()
    }
}

/// Whether the unfinished part of a route passes near the changed rectangle.
fn route_touches(terrain: &TerrainMap, record: &PathRecord, min: (i32, i32), max: (i32, i32)) -> bool {
    let margin = record.move_class.xsize.max(record.move_class.zsize) + 1;
    std::iter::once(record.last_from)
        .chain(record.waypoints.iter().copied())
        .map(|p| terrain.world_to_square(p))
        .any(|(x, z)| x >= min.0 - margin && x <= max.0 + margin && z >= min.1 - margin && z <= max.1 + margin)
}

fn route_digest(handle: u32, waypoints: &VecDeque<FixedVec2>) -> u32 {
    waypoints.iter().fold(handle, |h, p| {
        let h = h.wrapping_mul(31).wrapping_add(p.x.to_bits() as u32);
        h.wrapping_mul(31).wrapping_add(p.y.to_bits() as u32)
    })
}

// ============================================================================
// A* search
// ============================================================================

struct Route {
    waypoints: VecDeque<FixedVec2>,
    reached: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Open {
    f: FixedNum,
    idx: usize,
}

impl Ord for Open {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f, ties broken by square index so expansion order is stable.
        other.f.cmp(&self.f).then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Open {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NEIGHBOURS: [(i32, i32); 8] = [(1, 0), (-1, 0), (0, 1), (0, -1), (1, 1), (-1, 1), (1, -1), (-1, -1)];

fn octile(dx: i32, dz: i32) -> FixedNum {
    let (lo, hi) = (dx.abs().min(dz.abs()), dx.abs().max(dz.abs()));
    let diag = FixedNum::from_num(std::f64::consts::SQRT_2);
    (FixedNum::from_num(hi - lo) + FixedNum::from_num(lo) * diag) * square_size()
}

fn search(
    terrain: &TerrainMap,
    mc: &MoveClass,
    start: FixedVec2,
    goal: FixedVec2,
    goal_radius: FixedNum,
    max_iterations: usize,
) -> Option<Route> {
    if start.distance_squared(goal) <= sq(goal_radius) {
        return Some(Route { waypoints: VecDeque::from([goal]), reached: true });
    }

    let width = terrain.width as i32;
    let (sx, sz) = terrain.world_to_square(terrain.clamp_in_bounds(start));
    let (gx, gz) = terrain.world_to_square(goal);
    let start_idx = terrain.get_index(sx, sz);
    let goal_idx = terrain.get_index(gx, gz);

    let size = terrain.width * terrain.height;
    let mut g_score = vec![FixedNum::MAX; size];
    let mut came_from = vec![usize::MAX; size];
    let mut closed = vec![false; size];
    let passable = |x: i32, z: i32| terrain.in_bounds(x, z) && terrain.test_move_square(mc, terrain.square_center(x, z));
    let within_goal = |x: i32, z: i32| terrain.square_center(x, z).distance_squared(goal) <= sq(goal_radius);

    let mut open = BinaryHeap::new();
    g_score[start_idx] = FixedNum::ZERO;
    open.push(Open { f: octile(gx - sx, gz - sz), idx: start_idx });

    let mut best = (octile(gx - sx, gz - sz), start_idx);
    let mut end = None;
    let mut iterations = 0;

    while let Some(Open { idx, .. }) = open.pop() {
        if closed[idx] {
            continue;
        }
        closed[idx] = true;
        iterations += 1;
        if iterations > max_iterations {
            warn!("[PATH] A* exceeded {} iterations from {:?} to {:?}", max_iterations, start.to_vec2(), goal.to_vec2());
            break;
        }

        let (x, z) = (idx as i32 % width, idx as i32 / width);
        if idx == goal_idx || within_goal(x, z) {
            end = Some(idx);
            break;
        }
        let h = octile(gx - x, gz - z);
        if h < best.0 {
            best = (h, idx);
        }

        for (dx, dz) in NEIGHBOURS {
            let (nx, nz) = (x + dx, z + dz);
            if !passable(nx, nz) {
                continue;
            }
            if dx != 0 && dz != 0 && !(passable(x + dx, z) && passable(x, z + dz)) {
                continue;
            }
            let n_idx = terrain.get_index(nx, nz);
            if closed[n_idx] {
                continue;
            }
            let speed_mod = terrain.square_speed_mod(nx, nz).max(FixedNum::from_num(0.01));
            let tentative = g_score[idx] + octile(dx, dz) / speed_mod;
            if tentative < g_score[n_idx] {
                g_score[n_idx] = tentative;
                came_from[n_idx] = idx;
                open.push(Open { f: tentative + octile(gx - nx, gz - nz), idx: n_idx });
            }
        }
    }

    let reached = end.is_some();
    let last_idx = end.unwrap_or(best.1);
    if !reached && last_idx == start_idx {
        return None;
    }

    let mut squares = Vec::new();
    let mut current = last_idx;
    while current != start_idx && current != usize::MAX {
        squares.push(current);
        current = came_from[current];
    }
    squares.reverse();

    let mut waypoints = compress(terrain, &squares);
    if reached {
        waypoints.pop_back();
        waypoints.push_back(goal);
    }
    Some(Route { waypoints, reached })
}

/// Keeps turning points, every `MAX_RUN`-th square of straight runs and the end.
fn compress(terrain: &TerrainMap, squares: &[usize]) -> VecDeque<FixedVec2> {
    let width = terrain.width;
    let coords: Vec<(i32, i32)> = squares
        .iter()
        .map(|&i| ((i % width) as i32, (i / width) as i32))
        .collect();

    let mut out = VecDeque::new();
    let mut run = 0;
    for (i, &(x, z)) in coords.iter().enumerate() {
        run += 1;
        let is_last = i + 1 == coords.len();
        let turns = !is_last && i > 0 && {
            let (px, pz) = coords[i - 1];
            let (nx, nz) = coords[i + 1];
            (x - px, z - pz) != (nx - x, nz - z)
        };
        if is_last || turns || run >= MAX_RUN {
            out.push_back(terrain.square_center(x, z));
            run = 0;
        }
    }
    out
}
