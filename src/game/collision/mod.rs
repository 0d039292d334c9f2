//! Collision response for ground units.
//!
//! Runs in the parallel physics phase: every unit looks at its neighbours in
//! the start-of-phase snapshot and accumulates a corrective displacement for
//! itself only. Pushes on features and crush/contact notices are buffered
//! in the controller's outbox and applied serially.
//!
//! - **sat**: bounding-circle and separating-axis overlap tests
//! - **push**: momentum-weighted push vectors between bodies
//! - **statics**: responses to terrain, structure squares and static objects
//! - **displacement**: terrain-aware application of a requested move
//! - **resolver**: per-unit handling of units, features and terrain

mod displacement;
mod push;
mod resolver;
mod sat;
mod statics;

pub use displacement::{facing_from_heading, update_pos};
pub use push::{calculate_push_vector, feature_push, PushBody};
pub use sat::{check_collision, circles_overlap, have_separating_axis, Footprint};
pub use statics::StaticContact;
