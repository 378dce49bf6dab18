//! Query planning for batch graph QA: combination generators, the planner that
//! expands entity/constituent state into identified combinations, and the
//! session that accumulates that state.

pub mod combinations;
pub mod planner;
pub mod schema;
pub mod session;

pub use combinations::{cartesian_product, combinations_of};
pub use planner::{DedupStrategy, QueryPlanner};
pub use schema::{
    Combination, ConstituentSet, Entity, PathEdge, Plan, PlanInput, PlannedCombination, Term,
    START_NODE,
};
pub use session::{Session, SessionError, parse_constituent_input};
