//! The generation machine and the parameter draws it runs on.

pub mod event;
pub mod machine;
pub mod params;

pub use event::{Event, FetchTicket, Notice, Phase, Step, Trace};
pub use machine::{BuildingState, Engine, RunContext};
pub use params::{BuildingPlan, Placement, SetParams, StepKind, stamp_transform};
