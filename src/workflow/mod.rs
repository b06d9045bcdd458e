// Copyright 2025 Cowboy AI, LLC.

//! Workflow state machine
//!
//! Defines the legal lifecycle states and transitions for control lists and
//! work sessions, and the shared engine that validates a requested
//! transition against current state and actor authorization.

pub mod entity;
pub mod machine;
pub mod state;

pub use entity::{
    ControlItem, ControlList, ControlListId, ControlListMarker, Priority, TransitionPayload,
    WorkSession, WorkSessionId, WorkSessionMarker, WorkflowEntity,
};
pub use machine::WorkflowMachine;
pub use state::{ControlListStatus, WorkSessionStatus, WorkflowStatus};
