//! Tape-based adjoint recording and replay.
//!
//! Operations on overloaded values append blocks to a tape. The tape is
//! then swept backward for adjoints, forward for tangents, backward again
//! for Hessian actions, or replayed forward to recompute values from new
//! control checkpoints.
//!
//! # Architecture
//!
//! ```text
//! AdjFloat / Function  ──records on──►  Tape (SharedTape, thread-local working tape)
//!        │                                 │
//!        ▼                                 ▼
//!  BlockVariable (Rc)  ◄──deps/outputs──  Vec<Box<dyn Block>>
//!        │                                 │
//!        ▼                                 ▼
//!  adj / tlm / hessian / checkpoint    Assign, Split, Merge, Mul, Add
//! ```
//!
//! # Example
//!
//! ```
//! use adjtape::Value;
//! use adjtape::tape::{AdjFloat, Control, Tape, compute_gradient, push_working_tape};
//!
//! let _guard = push_working_tape(Tape::shared());
//! let a = AdjFloat::new(2.0);
//! let b = AdjFloat::new(3.0);
//! let j = &(&a * &b) + &a;
//!
//! let grad = compute_gradient(&j, &[Control::new(&a), Control::new(&b)]).unwrap();
//! assert_eq!(grad, vec![Value::Float(4.0), Value::Float(2.0)]);
//! ```
//!
//! # Key Types
//!
//! - [`Tape`]: ordered block log with the sweeps
//! - [`BlockVariable`]: one version of a tracked value
//! - [`Block`]: the rule contract, with reference kinds in [`blocks`]
//! - [`OverloadedType`]: what [`AdjFloat`] and [`Function`] implement
//! - [`ReducedFunctional`]: replay and differentiate at new control values
//!
//! # Design Notes
//!
//! - Thread-local working tape and annotation state (no `Arc`, uses `Rc`)
//! - Absent accumulators are the additive identity and short-circuit rules
//! - Controls keep their checkpoints through recompute

mod adj_float;
mod annotation;
mod block;
mod block_variable;
pub mod blocks;
mod control;
mod drivers;
mod function;
mod graph;
mod overloaded;
mod reduced_functional;
mod registry;

pub use adj_float::AdjFloat;
pub use annotation::{
    AnnotationGuard, annotate_tape, annotation_enabled, continue_annotation, no_annotations,
    pause_annotation, stop_annotating,
};
pub use block::{Block, BlockIo};
pub use block_variable::{BlockVariable, BlockVariableRef, VariableId};
pub use control::{Control, assign_flat_controls, controls_to_flat};
pub use drivers::{compute_gradient, compute_hessian, compute_tangent};
pub use function::Function;
pub use graph::{
    SharedTape, Tape, TapeNode, WorkingTapeGuard, get_working_tape, push_working_tape,
    set_working_tape,
};
pub use overloaded::{Overloaded, OverloadedType};
pub use reduced_functional::ReducedFunctional;
pub use registry::{Registry, create_overloaded_object, register_overloaded};
