//! patgen - Instruction behavior analysis for pattern generation.
//!
//! patgen takes machine-readable instruction descriptions (encoding, assembly
//! syntax and a behavior tree) and derives everything a pattern-based backend
//! needs: operand types and roles, register classes, immediate leaves, memory
//! side effects and canonical selection DAGs, including compressed-form
//! equivalences.
//!
//! # Primary Usage
//!
//! ```ignore
//! use patgen::model::{Instruction, InstructionSet, SetInfo, StateSpace};
//! use patgen::passes::Pipeline;
//!
//! // Describe the architectural state and hand over the instructions.
//! let mut info = SetInfo::default();
//! info.add_space(StateSpace::register_file("X", 32, 32));
//! info.add_space(StateSpace::program_counter("PC", 32));
//! let mut set = InstructionSet::new("MyExt", info);
//! set.push(my_instruction());
//!
//! // Run the standard analysis pipeline.
//! let report = Pipeline::standard().run(&mut set)?;
//! for pattern in set.instruction("MY.ADD").unwrap().attrs.patterns() {
//!     println!("{pattern}");
//! }
//! ```
//!
//! # Architecture
//!
//! - [`model`] - Instruction set model: operands, attributes, state spaces
//! - [`behav`] - Behavior tree IR handed in by the frontend
//! - [`passes`] - The analysis passes and the pipeline running them
//! - [`dag`] - Canonical selection-pattern DAG
//! - [`metrics`] - Per-pass metrics and the pipeline report
//! - [`error`] - Error taxonomy shared by all passes

pub mod behav;
pub mod dag;
pub mod error;
pub mod metrics;
pub mod model;
pub mod passes;

pub use error::{AnalysisError, AnalysisResult};
pub use metrics::{PassMetrics, PipelineReport};
pub use model::{Instruction, InstructionSet, IntType, Operand, Role, SetInfo};
pub use passes::{Pass, Pipeline, PipelineFailure, Policy};
