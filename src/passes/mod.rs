// This module is the pass framework: the Pass trait every analysis implements, the
// Pipeline that runs passes strictly in order, and the per-instruction failure
// isolation policy. A pass sees one instruction at a time through a shared SetInfo
// plus a mutable Instruction; set-level preparation (register detection) and
// cross-instruction finalization (compressed-pattern reconciliation) run before and
// after the per-instruction sweep on the whole set. Passes never overlap: pass N+1
// does not touch any instruction until pass N finished the whole set, because later
// passes consume attributes earlier ones attached. Within a pass, instructions have
// no cross-instance dependency, so the sweep optionally fans out over a bounded pool
// of scoped threads with a mutex-guarded metrics accumulator merged after the pool
// drains. Failures are recorded per instruction and never stop sibling instructions;
// only the strict policy escalates a nonzero failure count, after the pass completes.

//! Analysis passes and the pipeline running them.
//!
//! Pass order is fixed: type inference, operand roles, register classes,
//! immediate types, immediate leaves, side effects, DAG building, assembly
//! reconciliation. Each pass consumes attributes its predecessors attached to
//! the shared instruction model.

pub mod asm_syntax;
pub mod dag_builder;
pub mod imm_leafs;
pub mod imm_types;
pub mod infer_types;
pub mod registers;
pub mod roles;
pub mod side_effects;

use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::{PassMetrics, PipelineReport};
use crate::model::{Instruction, InstructionSet, SetInfo};
use std::sync::Mutex;
use thiserror::Error;

pub use asm_syntax::ReconcileAsm;
pub use dag_builder::BuildDags;
pub use imm_leafs::DetectImmLeafs;
pub use imm_types::DetectImmTypes;
pub use infer_types::InferTypes;
pub use registers::DetectRegisters;
pub use roles::DetectRoles;
pub use side_effects::DetectSideEffects;

/// Per-instruction result of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The instruction is outside the pass's scope (e.g. no behavior).
    Skipped,
}

/// One analysis pass over an instruction set.
///
/// `run` must be self-contained per instruction: the only shared state is the
/// read-only [`SetInfo`], which is what allows the pipeline to process
/// instructions of one pass in parallel.
pub trait Pass: Sync {
    fn name(&self) -> &'static str;

    /// Set-level preparation before the per-instruction sweep.
    fn prepare(&self, _set: &mut InstructionSet) -> AnalysisResult<()> {
        Ok(())
    }

    /// Analyze one instruction, mutating it in place.
    fn run(&self, info: &SetInfo, instr: &mut Instruction) -> AnalysisResult<Outcome>;

    /// Cross-instruction finalization after the sweep. May demote entries in
    /// the pass metrics for failures discovered here.
    fn finalize(&self, _set: &mut InstructionSet, _metrics: &mut PassMetrics) {}
}

/// What a nonzero per-pass failure count does to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Record failures in the metrics and keep going.
    #[default]
    IgnoreFailing,
    /// Abort after the first pass that failed any instruction.
    Strict,
}

/// Strict-mode pipeline abort. Carries the full report gathered so far, so
/// callers always see the metrics even on failure.
#[derive(Error, Debug)]
#[error("pass {pass} failed for {failed} instruction(s)")]
pub struct PipelineFailure {
    pub pass: &'static str,
    pub failed: usize,
    pub report: PipelineReport,
}

/// Runs the analysis passes strictly in order over one instruction set.
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
    policy: Policy,
    workers: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    /// The standard pass order.
    pub fn standard() -> Self {
        Pipeline {
            passes: vec![
                Box::new(InferTypes),
                Box::new(DetectRoles),
                Box::new(DetectRegisters),
                Box::new(DetectImmTypes),
                Box::new(DetectImmLeafs),
                Box::new(DetectSideEffects),
                Box::new(BuildDags),
                Box::new(ReconcileAsm),
            ],
            policy: Policy::default(),
            workers: 1,
        }
    }

    /// An empty pipeline; passes are pushed explicitly. Useful for testing a
    /// single pass in isolation.
    pub fn empty() -> Self {
        Pipeline { passes: Vec::new(), policy: Policy::default(), workers: 1 }
    }

    pub fn with_pass(mut self, pass: impl Pass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound of the per-instruction worker pool. `1` keeps the sweep on the
    /// calling thread.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Run every pass in order. The report covers all executed passes; in
    /// strict mode the first failing pass aborts the pipeline after it
    /// completed its whole sweep.
    pub fn run(&self, set: &mut InstructionSet) -> Result<PipelineReport, PipelineFailure> {
        let mut report = PipelineReport::default();
        for pass in &self.passes {
            let metrics = self.run_pass(pass.as_ref(), set);
            log::debug!("{metrics}");
            let failed = metrics.n_failed;
            let name = metrics.pass;
            report.push(metrics);
            if self.policy == Policy::Strict && failed > 0 {
                return Err(PipelineFailure { pass: name, failed, report });
            }
        }
        Ok(report)
    }

    fn run_pass(&self, pass: &dyn Pass, set: &mut InstructionSet) -> PassMetrics {
        let mut metrics = PassMetrics::new(pass.name());
        metrics.n_sets = 1;
        log::debug!("running pass {} on set {}", pass.name(), set.name);

        if let Err(err) = pass.prepare(set) {
            // A failed preparation fails every instruction of the set.
            log::error!("pass {} preparation failed: {err}", pass.name());
            for instr in &set.instructions {
                metrics.record_failed(&instr.name);
            }
            return metrics;
        }

        let (info, instructions) = set.split_mut();
        if self.workers > 1 && instructions.len() > 1 {
            let shared = Mutex::new(std::mem::take(&mut metrics));
            let chunk = instructions.len().div_ceil(self.workers);
            std::thread::scope(|scope| {
                for part in instructions.chunks_mut(chunk) {
                    let shared = &shared;
                    scope.spawn(move || {
                        let mut local = PassMetrics::new(pass.name());
                        for instr in part {
                            run_one(pass, info, instr, &mut local);
                        }
                        shared.lock().unwrap().merge(local);
                    });
                }
            });
            metrics = shared.into_inner().unwrap();
        } else {
            for instr in instructions {
                run_one(pass, info, instr, &mut metrics);
            }
        }

        pass.finalize(set, &mut metrics);
        metrics
    }
}

fn run_one(pass: &dyn Pass, info: &SetInfo, instr: &mut Instruction, metrics: &mut PassMetrics) {
    match pass.run(info, instr) {
        Ok(Outcome::Done) => metrics.record_success(&instr.name),
        Ok(Outcome::Skipped) => metrics.record_skipped(&instr.name),
        Err(err) => {
            if let AnalysisError::UnsupportedNodeKind { pass, kind } = &err {
                log::error!("{}: pass {pass} hit unhandled {kind} node", instr.name);
            }
            log::warn!("pass {} failed for {}: {err}", pass.name(), instr.name);
            metrics.record_failed(&instr.name);
        }
    }
}
