// This module provides the per-pass metrics accumulator every pipeline run reports:
// counts of processed, succeeded, skipped and failed instructions plus the name lists
// behind the counts. The accumulator is append-only during a pass; when a pass runs
// its per-instruction work on a worker pool, each worker appends through a mutex and
// the pool drains before the pass result is read, so entries never interleave within
// one record. The pipeline report aggregates one PassMetrics per executed pass and is
// always handed back to the caller, including on partial failure.

//! Per-pass metrics and the aggregated pipeline report.

use std::fmt;

/// Success/fail/skip bookkeeping for one pass over one instruction set.
#[derive(Debug, Default, Clone)]
pub struct PassMetrics {
    pub pass: &'static str,
    pub n_sets: usize,
    pub n_instructions: usize,
    pub n_skipped: usize,
    pub n_failed: usize,
    pub n_success: usize,
    pub skipped_instructions: Vec<String>,
    pub failed_instructions: Vec<String>,
    pub success_instructions: Vec<String>,
}

impl PassMetrics {
    pub fn new(pass: &'static str) -> Self {
        PassMetrics { pass, ..Default::default() }
    }

    pub fn record_success(&mut self, instruction: &str) {
        self.n_instructions += 1;
        self.n_success += 1;
        self.success_instructions.push(instruction.to_string());
    }

    pub fn record_skipped(&mut self, instruction: &str) {
        self.n_instructions += 1;
        self.n_skipped += 1;
        self.skipped_instructions.push(instruction.to_string());
    }

    pub fn record_failed(&mut self, instruction: &str) {
        self.n_instructions += 1;
        self.n_failed += 1;
        self.failed_instructions.push(instruction.to_string());
    }

    /// Move an instruction recorded as a success into the failed list.
    ///
    /// Used by set-level finalization steps that discover a failure after the
    /// per-instruction sweep already ran.
    pub fn demote(&mut self, instruction: &str) {
        if let Some(pos) = self.success_instructions.iter().position(|n| n == instruction) {
            self.success_instructions.remove(pos);
            self.n_success -= 1;
        } else {
            self.n_instructions += 1;
        }
        self.n_failed += 1;
        self.failed_instructions.push(instruction.to_string());
    }

    /// Merge another accumulator into this one (worker-pool drain).
    pub fn merge(&mut self, other: PassMetrics) {
        self.n_sets += other.n_sets;
        self.n_instructions += other.n_instructions;
        self.n_skipped += other.n_skipped;
        self.n_failed += other.n_failed;
        self.n_success += other.n_success;
        self.skipped_instructions.extend(other.skipped_instructions);
        self.failed_instructions.extend(other.failed_instructions);
        self.success_instructions.extend(other.success_instructions);
    }
}

impl fmt::Display for PassMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} instruction(s), {} ok, {} failed, {} skipped",
            self.pass, self.n_instructions, self.n_success, self.n_failed, self.n_skipped
        )
    }
}

/// Metrics for every pass the pipeline executed, in execution order.
#[derive(Debug, Default, Clone)]
pub struct PipelineReport {
    pub passes: Vec<PassMetrics>,
}

impl PipelineReport {
    pub fn push(&mut self, metrics: PassMetrics) {
        self.passes.push(metrics);
    }

    pub fn pass(&self, name: &str) -> Option<&PassMetrics> {
        self.passes.iter().find(|m| m.pass == name)
    }

    pub fn total_failed(&self) -> usize {
        self.passes.iter().map(|m| m.n_failed).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total_failed() == 0
    }
}
