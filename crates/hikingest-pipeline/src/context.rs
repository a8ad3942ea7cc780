//! Per-run step timing.
//!
//! One [`RunContext`] is created for each file, threaded through the stages
//! that process it, and dropped when the run is finalized.

use hikingest_core::ledger::StepTiming;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
pub struct RunContext {
  run_id:  Uuid,
  started: Instant,
  last:    Instant,
  steps:   Vec<StepTiming>,
}

impl RunContext {
  pub fn new(run_id: Uuid) -> Self {
    let now = Instant::now();
    Self { run_id, started: now, last: now, steps: Vec::new() }
  }

  pub fn run_id(&self) -> Uuid { self.run_id }

  /// Close the current step under `label` and start the next one.
  pub fn mark(&mut self, label: impl Into<String>) -> &StepTiming {
    let now = Instant::now();
    let step = StepTiming {
      step_no:    self.steps.len() as u32 + 1,
      label:      label.into(),
      step_secs:  now.duration_since(self.last).as_secs_f64(),
      total_secs: now.duration_since(self.started).as_secs_f64(),
    };
    self.last = now;

    tracing::info!(
      run_id = %self.run_id,
      step = step.step_no,
      label = %step.label,
      step_secs = step.step_secs,
      total_secs = step.total_secs,
      "step finished"
    );
    self.steps.push(step);
    &self.steps[self.steps.len() - 1]
  }

  pub fn into_steps(self) -> Vec<StepTiming> { self.steps }
}
