//! Stop conditions evaluated by a model client after each completed step.

use async_trait::async_trait;

use crate::types::StepResult;

/// Decides whether a multi-step streaming call should stop early.
///
/// Clients call [`should_stop`](Self::should_stop) once per completed step
/// with every step finished so far, oldest first.
#[async_trait]
pub trait StopCondition: Send + Sync {
    async fn should_stop(&self, steps: &[StepResult]) -> bool;
}

/// Stop once more than `max_steps` steps have completed.
pub struct StepCountStop {
    max_steps: usize,
}

impl StepCountStop {
    pub fn new(max_steps: usize) -> Self {
        Self { max_steps }
    }
}

#[async_trait]
impl StopCondition for StepCountStop {
    async fn should_stop(&self, steps: &[StepResult]) -> bool {
        steps.len() > self.max_steps
    }
}

/// Stop when a synchronous predicate over the steps returns true.
pub struct PredicateStop<F>
where
    F: Fn(&[StepResult]) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateStop<F>
where
    F: Fn(&[StepResult]) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<F> StopCondition for PredicateStop<F>
where
    F: Fn(&[StepResult]) -> bool + Send + Sync,
{
    async fn should_stop(&self, steps: &[StepResult]) -> bool {
        (self.predicate)(steps)
    }
}

/// Never stops; the client runs until the model finishes.
pub struct NeverStop;

#[async_trait]
impl StopCondition for NeverStop {
    async fn should_stop(&self, _steps: &[StepResult]) -> bool {
        false
    }
}
