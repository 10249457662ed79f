//! The provisioning saga executor.
//!
//! A saga is an ordered list of stages; a stage is a human-readable label
//! plus an ordered list of actions. An action is a plain function value
//! taking the shared context and the mutable partial state — the state is an
//! explicit parameter, never hidden behind a captured pointer — and every
//! action is idempotent: applied to state it has already mutated, it must
//! return success without touching the provider again.
//!
//! `run` halts at the first failing action; there is no retry inside the
//! saga. Recovery is re-running the whole saga, which skips completed work
//! through the idempotency guards. State is mutated in place so the caller
//! can persist it whether `run` succeeded or failed.

use anyhow::Result;
use futures::future::LocalBoxFuture;

use crate::application::ports::ProgressReporter;

/// The future returned by one action invocation.
pub type ActionFuture<'a> = LocalBoxFuture<'a, Result<()>>;

/// One idempotent unit of work over the partial state.
pub type Action<C, S> = for<'a> fn(&'a C, &'a mut S) -> ActionFuture<'a>;

/// A named, ordered group of actions.
pub struct Stage<C, S> {
    label: String,
    actions: Vec<Action<C, S>>,
}

impl<C, S> Stage<C, S> {
    pub fn new(label: impl Into<String>, actions: Vec<Action<C, S>>) -> Self {
        Self {
            label: label.into(),
            actions,
        }
    }
}

/// An ordered list of stages driving one aggregate's lifecycle operation.
pub struct Saga<C, S> {
    stages: Vec<Stage<C, S>>,
}

impl<C, S> Saga<C, S> {
    #[must_use]
    pub fn new(stages: Vec<Stage<C, S>>) -> Self {
        Self { stages }
    }

    /// Run every stage in order, announcing each label before its actions.
    /// The first action failure aborts the saga; later stages are neither
    /// announced nor executed.
    ///
    /// # Errors
    ///
    /// Returns the first action's error. `state` reflects everything applied
    /// up to that point and must be persisted by the caller either way.
    pub async fn run(
        &self,
        ctx: &C,
        state: &mut S,
        reporter: &impl ProgressReporter,
    ) -> Result<()> {
        for stage in &self.stages {
            reporter.announce_stage(&stage.label);
            for action in &stage.actions {
                action(ctx, state).await?;
            }
        }
        Ok(())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
