// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::RepselError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag shared between a caller and a running pipeline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Receives stage progress in `[0, 1]`.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, fraction: f32);
}

/// Per-run collaborator handles. Carries no configuration and no mutable state of its own.
#[derive(Clone, Copy, Default)]
pub struct ExecutionContext<'a> {
    pub cancel: Option<&'a CancelToken>,
    pub progress: Option<&'a dyn ProgressSink>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress_sink(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    pub fn check_cancelled(&self) -> Result<(), RepselError> {
        if self.is_cancelled() {
            return Err(RepselError::cancelled());
        }
        Ok(())
    }

    /// Checks cancellation every `every` iterations; zero is treated as one.
    pub fn check_cancelled_every(&self, iteration: usize, every: usize) -> Result<(), RepselError> {
        let every = every.max(1);
        if iteration % every != 0 {
            return Ok(());
        }
        self.check_cancelled()
    }

    /// Emits clamped progress to the sink, if configured.
    pub fn report_progress(&self, fraction: f32) {
        if !fraction.is_finite() {
            return;
        }

        if let Some(sink) = self.progress {
            sink.on_progress(fraction.clamp(0.0, 1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, ExecutionContext, ProgressSink};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockProgressSink {
        values: Mutex<Vec<f32>>,
    }

    impl ProgressSink for MockProgressSink {
        fn on_progress(&self, fraction: f32) {
            self.values
                .lock()
                .expect("progress mutex should lock")
                .push(fraction);
        }
    }

    #[test]
    fn new_context_has_no_hooks() {
        let ctx = ExecutionContext::new();
        assert!(ctx.cancel.is_none());
        assert!(ctx.progress.is_none());
        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn cancellation_is_observed_through_clones() {
        let cancel = CancelToken::new();
        let ctx = ExecutionContext::new().with_cancel(&cancel);
        assert!(!ctx.is_cancelled());

        let remote = cancel.clone();
        remote.cancel();

        let err = ctx
            .check_cancelled()
            .expect_err("cancelled token should return an error");
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn check_cancelled_every_polls_on_cadence() {
        let cancel = CancelToken::new();
        let ctx = ExecutionContext::new().with_cancel(&cancel);
        cancel.cancel();

        assert!(ctx.check_cancelled_every(3, 2).is_ok());
        assert!(ctx.check_cancelled_every(4, 2).is_err());
        assert!(ctx.check_cancelled_every(3, 0).is_err());
    }

    #[test]
    fn report_progress_clamps_and_ignores_non_finite_values() {
        let progress = MockProgressSink::default();
        let ctx = ExecutionContext::new().with_progress_sink(&progress);

        ctx.report_progress(-0.2);
        ctx.report_progress(0.25);
        ctx.report_progress(1.2);
        ctx.report_progress(f32::NAN);
        ctx.report_progress(f32::INFINITY);

        let got = progress
            .values
            .lock()
            .expect("progress values should lock")
            .clone();
        assert_eq!(got, vec![0.0, 0.25, 1.0]);
    }
}
