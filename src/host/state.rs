use super::sample::SampleBatch;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub type SampleSender = mpsc::Sender<SampleBatch>;
pub type SampleReceiver = mpsc::Receiver<SampleBatch>;

/// Creates the bounded pipeline the host drains samples from.
pub fn sample_channel(capacity: usize) -> (SampleSender, SampleReceiver) {
    mpsc::channel(capacity)
}

/// State a virtual user carries while an iteration is running.
#[derive(Debug, Clone)]
pub struct RunState {
    samples: SampleSender,
}

impl RunState {
    pub fn new(samples: SampleSender) -> Self {
        Self { samples }
    }

    /// Pushes a batch unless the run is over.
    ///
    /// Returns `false` when the batch was dropped, either because `done` was
    /// canceled (before or while waiting for capacity) or because the host
    /// stopped draining the pipeline.
    pub async fn push_if_not_done(&self, done: &CancellationToken, batch: SampleBatch) -> bool {
        if done.is_cancelled() {
            trace!("Run finished, dropping sample batch");
            return false;
        }

        tokio::select! {
            _ = done.cancelled() => {
                trace!("Run finished while waiting for pipeline capacity");
                false
            }
            sent = self.samples.send(batch) => sent.is_ok(),
        }
    }
}

/// Handle to the run state of one virtual user.
///
/// Starts without state (init phase). The host activates it when iterations
/// begin and deactivates it when the VU is done.
#[derive(Debug, Clone)]
pub struct VuHandle {
    state: Arc<watch::Sender<Option<RunState>>>,
}

impl VuHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn active(state: RunState) -> Self {
        let vu = Self::new();
        vu.activate(state);
        vu
    }

    pub fn activate(&self, state: RunState) {
        self.state.send_replace(Some(state));
    }

    pub fn deactivate(&self) {
        self.state.send_replace(None);
    }

    pub fn state(&self) -> Option<RunState> {
        self.state.borrow().clone()
    }
}

impl Default for VuHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution context passed to every publish call.
///
/// Carries the virtual user whose state must be active and the cancellation
/// token of the run. Cloning is cheap; asynchronous completions hold a clone.
#[derive(Debug, Clone)]
pub struct RunContext {
    vu: VuHandle,
    done: CancellationToken,
}

impl RunContext {
    pub fn new(vu: VuHandle, done: CancellationToken) -> Self {
        Self { vu, done }
    }

    pub fn vu(&self) -> &VuHandle {
        &self.vu
    }

    pub fn state(&self) -> Option<RunState> {
        self.vu.state()
    }

    pub fn done(&self) -> &CancellationToken {
        &self.done
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }
}
