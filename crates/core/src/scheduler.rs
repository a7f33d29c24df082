use crate::speech::SpeechToken;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Deferred work the session asks to be woken up for.
///
/// Each wakeup carries the token that was current when it was scheduled. The
/// session drops it if that token has been superseded in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Re-open recognition after a network error.
    RetryRecognition(SpeechToken),
    /// Second start attempt after the device reported it was already running.
    RestartRecognition(SpeechToken),
    /// Read the current question aloud.
    SpeakQuestion(SpeechToken),
}

/// Something that can deliver a [`Wakeup`] back to the session after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, wakeup: Wakeup);
}

/// Schedules wakeups as tokio timers and sends them into the runtime's
/// event loop once they fire.
pub struct TokioScheduler {
    tx: UnboundedSender<Wakeup>,
}

impl TokioScheduler {
    pub fn new(tx: UnboundedSender<Wakeup>) -> Self {
        Self { tx }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, wakeup: Wakeup) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Cannot schedule {:?} outside a tokio runtime: {}", wakeup, e);
                return;
            }
        };
        let tx = self.tx.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(wakeup).is_err() {
                tracing::debug!("Wakeup receiver dropped, discarding {:?}", wakeup);
            }
        });
    }
}

/// A scheduler that only records what was asked of it.
///
/// Nothing fires on its own: the owner drains the queue and hands the wakeups
/// to the session when it chooses, which makes retry timing deterministic.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, Wakeup)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything scheduled so far, oldest first.
    pub fn drain(&self) -> Vec<(Duration, Wakeup)> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        match self.pending.lock() {
            Ok(pending) => pending.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, wakeup: Wakeup) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push((delay, wakeup)),
            Err(poisoned) => poisoned.into_inner().push((delay, wakeup)),
        }
    }
}
