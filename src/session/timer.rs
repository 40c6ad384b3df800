//! Per-question countdown for timed Challenge play
//!
//! One tick source exists per active question. Starting while a countdown
//! is already running is a no-op; stopping aborts the pending tick so
//! nothing fires after a question has advanced. The engine additionally
//! discards stale events by comparing the carried position against the
//! session's current one.

use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A question's time ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEvent {
    pub session_id: Uuid,
    /// Question position the countdown was armed for
    pub position: usize,
}

struct ActiveCountdown {
    position: usize,
    handle: JoinHandle<()>,
}

/// Countdown tick source delivering [`TimeoutEvent`]s over a channel.
pub struct QuestionTimer {
    duration: Duration,
    sender: mpsc::Sender<TimeoutEvent>,
    active: Mutex<Option<ActiveCountdown>>,
}

impl QuestionTimer {
    pub fn new(duration: Duration, sender: mpsc::Sender<TimeoutEvent>) -> Self {
        Self {
            duration,
            sender,
            active: Mutex::new(None),
        }
    }

    /// Arm the countdown for a question. No-op while one is running.
    pub fn start(&self, session_id: Uuid, position: usize) {
        let mut active = self.active.lock().unwrap();
        if let Some(current) = active.as_ref() {
            if !current.handle.is_finished() {
                debug!("countdown already running, ignoring start");
                return;
            }
        }

        let sender = self.sender.clone();
        let duration = self.duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = sender.try_send(TimeoutEvent {
                session_id,
                position,
            });
        });
        *active = Some(ActiveCountdown { position, handle });
    }

    /// Cancel any pending tick. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(current) = self.active.lock().unwrap().take() {
            current.handle.abort();
        }
    }

    /// Position the running countdown was armed for, if any.
    pub fn armed_position(&self) -> Option<usize> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .filter(|c| !c.handle.is_finished())
            .map(|c| c.position)
    }
}

impl Drop for QuestionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
