//! Refresh debouncing
//!
//! Coalesces bursts of manual refresh requests: the first request fires
//! immediately, further requests inside the cooldown window collapse
//! into one trailing trigger at the end of the window.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

struct State {
    /// When the last trigger was handed to the consumer.
    last_fired: Option<Instant>,
    /// Whether a request is waiting to be handed out.
    pending: bool,
}

/// A shared trigger with an immediate-then-cooldown policy.
///
/// Producers call [`request`](Self::request); the single owning task
/// awaits [`triggered`](Self::triggered) in its select loop.
pub struct Debouncer {
    cooldown: Duration,
    state: Mutex<State>,
    notify: Notify,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Mutex::new(State {
                last_fired: None,
                pending: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Ask for a refresh. Never blocks.
    pub fn request(&self) {
        self.state.lock().pending = true;
        self.notify.notify_one();
    }

    /// Resolve when the next (coalesced) trigger is due.
    pub async fn triggered(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                if state.pending {
                    let since_last = state
                        .last_fired
                        .map(|t| t.elapsed())
                        .unwrap_or(self.cooldown);
                    if since_last >= self.cooldown {
                        state.pending = false;
                        state.last_fired = Some(Instant::now());
                        return;
                    }
                    Some(self.cooldown - since_last)
                } else {
                    None
                }
            };

            match wait {
                // Inside the cooldown window: sleep out the remainder,
                // then re-check (the trailing trigger).
                Some(remaining) => time::sleep(remaining).await,
                // Nothing pending: wait for a request. notify_one
                // stores a permit, so a request landing between the
                // check above and this await is not lost.
                None => self.notify.notified().await,
            }
        }
    }
}
