//! Stop signal shared by a worker and its consumers
//!
//! A consumer checks the token between envelopes and while idle-polling.
//! An envelope already handed to a handler is never interrupted: the pass
//! settles it, then returns its report. The worker bounds that wait with
//! [`ConsumerConfig::settle_window`](super::ConsumerConfig::settle_window).

use tokio::sync::watch;

/// Read side, cloned into every consumer task
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested or the sender is gone.
    ///
    /// A request made before the call resolves immediately, so a consumer
    /// that starts late still stops.
    pub async fn wait(&mut self) {
        // Err means the sender was dropped
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

/// Write side, owned by the worker's signal handler
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Ask every consumer to stop after the envelope it is settling
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Token for a consumer spawned after the channel was created
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
