// src/pool/reclaim.rs

//! Background trimming of idle inventory toward the floor.
//!
//! The task only ever destroys surplus idle connections. It never creates
//! connections and never touches admission permits: permits track lent
//! connections, and idle ones returned theirs when they came back.

use async_trait::async_trait;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Something that can run one reclamation pass.
#[async_trait]
pub trait Reclaim: Send + Sync + 'static {
    /// Trim idle inventory and return how many connections were destroyed.
    async fn reclaim(&self) -> usize;
}

/// Handle to a running reclamation task.
pub struct Reclaimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Reclaimer {
    /// Spawn the task. The first pass runs one `period` after start. The
    /// task ends on `stop` or once the target has been dropped.
    pub fn start<R: Reclaim>(target: Weak<R>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(target) = target.upgrade() else {
                    break;
                };
                let trimmed = target.reclaim().await;
                if trimmed > 0 {
                    debug!("Reclamation pass destroyed {} idle connections", trimmed);
                }
            }
            debug!("Reclamation task stopped");
        });

        Self { cancel, handle }
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!("Reclamation task panicked: {}", e);
            }
        }
    }
}
