use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bot::Bot;
use crate::config::FanOut;
use crate::types::{GetUpdatesOptions, Update};

/// Set once the process-wide Ctrl-C handler is installed.
static INTERRUPT_INSTALLED: AtomicBool = AtomicBool::new(false);

/// A running poll loop.
pub struct PollingHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollingHandle {
    /// Cancel the pending delay. A cycle in flight still completes.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub(crate) fn stopper(&self) -> watch::Sender<bool> {
        self.stop_tx.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit after [`PollingHandle::stop`].
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Polling task failed: {e}");
        }
    }
}

pub(crate) fn spawn(bot: Bot, options: GetUpdatesOptions) -> PollingHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        loop {
            if *stop_rx.borrow() {
                break;
            }

            poll_once(&bot, &options).await;

            if *stop_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(bot.polling_delay()) => {}
                changed = stop_rx.changed() => {
                    // Sender dropped or stop requested.
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Poll loop exited");
    });

    PollingHandle { stop_tx, task }
}

/// One fetch + dispatch cycle. Failures are routed and never escape.
async fn poll_once(bot: &Bot, options: &GetUpdatesOptions) {
    let updates = match bot.get_updates(options).await {
        Ok(Some(updates)) => updates,
        Ok(None) => return,
        Err(e) => {
            warn!("getUpdates failed: {e}");
            return;
        }
    };

    if updates.is_empty() {
        return;
    }
    debug!("Fetched {} update(s)", updates.len());

    match bot.config().fan_out {
        FanOut::Concurrent => {
            join_all(updates.into_iter().map(|u| dispatch(bot, u))).await;
        }
        FanOut::Sequential => {
            for update in updates {
                dispatch(bot, update).await;
            }
        }
    }
}

async fn dispatch(bot: &Bot, update: Update) {
    let update_id = update.update_id;
    if let Err(e) = bot.handle_update(update).await {
        error!(update_id, "Update handler failed: {e}");
    }
}

/// Install the Ctrl-C handler that stops polling and exits the process.
/// Only the first call in a process has any effect.
pub fn install_interrupt_handler(bot: Bot) {
    if INTERRUPT_INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            bot.stop_polling();
            std::process::exit(0);
        }
    });
}
