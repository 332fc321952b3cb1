// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The reconnect supervisor.
//!
//! Watches the status channel; whenever the connection lands in
//! `disconnect`, a retry is scheduled after a fixed delay. At fire
//! time the status is checked again: an orderly `stop()` has moved
//! on to `offline` by then and no retry happens. Retry failures are
//! swallowed here: the connection already reported them through its
//! own error event, and the next `disconnect` reschedules.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::connection::{Connection, Status};
use crate::error::Error;

/// Default delay between a disconnect and the retry.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Supervises one connection, retrying connect+open after unexpected
/// disconnects.
pub struct Reconnect {
    delay: Duration,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl Reconnect {
    /// Create a supervisor with the given retry delay.
    pub fn new(delay: Duration) -> Reconnect {
        Reconnect {
            delay,
            task: StdMutex::new(None),
        }
    }

    /// Attach to a connection's status channel. A previous attachment
    /// is detached first.
    pub fn start(&self, connection: &Connection) {
        self.stop();
        let connection = connection.clone();
        let delay = self.delay;
        let task = tokio::spawn(async move {
            let mut status_rx = connection.status_watch();
            loop {
                if status_rx.changed().await.is_err() {
                    break;
                }
                if *status_rx.borrow_and_update() != Status::Disconnect {
                    continue;
                }
                tokio::time::sleep(delay).await;
                if connection.status() != Status::Disconnect {
                    // Someone else moved the connection on (orderly
                    // stop, manual reconnect); stand down.
                    continue;
                }
                let Some((service, domain, lang)) = connection.last_known() else {
                    continue;
                };
                log::debug!("reconnecting to {}", service);
                let attempt = async {
                    connection.connect(&service).await?;
                    connection.open(&domain, lang.as_deref()).await?;
                    Ok::<(), Error>(())
                };
                if let Err(e) = attempt.await {
                    log::debug!("reconnect attempt failed: {}", e);
                }
            }
        });
        *self.task.lock().unwrap() = Some(task);
    }

    /// Cancel the pending retry and detach from the status channel.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for Reconnect {
    fn drop(&mut self) {
        self.stop();
    }
}
