// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-sender debounce buffer.
//!
//! Each inbound text lands in its sender's buffer and (re)arms that sender's
//! quiet-window timer. When the timer fires, the buffered texts flush as one
//! batch in arrival order. A full buffer flushes immediately. Identical
//! consecutive texts inside one window are dropped, which makes transport
//! redelivery idempotent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use attache_core::Batch;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

struct SenderBuffer {
    texts: Vec<String>,
    /// Bumped on every push; a timer only flushes if its epoch is still
    /// current, so re-arming is just spawning a newer timer.
    epoch: u64,
}

/// Coalesces bursts per sender into single batches.
pub struct DebounceBuffer {
    state: Mutex<HashMap<String, SenderBuffer>>,
    tx: mpsc::Sender<Batch>,
    window: Duration,
    max_buffer: usize,
}

impl DebounceBuffer {
    /// Creates the buffer and the batch stream it flushes into.
    pub fn new(window: Duration, max_buffer: usize) -> (Arc<Self>, mpsc::Receiver<Batch>) {
        let (tx, rx) = mpsc::channel(128);
        (
            Arc::new(Self {
                state: Mutex::new(HashMap::new()),
                tx,
                window,
                max_buffer,
            }),
            rx,
        )
    }

    /// Buffers one text for `sender`, re-arming the quiet-window timer.
    /// Flushes immediately when the buffer reaches its size cap.
    pub async fn push(self: &Arc<Self>, sender: &str, text: String) {
        let flush_now = {
            let mut state = self.state.lock().await;
            let buffer = state.entry(sender.to_string()).or_insert(SenderBuffer {
                texts: Vec::new(),
                epoch: 0,
            });

            // Transport redelivery: an identical consecutive text only
            // extends the quiet window.
            if buffer.texts.last().map(String::as_str) != Some(text.as_str()) {
                buffer.texts.push(text);
            }
            buffer.epoch += 1;

            if buffer.texts.len() >= self.max_buffer {
                let texts = std::mem::take(&mut buffer.texts);
                state.remove(sender);
                Some(texts)
            } else {
                None
            }
        };

        if let Some(texts) = flush_now {
            debug!(sender, count = texts.len(), "buffer cap reached, flushing now");
            self.emit(sender, texts).await;
            return;
        }

        let this = self.clone();
        let sender = sender.to_string();
        let armed_epoch = {
            let state = self.state.lock().await;
            state.get(&sender).map(|b| b.epoch)
        };
        let Some(armed_epoch) = armed_epoch else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(this.window).await;
            let texts = {
                let mut state = this.state.lock().await;
                // A newer push re-armed the window; that push's timer owns
                // the flush.
                let current = state.get(&sender).map(|buffer| buffer.epoch);
                if current == Some(armed_epoch) {
                    state.remove(&sender).map(|buffer| buffer.texts)
                } else {
                    None
                }
            };
            if let Some(texts) = texts {
                if !texts.is_empty() {
                    this.emit(&sender, texts).await;
                }
            }
        });
    }

    /// Flushes every buffered sender immediately (graceful shutdown).
    pub async fn flush_all(self: &Arc<Self>) {
        let drained: Vec<(String, Vec<String>)> = {
            let mut state = self.state.lock().await;
            state
                .drain()
                .map(|(sender, buffer)| (sender, buffer.texts))
                .filter(|(_, texts)| !texts.is_empty())
                .collect()
        };
        for (sender, texts) in drained {
            self.emit(&sender, texts).await;
        }
    }

    async fn emit(&self, sender: &str, texts: Vec<String>) {
        let batch = Batch {
            sender: sender.to_string(),
            texts,
        };
        if self.tx.send(batch).await.is_err() {
            warn!(sender, "batch receiver closed, dropping flush");
        }
    }
}
