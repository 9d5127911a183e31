//! Audio write loop
//!
//! Owns the block queue and the thread that drains it into a [`PcmSink`].
//! The platform source itself stays with the caller because its stream may
//! not cross threads; the recorder only hands out push handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::pipeline::{join_with_timeout, PipelineShared};

use super::{AudioPush, BlockQueue, PcmSink};

/// How long one pop waits before the loop re-checks the stop flag.
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Bound on waiting for the writer thread at stop.
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

pub struct AudioRecorder {
    queue: Arc<BlockQueue>,
    shared: Arc<PipelineShared>,
    stop: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
}

impl AudioRecorder {
    pub fn new(queue_capacity: usize, shared: Arc<PipelineShared>) -> Self {
        Self {
            queue: Arc::new(BlockQueue::new(queue_capacity)),
            shared,
            stop: Arc::new(AtomicBool::new(false)),
            writer: None,
        }
    }

    /// Producer handle for the audio backend's callback.
    pub fn push_handle(&self) -> AudioPush {
        AudioPush::new(Arc::clone(&self.queue), Arc::clone(&self.shared))
    }

    /// Start the write loop. The sink moves into the thread and is finalized
    /// there once the queue has drained.
    pub fn spawn_writer(&mut self, mut sink: Box<dyn PcmSink>) {
        let queue = Arc::clone(&self.queue);
        let shared = Arc::clone(&self.shared);
        let stop = Arc::clone(&self.stop);

        let handle = thread::Builder::new()
            .name("audio-writer".to_string())
            .spawn(move || {
                loop {
                    match queue.pop_timeout(RECV_TIMEOUT) {
                        Some(block) => match sink.write_block(&block) {
                            Ok(()) => shared.stats.note_audio_block_written(),
                            Err(err) => {
                                tracing::warn!(
                                    "audio block {} write failed: {}",
                                    block.sequence,
                                    err
                                );
                            }
                        },
                        // Blocks still queued at stop are drained above;
                        // exit only once the queue is actually empty.
                        None => {
                            if stop.load(Ordering::SeqCst) {
                                break;
                            }
                        }
                    }
                }
                if let Err(err) = sink.finalize() {
                    tracing::warn!("audio sink finalize failed: {}", err);
                }
            })
            .expect("failed to spawn audio writer thread");
        self.writer = Some(handle);
    }

    /// Stop the write loop after it drains. Idempotent, safe before spawn.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.writer.take() {
            join_with_timeout(handle, JOIN_TIMEOUT, "audio writer");
        }
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
