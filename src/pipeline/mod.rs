//! Two single-worker FIFO stages between the driver and the consumer.
//!
//! Stage 1 decodes and corrects, stage 2 delivers and recycles. Preview
//! messages carry only a [`BufferRef`]; the buffers stay in the pool and
//! every handler re-checks generation and slot owner after locking.
//!
//! Shutdown is an explicit message: the driver may still hold sink clones,
//! so the channels never disconnect on their own. Stage 1 forwards it to
//! stage 2 once everything queued ahead of it has been handled.

mod stage1;
mod stage2;

use crate::errors::CameraError;
use crate::pool::BufferRef;
use crate::session::Core;
use bytes::Bytes;
use crossbeam_channel::{unbounded, Sender};
use image::RgbImage;
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) enum Stage1Msg {
    ProcessPreview(BufferRef),
    ProcessCapture(Bytes),
    Shutdown,
}

pub(crate) enum Stage2Msg {
    DeliverPreview(BufferRef),
    DeliverCapture(RgbImage),
    Shutdown,
}

/// Running worker threads of one streaming period.
pub(crate) struct Workers {
    stage1_tx: Sender<Stage1Msg>,
    stage1: JoinHandle<()>,
    stage2: JoinHandle<()>,
}

impl Workers {
    /// Spawn both workers. Returns them and a sender for the driver sink.
    pub fn spawn(core: Arc<Core>) -> Result<(Self, Sender<Stage1Msg>), CameraError> {
        let (stage1_tx, stage1_rx) = unbounded();
        let (stage2_tx, stage2_rx) = unbounded();

        let deliver_core = core.clone();
        let stage2 = std::thread::Builder::new()
            .name("camfeed-deliver".to_string())
            .spawn(move || stage2::run(deliver_core, stage2_rx))
            .map_err(|e| CameraError::InvalidState(format!("spawn failed: {e}")))?;

        let stage1 = match std::thread::Builder::new()
            .name("camfeed-decode".to_string())
            .spawn(move || stage1::run(core, stage1_rx, stage2_tx))
        {
            Ok(handle) => handle,
            Err(e) => {
                // stage2_tx went down with the failed closure, so stage 2 exits.
                let _ = stage2.join();
                return Err(CameraError::InvalidState(format!("spawn failed: {e}")));
            }
        };

        let sink_tx = stage1_tx.clone();
        Ok((
            Self {
                stage1_tx,
                stage1,
                stage2,
            },
            sink_tx,
        ))
    }

    /// Queue the shutdown marker behind any pending work and join both
    /// workers. Must not be called with the session lock held.
    pub fn shutdown(self) {
        if self.stage1_tx.send(Stage1Msg::Shutdown).is_err() {
            log::warn!("decode worker already gone");
        }
        if self.stage1.join().is_err() {
            log::error!("decode worker panicked");
        }
        if self.stage2.join().is_err() {
            log::error!("delivery worker panicked");
        }
    }
}
