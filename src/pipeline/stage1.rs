//! Decode worker: raw preview → corrected image, compressed capture → oriented image.

use super::{Stage1Msg, Stage2Msg};
use crate::convert::{self, CaptureBudget, Decoded, PreviewDecoder};
use crate::errors::CameraError;
use crate::pool::{BufferRef, SlotOwner};
use crate::session::{return_to_driver, Core};
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

pub(super) fn run(core: Arc<Core>, rx: Receiver<Stage1Msg>, tx: Sender<Stage2Msg>) {
    let mut decoder = PreviewDecoder::new(core.config.preview.jpeg_quality);
    log::debug!("decode worker started");
    while let Ok(msg) = rx.recv() {
        match msg {
            Stage1Msg::ProcessPreview(buffer) => process_preview(&core, &mut decoder, buffer, &tx),
            Stage1Msg::ProcessCapture(jpeg) => process_capture(&core, jpeg, &tx),
            Stage1Msg::Shutdown => {
                let _ = tx.send(Stage2Msg::Shutdown);
                break;
            }
        }
    }
    log::debug!("decode worker stopped");
}

fn process_preview(
    core: &Core,
    decoder: &mut PreviewDecoder,
    buffer: BufferRef,
    tx: &Sender<Stage2Msg>,
) {
    let (slot, frame, mut corrected, mut scratch, layout, transform) = {
        let mut guard = core.lock();
        let shared = &mut *guard;
        let delivering = shared.is_delivering();

        let Some(pool) = shared.pool.as_mut() else {
            shared.stats.stale_dropped += 1;
            return;
        };
        let Some(slot) = pool
            .resolve(buffer)
            .filter(|&slot| pool.owner(slot) == SlotOwner::Stage1)
        else {
            log::debug!("stale preview message {:?}", buffer);
            shared.stats.stale_dropped += 1;
            return;
        };

        if !delivering {
            if let Some(frame) = pool.take_raw(slot) {
                return_to_driver(&mut shared.device, pool, slot, frame);
            }
            shared.stats.suppressed_recycled += 1;
            return;
        }

        let Some(transform) = shared.negotiated.as_ref().map(|n| n.transform.clone()) else {
            return;
        };
        let layout = *pool.layout();
        match (pool.take_raw(slot), pool.take_corrected(slot), pool.take_scratch()) {
            (Some(frame), Some(corrected), Some(scratch)) => {
                (slot, frame, corrected, scratch, layout, transform)
            }
            (frame, corrected, scratch) => {
                // Only reachable if ownership tracking is broken.
                log::warn!("slot {} missing buffers, recycling", slot);
                if let Some(corrected) = corrected {
                    pool.put_corrected(slot, corrected);
                }
                if let Some(scratch) = scratch {
                    pool.put_scratch(scratch);
                }
                if let Some(frame) = frame {
                    return_to_driver(&mut shared.device, pool, slot, frame);
                }
                return;
            }
        }
    };

    let result = decoder
        .decode(frame.data(), &layout, &mut scratch)
        .map(|decoded| match decoded {
            Decoded::InPlace => transform.draw_into(&scratch, &mut corrected),
            Decoded::Fresh(image) => transform.draw_into(&image, &mut corrected),
        });

    let mut guard = core.lock();
    let shared = &mut *guard;
    let Some(pool) = shared
        .pool
        .as_mut()
        .filter(|pool| pool.generation() == buffer.generation)
    else {
        // Pool released while decoding; these buffers belong to nobody now.
        shared.stats.stale_dropped += 1;
        return;
    };
    pool.put_scratch(scratch);
    pool.put_corrected(slot, corrected);

    if let Err(e) = result {
        log_failure("preview frame", &e);
        shared.stats.decode_failures += 1;
        return_to_driver(&mut shared.device, pool, slot, frame);
        return;
    }

    pool.put_raw(slot, frame);
    pool.set_owner(slot, SlotOwner::Stage2);
    if tx.send(Stage2Msg::DeliverPreview(buffer)).is_err() {
        log::warn!("delivery worker gone, recycling slot {}", slot);
        if let Some(frame) = pool.take_raw(slot) {
            return_to_driver(&mut shared.device, pool, slot, frame);
        }
    }
}

fn process_capture(core: &Core, jpeg: Bytes, tx: &Sender<Stage2Msg>) {
    let transform = core
        .lock()
        .negotiated
        .as_ref()
        .map(|n| n.transform.clone());
    let Some(transform) = transform else {
        core.lock().finish_capture(false);
        return;
    };
    let budget = CaptureBudget {
        memory_bytes: core.config.capture.memory_budget_bytes,
        max_retries: core.config.capture.max_retries,
    };

    match convert::decode_capture(&jpeg, &transform, budget) {
        Ok(image) => {
            log::debug!("capture ready: {}x{}", image.width(), image.height());
            if tx.send(Stage2Msg::DeliverCapture(image)).is_err() {
                log::warn!("delivery worker gone, capture lost");
                core.lock().finish_capture(false);
            }
        }
        Err(e) => {
            log_failure("capture", &e);
            core.lock().finish_capture(false);
        }
    }
}

/// Frame-local failures are routine on a busy device; anything else points
/// at the session or the driver.
fn log_failure(what: &str, err: &CameraError) {
    if err.is_frame_local() {
        log::warn!("dropping {}: {}", what, err);
    } else {
        log::error!("{} failed: {}", what, err);
    }
}
