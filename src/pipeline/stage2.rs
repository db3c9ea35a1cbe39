//! Delivery worker: hands finished images to the listener and recycles buffers.

use super::Stage2Msg;
use crate::pool::{BufferRef, SlotOwner};
use crate::session::{return_to_driver, Core};
use crossbeam_channel::Receiver;
use image::RgbImage;
use std::sync::Arc;

pub(super) fn run(core: Arc<Core>, rx: Receiver<Stage2Msg>) {
    log::debug!("delivery worker started");
    while let Ok(msg) = rx.recv() {
        match msg {
            Stage2Msg::DeliverPreview(buffer) => deliver_preview(&core, buffer),
            Stage2Msg::DeliverCapture(image) => deliver_capture(&core, image),
            Stage2Msg::Shutdown => break,
        }
    }
    log::debug!("delivery worker stopped");
}

fn deliver_preview(core: &Core, buffer: BufferRef) {
    let (slot, image, timestamp_ms) = {
        let mut guard = core.lock();
        let shared = &mut *guard;
        let delivering = shared.is_delivering();

        let Some(pool) = shared.pool.as_mut() else {
            shared.stats.stale_dropped += 1;
            return;
        };
        let Some(slot) = pool
            .resolve(buffer)
            .filter(|&slot| pool.owner(slot) == SlotOwner::Stage2)
        else {
            log::debug!("stale delivery message {:?}", buffer);
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

        let Some(image) = pool.take_corrected(slot) else {
            log::warn!("slot {} has no corrected image", slot);
            if let Some(frame) = pool.take_raw(slot) {
                return_to_driver(&mut shared.device, pool, slot, frame);
            }
            return;
        };
        pool.set_owner(slot, SlotOwner::Consumer);
        (slot, image, pool.timestamp_ms(slot))
    };

    core.listener.on_preview(&image, timestamp_ms);

    let mut guard = core.lock();
    let shared = &mut *guard;
    let Some(pool) = shared
        .pool
        .as_mut()
        .filter(|pool| pool.generation() == buffer.generation)
    else {
        log::debug!("pool replaced during delivery of {:?}", buffer);
        return;
    };
    pool.put_corrected(slot, image);
    shared.stats.previews_delivered += 1;
    if let Some(frame) = pool.take_raw(slot) {
        return_to_driver(&mut shared.device, pool, slot, frame);
    }
}

fn deliver_capture(core: &Core, image: RgbImage) {
    core.listener.on_capture(image);
    core.lock().finish_capture(true);
    log::debug!("capture delivered");
}
