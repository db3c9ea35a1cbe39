//! Fixed pool of raw preview buffers and their corrected images.
//!
//! The pool is an arena indexed by slot. A raw buffer is *moved* between the
//! driver and the pipeline; while the driver holds it the slot is empty and
//! tagged [`SlotOwner::Driver`]. Every pool allocation gets a new generation so
//! buffers and messages from before a restart can be recognised and dropped.
//!
//! The pool does no locking of its own. The session serializes access.

use crate::errors::CameraError;
use crate::types::Size;
use image::RgbImage;

/// Raw buffers per pool. Three keeps one filling, one decoding, one delivering.
pub const NUM_BUFFERS: usize = 3;

fn align16(value: usize) -> usize {
    value.div_ceil(16) * 16
}

/// Byte layout of a YV12 frame with 16-byte aligned plane strides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanarLayout {
    pub width: u32,
    pub height: u32,
    pub y_stride: usize,
    pub uv_stride: usize,
    pub y_size: usize,
    pub uv_size: usize,
}

impl PlanarLayout {
    pub fn yv12(size: Size) -> Self {
        let y_stride = align16(size.width as usize);
        let uv_stride = align16(y_stride / 2);
        let y_size = y_stride * size.height as usize;
        let uv_size = uv_stride * size.height as usize / 2;
        Self {
            width: size.width,
            height: size.height,
            y_stride,
            uv_stride,
            y_size,
            uv_size,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Total buffer length in bytes.
    pub fn len(&self) -> usize {
        self.y_size + self.uv_size * 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// V (Cr) plane comes first in YV12.
    pub fn v_offset(&self) -> usize {
        self.y_size
    }

    pub fn u_offset(&self) -> usize {
        self.y_size + self.uv_size
    }
}

/// One raw sensor buffer. Deliberately not `Clone`: a frame has exactly one owner.
#[derive(Debug)]
pub struct RawFrame {
    generation: u64,
    slot: usize,
    data: Vec<u8>,
}

impl RawFrame {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Drivers fill the buffer in place.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn buffer_ref(&self) -> BufferRef {
        BufferRef {
            generation: self.generation,
            slot: self.slot,
        }
    }
}

/// Identity of a pool slot carried through pipeline messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRef {
    pub generation: u64,
    pub slot: usize,
}

/// Who currently owns a slot's raw buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOwner {
    /// Queued with the driver, waiting to be filled.
    Driver,
    Stage1,
    Stage2,
    /// The corrected image is lent to the consumer callback.
    Consumer,
    /// Parked in the pool because no device was available to take it.
    Idle,
}

#[derive(Debug)]
struct Slot {
    raw: Option<RawFrame>,
    corrected: Option<RgbImage>,
    timestamp_ms: u64,
    owner: SlotOwner,
}

#[derive(Debug)]
pub struct BufferPool {
    generation: u64,
    layout: PlanarLayout,
    corrected_size: Size,
    slots: Vec<Slot>,
    scratch: Option<RgbImage>,
}

impl BufferPool {
    /// Allocate `count` raw buffers for `layout`, `count` corrected images of
    /// `corrected_size` and one scratch image of the unrotated preview size.
    /// All slots start [`SlotOwner::Idle`].
    pub fn allocate(generation: u64, count: usize, layout: PlanarLayout, corrected_size: Size) -> Self {
        log::debug!(
            "allocate pool gen {}: {} x {} bytes, corrected {}",
            generation,
            count,
            layout.len(),
            corrected_size
        );
        let slots = (0..count)
            .map(|slot| Slot {
                raw: Some(RawFrame {
                    generation,
                    slot,
                    data: vec![0u8; layout.len()],
                }),
                corrected: Some(RgbImage::new(corrected_size.width, corrected_size.height)),
                timestamp_ms: 0,
                owner: SlotOwner::Idle,
            })
            .collect();
        Self {
            generation,
            layout,
            corrected_size,
            slots,
            scratch: Some(RgbImage::new(layout.width, layout.height)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout(&self) -> &PlanarLayout {
        &self.layout
    }

    pub fn corrected_size(&self) -> Size {
        self.corrected_size
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot of a buffer handed back by the driver. Buffers from another
    /// pool generation are `StaleBuffer`.
    pub fn index_of(&self, frame: &RawFrame) -> Result<usize, CameraError> {
        self.resolve(frame.buffer_ref())
            .ok_or(CameraError::StaleBuffer {
                generation: frame.generation(),
                slot: frame.slot(),
            })
    }

    /// Slot for a message reference, or `None` when it is stale.
    pub fn resolve(&self, buffer: BufferRef) -> Option<usize> {
        (buffer.generation == self.generation && buffer.slot < self.slots.len())
            .then_some(buffer.slot)
    }

    pub fn owner(&self, slot: usize) -> SlotOwner {
        self.slots[slot].owner
    }

    pub fn set_owner(&mut self, slot: usize, owner: SlotOwner) {
        self.slots[slot].owner = owner;
    }

    pub fn timestamp_ms(&self, slot: usize) -> u64 {
        self.slots[slot].timestamp_ms
    }

    /// Store a buffer returned by the driver.
    pub fn park(&mut self, slot: usize, frame: RawFrame, owner: SlotOwner, timestamp_ms: u64) {
        let s = &mut self.slots[slot];
        s.raw = Some(frame);
        s.owner = owner;
        s.timestamp_ms = timestamp_ms;
    }

    pub fn take_raw(&mut self, slot: usize) -> Option<RawFrame> {
        self.slots[slot].raw.take()
    }

    pub fn put_raw(&mut self, slot: usize, frame: RawFrame) {
        self.slots[slot].raw = Some(frame);
    }

    pub fn take_corrected(&mut self, slot: usize) -> Option<RgbImage> {
        self.slots[slot].corrected.take()
    }

    pub fn put_corrected(&mut self, slot: usize, image: RgbImage) {
        self.slots[slot].corrected = Some(image);
    }

    pub fn take_scratch(&mut self) -> Option<RgbImage> {
        self.scratch.take()
    }

    pub fn put_scratch(&mut self, image: RgbImage) {
        self.scratch = Some(image);
    }

    /// Take every idle buffer, marking its slot as owned by the driver.
    pub fn drain_idle(&mut self) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        for slot in self.slots.iter_mut().filter(|s| s.owner == SlotOwner::Idle) {
            if let Some(frame) = slot.raw.take() {
                slot.owner = SlotOwner::Driver;
                frames.push(frame);
            }
        }
        frames
    }

    /// Slots currently owned by a worker or the consumer.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s.owner, SlotOwner::Driver | SlotOwner::Idle))
            .count()
    }

    /// Drop every buffer. Frames still held by the driver are dropped when
    /// the driver lets go of them; they will no longer resolve.
    pub fn release(&mut self) {
        log::debug!("release pool gen {}", self.generation);
        self.slots.clear();
        self.scratch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(generation: u64) -> BufferPool {
        let layout = PlanarLayout::yv12(Size::new(320, 240));
        BufferPool::allocate(generation, NUM_BUFFERS, layout, Size::new(240, 320))
    }

    #[test]
    fn test_yv12_layout_pads_strides() {
        let layout = PlanarLayout::yv12(Size::new(100, 10));
        assert_eq!(layout.y_stride, 112);
        assert_eq!(layout.uv_stride, 64);
        assert_eq!(layout.y_size, 1120);
        assert_eq!(layout.uv_size, 320);
        assert_eq!(layout.len(), 1760);
        assert_eq!(layout.v_offset(), 1120);
        assert_eq!(layout.u_offset(), 1440);
    }

    #[test]
    fn test_allocate_sizes_buffers() {
        let mut p = pool(1);
        assert_eq!(p.len(), NUM_BUFFERS);
        assert_eq!(p.corrected_size(), Size::new(240, 320));
        let corrected = p.take_corrected(0).unwrap();
        assert_eq!(corrected.dimensions(), (240, 320));
        let scratch = p.take_scratch().unwrap();
        assert_eq!(scratch.dimensions(), (320, 240));
        let raw = p.take_raw(2).unwrap();
        assert_eq!(raw.len(), p.layout().len());
        assert_eq!(raw.slot(), 2);
    }

    #[test]
    fn test_index_of_rejects_foreign_generation() {
        let mut old = pool(1);
        let new = pool(2);
        let frame = old.take_raw(1).unwrap();
        assert_eq!(old.index_of(&frame).unwrap(), 1);
        assert!(matches!(
            new.index_of(&frame),
            Err(CameraError::StaleBuffer {
                generation: 1,
                slot: 1
            })
        ));
        assert_eq!(new.resolve(BufferRef { generation: 2, slot: 7 }), None);
    }

    #[test]
    fn test_drain_idle_hands_all_to_driver() {
        let mut p = pool(1);
        let frames = p.drain_idle();
        assert_eq!(frames.len(), NUM_BUFFERS);
        assert_eq!(p.in_flight(), 0);
        assert!(p.drain_idle().is_empty());
        for i in 0..NUM_BUFFERS {
            assert_eq!(p.owner(i), SlotOwner::Driver);
        }
    }

    #[test]
    fn test_in_flight_tracks_worker_ownership() {
        let mut p = pool(1);
        let mut frames = p.drain_idle();
        let f = frames.pop().unwrap();
        let slot = p.index_of(&f).unwrap();
        p.park(slot, f, SlotOwner::Stage1, 42);
        assert_eq!(p.in_flight(), 1);
        assert_eq!(p.timestamp_ms(slot), 42);
        p.set_owner(slot, SlotOwner::Consumer);
        assert_eq!(p.in_flight(), 1);
        p.set_owner(slot, SlotOwner::Driver);
        assert_eq!(p.in_flight(), 0);
    }

    #[test]
    fn test_release_invalidates_everything() {
        let mut p = pool(3);
        p.release();
        assert!(p.is_empty());
        assert_eq!(p.resolve(BufferRef { generation: 3, slot: 0 }), None);
        assert!(p.take_scratch().is_none());
    }
}
