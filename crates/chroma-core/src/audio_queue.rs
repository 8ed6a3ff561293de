use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Single-producer / single-consumer ring buffer of stereo sample frames.
///
/// The emulator thread pushes one frame per resampler output; the host audio
/// callback pops under its own lock-free pace. No mutexes: coordination is a
/// pair of acquire/release indices over a fixed slot array.
///
/// The queue is *lossy* when full: new frames are dropped and counted, so a
/// stalled host cannot back up the core.
pub struct SampleProducer {
    inner: Arc<Inner>,
}

#[derive(Clone)]
pub struct SampleConsumer {
    inner: Arc<Inner>,
}

/// One interleaved stereo frame of signed 8-bit samples.
pub type StereoFrame = [i8; 2];

struct Inner {
    // Slots are plain atomics; a frame fits in 16 bits so each slot packs
    // left/right into one AtomicUsize-sized cell.
    slots: Box<[AtomicUsize]>,
    cap: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    dropped: AtomicUsize,
}

impl Inner {
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            (self.cap - tail) + head
        }
    }

    #[inline]
    fn next_index(&self, idx: usize) -> usize {
        let next = idx + 1;
        if next == self.cap { 0 } else { next }
    }
}

fn pack(frame: StereoFrame) -> usize {
    ((frame[0] as u8 as usize) << 8) | frame[1] as u8 as usize
}

fn unpack(raw: usize) -> StereoFrame {
    [(raw >> 8) as u8 as i8, raw as u8 as i8]
}

/// Create a queue holding up to `capacity_frames` stereo frames.
pub fn sample_queue(capacity_frames: usize) -> (SampleProducer, SampleConsumer) {
    // One extra slot so head == tail is unambiguously empty.
    let cap = capacity_frames.saturating_add(1).max(2);
    let slots = (0..cap).map(|_| AtomicUsize::new(0)).collect();

    let inner = Arc::new(Inner {
        slots,
        cap,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
    });

    (
        SampleProducer {
            inner: Arc::clone(&inner),
        },
        SampleConsumer { inner },
    )
}

impl SampleProducer {
    /// Push one frame. Returns false (and counts the drop) when full.
    #[inline]
    pub fn push(&self, left: i8, right: i8) -> bool {
        let head = self.inner.head.load(Ordering::Relaxed);
        let next = self.inner.next_index(head);
        let tail = self.inner.tail.load(Ordering::Acquire);
        if next == tail {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.inner.slots[head].store(pack([left, right]), Ordering::Relaxed);
        self.inner.head.store(next, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames discarded because the host was not draining fast enough.
    pub fn dropped(&self) -> usize {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl SampleConsumer {
    #[inline]
    pub fn pop(&self) -> Option<StereoFrame> {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let head = self.inner.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }

        let raw = self.inner.slots[tail].load(Ordering::Relaxed);
        self.inner.tail.store(self.inner.next_index(tail), Ordering::Release);
        Some(unpack(raw))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
