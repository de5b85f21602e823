use crate::geometry::Ray;
use crate::RayHit;
use parking_lot::{Condvar, Mutex};
use std::collections::{BinaryHeap, HashMap, VecDeque};

/// Default batch size: large enough that one buffer saturates a device.
pub const RAY_BUFFER_SIZE: usize = 65536;

/// A fixed-capacity batch of rays and their result slots. Within a buffer
/// the ray index is stable: `hits[i]` always answers `rays[i]`.
#[derive(Debug, Clone)]
pub struct RayBuffer {
    pub rays: Vec<Ray>,
    pub hits: Vec<RayHit>,
    capacity: usize,
    pub producer_id: usize,
    pub sequence: u64,
}

impl RayBuffer {
    pub fn new(capacity: usize, producer_id: usize) -> Self {
        Self {
            rays: Vec::with_capacity(capacity),
            hits: Vec::with_capacity(capacity),
            capacity,
            producer_id,
            sequence: 0,
        }
    }

    /// Queues a ray, returning its index in the buffer.
    pub fn add_ray(&mut self, ray: Ray) -> usize {
        debug_assert!(!self.is_full());
        self.rays.push(ray);
        self.rays.len() - 1
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rays.len() >= self.capacity
    }

    pub fn reset(&mut self) {
        self.rays.clear();
        self.hits.clear();
    }

    pub fn hit(&self, index: usize) -> &RayHit {
        &self.hits[index]
    }
}

/// Blocking FIFO of buffers awaiting intersection. Closing the queue wakes
/// every waiter with `None`, which is the worker shutdown signal.
#[derive(Default)]
pub struct TodoQueue {
    queue: Mutex<TodoState>,
    condvar: Condvar,
}

#[derive(Default)]
struct TodoState {
    buffers: VecDeque<RayBuffer>,
    closed: bool,
}

impl TodoQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, buffer: RayBuffer) {
        let mut state = self.queue.lock();
        state.buffers.push_back(buffer);
        self.condvar.notify_one();
    }

    /// Blocks until a buffer is available or the queue is closed.
    pub fn pop(&self) -> Option<RayBuffer> {
        let mut state = self.queue.lock();
        loop {
            if let Some(buf) = state.buffers.pop_front() {
                return Some(buf);
            }
            if state.closed {
                return None;
            }
            self.condvar.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<RayBuffer> {
        self.queue.lock().buffers.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_rays(&self) -> usize {
        self.queue.lock().buffers.iter().map(|b| b.len()).sum()
    }

    pub fn close(&self) {
        self.queue.lock().closed = true;
        self.condvar.notify_all();
    }
}

struct SequencedBuffer(RayBuffer);

impl PartialEq for SequencedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence == other.0.sequence
    }
}
impl Eq for SequencedBuffer {}
impl PartialOrd for SequencedBuffer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SequencedBuffer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // min-heap on sequence number
        other.0.sequence.cmp(&self.0.sequence)
    }
}

#[derive(Default)]
struct ProducerSlot {
    next_pop_sequence: u64,
    next_push_sequence: u64,
    ready: BinaryHeap<SequencedBuffer>,
}

/// Completion router: buffers may arrive out of order from any device, but
/// each producer pops them back in its own push order.
#[derive(Default)]
pub struct DoneQueue {
    slots: Mutex<HashMap<usize, ProducerSlot>>,
    condvar: Condvar,
}

impl DoneQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps the buffer with the producer's next sequence number; must be
    /// called exactly once before the buffer is pushed to a device.
    pub fn assign_sequence(&self, buffer: &mut RayBuffer) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(buffer.producer_id).or_default();
        buffer.sequence = slot.next_push_sequence;
        slot.next_push_sequence += 1;
    }

    pub fn push_done(&self, buffer: RayBuffer) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(buffer.producer_id).or_default();
        slot.ready.push(SequencedBuffer(buffer));
        self.condvar.notify_all();
    }

    /// Blocks until the producer's next in-order buffer has completed.
    pub fn pop_done(&self, producer_id: usize) -> RayBuffer {
        let mut slots = self.slots.lock();
        loop {
            let slot = slots.entry(producer_id).or_default();
            let ready = slot
                .ready
                .peek()
                .map(|b| b.0.sequence == slot.next_pop_sequence)
                .unwrap_or(false);
            if ready {
                slot.next_pop_sequence += 1;
                return slot.ready.pop().unwrap().0;
            }
            self.condvar.wait(&mut slots);
        }
    }

    /// Discards everything in flight; used when the engine stops.
    pub fn drain(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.values_mut() {
            slot.next_pop_sequence = slot.next_push_sequence;
            slot.ready.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Point3f, Vec3f};

    fn buffer_with(producer: usize) -> RayBuffer {
        let mut b = RayBuffer::new(8, producer);
        b.add_ray(Ray::new(
            Point3f::new(0.0, 0.0, 0.0),
            Vec3f::new(0.0, 0.0, 1.0),
        ));
        b
    }

    #[test]
    fn test_todo_queue_fifo() {
        let q = TodoQueue::new();
        for i in 0..3 {
            let mut b = buffer_with(0);
            b.sequence = i;
            q.push(b);
        }
        for i in 0..3 {
            assert_eq!(q.pop().unwrap().sequence, i);
        }
    }

    #[test]
    fn test_todo_close_unblocks() {
        let q = TodoQueue::new();
        q.close();
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_done_queue_reorders_per_producer() {
        let q = DoneQueue::new();
        let mut b0 = buffer_with(7);
        let mut b1 = buffer_with(7);
        q.assign_sequence(&mut b0);
        q.assign_sequence(&mut b1);
        assert_eq!(b0.sequence, 0);
        assert_eq!(b1.sequence, 1);

        // complete out of order
        q.push_done(b1);
        q.push_done(b0);

        assert_eq!(q.pop_done(7).sequence, 0);
        assert_eq!(q.pop_done(7).sequence, 1);
    }

    #[test]
    fn test_done_queue_isolates_producers() {
        let q = DoneQueue::new();
        let mut a = buffer_with(1);
        let mut b = buffer_with(2);
        q.assign_sequence(&mut a);
        q.assign_sequence(&mut b);
        q.push_done(b);
        q.push_done(a);
        assert_eq!(q.pop_done(2).producer_id, 2);
        assert_eq!(q.pop_done(1).producer_id, 1);
    }
}
