use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::AtomicUsize;

use crate::solver::sync::SpinRwLock;

/// An open state waiting for expansion: its table hash, its depth in the
/// search tree and the root it descends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierEntry {
    pub hash: u64,
    pub depth: u32,
    pub root: u32,
}

/// Growable multi-producer multi-consumer ring buffer.
///
/// Enqueue reserves a slot with a CAS on `tail_reserved`, writes it, then
/// commits by advancing `tail_committed` in reservation order. Dequeue
/// reads the head slot speculatively and only keeps the value if its CAS
/// on `head` wins; a lost CAS discards the read, so a slot recycled by a
/// wrapped-around producer can never be handed out twice. All three
/// counters are monotonic, slot indices are taken modulo the capacity.
///
/// Growth copies the live range into a doubled buffer under the write
/// side of the lock; every other operation holds the read side, which
/// also guarantees no reservation is in flight while growing.
struct ConcurrentQueue<T: Copy> {
    buffer: UnsafeCell<Box<[UnsafeCell<MaybeUninit<T>>]>>,
    head: AtomicUsize,
    tail_reserved: AtomicUsize,
    tail_committed: AtomicUsize,
    lock: SpinRwLock,
}

unsafe impl<T: Copy + Send> Sync for ConcurrentQueue<T> {}

const INITIAL_QUEUE_CAPACITY: usize = 64;

impl<T: Copy> ConcurrentQueue<T> {
    fn new() -> ConcurrentQueue<T> {
        ConcurrentQueue {
            buffer: UnsafeCell::new(new_buffer(INITIAL_QUEUE_CAPACITY)),
            head: AtomicUsize::new(0),
            tail_reserved: AtomicUsize::new(0),
            tail_committed: AtomicUsize::new(0),
            lock: SpinRwLock::new(),
        }
    }

    fn enqueue(&self, item: T) {
        loop {
            {
                let _guard = self.lock.read();
                let buffer = unsafe { &**self.buffer.get() };
                let capacity = buffer.len();

                let tail = self.tail_reserved.load(Acquire);
                let head = self.head.load(Acquire);
                if tail - head >= capacity {
                    // full, grow outside the read guard
                } else if self
                    .tail_reserved
                    .compare_exchange(tail, tail + 1, Acquire, Relaxed)
                    .is_ok()
                {
                    unsafe {
                        (*buffer[tail & (capacity - 1)].get()).write(item);
                    }
                    // commit in reservation order
                    while self
                        .tail_committed
                        .compare_exchange(tail, tail + 1, Release, Relaxed)
                        .is_err()
                    {
                        std::hint::spin_loop();
                    }
                    return;
                } else {
                    // raced on the reservation, re-read the bounds
                    continue;
                }
            }
            self.grow();
        }
    }

    fn try_dequeue(&self) -> Option<T> {
        let _guard = self.lock.read();
        let buffer = unsafe { &**self.buffer.get() };
        let capacity = buffer.len();

        loop {
            let head = self.head.load(Acquire);
            let committed = self.tail_committed.load(Acquire);
            if head == committed {
                return None;
            }
            // speculative read, discarded unless the CAS below wins
            let item = unsafe { (*buffer[head & (capacity - 1)].get()).assume_init() };
            if self
                .head
                .compare_exchange(head, head + 1, Acquire, Relaxed)
                .is_ok()
            {
                return Some(item);
            }
        }
    }

    fn len(&self) -> usize {
        let committed = self.tail_committed.load(Acquire);
        let head = self.head.load(Acquire);
        committed.saturating_sub(head)
    }

    fn grow(&self) {
        let _guard = self.lock.write();
        let buffer = unsafe { &mut *self.buffer.get() };
        let capacity = buffer.len();

        let head = self.head.load(Relaxed);
        let committed = self.tail_committed.load(Relaxed);
        debug_assert_eq!(self.tail_reserved.load(Relaxed), committed);
        let len = committed - head;
        if len < capacity {
            // someone else already grew or consumers caught up
            return;
        }

        let new_buffer = new_buffer(capacity * 2);
        for i in 0..len {
            unsafe {
                let item = (*buffer[(head + i) & (capacity - 1)].get()).assume_init();
                (*new_buffer[i].get()).write(item);
            }
        }
        *buffer = new_buffer;
        self.head.store(0, Relaxed);
        self.tail_reserved.store(len, Relaxed);
        self.tail_committed.store(len, Relaxed);
    }
}

fn new_buffer<T: Copy>(capacity: usize) -> Box<[UnsafeCell<MaybeUninit<T>>]> {
    (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect()
}

/// Priority frontier: one queue per f-value, popped lowest first.
///
/// `lowest` is an advisory hint for where to start scanning. It only
/// ever lags behind the true minimum (pushes lower it, pops bump it past
/// drained buckets), and a pop that comes up empty while the entry count
/// says otherwise rescans from zero, so a stale hint costs a scan, not
/// an entry.
pub struct Frontier {
    buckets: UnsafeCell<Vec<Option<Box<ConcurrentQueue<FrontierEntry>>>>>,
    lock: SpinRwLock,
    lowest: AtomicUsize,
    count: AtomicUsize,
}

unsafe impl Sync for Frontier {}
unsafe impl Send for Frontier {}

impl Frontier {
    pub fn new() -> Frontier {
        Frontier {
            buckets: UnsafeCell::new(Vec::new()),
            lock: SpinRwLock::new(),
            lowest: AtomicUsize::new(usize::MAX),
            count: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Acquire)
    }

    pub fn push(&self, priority: u32, entry: FrontierEntry) {
        let priority = priority as usize;
        let queue = match self.bucket(priority) {
            Some(queue) => queue,
            None => self.create_bucket(priority),
        };
        // count first: a pop may dequeue the entry the moment it lands,
        // and its decrement must never get ahead of this increment
        self.count.fetch_add(1, Release);
        // the Box keeps the queue's address stable across bucket growth
        unsafe { (*queue).enqueue(entry) };

        let mut current = self.lowest.load(Relaxed);
        while current > priority {
            match self
                .lowest
                .compare_exchange(current, priority, Relaxed, Relaxed)
            {
                Ok(_) => break,
                Err(now) => current = now,
            }
        }
    }

    /// Pops some entry of the lowest non-empty priority. Entries pushed
    /// concurrently with the scan may be missed once; the caller loops
    /// while work remains.
    pub fn try_pop(&self) -> Option<FrontierEntry> {
        if self.count.load(Acquire) == 0 {
            return None;
        }

        let num_buckets = {
            let _guard = self.lock.read();
            unsafe { (*self.buckets.get()).len() }
        };
        let start = self.lowest.load(Relaxed).min(num_buckets);

        if let Some(entry) = self.scan(start, num_buckets, true) {
            return Some(entry);
        }
        if self.count.load(Acquire) > 0 {
            // the hint overshot, rescan everything without advancing it
            return self.scan(0, num_buckets, false);
        }
        None
    }

    fn scan(&self, start: usize, end: usize, advance_hint: bool) -> Option<FrontierEntry> {
        for priority in start..end {
            if let Some(queue) = self.bucket(priority) {
                if let Some(entry) = unsafe { (*queue).try_dequeue() } {
                    self.count.fetch_sub(1, Release);
                    return Some(entry);
                }
            }
            if advance_hint {
                // only advance past the value we saw, a concurrent push
                // may have lowered it again
                let _ = self
                    .lowest
                    .compare_exchange(priority, priority + 1, Relaxed, Relaxed);
            }
        }
        None
    }

    fn bucket(&self, priority: usize) -> Option<*const ConcurrentQueue<FrontierEntry>> {
        let _guard = self.lock.read();
        let buckets = unsafe { &*self.buckets.get() };
        buckets
            .get(priority)
            .and_then(|b| b.as_ref())
            .map(|b| &**b as *const _)
    }

    fn create_bucket(&self, priority: usize) -> *const ConcurrentQueue<FrontierEntry> {
        let _guard = self.lock.write();
        let buckets = unsafe { &mut *self.buckets.get() };
        if buckets.len() <= priority {
            buckets.resize_with(priority + 1, || None);
        }
        if buckets[priority].is_none() {
            buckets[priority] = Some(Box::new(ConcurrentQueue::new()));
        }
        match &buckets[priority] {
            Some(queue) => &**queue as *const _,
            None => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering::Relaxed;

    fn entry(hash: u64) -> FrontierEntry {
        FrontierEntry {
            hash,
            depth: 0,
            root: 0,
        }
    }

    #[test]
    fn queue_is_fifo_and_grows() {
        let queue = ConcurrentQueue::new();
        for i in 0..1000u64 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 1000);
        for i in 0..1000u64 {
            assert_eq!(queue.try_dequeue(), Some(i));
        }
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn queue_conserves_items_under_contention() {
        let queue = ConcurrentQueue::new();
        let received = std::sync::Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for t in 0..4u64 {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..2000u64 {
                        queue.enqueue(t * 10_000 + i);
                    }
                });
            }
            for _ in 0..4 {
                s.spawn(|| {
                    let mut got = Vec::new();
                    let mut misses = 0;
                    while misses < 1000 {
                        match queue.try_dequeue() {
                            Some(item) => {
                                got.push(item);
                                misses = 0;
                            }
                            None => {
                                misses += 1;
                                std::thread::yield_now();
                            }
                        }
                    }
                    received.lock().unwrap().extend(got);
                });
            }
        });

        let mut all = received.into_inner().unwrap();
        all.sort_unstable();
        let mut expected: Vec<u64> = (0..4)
            .flat_map(|t| (0..2000).map(move |i| t * 10_000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(all, expected);
    }

    #[test]
    fn pops_lowest_priority_first() {
        let frontier = Frontier::new();
        frontier.push(7, entry(70));
        frontier.push(3, entry(30));
        frontier.push(5, entry(50));
        frontier.push(3, entry(31));

        assert_eq!(frontier.len(), 4);
        assert_eq!(frontier.try_pop().unwrap().hash, 30);
        assert_eq!(frontier.try_pop().unwrap().hash, 31);
        assert_eq!(frontier.try_pop().unwrap().hash, 50);
        assert_eq!(frontier.try_pop().unwrap().hash, 70);
        assert_eq!(frontier.try_pop(), None);
        assert_eq!(frontier.len(), 0);
    }

    #[test]
    fn stale_hint_still_finds_lower_entries() {
        let frontier = Frontier::new();
        frontier.push(9, entry(90));
        assert_eq!(frontier.try_pop().unwrap().hash, 90);
        // hint now sits at 10, a new lower entry must still come out
        frontier.push(2, entry(20));
        assert_eq!(frontier.try_pop().unwrap().hash, 20);
    }

    #[test]
    fn concurrent_pushes_and_pops_conserve_entries() {
        let frontier = Frontier::new();
        let popped = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for t in 0..4u32 {
                let frontier = &frontier;
                s.spawn(move || {
                    for i in 0..1000u32 {
                        frontier.push((i % 16) as u32, entry((t * 1000 + i) as u64));
                    }
                });
            }
            for _ in 0..4 {
                s.spawn(|| {
                    let mut misses = 0;
                    while misses < 1000 {
                        // the count may run ahead of in-flight pushes but
                        // must never wrap below zero
                        assert!(frontier.len() <= 4000);
                        match frontier.try_pop() {
                            Some(_) => {
                                popped.fetch_add(1, Relaxed);
                                misses = 0;
                            }
                            None => {
                                misses += 1;
                                std::thread::yield_now();
                            }
                        }
                    }
                });
            }
        });

        assert_eq!(popped.load(Relaxed), 4000);
        assert_eq!(frontier.len(), 0);
    }
}
