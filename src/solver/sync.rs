use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicBool, AtomicU32};
use std::thread;

const SPIN_BEFORE_YIELD: u32 = 50;

/// Minimal spinning reader-writer lock for short exclusive sections
/// (table growth). Readers increment, recheck the writer flags and back
/// out on conflict; writers queue on a single active flag and then wait
/// out the readers. Spins briefly, then yields.
pub struct SpinRwLock {
    readers: AtomicU32,
    writers_waiting: AtomicU32,
    writer_active: AtomicBool,
}

impl SpinRwLock {
    pub const fn new() -> SpinRwLock {
        SpinRwLock {
            readers: AtomicU32::new(0),
            writers_waiting: AtomicU32::new(0),
            writer_active: AtomicBool::new(false),
        }
    }

    pub fn read(&self) -> ReadGuard<'_> {
        let mut spins = 0;
        loop {
            if self.writers_waiting.load(Acquire) == 0 && !self.writer_active.load(Acquire) {
                self.readers.fetch_add(1, Acquire);
                // recheck, a writer may have arrived in between
                if self.writers_waiting.load(Acquire) == 0 && !self.writer_active.load(Acquire) {
                    return ReadGuard { lock: self };
                }
                self.readers.fetch_sub(1, Release);
            }
            spin(&mut spins);
        }
    }

    pub fn write(&self) -> WriteGuard<'_> {
        self.writers_waiting.fetch_add(1, Acquire);
        let mut spins = 0;
        while self
            .writer_active
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_err()
        {
            spin(&mut spins);
        }
        while self.readers.load(Acquire) != 0 {
            spin(&mut spins);
        }
        self.writers_waiting.fetch_sub(1, Release);
        WriteGuard { lock: self }
    }
}

fn spin(spins: &mut u32) {
    *spins += 1;
    if *spins >= SPIN_BEFORE_YIELD {
        *spins = 0;
        thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}

pub struct ReadGuard<'a> {
    lock: &'a SpinRwLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.readers.fetch_sub(1, Release);
    }
}

pub struct WriteGuard<'a> {
    lock: &'a SpinRwLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.writer_active.store(false, Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn readers_share_writers_exclude() {
        let lock = SpinRwLock::new();
        let value = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let _guard = lock.write();
                        // no torn increments under the write lock
                        let v = value.load(Relaxed);
                        value.store(v + 1, Relaxed);
                    }
                });
            }
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let _guard = lock.read();
                        let _ = value.load(Relaxed);
                    }
                });
            }
        });

        assert_eq!(value.load(Relaxed), 4000);
    }
}
