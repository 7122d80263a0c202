//! Small synchronization primitives shared by the physics pipeline
//!
//! - [`AtomicF64`] — an `f64` stored as bits in an `AtomicU64`, used for all
//!   particle/black-hole state that is mutated through shared references
//! - [`SpinBarrier`] — a reusable spinning rendezvous for the fixed worker
//!   pool; no blocking syscalls in the hot path

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// An `f64` with relaxed atomic load/store semantics.
///
/// Individual fields are always consistent; consistency *between* fields is
/// provided by the phase barriers, never by this type.
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn swap(&self, value: f64) -> f64 {
        f64::from_bits(self.0.swap(value.to_bits(), Ordering::Relaxed))
    }

    /// Add `delta` without losing concurrent updates.
    pub fn fetch_add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Raise the stored value to `value` if it is larger.
    pub fn fetch_max(&self, value: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if f64::from_bits(current) >= value {
                return;
            }
            match self.0.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Lower the stored value to `value` if it is smaller.
    pub fn fetch_min(&self, value: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            if f64::from_bits(current) <= value {
                return;
            }
            match self.0.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

impl std::fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.load())
    }
}

/// Reusable spinning barrier for a small fixed set of threads.
///
/// The last thread to arrive resets the arrival counter and advances the
/// completion generation; earlier arrivers spin on the generation. Burns CPU
/// while waiting, which is the intended tradeoff for a 2-3 thread pool.
pub struct SpinBarrier {
    threads: usize,
    waiting: AtomicUsize,
    generation: AtomicUsize, // wrapping is fine
}

impl SpinBarrier {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            waiting: AtomicUsize::new(0),
            generation: AtomicUsize::new(0),
        }
    }

    /// Rendezvous with the other threads. Returns `true` for the last
    /// arriver (the "leader" of this generation).
    pub fn wait(&self) -> bool {
        let generation = self.generation.load(Ordering::Acquire);

        if self.waiting.fetch_add(1, Ordering::AcqRel) == self.threads - 1 {
            self.waiting.store(0, Ordering::Release);
            self.generation.fetch_add(1, Ordering::AcqRel);
            true
        } else {
            while self.generation.load(Ordering::Acquire) == generation {
                std::hint::spin_loop();
            }
            false
        }
    }
}
