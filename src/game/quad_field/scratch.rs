//! Per-thread reusable buffers for spatial queries.
//!
//! Queries run concurrently from the parallel movement phases, so each worker
//! thread keeps its own small stack of buffers per buffer type. A buffer is
//! handed out as a [`Scratch`] guard and goes back to its thread's stack when
//! the guard drops, which makes acquire/release pairing structural.

use bevy::prelude::*;
use rustc_hash::FxHashSet;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Concurrent users per buffer type on one thread. Queries nest at most a few
/// deep (quads -> seen-marks -> results, held by a caller holding another result).
pub const SLOTS_PER_THREAD: usize = 8;

pub struct SlotStack<T> {
    free: Vec<T>,
    in_use: usize,
    overflowed: usize,
}

impl<T> SlotStack<T> {
    const fn new() -> Self {
        Self { free: Vec::new(), in_use: 0, overflowed: 0 }
    }
}

/// A buffer type that can live in the pool.
pub trait Pooled: Default + Sized + 'static {
    fn reset(&mut self);
    fn with_slots<R>(f: impl FnOnce(&mut SlotStack<Self>) -> R) -> R;
}

macro_rules! pooled_buffer {
    ($ty:ty, $slot:ident) => {
        thread_local! {
            static $slot: RefCell<SlotStack<$ty>> = const { RefCell::new(SlotStack::new()) };
        }

        impl Pooled for $ty {
            fn reset(&mut self) {
                self.clear();
            }

            fn with_slots<R>(f: impl FnOnce(&mut SlotStack<Self>) -> R) -> R {
                $slot.with(|slots| f(&mut slots.borrow_mut()))
            }
        }
    };
}

pooled_buffer!(Vec<usize>, QUAD_INDEX_SLOTS);
pooled_buffer!(Vec<Entity>, ENTITY_SLOTS);
pooled_buffer!(FxHashSet<Entity>, MARK_SLOTS);

/// Scoped buffer lease. Dereferences to the buffer; returns it on drop.
pub struct Scratch<T: Pooled> {
    buf: T,
    pooled: bool,
}

impl<T: Pooled> Scratch<T> {
    /// Leases an empty buffer from the current thread's pool.
    pub fn acquire() -> Self {
        T::with_slots(|slots| {
            if slots.in_use >= SLOTS_PER_THREAD {
                debug_assert!(false, "query scratch pool exhausted ({} leases)", slots.in_use);
                slots.overflowed += 1;
                if slots.overflowed == 1 {
                    warn!("[QUAD] scratch pool exhausted on this thread, allocating unpooled buffer");
                }
                return Self { buf: T::default(), pooled: false };
            }
            slots.in_use += 1;
            let buf = slots.free.pop().unwrap_or_default();
            Self { buf, pooled: true }
        })
    }

    /// Returns the buffer early. Equivalent to dropping the guard.
    pub fn release(self) {}

    /// Moves the contents out, still returning the (now empty) buffer to the pool.
    pub fn take(mut self) -> T {
        std::mem::take(&mut self.buf)
    }
}

impl<T: Pooled> Deref for Scratch<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.buf
    }
}

impl<T: Pooled> DerefMut for Scratch<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.buf
    }
}

impl<T: Pooled> Drop for Scratch<T> {
    fn drop(&mut self) {
        if !self.pooled {
            return;
        }
        let mut buf = std::mem::take(&mut self.buf);
        buf.reset();
        T::with_slots(|slots| {
            slots.in_use = slots.in_use.saturating_sub(1);
            slots.free.push(buf);
        });
    }
}

/// Pool-wide helpers.
pub struct QueryScratchPool;

impl QueryScratchPool {
    /// Leases currently outstanding for `T` on the calling thread.
    pub fn in_use<T: Pooled>() -> usize {
        T::with_slots(|slots| slots.in_use)
    }

    /// Buffers of type `T` parked on the calling thread.
    pub fn parked<T: Pooled>() -> usize {
        T::with_slots(|slots| slots.free.len())
    }
}
