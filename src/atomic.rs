// src/atomic.rs

//! Lock-per-cell mutable values shared between concurrent executions.
//!
//! Each cell owns its own mutex, so two work nodes never contend on the same
//! lock unless they touch the same attribute. There is deliberately no
//! graph-wide lock anywhere in the scheduler.

use std::fmt;

use parking_lot::Mutex;

/// Integer cell with atomic get/set/increment/decrement.
#[derive(Default)]
pub struct AtomicInt {
    value: Mutex<i64>,
}

impl AtomicInt {
    pub fn new(value: i64) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn get(&self) -> i64 {
        *self.value.lock()
    }

    pub fn set(&self, value: i64) {
        *self.value.lock() = value;
    }

    /// Increment and return the new value.
    pub fn increment(&self) -> i64 {
        let mut guard = self.value.lock();
        *guard += 1;
        *guard
    }

    /// Decrement and return the new value.
    ///
    /// Returns `None` (leaving the cell untouched) if the value is already
    /// zero or below; counters built on this cell never go negative.
    pub fn decrement(&self) -> Option<i64> {
        let mut guard = self.value.lock();
        if *guard <= 0 {
            return None;
        }
        *guard -= 1;
        Some(*guard)
    }

    /// Set to `new` only if the current value equals `current`.
    ///
    /// Returns `true` if the swap happened.
    pub fn compare_and_set(&self, current: i64, new: i64) -> bool {
        let mut guard = self.value.lock();
        if *guard == current {
            *guard = new;
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for AtomicInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicInt").field(&self.get()).finish()
    }
}

/// String cell with atomic get/set/append.
#[derive(Default)]
pub struct AtomicString {
    value: Mutex<String>,
}

impl AtomicString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(value.into()),
        }
    }

    pub fn get(&self) -> String {
        self.value.lock().clone()
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.value.lock() = value.into();
    }

    /// Append `value`, separated by `"; "` when the cell is not empty.
    pub fn append(&self, value: &str) {
        let mut guard = self.value.lock();
        if !guard.is_empty() {
            guard.push_str("; ");
        }
        guard.push_str(value);
    }

    pub fn is_empty(&self) -> bool {
        self.value.lock().is_empty()
    }
}

impl fmt::Debug for AtomicString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicString").field(&self.get()).finish()
    }
}
