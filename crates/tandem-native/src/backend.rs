// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Primitive factory.
//!
//! An adapter asks a backend for its native primitive once, at
//! construction, and keeps that instance for life.

use std::sync::{Arc, OnceLock};

use crate::condvar::{NativeCondvar, ParkingLotCondvar};
use crate::mutex::{NativeMutex, ParkingLotMutex, ParkingLotRecursiveMutex};
use crate::semaphore::{NativeSemaphore, ParkingLotSemaphore};

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn mutex(&self, recursive: bool) -> Box<dyn NativeMutex>;

    fn condvar(&self) -> Box<dyn NativeCondvar>;

    fn semaphore(&self, permits: usize) -> Box<dyn NativeSemaphore>;
}

/// Reference binding.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParkingLotBackend;

impl Backend for ParkingLotBackend {
    fn name(&self) -> &'static str {
        "parking_lot"
    }

    fn mutex(&self, recursive: bool) -> Box<dyn NativeMutex> {
        if recursive {
            Box::new(ParkingLotRecursiveMutex::new())
        } else {
            Box::new(ParkingLotMutex::new())
        }
    }

    fn condvar(&self) -> Box<dyn NativeCondvar> {
        Box::new(ParkingLotCondvar::new())
    }

    fn semaphore(&self, permits: usize) -> Box<dyn NativeSemaphore> {
        Box::new(ParkingLotSemaphore::new(permits))
    }
}

/// Process-wide default backend.
pub fn default_backend() -> Arc<dyn Backend> {
    static DEFAULT: OnceLock<Arc<dyn Backend>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(ParkingLotBackend)).clone()
}
