//! Source of the fallback coordinate used when a fetch is retried.

use crate::request::Coordinate;
use std::sync::{Mutex, PoisonError};

pub trait LocationProvider: Send + Sync + 'static {
    /// The device's last known position, if there is one.
    fn last_known(&self) -> Option<Coordinate>;
}

/// No location service; retries reuse the original coordinate.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn last_known(&self) -> Option<Coordinate> {
        None
    }
}

/// A location that can be updated from outside, e.g. by a GPS callback.
#[derive(Debug, Default)]
pub struct FixedLocation {
    current: Mutex<Option<Coordinate>>,
}

impl FixedLocation {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            current: Mutex::new(Some(coordinate)),
        }
    }

    pub fn set(&self, coordinate: Coordinate) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(coordinate);
    }
}

impl LocationProvider for FixedLocation {
    fn last_known(&self) -> Option<Coordinate> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Coordinate to use for a retry: the last known location, else the original.
pub fn fallback_coordinate<L: LocationProvider + ?Sized>(
    provider: &L,
    original: Coordinate,
) -> Coordinate {
    provider
        .last_known()
        .filter(Coordinate::is_finite)
        .unwrap_or(original)
}
