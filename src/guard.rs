//! Duplicate-request suppression.
//!
//! Sighting fetches use a per-endpoint in-flight flag: a fire-and-forget
//! fetch that finds the flag set does nothing. Species metadata requests are
//! coalesced: a request for a species that is already being scraped joins the
//! running request and receives the same result.

use crate::error::Result;
use crate::record::AssetMetadata;
use futures::future::{BoxFuture, Shared};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// At-most-one flag for a class of operation.
#[derive(Debug, Default)]
pub struct InFlightFlag {
    busy: AtomicBool,
}

impl InFlightFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag, or return `None` if it is already set.
    ///
    /// The flag is cleared when the returned guard is dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                flag: Arc::clone(self),
            })
    }

    pub fn is_set(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard {
    flag: Arc<InFlightFlag>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}

/// A metadata scrape that any number of callers can await.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Vec<AssetMetadata>>>>;

/// Outcome of asking to scrape a species.
pub enum Claim {
    /// A scrape for this species is running; await it.
    Joined(SharedFetch),
    /// This caller started the scrape and must make sure it is driven.
    Started(SharedFetch),
    /// Scraped before and not forgotten since; nothing to do.
    AlreadyAttempted,
}

#[derive(Default)]
struct RequestState {
    in_flight: HashMap<String, (u64, SharedFetch)>,
    attempted: HashSet<String>,
    next_ticket: u64,
}

/// In-flight and historical species metadata requests, keyed by species code.
#[derive(Default)]
pub struct MetadataRequests {
    state: Mutex<RequestState>,
}

impl MetadataRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the running request for `species_code`, or start one with `start`.
    ///
    /// `start` receives the ticket to hand back to [`finish`](Self::finish).
    pub fn claim<F>(&self, species_code: &str, start: F) -> Claim
    where
        F: FnOnce(u64) -> BoxFuture<'static, Result<Vec<AssetMetadata>>>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some((_, fetch)) = state.in_flight.get(species_code) {
            debug!("Joining in-flight metadata request for {}", species_code);
            return Claim::Joined(fetch.clone());
        }
        if state.attempted.contains(species_code) {
            debug!("Metadata for {} already requested", species_code);
            return Claim::AlreadyAttempted;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let fetch = futures::FutureExt::shared(start(ticket));
        state
            .in_flight
            .insert(species_code.to_string(), (ticket, fetch.clone()));
        state.attempted.insert(species_code.to_string());
        Claim::Started(fetch)
    }

    /// Expire the in-flight entry started with `ticket`. When `keep_history`
    /// is false the species is also forgotten, so the next request goes out again.
    pub fn finish(&self, species_code: &str, ticket: u64, keep_history: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A reset may have cleared the entry and a newer request taken its place.
        if state
            .in_flight
            .get(species_code)
            .is_some_and(|(current, _)| *current == ticket)
        {
            state.in_flight.remove(species_code);
            if !keep_history {
                state.attempted.remove(species_code);
            }
        }
    }

    pub fn is_in_flight(&self, species_code: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .contains_key(species_code)
    }

    pub fn was_attempted(&self, species_code: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempted
            .contains(species_code)
    }

    /// Forget every in-flight and past request.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.clear();
        state.attempted.clear();
    }
}
