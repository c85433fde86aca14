// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Timeout handling for blocking channel operations.
//!
//! A `Wait` is what the caller asks for; a `Deadline` is that request pinned to
//! an absolute instant when the operation starts, so multi-step transfers share
//! one budget instead of restarting the timer on every partial read.
//!
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (host)

use std::time::{Duration, Instant};

use parking_lot::{Condvar, MutexGuard};

use crate::Error;

/// Wait policy applied to blocking operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Wait {
    /// Block until completion or until the channel closes.
    #[default]
    Blocking,
    /// Fail with `WouldBlock` when no progress is possible.
    NonBlocking,
    /// Block for at most the given duration, then fail with `Timeout`.
    Timeout(Duration),
}

impl Wait {
    /// Maps the integer millisecond convention onto a wait policy.
    ///
    /// `0` attempts once without blocking and `u32::MAX` blocks forever.
    pub const fn from_millis(timeout_ms: u32) -> Self {
        match timeout_ms {
            u32::MAX => Self::Blocking,
            ms => Self::Timeout(Duration::from_millis(ms as u64)),
        }
    }

    /// Returns true when the operation must not wait at all.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Returns the optional timeout associated with the wait policy.
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            _ => None,
        }
    }
}

/// Absolute expiry derived from a [`Wait`].
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    wait: Wait,
    at: Option<Instant>,
}

impl Deadline {
    /// Pins `wait` to the current instant.
    pub fn new(wait: Wait) -> Self {
        let now = Instant::now();
        let at = match wait {
            Wait::Blocking => None,
            Wait::NonBlocking => Some(now),
            // An unrepresentable instant is as good as forever.
            Wait::Timeout(duration) => now.checked_add(duration),
        };
        Self { wait, at }
    }

    /// Deadline that never expires.
    pub fn never() -> Self {
        Self::new(Wait::Blocking)
    }

    /// Wait policy the deadline was built from.
    pub fn wait(&self) -> Wait {
        self.wait
    }

    /// Returns true once the deadline has passed.
    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry; `None` for blocking deadlines.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Error reported when the deadline expires without progress.
    pub fn expiry_error(&self) -> Error {
        if self.wait.is_non_blocking() {
            Error::WouldBlock
        } else {
            Error::Timeout
        }
    }

    /// Parks on `cond` until notified or until the deadline.
    ///
    /// Returns false without waiting when the deadline already passed; callers
    /// re-check their condition after every `true`.
    pub fn wait_on<T>(&self, cond: &Condvar, guard: &mut MutexGuard<'_, T>) -> bool {
        match self.at {
            None => {
                cond.wait(guard);
                true
            }
            Some(at) if Instant::now() >= at => false,
            Some(at) => {
                let _ = cond.wait_until(guard, at);
                true
            }
        }
    }
}
