// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! TX gating and queue-drain accounting.
//!
//! The gate is a balanced counter, not a boolean: nested holders each
//! lock/unlock exactly once and TX resumes when the count returns to zero.
//! Unlocking an already-unlocked gate is a diagnosed misuse, tolerated so
//! the forced-unlock stop path cannot wedge a confused caller.

use crate::error::Error;
use crate::iface::{IfaceId, MAX_IFACES};
use log::{error, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Bounded wait for in-flight frames to drain.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TxGate {
    lock_count: AtomicU32,
    pending: Mutex<[usize; MAX_IFACES]>,
    drained: Condvar,
}

impl TxGate {
    pub fn new() -> Self {
        Self { lock_count: AtomicU32::new(0), pending: Mutex::new([0; MAX_IFACES]), drained: Condvar::new() }
    }

    /// Gates TX. Every `lock` must be balanced by exactly one [`TxGate::unlock`].
    pub fn lock(&self) {
        self.lock_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unlock(&self) {
        let prev = self
            .lock_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if prev == 0 {
            warn!("TX gate unlocked while already unlocked");
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count.load(Ordering::Acquire) > 0
    }

    /// Resets the gate to unlocked regardless of outstanding holders.
    ///
    /// Only the full-stop recovery path may call this; any holder still in
    /// flight will trip the unlock diagnostic when it finishes.
    pub fn force_reset(&self) {
        if self.lock_count.swap(0, Ordering::AcqRel) != 0 {
            warn!("TX force-unlocked due to stop request");
        }
    }

    /// Accounts one frame queued for `iface`.
    pub fn frame_queued(&self, iface: IfaceId) {
        self.pending.lock()[iface] += 1;
    }

    /// Accounts one frame leaving the queues (sent or dropped below us).
    pub fn frame_completed(&self, iface: IfaceId) {
        let mut pending = self.pending.lock();
        match pending[iface].checked_sub(1) {
            Some(n) => pending[iface] = n,
            None => error!("TX completion for iface {} with no frames outstanding", iface),
        }
        self.drained.notify_all();
    }

    pub fn pending_frames(&self, iface: Option<IfaceId>) -> usize {
        let pending = self.pending.lock();
        match iface {
            Some(id) => pending[id],
            None => pending.iter().sum(),
        }
    }

    /// Waits up to [`FLUSH_TIMEOUT`] for the queues of `iface` (or all
    /// interfaces) to drain. With `drop` set, discards everything queued
    /// immediately instead of waiting.
    pub fn flush(&self, iface: Option<IfaceId>, drop: bool) -> Result<(), Error> {
        let mut pending = self.pending.lock();
        if drop {
            match iface {
                Some(id) => pending[id] = 0,
                None => *pending = [0; MAX_IFACES],
            }
            self.drained.notify_all();
            return Ok(());
        }
        let is_empty = |pending: &[usize; MAX_IFACES]| match iface {
            Some(id) => pending[id] == 0,
            None => pending.iter().all(|n| *n == 0),
        };
        let mut deadline = FLUSH_TIMEOUT;
        while !is_empty(&pending) {
            let start = std::time::Instant::now();
            if self.drained.wait_for(&mut pending, deadline).timed_out() {
                error!("flush timed out with {:?} frames outstanding", *pending);
                return Err(Error::FlushTimeout);
            }
            deadline = deadline.saturating_sub(start.elapsed());
        }
        Ok(())
    }
}

impl Default for TxGate {
    fn default() -> Self {
        Self::new()
    }
}
