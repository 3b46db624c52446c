// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Exclusive-access gate shared with the scan collaborator.
//!
//! The scanner holds this gate across entire scan operations, which can be
//! long. Lock order: the scan gate is always acquired BEFORE exclusive
//! access to the link manager; operations that cannot afford to wait probe
//! it with [`ScanAccess::try_acquire`] and defer their work instead.

use log::warn;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ScanAccess {
    held: Mutex<bool>,
    released: Condvar,
    in_progress: AtomicBool,
}

impl ScanAccess {
    pub fn new() -> Self {
        Self { held: Mutex::new(false), released: Condvar::new(), in_progress: AtomicBool::new(false) }
    }

    /// Blocks until the gate is free, then takes it.
    pub fn acquire(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
    }

    /// Takes the gate if it is free right now.
    pub fn try_acquire(&self) -> bool {
        let mut held = self.held.lock();
        if *held {
            false
        } else {
            *held = true;
            true
        }
    }

    pub fn release(&self) {
        let mut held = self.held.lock();
        if !*held {
            warn!("scan gate released while not held");
        }
        *held = false;
        self.released.notify_one();
    }

    /// Whether an actual scan is running. Distinct from gate ownership:
    /// teardown paths hold the gate without scanning.
    pub fn scan_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn set_scan_in_progress(&self, value: bool) {
        self.in_progress.store(value, Ordering::Release);
    }
}

impl Default for ScanAccess {
    fn default() -> Self {
        Self::new()
    }
}
