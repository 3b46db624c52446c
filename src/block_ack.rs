// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Adaptive block-ack policy.
//!
//! The data path feeds per-frame aggregation accuracy samples into
//! [`BaStats`]; a periodic tick evaluates the running averages and flips
//! the firmware block-ack policy. Enabling is immediate, disabling waits
//! out a few consecutive below-threshold periods so one bad second does
//! not tear down established sessions.

use std::time::Duration;

use parking_lot::Mutex;

/// Evaluation period.
pub const BLOCK_ACK_INTERVAL: Duration = Duration::from_secs(1);
/// Minimum samples per direction before a period is considered at all.
pub const BLOCK_ACK_MIN_SAMPLES: u32 = 30;
/// Mean accuracy, in tenths of a percent, required to keep aggregation on.
pub const BLOCK_ACK_ACCURACY_THRESHOLD: u32 = 800;
/// Below-threshold periods tolerated before aggregation is switched off.
pub const BLOCK_ACK_HISTORY: u32 = 3;

/// Per-period aggregation counters, shared with the data path.
#[derive(Debug, Default)]
struct Counters {
    tx_samples: u32,
    tx_accuracy: u64,
    rx_samples: u32,
    rx_accuracy: u64,
}

#[derive(Debug, Default)]
pub struct BaStats {
    counters: Mutex<Counters>,
}

impl BaStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one transmitted aggregate; `accuracy` is the per-frame
    /// delivery ratio in tenths of a percent (0..=1000).
    pub fn record_tx(&self, accuracy: u32) {
        let mut c = self.counters.lock();
        c.tx_samples += 1;
        c.tx_accuracy += u64::from(accuracy);
    }

    pub fn record_rx(&self, accuracy: u32) {
        let mut c = self.counters.lock();
        c.rx_samples += 1;
        c.rx_accuracy += u64::from(accuracy);
    }

    /// Takes and clears the period counters.
    fn drain(&self) -> Counters {
        std::mem::take(&mut *self.counters.lock())
    }

    pub fn clear(&self) {
        self.drain();
    }
}

impl Counters {
    /// The TX sample minimum is the outer gate: without enough transmit
    /// activity the period carries no signal, no matter how the receive
    /// side looks.
    fn wants_aggregation(&self) -> bool {
        if self.tx_samples < BLOCK_ACK_MIN_SAMPLES {
            return false;
        }
        let ratio_ok = |samples: u32, accuracy: u64| {
            accuracy / u64::from(samples) >= u64::from(BLOCK_ACK_ACCURACY_THRESHOLD)
        };
        ratio_ok(self.tx_samples, self.tx_accuracy)
            || (self.rx_samples >= BLOCK_ACK_MIN_SAMPLES
                && ratio_ok(self.rx_samples, self.rx_accuracy))
    }
}

/// Periodic decision logic over [`BaStats`].
#[derive(Debug, Default)]
pub struct BaController {
    enabled: bool,
    below_threshold_periods: u32,
}

impl BaController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Forces the policy state, e.g. after an unjoin reset the policy is
    /// known to be off.
    pub fn reset(&mut self, stats: &BaStats) {
        self.enabled = false;
        self.below_threshold_periods = 0;
        stats.clear();
    }

    /// One evaluation tick. Returns `Some(enable)` when the firmware
    /// policy must change, `None` otherwise. A scan in progress skews the
    /// counters, so the period is discarded without a decision.
    pub fn on_interval(&mut self, stats: &BaStats, scan_in_progress: bool) -> Option<bool> {
        let counters = stats.drain();
        if scan_in_progress {
            return None;
        }
        let wanted = counters.wants_aggregation();
        if wanted == self.enabled {
            self.below_threshold_periods = self.below_threshold_periods.saturating_sub(1);
            return None;
        }
        if wanted {
            self.below_threshold_periods = 0;
            self.enabled = true;
            return Some(true);
        }
        self.below_threshold_periods += 1;
        if self.below_threshold_periods >= BLOCK_ACK_HISTORY {
            self.below_threshold_periods = 0;
            self.enabled = false;
            return Some(false);
        }
        None
    }
}
