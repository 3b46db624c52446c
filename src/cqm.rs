// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Connection quality monitoring: beacon-loss confirmation and signal
//! threshold tracking.
//!
//! A `BssLost` indication opens a short confirmation window instead of
//! reporting immediately; RX activity observed inside the window demands
//! one more confirmation round, and a `BssRegained` at any point declares
//! the link healthy. Only once the window closes unanswered does the
//! monitor hand a connection-loss deadline back to the caller.

use std::time::Duration;

/// Confirmation delay once a loss is signalled and the scan gate is free.
pub const LOSS_CONFIRM_DELAY: Duration = Duration::from_millis(100);
/// Watchdog used when a scan holds the gate; scan completion normally
/// re-arms the short delay well before this fires.
pub const LOSS_SCAN_WATCHDOG: Duration = Duration::from_secs(10);
/// Extra grace once RX activity demanded a second confirmation round.
pub const LOSS_CONFIRMED_GRACE: Duration = Duration::from_secs(1);

pub const DEFAULT_LINK_LOSS_BEACONS: u32 = 40;
pub const DEFAULT_BEACON_LOSS_BEACONS: u32 = 20;

/// Where the monitor stands in one loss-confirmation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BssLossStatus {
    /// Link healthy, nothing pending.
    None,
    /// Loss signalled, confirmation window open.
    Checking,
    /// RX activity seen during the window; one more round required.
    Confirming,
    /// Second window elapsed; next check fires the report path.
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CqmConfig {
    /// Beacons missed before firmware declares the link lost outright.
    pub link_loss_beacons: u32,
    /// Beacons missed before the loss report is raised to the stack.
    pub beacon_loss_beacons: u32,
    pub rssi_threshold_dbm: i32,
    /// Firmware reports raw signed RSSI instead of RCPI.
    pub use_raw_rssi: bool,
}

impl Default for CqmConfig {
    fn default() -> Self {
        Self {
            link_loss_beacons: DEFAULT_LINK_LOSS_BEACONS,
            beacon_loss_beacons: DEFAULT_BEACON_LOSS_BEACONS,
            rssi_threshold_dbm: -75,
            use_raw_rssi: false,
        }
    }
}

/// What the caller must do after a `BssLost` indication.
#[derive(Debug, PartialEq)]
pub enum LossCheck {
    /// A confirmation cycle is already in flight; ignore the indication.
    AlreadyPending,
    /// Arm the confirmation check after `LOSS_CONFIRM_DELAY`.
    Confirm,
    /// Scan holds the gate: report later, arm the watchdog instead.
    Delayed,
}

/// What the caller must do when the confirmation check fires.
#[derive(Debug, PartialEq)]
pub enum CheckOutcome {
    /// Re-arm the check after `LOSS_CONFIRMED_GRACE`.
    ExtendGrace,
    /// The link recovered while the check was queued; cancel the
    /// connection-loss deadline.
    LinkAlive,
    /// Arm the connection-loss report after `delay`.
    Report { delay: Duration },
}

#[derive(Debug)]
pub struct LinkMonitor {
    status: BssLossStatus,
    delayed_report: bool,
    config: CqmConfig,
}

impl LinkMonitor {
    pub fn new(config: CqmConfig) -> Self {
        Self { status: BssLossStatus::None, delayed_report: false, config }
    }

    pub fn status(&self) -> BssLossStatus {
        self.status
    }

    pub fn config(&self) -> &CqmConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut CqmConfig {
        &mut self.config
    }

    /// Loss indication from firmware. At most one confirmation cycle is
    /// ever in flight per interface.
    pub fn on_bss_lost(&mut self, scan_gate_free: bool) -> LossCheck {
        if self.status > BssLossStatus::None {
            return LossCheck::AlreadyPending;
        }
        self.status = BssLossStatus::Checking;
        if scan_gate_free {
            self.delayed_report = false;
            LossCheck::Confirm
        } else {
            self.delayed_report = true;
            LossCheck::Delayed
        }
    }

    /// RX-path hint: traffic arrived while a check is open, so demand one
    /// more confirmation round before reporting.
    pub fn note_rx_activity(&mut self) {
        if self.status == BssLossStatus::Checking {
            self.status = BssLossStatus::Confirming;
        }
    }

    /// The confirmation check fired. Peer-to-peer links skip the entire
    /// confirmation dance and report at once.
    pub fn on_check_fired(&mut self, p2p: bool) -> CheckOutcome {
        if !p2p {
            match self.status {
                BssLossStatus::Confirming => {
                    self.status = BssLossStatus::Confirmed;
                    return CheckOutcome::ExtendGrace;
                }
                BssLossStatus::None => return CheckOutcome::LinkAlive,
                // Checking: the window closed unanswered. Confirmed: the
                // grace round elapsed. Both report.
                BssLossStatus::Checking | BssLossStatus::Confirmed => {}
            }
        }
        self.status = BssLossStatus::None;
        CheckOutcome::Report { delay: self.report_delay() }
    }

    /// Beacons resumed; kill the cycle unconditionally. The caller cancels
    /// both pending timers.
    pub fn on_regained(&mut self) {
        self.status = BssLossStatus::None;
        self.delayed_report = false;
    }

    /// Resets to defaults on unjoin/teardown, keeping the configuration.
    pub fn reset(&mut self) {
        self.status = BssLossStatus::None;
        self.delayed_report = false;
    }

    /// Consumes the "loss report delayed by scan" flag.
    pub fn take_delayed_report(&mut self) -> bool {
        std::mem::replace(&mut self.delayed_report, false)
    }

    /// Delay until the loss is reported: the margin between the firmware
    /// link-loss threshold and the host report threshold, in tenths of a
    /// second, never negative. A zero beacon-loss threshold reports
    /// immediately.
    fn report_delay(&self) -> Duration {
        if self.config.beacon_loss_beacons == 0 {
            return Duration::ZERO;
        }
        let beacons = self.config.link_loss_beacons.saturating_sub(self.config.beacon_loss_beacons);
        Duration::from_millis(u64::from(beacons) * 100)
    }
}

/// Converts one firmware signal sample to dBm. RCPI is unsigned Q7.1:
/// `rssi = rcpi / 2 - 110`; RSSI mode passes the sample through signed.
pub fn signal_dbm(raw: u8, use_raw_rssi: bool) -> i32 {
    if use_raw_rssi {
        i32::from(raw as i8)
    } else {
        i32::from(raw) / 2 - 110
    }
}
