// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Link-management core for a FullMAC WLAN driver.
//!
//! This crate owns the per-interface connection lifecycle of one device:
//! the join/unjoin state machine, beacon-loss confirmation and
//! connection-loss reporting, dispatch of asynchronous firmware events,
//! adaptive block-ack policy, and the TX-gating, scan-access and key-slot
//! coordination those transitions need.
//!
//! The driver's transport layer implements [`device::DeviceOps`] and a
//! [`timer::Scheduler`]; the bottom half and data path feed the queues
//! reachable through [`station::Shared`]. All state transitions run
//! through a single [`station::LinkManager`], whose `&mut` methods
//! serialize them, and confirmed losses, threshold crossings and injected
//! frames come back out on a [`sink::MacEvent`] stream.

pub mod block_ack;
pub mod cqm;
pub mod device;
pub mod error;
pub mod events;
pub mod frames;
pub mod gate;
pub mod iface;
pub mod keys;
pub mod power;
pub mod scan;
pub mod sink;
pub mod station;
pub mod timer;

pub use error::Error;
pub use station::{LinkManager, Shared, TimedEvent};

use cqm::CqmConfig;
use iface::MAX_IFACES;

/// Device-wide tunables fixed at manager construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Hardware address table. An interface add must name one of these
    /// addresses and lands in the matching slot.
    pub addresses: [[u8; 6]; MAX_IFACES],
    /// Connection-quality-monitoring defaults applied to new interfaces.
    pub cqm: CqmConfig,
    /// Traffic classes block-ack is negotiated for when the controller
    /// enables aggregation.
    pub ba_tx_tid_mask: u8,
    pub ba_rx_tid_mask: u8,
}

impl Default for Config {
    fn default() -> Self {
        // Locally administered addresses, one per slot; real deployments
        // overwrite these with the addresses fused into the device.
        let mut addresses = [[0u8; 6]; MAX_IFACES];
        for (n, addr) in addresses.iter_mut().enumerate() {
            *addr = [0x02, 0, 0, 0, 0, n as u8];
        }
        Self { addresses, cqm: CqmConfig::default(), ba_tx_tid_mask: 0x3F, ba_rx_tid_mask: 0x3F }
    }
}
