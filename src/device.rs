// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Contract with the firmware command/response collaborator.
//!
//! The transport (bus, DMA, interrupts) lives below this trait; the link
//! core only sees named commands that succeed or fail. Failures on setup
//! paths abort the in-progress transition; failures on teardown paths are
//! logged and teardown proceeds.

use crate::iface::IfaceId;
use crate::power::PowerMode;
use anyhow::Error;

#[cfg(test)]
pub use test_utils::*;

/// Frequency band of a channel. The firmware wants this alongside the
/// channel number in join and listen requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    TwoGhz,
    FiveGhz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub number: u8,
    pub band: Band,
}

/// Power level requested through `set_operational_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalMode {
    Active,
    Doze,
    /// Radio quiesced; used around join and on every unjoin/reset.
    Quiescent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub bssid: [u8; 6],
    pub channel: Channel,
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub basic_rate_set: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetRequest {
    pub reset_statistics: bool,
}

/// Opaque key material tagged with its cipher suite; derivation happens
/// above this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDescriptor {
    pub slot: usize,
    pub cipher: u8,
    pub peer: Option<[u8; 6]>,
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxFilter {
    pub promiscuous: bool,
    pub bssid_only: bool,
    pub probe_responses: bool,
}

/// Off-channel presence parameters for `start_listening`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenRequest {
    pub channel: Channel,
    pub beacon_interval: u16,
    pub dtim_period: u8,
    pub probe_delay: u8,
    pub basic_rate_set: u32,
}

impl ListenRequest {
    pub fn on_channel(channel: Channel) -> Self {
        Self { channel, beacon_interval: 100, dtim_period: 1, probe_delay: 0, basic_rate_set: 0x0F }
    }
}

/// Firmware command surface consumed by the link core.
///
/// One implementation per physical device; interface-scoped commands carry
/// the interface slot explicitly.
pub trait DeviceOps {
    fn join(&mut self, req: &JoinRequest, iface: IfaceId) -> Result<(), Error>;
    fn reset(&mut self, req: &ResetRequest, iface: IfaceId) -> Result<(), Error>;
    fn set_operational_mode(&mut self, mode: OperationalMode, iface: IfaceId) -> Result<(), Error>;
    /// `tx_tid_mask`/`rx_tid_mask` select the traffic classes block-ack is
    /// negotiated for; `iface` of `None` applies to all interfaces.
    fn set_block_ack_policy(
        &mut self,
        tx_tid_mask: u8,
        rx_tid_mask: u8,
        iface: Option<IfaceId>,
    ) -> Result<(), Error>;
    fn set_power_mode(&mut self, mode: PowerMode, iface: IfaceId) -> Result<(), Error>;
    fn add_key(&mut self, key: &KeyDescriptor, iface: IfaceId) -> Result<(), Error>;
    fn remove_key(&mut self, slot: usize, iface: IfaceId) -> Result<(), Error>;
    fn set_rx_filter(&mut self, filter: RxFilter, iface: IfaceId) -> Result<(), Error>;
    fn set_beacon_filter(&mut self, enabled: bool, iface: IfaceId) -> Result<(), Error>;
    /// Arms firmware-side signal sampling around `threshold_dbm`;
    /// `use_raw_rssi` selects signed-RSSI reports over RCPI.
    fn set_signal_threshold(
        &mut self,
        threshold_dbm: i32,
        use_raw_rssi: bool,
        iface: IfaceId,
    ) -> Result<(), Error>;
    fn start_listening(&mut self, req: &ListenRequest, iface: IfaceId) -> Result<(), Error>;
    fn stop_listening(&mut self, iface: IfaceId) -> Result<(), Error>;
}
