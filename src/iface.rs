// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-interface state: identity, join status, deferred-work handles and
//! the AP-mode peer link table.

use crate::cqm::{CqmConfig, LinkMonitor};
use crate::device::{Channel, KeyDescriptor};
use crate::power::PowerMode;
use crate::sink::RssiClass;
use crate::timer::EventId;

pub type IfaceId = usize;

/// Interface slots the firmware exposes on one device.
pub const MAX_IFACES: usize = 4;
/// Peer link IDs available to an access-point interface. Link ID 0 is the
/// AP itself and never allocated to a peer.
pub const MAX_AP_LINKS: usize = 8;

/// What an interface is currently doing on air. The declaration order is
/// a capability ordering: everything below `Station` is "not joined".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JoinStatus {
    /// Idle; no firmware presence beyond the MAC address.
    Passive,
    /// Off-channel listening presence (device discovery).
    Monitor,
    /// Associated to a BSS as a client.
    Station,
    /// Operating a BSS.
    AccessPoint,
}

/// Fixed role assigned when the interface is added. Listen-mode presence
/// is a capability of the role, not of a magic slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfaceRole {
    Station,
    AccessPoint,
    /// Peer-to-peer device: may enter `Monitor`, skips loss confirmation.
    P2pDevice,
}

/// Peer link-ID table for AP mode. IDs are 1-based; bit `n` of a firmware
/// inactivity map addresses link ID `n`.
#[derive(Debug, Default)]
pub struct ApLinks {
    slots: [Option<[u8; 6]>; MAX_AP_LINKS],
}

impl ApLinks {
    /// Maps a peer to a free link ID, or returns the ID it already holds.
    pub fn map(&mut self, mac: [u8; 6]) -> Option<u8> {
        if let Some(id) = self.id_of(&mac) {
            return Some(id);
        }
        let idx = self.slots.iter().position(|s| s.is_none())?;
        self.slots[idx] = Some(mac);
        Some(idx as u8 + 1)
    }

    pub fn unmap(&mut self, link_id: u8) -> Option<[u8; 6]> {
        let idx = usize::from(link_id).checked_sub(1)?;
        self.slots.get_mut(idx)?.take()
    }

    pub fn mac_of(&self, link_id: u8) -> Option<[u8; 6]> {
        let idx = usize::from(link_id).checked_sub(1)?;
        *self.slots.get(idx)?
    }

    pub fn id_of(&self, mac: &[u8; 6]) -> Option<u8> {
        self.slots.iter().position(|s| s.as_ref() == Some(mac)).map(|idx| idx as u8 + 1)
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}

/// All mutable state of one interface slot. Owned by the link manager:
/// access is serialized by `&mut` ownership, not by per-field locking.
pub struct InterfaceContext {
    pub id: IfaceId,
    pub mac: [u8; 6],
    pub role: IfaceRole,
    pub join_status: JoinStatus,
    pub bssid: Option<[u8; 6]>,
    pub channel: Option<Channel>,
    pub monitor: LinkMonitor,

    /// Mode requested by the user; re-applied after error recovery.
    pub user_power: PowerMode,
    /// Last mode actually pushed to firmware; identical requests are
    /// absorbed without a command.
    pub committed_power: Option<PowerMode>,
    pub uapsd_active: bool,

    /// The peer negotiated high-throughput support; aggregation is only
    /// worth considering while some joined interface has this set.
    pub ht_capable: bool,

    /// Set while joined so RSSI sampling works; restored on unjoin.
    pub beacon_filter_disabled: bool,

    /// Side of the RSSI threshold the last sample landed on; crossings are
    /// reported, repeats are not.
    pub last_rssi_class: Option<RssiClass>,

    pub join_timeout: Option<EventId>,
    pub bss_loss_check: Option<EventId>,
    pub connection_loss: Option<EventId>,

    /// An unjoin arrived while a scan held the gate; honored on scan
    /// completion.
    pub delayed_unjoin: bool,

    /// Frame that triggered an on-demand join; requeued once the join
    /// lands, dropped if it fails.
    pub pending_frame: Option<Vec<u8>>,

    /// Keys installed on this interface, by slot, for teardown.
    pub keys: Vec<KeyDescriptor>,

    pub links: ApLinks,
}

impl InterfaceContext {
    pub fn new(id: IfaceId, mac: [u8; 6], role: IfaceRole, cqm: CqmConfig) -> Self {
        Self {
            id,
            mac,
            role,
            join_status: JoinStatus::Passive,
            bssid: None,
            channel: None,
            monitor: LinkMonitor::new(cqm),
            user_power: PowerMode::active(),
            committed_power: None,
            uapsd_active: false,
            ht_capable: false,
            beacon_filter_disabled: false,
            last_rssi_class: None,
            join_timeout: None,
            bss_loss_check: None,
            connection_loss: None,
            delayed_unjoin: false,
            pending_frame: None,
            keys: Vec::new(),
            links: ApLinks::default(),
        }
    }

    pub fn is_joined(&self) -> bool {
        self.join_status >= JoinStatus::Station
    }

    pub fn is_p2p(&self) -> bool {
        self.role == IfaceRole::P2pDevice
    }

    /// Back to `Passive` after an unjoin or failed join. Keys survive; they
    /// are scoped to the interface, not to one association.
    pub fn reset_link_state(&mut self) {
        self.join_status = JoinStatus::Passive;
        self.bssid = None;
        self.channel = None;
        self.monitor.reset();
        self.uapsd_active = false;
        self.ht_capable = false;
        self.beacon_filter_disabled = false;
        self.last_rssi_class = None;
        self.delayed_unjoin = false;
        self.pending_frame = None;
        self.links.clear();
    }
}
