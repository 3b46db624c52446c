// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The link manager: owns every interface slot and serializes all
//! link-state transitions.
//!
//! There is exactly one `LinkManager` per device and all its methods take
//! `&mut self`, so join/unjoin, timeout delivery and event dispatch never
//! race each other. The pieces shared with the interrupt-adjacent bottom
//! half and the scan collaborator live in [`Shared`] behind their own
//! short-held locks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::format_err;
use futures::channel::mpsc::{self, UnboundedReceiver};
use log::{debug, error, info, warn};

use crate::block_ack::{BaController, BaStats, BLOCK_ACK_INTERVAL};
use crate::cqm::{self, CheckOutcome, LossCheck};
use crate::device::{
    DeviceOps, JoinRequest, KeyDescriptor, ListenRequest, OperationalMode, ResetRequest, RxFilter,
};
use crate::error::Error;
use crate::events::{EventKind, EventQueue, EventRecord};
use crate::frames::{deauth_frame, REASON_DEAUTH_LEAVING};
use crate::gate::TxGate;
use crate::iface::{
    IfaceId, IfaceRole, InterfaceContext, JoinStatus, MAX_AP_LINKS, MAX_IFACES,
};
use crate::keys::KeySlotPool;
use crate::power::{PowerMode, PsMode};
use crate::scan::ScanAccess;
use crate::sink::{MacEvent, MacSink, RssiClass};
use crate::timer::{EventId, Scheduler, Timer};
use crate::Config;

/// No traffic from the BSS within this window after a successful join
/// means the join is considered failed and torn down.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout payloads dispatched back into the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEvent {
    JoinTimeout(IfaceId),
    BssLossCheck(IfaceId),
    ConnectionLoss(IfaceId),
    BlockAckInterval,
}

/// State reachable without exclusive manager access: the firmware event
/// queue fed from the bottom half, TX gating, block-ack counters from the
/// data path, and the scan gate.
pub struct Shared {
    pub events: EventQueue,
    pub tx_gate: TxGate,
    pub scan: ScanAccess,
    pub ba_stats: BaStats,
}

impl Shared {
    fn new() -> Self {
        Self {
            events: EventQueue::new(),
            tx_gate: TxGate::new(),
            scan: ScanAccess::new(),
            ba_stats: BaStats::new(),
        }
    }
}

pub struct LinkManager<D> {
    device: D,
    timer: Timer<TimedEvent>,
    mac_sink: MacSink,
    shared: Arc<Shared>,
    ifaces: [Option<InterfaceContext>; MAX_IFACES],
    key_pool: KeySlotPool,
    ba: BaController,
    /// Some joined interface negotiated high-throughput support; while
    /// false the block-ack controller is throttled to legacy behavior.
    ht_allowed: bool,
    config: Config,
    running: bool,
}

impl<D: DeviceOps> LinkManager<D> {
    /// Returns the manager and the stream of [`MacEvent`]s it raises to
    /// the MAC-management stack.
    pub fn new(
        device: D,
        scheduler: Box<dyn Scheduler + Send>,
        config: Config,
    ) -> (Self, UnboundedReceiver<MacEvent>) {
        let (sink, stream) = mpsc::unbounded();
        let manager = Self {
            device,
            timer: Timer::new(scheduler),
            mac_sink: MacSink::new(sink),
            shared: Arc::new(Shared::new()),
            ifaces: Default::default(),
            key_pool: KeySlotPool::new(),
            ba: BaController::new(),
            ht_allowed: false,
            config,
            running: false,
        };
        (manager, stream)
    }

    /// Handle for the bottom half, data path and scanner.
    pub fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.timer.schedule_after(BLOCK_ACK_INTERVAL, TimedEvent::BlockAckInterval);
        info!("link manager started");
    }

    /// Full stop: forcibly unblocks TX, drops queued frames and events,
    /// and cancels all deferred work. Interfaces stay registered but fall
    /// back to `Passive`.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.shared.tx_gate.force_reset();
        let _ = self.shared.tx_gate.flush(None, true);
        self.timer.cancel_all();
        self.shared.events.clear(None);
        self.ba.reset(&self.shared.ba_stats);
        for ctx in self.ifaces.iter_mut().flatten() {
            ctx.join_timeout = None;
            ctx.bss_loss_check = None;
            ctx.connection_loss = None;
            ctx.reset_link_state();
            ctx.committed_power = None;
        }
        self.recompute_ht_throttle();
        info!("link manager stopped");
    }

    // Interface lifecycle.

    pub fn add_interface(&mut self, mac: [u8; 6], role: IfaceRole) -> Result<IfaceId, Error> {
        // The slot is fixed by the device's address table, so a second add
        // of the same address lands on its occupied slot and fails.
        let id = self
            .config
            .addresses
            .iter()
            .position(|addr| *addr == mac)
            .filter(|id| self.ifaces[*id].is_none())
            .ok_or(Error::NoFreeIfaceSlot(mac))?;
        self.device
            .set_rx_filter(RxFilter::default(), id)
            .map_err(|e| Error::firmware("set_rx_filter", e))?;
        self.device
            .set_signal_threshold(self.config.cqm.rssi_threshold_dbm, self.config.cqm.use_raw_rssi, id)
            .map_err(|e| Error::firmware("set_signal_threshold", e))?;
        self.ifaces[id] = Some(InterfaceContext::new(id, mac, role, self.config.cqm));
        info!("added iface {} ({:?}) for {:02x?}", id, role, mac);
        Ok(id)
    }

    /// Unregisters an interface. Waits out any running scan, tears down
    /// whatever presence the interface still has, and drops its queued
    /// frames, events and keys.
    pub fn remove_interface(&mut self, iface: IfaceId) -> Result<(), Error> {
        self.ensure_iface(iface)?;
        self.shared.scan.acquire();
        match self.ifaces[iface].as_ref().map(|c| c.join_status) {
            Some(JoinStatus::Monitor) => {
                if let Err(e) = self.disable_listening(iface) {
                    warn!("remove iface {}: stop listening failed: {}", iface, e);
                }
            }
            Some(status) if status >= JoinStatus::Station => self.teardown(iface),
            _ => {}
        }
        self.shared.events.clear(Some(iface));
        let _ = self.shared.tx_gate.flush(Some(iface), true);
        if let Some(mut ctx) = self.ifaces[iface].take() {
            for handle in
                [ctx.join_timeout.take(), ctx.bss_loss_check.take(), ctx.connection_loss.take()]
            {
                if let Some(handle) = handle {
                    self.timer.cancel_event(handle);
                }
            }
            for key in ctx.keys.drain(..) {
                best_effort("remove_key", self.device.remove_key(key.slot, iface));
                if let Err(e) = self.key_pool.release(key.slot) {
                    warn!("remove iface {}: key slot {}: {}", iface, key.slot, e);
                }
            }
            info!("removed iface {} ({:02x?})", iface, ctx.mac);
        }
        if self.ifaces.iter().all(|slot| slot.is_none()) {
            // Last interface gone: nothing can own key material anymore.
            self.key_pool.release_all();
        }
        self.recompute_ht_throttle();
        self.shared.scan.release();
        Ok(())
    }

    // Join handling.

    /// Joins (or, for an access-point role, starts) the BSS described by
    /// `req`. An existing association or listen presence is folded first.
    /// TX is gated for the duration of the firmware handshake; a failure
    /// leaves the interface `Passive`.
    pub fn join(&mut self, iface: IfaceId, req: &JoinRequest) -> Result<(), Error> {
        self.ensure_iface(iface)?;
        self.shared.scan.acquire();
        let result = self.join_locked(iface, req);
        self.shared.scan.release();
        result
    }

    fn join_locked(&mut self, iface: IfaceId, req: &JoinRequest) -> Result<(), Error> {
        let (was_joined, was_monitor) = match &self.ifaces[iface] {
            Some(ctx) => (ctx.is_joined(), ctx.join_status == JoinStatus::Monitor),
            None => return Err(Error::NoSuchIface(iface)),
        };
        if was_joined {
            info!("join on iface {} folds existing association", iface);
            self.teardown(iface);
        } else if was_monitor {
            self.disable_listening(iface)?;
        }
        if let Some(ctx) = &mut self.ifaces[iface] {
            if let Some(handle) = ctx.join_timeout.take() {
                self.timer.cancel_event(handle);
            }
        }

        self.shared.tx_gate.lock();
        let handshake = self.join_handshake(iface, req);
        self.shared.tx_gate.unlock();

        if let Err(e) = handshake {
            warn!("join failed on iface {}: {}", iface, e);
            best_effort("reset", self.device.reset(&ResetRequest { reset_statistics: true }, iface));
            if let Some(ctx) = &mut self.ifaces[iface] {
                ctx.reset_link_state();
            }
            return Err(e);
        }

        self.ba.reset(&self.shared.ba_stats);
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.join_status = match ctx.role {
                IfaceRole::AccessPoint => JoinStatus::AccessPoint,
                IfaceRole::Station | IfaceRole::P2pDevice => JoinStatus::Station,
            };
            ctx.bssid = Some(req.bssid);
            ctx.channel = Some(req.channel);
            ctx.beacon_filter_disabled = true;
            if ctx.pending_frame.take().is_some() {
                self.shared.tx_gate.frame_queued(iface);
            }
            if ctx.join_status == JoinStatus::Station {
                ctx.join_timeout =
                    Some(self.timer.schedule_after(JOIN_TIMEOUT, TimedEvent::JoinTimeout(iface)));
            }
            info!("iface {} now {:?} with {:02x?}", iface, ctx.join_status, req.bssid);
        }
        Ok(())
    }

    fn join_handshake(&mut self, iface: IfaceId, req: &JoinRequest) -> Result<(), Error> {
        self.device
            .set_operational_mode(OperationalMode::Quiescent, iface)
            .map_err(|e| Error::firmware("set_operational_mode", e))?;
        self.device.join(req, iface).map_err(|e| Error::firmware("join", e))?;
        // Beacons must reach the host while joined or signal sampling and
        // loss detection starve.
        self.device
            .set_beacon_filter(false, iface)
            .map_err(|e| Error::firmware("set_beacon_filter", e))?;
        self.device
            .set_rx_filter(RxFilter { bssid_only: true, ..RxFilter::default() }, iface)
            .map_err(|e| Error::firmware("set_rx_filter", e))?;
        // Aggregation stays off until the controller has samples to argue
        // for it.
        self.device
            .set_block_ack_policy(0, 0, None)
            .map_err(|e| Error::firmware("set_block_ack_policy", e))?;
        Ok(())
    }

    /// Leaves the current BSS. A no-op when not joined; deferred until
    /// scan completion when a scan is running.
    pub fn unjoin(&mut self, iface: IfaceId) -> Result<(), Error> {
        let ctx = self
            .ifaces
            .get_mut(iface)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::NoSuchIface(iface))?;
        if !ctx.is_joined() {
            debug!("unjoin on iface {} while not joined", iface);
            return Ok(());
        }
        if self.shared.scan.scan_in_progress() {
            debug!("unjoin on iface {} deferred until scan completion", iface);
            ctx.delayed_unjoin = true;
            return Ok(());
        }
        if ctx.join_status > JoinStatus::Station {
            error!("unjoin on iface {} while operating a BSS", iface);
        }
        self.teardown(iface);
        Ok(())
    }

    /// Best-effort teardown shared by unjoin, failed/expired joins and
    /// interface removal. Firmware failures here are logged, not
    /// propagated; the host-side state is reset regardless.
    fn teardown(&mut self, iface: IfaceId) {
        if let Some(ctx) = &mut self.ifaces[iface] {
            for handle in
                [ctx.join_timeout.take(), ctx.bss_loss_check.take(), ctx.connection_loss.take()]
            {
                if let Some(handle) = handle {
                    self.timer.cancel_event(handle);
                }
            }
        } else {
            return;
        }
        if let Err(e) = self.shared.tx_gate.flush(Some(iface), false) {
            warn!("teardown iface {}: {}; dropping backlog", iface, e);
            let _ = self.shared.tx_gate.flush(Some(iface), true);
        }
        best_effort("reset", self.device.reset(&ResetRequest { reset_statistics: true }, iface));
        best_effort(
            "set_operational_mode",
            self.device.set_operational_mode(OperationalMode::Quiescent, iface),
        );
        best_effort("set_beacon_filter", self.device.set_beacon_filter(true, iface));
        best_effort("set_rx_filter", self.device.set_rx_filter(RxFilter::default(), iface));
        self.ba.reset(&self.shared.ba_stats);
        // TX aggregation stops, but the RX side keeps honoring sessions the
        // peer may still tear down in order.
        best_effort(
            "set_block_ack_policy",
            self.device.set_block_ack_policy(0, self.config.ba_rx_tid_mask, None),
        );
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.reset_link_state();
            ctx.committed_power = None;
        }
        self.recompute_ht_throttle();
    }

    /// Re-derives whether aggregation is worth pursuing from the surviving
    /// interfaces: block-ack stays throttled to legacy behavior until some
    /// joined peer negotiated high-throughput support.
    fn recompute_ht_throttle(&mut self) {
        let allowed = self.ifaces.iter().flatten().any(|c| c.is_joined() && c.ht_capable);
        if allowed == self.ht_allowed {
            return;
        }
        self.ht_allowed = allowed;
        if !allowed && self.ba.enabled() {
            self.apply_ba_policy(false);
            self.ba.reset(&self.shared.ba_stats);
        }
    }

    /// Records the outcome of the peer's high-throughput negotiation,
    /// typically right after association completes.
    pub fn set_ht_capability(&mut self, iface: IfaceId, capable: bool) -> Result<(), Error> {
        self.ifaces
            .get_mut(iface)
            .and_then(|s| s.as_mut())
            .ok_or(Error::NoSuchIface(iface))?
            .ht_capable = capable;
        self.recompute_ht_throttle();
        Ok(())
    }

    /// Pushes a block-ack policy change with TX gated for the duration.
    fn apply_ba_policy(&mut self, enable: bool) {
        let (tx, rx) =
            if enable { (self.config.ba_tx_tid_mask, self.config.ba_rx_tid_mask) } else { (0, 0) };
        info!("block-ack {}", if enable { "enabled" } else { "disabled" });
        self.shared.tx_gate.lock();
        if let Err(e) = self.device.set_block_ack_policy(tx, rx, None) {
            warn!("block-ack policy update failed: {}", e);
        }
        self.shared.tx_gate.unlock();
    }

    /// Registers a frame whose transmission demands an association: if one
    /// exists the frame is accounted to the TX queues at once, otherwise it
    /// is parked and the join in `req` is performed first. A failed join
    /// drops the frame.
    pub fn queue_tx_trigger(
        &mut self,
        iface: IfaceId,
        req: &JoinRequest,
        frame: Vec<u8>,
    ) -> Result<(), Error> {
        let ctx = self
            .ifaces
            .get_mut(iface)
            .and_then(|slot| slot.as_mut())
            .ok_or(Error::NoSuchIface(iface))?;
        if ctx.is_joined() {
            self.shared.tx_gate.frame_queued(iface);
            return Ok(());
        }
        ctx.pending_frame = Some(frame);
        self.join(iface, req)
    }

    /// RX-path hint that traffic from the joined BSS arrived. Confirms a
    /// fresh join and feeds the loss-confirmation state machine.
    pub fn note_rx_activity(&mut self, iface: IfaceId) {
        if let Some(ctx) = self.ifaces.get_mut(iface).and_then(|slot| slot.as_mut()) {
            if let Some(handle) = ctx.join_timeout.take() {
                self.timer.cancel_event(handle);
            }
            ctx.monitor.note_rx_activity();
        }
    }

    // Listening (off-channel presence).

    /// Starts an off-channel listening presence. Only peer-to-peer device
    /// interfaces may listen.
    pub fn enable_listening(
        &mut self,
        iface: IfaceId,
        channel: crate::device::Channel,
    ) -> Result<(), Error> {
        let (role, status) = match self.ifaces.get(iface).and_then(|slot| slot.as_ref()) {
            Some(ctx) => (ctx.role, ctx.join_status),
            None => return Err(Error::NoSuchIface(iface)),
        };
        if role != IfaceRole::P2pDevice {
            return Err(Error::RoleMismatch { iface, role });
        }
        match status {
            JoinStatus::Monitor => return Ok(()),
            JoinStatus::Passive => {}
            _ => {
                return Err(Error::Internal(format_err!(
                    "iface {} is joined; cannot enter listen mode",
                    iface
                )))
            }
        }
        self.device
            .start_listening(&ListenRequest::on_channel(channel), iface)
            .map_err(|e| Error::firmware("start_listening", e))?;
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.join_status = JoinStatus::Monitor;
            ctx.channel = Some(channel);
        }
        Ok(())
    }

    pub fn disable_listening(&mut self, iface: IfaceId) -> Result<(), Error> {
        let status = self
            .ifaces
            .get(iface)
            .and_then(|slot| slot.as_ref())
            .map(|ctx| ctx.join_status)
            .ok_or(Error::NoSuchIface(iface))?;
        if status != JoinStatus::Monitor {
            return Ok(());
        }
        self.device.stop_listening(iface).map_err(|e| Error::firmware("stop_listening", e))?;
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.join_status = JoinStatus::Passive;
            ctx.channel = None;
        }
        Ok(())
    }

    // Keys.

    /// Installs key material and returns the firmware slot it landed in.
    pub fn set_key(
        &mut self,
        iface: IfaceId,
        cipher: u8,
        peer: Option<[u8; 6]>,
        key: Vec<u8>,
    ) -> Result<usize, Error> {
        self.ensure_iface(iface)?;
        let slot = self.key_pool.alloc()?;
        let desc = KeyDescriptor { slot, cipher, peer, key };
        if let Err(e) = self.device.add_key(&desc, iface) {
            // The slot goes back to the pool; nothing reached firmware.
            let _ = self.key_pool.release(slot);
            return Err(Error::firmware("add_key", e));
        }
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.keys.push(desc);
        }
        Ok(slot)
    }

    pub fn remove_key(&mut self, iface: IfaceId, slot: usize) -> Result<(), Error> {
        let ctx = self
            .ifaces
            .get_mut(iface)
            .and_then(|s| s.as_mut())
            .ok_or(Error::NoSuchIface(iface))?;
        let pos = ctx
            .keys
            .iter()
            .position(|k| k.slot == slot)
            .ok_or(Error::InvalidKeySlot(slot))?;
        self.device.remove_key(slot, iface).map_err(|e| Error::firmware("remove_key", e))?;
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.keys.remove(pos);
        }
        self.key_pool.release(slot)?;
        Ok(())
    }

    // Power save.

    pub fn set_power_mode(&mut self, iface: IfaceId, mode: PowerMode) -> Result<(), Error> {
        self.ifaces
            .get_mut(iface)
            .and_then(|s| s.as_mut())
            .ok_or(Error::NoSuchIface(iface))?
            .user_power = mode;
        self.commit_power(iface)
    }

    pub fn set_uapsd(&mut self, iface: IfaceId, active: bool) -> Result<(), Error> {
        self.ifaces
            .get_mut(iface)
            .and_then(|s| s.as_mut())
            .ok_or(Error::NoSuchIface(iface))?
            .uapsd_active = active;
        self.commit_power(iface)
    }

    fn commit_power(&mut self, iface: IfaceId) -> Result<(), Error> {
        let (effective, committed) = match self.ifaces.get(iface).and_then(|s| s.as_ref()) {
            Some(ctx) => (ctx.user_power.effective(ctx.uapsd_active), ctx.committed_power),
            None => return Err(Error::NoSuchIface(iface)),
        };
        if committed == Some(effective) {
            return Ok(());
        }
        self.device
            .set_power_mode(effective, iface)
            .map_err(|e| Error::firmware("set_power_mode", e))?;
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.committed_power = Some(effective);
        }
        Ok(())
    }

    // Configuration surface.

    /// Replaces the interface's RX filtering configuration.
    pub fn configure_rx_filter(&mut self, iface: IfaceId, filter: RxFilter) -> Result<(), Error> {
        self.ensure_iface(iface)?;
        self.device.set_rx_filter(filter, iface).map_err(|e| Error::firmware("set_rx_filter", e))
    }

    /// Replaces the interface's connection-quality thresholds. Takes
    /// effect from the next loss cycle and signal sample.
    pub fn set_cqm_config(
        &mut self,
        iface: IfaceId,
        config: crate::cqm::CqmConfig,
    ) -> Result<(), Error> {
        self.ensure_iface(iface)?;
        self.device
            .set_signal_threshold(config.rssi_threshold_dbm, config.use_raw_rssi, iface)
            .map_err(|e| Error::firmware("set_signal_threshold", e))?;
        if let Some(ctx) = &mut self.ifaces[iface] {
            *ctx.monitor.config_mut() = config;
            ctx.last_rssi_class = None;
        }
        Ok(())
    }

    // AP peer links.

    /// Maps an associated peer to a firmware link ID.
    pub fn map_peer_link(&mut self, iface: IfaceId, mac: [u8; 6]) -> Result<u8, Error> {
        let ctx = self
            .ifaces
            .get_mut(iface)
            .and_then(|s| s.as_mut())
            .ok_or(Error::NoSuchIface(iface))?;
        if ctx.join_status != JoinStatus::AccessPoint {
            return Err(Error::RoleMismatch { iface, role: ctx.role });
        }
        ctx.links
            .map(mac)
            .ok_or_else(|| Error::Internal(format_err!("no free peer link ID on iface {}", iface)))
    }

    pub fn unmap_peer_link(&mut self, iface: IfaceId, link_id: u8) -> Result<(), Error> {
        let ctx = self
            .ifaces
            .get_mut(iface)
            .and_then(|s| s.as_mut())
            .ok_or(Error::NoSuchIface(iface))?;
        if ctx.links.unmap(link_id).is_none() {
            debug!("unmap of unused link {} on iface {}", link_id, iface);
        }
        Ok(())
    }

    // TX drain.

    pub fn flush(&self, iface: Option<IfaceId>, drop_frames: bool) -> Result<(), Error> {
        self.shared.tx_gate.flush(iface, drop_frames)
    }

    // Scan collaboration.

    /// Called once the scanner released the air. Honors unjoins and loss
    /// reports that were deferred while the scan ran.
    pub fn scan_complete(&mut self) {
        self.shared.scan.set_scan_in_progress(false);
        for iface in 0..MAX_IFACES {
            let deferred_unjoin = matches!(&self.ifaces[iface], Some(c) if c.delayed_unjoin);
            if deferred_unjoin {
                if let Err(e) = self.unjoin(iface) {
                    warn!("deferred unjoin of iface {} failed: {}", iface, e);
                }
                continue;
            }
            let rearm = match &mut self.ifaces[iface] {
                Some(ctx) => ctx.monitor.take_delayed_report(),
                None => false,
            };
            if rearm {
                // Swap the scan watchdog for the short confirmation window.
                self.arm_loss_check(iface, cqm::LOSS_CONFIRM_DELAY);
            }
        }
    }

    // Firmware event dispatch.

    /// Detaches and processes the firmware event backlog. Events for
    /// interfaces removed since they were queued are dropped with a
    /// diagnostic.
    pub fn drain_events(&mut self) {
        for record in self.shared.events.detach_all() {
            self.handle_event(record);
        }
    }

    fn handle_event(&mut self, record: EventRecord) {
        let EventRecord { iface, kind } = record;
        if self.ifaces.get(iface).map(|slot| slot.is_none()).unwrap_or(true) {
            debug!("dropping {:?} for removed iface {}", kind, iface);
            return;
        }
        match kind {
            EventKind::Error(code) => error!("firmware error {:#x} on iface {}", code, iface),
            EventKind::BssLost { beacon_miss } => self.on_bss_lost(iface, beacon_miss),
            EventKind::BssRegained => self.on_bss_regained(iface),
            EventKind::Radar => warn!("radar detected on iface {}", iface),
            EventKind::RcpiRssi(raw) => self.on_signal_sample(iface, raw),
            EventKind::Inactivity { link_map } => self.on_inactivity(iface, link_map),
            EventKind::PsModeError => self.on_ps_mode_error(iface),
        }
    }

    fn on_bss_lost(&mut self, iface: IfaceId, beacon_miss: u8) {
        let gate_free = self.shared.scan.try_acquire();
        let check = match &mut self.ifaces[iface] {
            Some(ctx) if ctx.join_status == JoinStatus::Station => {
                ctx.monitor.on_bss_lost(gate_free)
            }
            _ => {
                if gate_free {
                    self.shared.scan.release();
                }
                debug!("BSS-lost on iface {} while not a station", iface);
                return;
            }
        };
        if gate_free {
            self.shared.scan.release();
        }
        debug!("BSS lost on iface {} after {} missed beacons", iface, beacon_miss);
        match check {
            LossCheck::AlreadyPending => {}
            LossCheck::Confirm => self.arm_loss_check(iface, cqm::LOSS_CONFIRM_DELAY),
            LossCheck::Delayed => self.arm_loss_check(iface, cqm::LOSS_SCAN_WATCHDOG),
        }
    }

    fn on_bss_regained(&mut self, iface: IfaceId) {
        let handles = match &mut self.ifaces[iface] {
            Some(ctx) => {
                ctx.monitor.on_regained();
                [ctx.bss_loss_check.take(), ctx.connection_loss.take()]
            }
            None => return,
        };
        for handle in handles {
            if let Some(handle) = handle {
                self.timer.cancel_event(handle);
            }
        }
        debug!("BSS regained on iface {}", iface);
    }

    fn on_signal_sample(&mut self, iface: IfaceId, raw: u8) {
        let sample = match &mut self.ifaces[iface] {
            Some(ctx) => {
                let cfg = *ctx.monitor.config();
                let rssi_dbm = cqm::signal_dbm(raw, cfg.use_raw_rssi);
                // A sample landing exactly on the threshold classes Low.
                let class = if rssi_dbm <= cfg.rssi_threshold_dbm {
                    RssiClass::Low
                } else {
                    RssiClass::High
                };
                let crossed = ctx.last_rssi_class != Some(class);
                ctx.last_rssi_class = Some(class);
                crossed.then(|| (rssi_dbm, class))
            }
            None => None,
        };
        if let Some((rssi_dbm, class)) = sample {
            self.mac_sink.send(MacEvent::RssiThreshold { iface, rssi_dbm, class });
        }
    }

    /// Firmware declared AP peer links inactive: synthesize a
    /// deauthentication for each so the management stack ages the peer
    /// out through its normal RX path, and free the link IDs.
    fn on_inactivity(&mut self, iface: IfaceId, link_map: u32) {
        let mut frames = Vec::new();
        if let Some(ctx) = &mut self.ifaces[iface] {
            if ctx.join_status != JoinStatus::AccessPoint {
                debug!("inactivity map {:#x} on non-AP iface {}", link_map, iface);
                return;
            }
            for link_id in 1..=MAX_AP_LINKS as u8 {
                if link_map & (1 << link_id) == 0 {
                    continue;
                }
                if let Some(peer) = ctx.links.unmap(link_id) {
                    info!("aging out inactive peer {:02x?} (link {}) on iface {}", peer, link_id, iface);
                    frames.push(deauth_frame(&ctx.mac, &peer, REASON_DEAUTH_LEAVING));
                }
            }
        }
        for frame in frames {
            self.mac_sink.send(MacEvent::RxFrame { iface, frame });
        }
    }

    /// Firmware could not enter the committed power-save mode. Fall back
    /// to active so the link keeps working; the user's preference stays
    /// recorded and is re-applied on the next explicit request.
    fn on_ps_mode_error(&mut self, iface: IfaceId) {
        let (uapsd, user) = match &self.ifaces[iface] {
            Some(ctx) => (ctx.uapsd_active, ctx.user_power),
            None => return,
        };
        if uapsd || user.mode == PsMode::PowerSave {
            return;
        }
        warn!("firmware rejected power mode on iface {}; falling back to active", iface);
        let recovery = self.device.set_power_mode(PowerMode::active(), iface);
        if let Some(ctx) = &mut self.ifaces[iface] {
            match recovery {
                Ok(()) => ctx.committed_power = Some(PowerMode::active()),
                Err(e) => {
                    error!("power-save recovery failed on iface {}: {}", iface, e);
                    ctx.committed_power = None;
                }
            }
        }
    }

    // Timeout dispatch.

    pub fn handle_timeout(&mut self, event_id: EventId) {
        let event = match self.timer.triggered(&event_id) {
            Some(event) => event,
            None => return,
        };
        match event {
            TimedEvent::JoinTimeout(iface) => {
                match &mut self.ifaces[iface] {
                    Some(ctx) => ctx.join_timeout = None,
                    None => return,
                }
                warn!("no traffic within {:?} of join on iface {}; leaving", JOIN_TIMEOUT, iface);
                self.teardown(iface);
            }
            TimedEvent::BssLossCheck(iface) => self.on_loss_check(iface),
            TimedEvent::ConnectionLoss(iface) => {
                match &mut self.ifaces[iface] {
                    Some(ctx) => ctx.connection_loss = None,
                    None => return,
                }
                info!("reporting connection loss on iface {}", iface);
                self.mac_sink.send(MacEvent::ConnectionLost { iface });
            }
            TimedEvent::BlockAckInterval => self.on_block_ack_interval(),
        }
    }

    fn on_loss_check(&mut self, iface: IfaceId) {
        let outcome = match &mut self.ifaces[iface] {
            Some(ctx) => {
                ctx.bss_loss_check = None;
                let p2p = ctx.is_p2p();
                ctx.monitor.on_check_fired(p2p)
            }
            None => return,
        };
        match outcome {
            CheckOutcome::ExtendGrace => self.arm_loss_check(iface, cqm::LOSS_CONFIRMED_GRACE),
            CheckOutcome::LinkAlive => {
                let handle = self.ifaces[iface].as_mut().and_then(|c| c.connection_loss.take());
                if let Some(handle) = handle {
                    self.timer.cancel_event(handle);
                }
            }
            CheckOutcome::Report { delay } => {
                let stale = self.ifaces[iface].as_mut().and_then(|c| c.connection_loss.take());
                if let Some(handle) = stale {
                    self.timer.cancel_event(handle);
                }
                let handle = self.timer.schedule_after(delay, TimedEvent::ConnectionLoss(iface));
                if let Some(ctx) = &mut self.ifaces[iface] {
                    ctx.connection_loss = Some(handle);
                }
            }
        }
    }

    fn on_block_ack_interval(&mut self) {
        if self.running {
            self.timer.schedule_after(BLOCK_ACK_INTERVAL, TimedEvent::BlockAckInterval);
        }
        if !self.ht_allowed {
            self.shared.ba_stats.clear();
            return;
        }
        let scanning = self.shared.scan.scan_in_progress();
        if let Some(enable) = self.ba.on_interval(&self.shared.ba_stats, scanning) {
            self.apply_ba_policy(enable);
        }
    }

    fn arm_loss_check(&mut self, iface: IfaceId, delay: Duration) {
        let stale = self.ifaces[iface].as_mut().and_then(|c| c.bss_loss_check.take());
        if let Some(handle) = stale {
            self.timer.cancel_event(handle);
        }
        let handle = self.timer.schedule_after(delay, TimedEvent::BssLossCheck(iface));
        if let Some(ctx) = &mut self.ifaces[iface] {
            ctx.bss_loss_check = Some(handle);
        }
    }

    fn ensure_iface(&self, iface: IfaceId) -> Result<(), Error> {
        match self.ifaces.get(iface) {
            Some(Some(_)) => Ok(()),
            _ => Err(Error::NoSuchIface(iface)),
        }
    }
}

fn best_effort(cmd: &'static str, result: Result<(), anyhow::Error>) {
    if let Err(e) = result {
        warn!("teardown: {} failed: {}", cmd, e);
    }
}
