// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::iface::IfaceId;
use futures::channel::mpsc::UnboundedSender;
use log::warn;

/// Notifications surfaced to the MAC-management stack.
#[derive(Debug, Clone, PartialEq)]
pub enum MacEvent {
    /// Confirmed loss of the association on `iface`. Emitted exactly once
    /// per confirmation cycle; teardown is driven by the stack's own
    /// disassociation handling.
    ConnectionLost { iface: IfaceId },
    /// A firmware RSSI/RCPI sample crossed the configured threshold.
    RssiThreshold { iface: IfaceId, rssi_dbm: i32, class: RssiClass },
    /// A management frame injected on behalf of the firmware, e.g. the
    /// deauthentication synthesized for an expired peer link.
    RxFrame { iface: IfaceId, frame: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RssiClass {
    Low,
    High,
}

/// Sending end of the upward notification channel.
///
/// Sends never block; if the management stack dropped its receiver we log
/// and carry on, since nothing in the link core can recover that.
#[derive(Clone)]
pub struct MacSink {
    sink: UnboundedSender<MacEvent>,
}

impl MacSink {
    pub fn new(sink: UnboundedSender<MacEvent>) -> Self {
        Self { sink }
    }

    pub fn send(&self, event: MacEvent) {
        if let Err(e) = self.sink.unbounded_send(event) {
            warn!("dropping MacEvent, receiver gone: {:?}", e);
        }
    }
}
