// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Minimal management-frame synthesis.
//!
//! The link core builds exactly one frame itself: the deauthentication
//! injected upward when firmware expires an inactive peer link. Everything
//! else arrives and leaves as opaque bytes.

/// Frame Control for a deauthentication management frame with ToDS set,
/// little-endian encoded on the wire.
const FRAME_CTL_DEAUTH_TODS: u16 = 0x00C0 | 0x0100;

/// Reason 3: deauthenticated because sending STA is leaving.
pub const REASON_DEAUTH_LEAVING: u16 = 3;

pub const DEAUTH_FRAME_LEN: usize = 26;

/// Builds the deauthentication frame reported on behalf of an expired
/// peer: destination and BSSID are our own address, source is the peer
/// being expired, sequence control zero.
pub fn deauth_frame(own_addr: &[u8; 6], peer_addr: &[u8; 6], reason: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(DEAUTH_FRAME_LEN);
    frame.extend_from_slice(&FRAME_CTL_DEAUTH_TODS.to_le_bytes());
    frame.extend_from_slice(&0u16.to_le_bytes()); // duration
    frame.extend_from_slice(own_addr); // DA
    frame.extend_from_slice(peer_addr); // SA
    frame.extend_from_slice(own_addr); // BSSID
    frame.extend_from_slice(&0u16.to_le_bytes()); // sequence control
    frame.extend_from_slice(&reason.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deauth_frame_layout() {
        let own = [2u8, 2, 2, 2, 2, 2];
        let peer = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        let frame = deauth_frame(&own, &peer, REASON_DEAUTH_LEAVING);
        assert_eq!(
            frame,
            vec![
                0xC0, 0x01, // frame control: mgmt/deauth, ToDS
                0, 0, // duration
                2, 2, 2, 2, 2, 2, // DA: own address
                0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, // SA: expiring peer
                2, 2, 2, 2, 2, 2, // BSSID: own address
                0, 0, // sequence control
                3, 0, // reason code
            ]
        );
        assert_eq!(frame.len(), DEAUTH_FRAME_LEN);
    }
}
