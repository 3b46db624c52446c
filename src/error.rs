// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no free interface slot for address {0:02x?}")]
    NoFreeIfaceSlot([u8; 6]),
    #[error("no free key slot")]
    NoFreeKeySlot,
    #[error("key slot index {0} out of range")]
    InvalidKeySlot(usize),
    #[error("interface {0} does not exist")]
    NoSuchIface(usize),
    #[error("operation not supported for interface {iface} in role {role:?}")]
    RoleMismatch { iface: usize, role: crate::iface::IfaceRole },
    #[error("timed out waiting for TX queues to drain")]
    FlushTimeout,
    #[error("firmware rejected {cmd}: {source}")]
    Firmware {
        cmd: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Wraps a failure returned by the firmware collaborator, naming the
    /// command for diagnostics.
    pub fn firmware(cmd: &'static str, source: anyhow::Error) -> Self {
        Error::Firmware { cmd, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::format_err;

    #[test]
    fn firmware_error_names_command() {
        let e = Error::firmware("join", format_err!("bus timeout"));
        let msg = e.to_string();
        assert!(msg.contains("join"), "{}", msg);
        assert!(msg.contains("bus timeout"), "{}", msg);
    }
}
