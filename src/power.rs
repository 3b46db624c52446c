// Copyright 2023 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Power-save mode plumbing.
//!
//! The firmware is only told about a mode change when the effective mode
//! actually differs from the last committed one; repeated identical
//! requests are absorbed host-side.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsMode {
    Active,
    PowerSave,
    /// Power-save with fast wakeup. Invalid while UAPSD is negotiated; the
    /// committer masks it back to plain `PowerSave`.
    FastPowerSave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerMode {
    pub mode: PsMode,
    pub fast_psm_idle_period: u8,
    pub ap_psm_change_period: u8,
}

impl PowerMode {
    pub fn active() -> Self {
        Self { mode: PsMode::Active, fast_psm_idle_period: 0, ap_psm_change_period: 0 }
    }

    pub fn power_save() -> Self {
        Self { mode: PsMode::PowerSave, fast_psm_idle_period: 0, ap_psm_change_period: 0 }
    }

    /// The mode actually handed to firmware given the interface's UAPSD
    /// state.
    pub fn effective(self, uapsd_active: bool) -> Self {
        if uapsd_active && self.mode == PsMode::FastPowerSave {
            Self { mode: PsMode::PowerSave, ..self }
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uapsd_masks_fast_ps() {
        let fast = PowerMode { mode: PsMode::FastPowerSave, ..PowerMode::active() };
        assert_eq!(fast.effective(true).mode, PsMode::PowerSave);
        assert_eq!(fast.effective(false).mode, PsMode::FastPowerSave);
    }

    #[test]
    fn uapsd_leaves_other_modes_alone() {
        assert_eq!(PowerMode::active().effective(true), PowerMode::active());
        assert_eq!(PowerMode::power_save().effective(true), PowerMode::power_save());
    }
}
