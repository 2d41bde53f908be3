// Head Unit Bridge - Connection State
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Connectivity snapshot taken at the start of every evaluation pass.

use serde::{Deserialize, Serialize};

/// Head-unit vendor as reported by the head-unit link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Bmw,
    Mini,
    #[default]
    Unknown,
}

impl Vendor {
    /// Map a raw brand string to a known vendor.
    pub fn from_brand(brand: Option<&str>) -> Self {
        match brand.map(|b| b.trim().to_ascii_lowercase()).as_deref() {
            Some("bmw") => Self::Bmw,
            Some("mini") => Self::Mini,
            _ => Self::Unknown,
        }
    }
}

/// Both connectivity signals as read for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Head-unit link is up.
    pub head_unit: bool,
    /// Security service is bound.
    pub security: bool,
    /// Vendor reported by the head-unit link.
    #[serde(default)]
    pub vendor: Vendor,
}

impl ConnectionState {
    /// Aggregate connectivity.
    pub fn is_connected(&self) -> bool {
        self.head_unit && self.security
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_from_brand() {
        assert_eq!(Vendor::from_brand(Some("bmw")), Vendor::Bmw);
        assert_eq!(Vendor::from_brand(Some(" MINI ")), Vendor::Mini);
        assert_eq!(Vendor::from_brand(Some("rolls")), Vendor::Unknown);
        assert_eq!(Vendor::from_brand(None), Vendor::Unknown);
    }

    #[test]
    fn test_aggregate_requires_both() {
        let mut state = ConnectionState::default();
        assert!(!state.is_connected());
        state.head_unit = true;
        assert!(!state.is_connected());
        state.security = true;
        assert!(state.is_connected());
    }
}
