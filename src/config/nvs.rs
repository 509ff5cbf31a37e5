//! NVS-backed key/value store for persisted items.
//!
//! Every persisted item is one NVS string entry in [`NVS_NAMESPACE`]. NVS
//! limits keys to 15 bytes, so longer item names are shortened with a hash
//! suffix by [`nvs_key`]; the mapping is stable across firmware versions.
//!
//! # Version History
//!
//! - **v1** (current): one string entry per item, canonical string form
//!
//! A namespace stamped with a newer schema than this firmware understands
//! is refused with [`NvsError::TooNew`] instead of being overwritten.

use thiserror::Error;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;
#[cfg(target_os = "espidf")]
use parking_lot::Mutex;
#[cfg(target_os = "espidf")]
use tracing::{info, warn};

#[cfg(target_os = "espidf")]
use crate::persist::KeyValueStore;

/// Current schema version of the item namespace.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// NVS namespace holding persisted items.
pub const NVS_NAMESPACE: &str = "tower_items";

/// Longest key NVS accepts.
pub const NVS_KEY_MAX: usize = 15;

/// NVS key for schema version
#[cfg(target_os = "espidf")]
const VERSION_KEY: &str = "schema_ver";

/// Largest string value read back from NVS.
#[cfg(target_os = "espidf")]
const MAX_VALUE_LEN: usize = 256;

/// NVS operation errors
#[derive(Debug, Error)]
pub enum NvsError {
    /// NVS initialization failed
    #[cfg(target_os = "espidf")]
    #[error("NVS init failed: {0}")]
    InitFailed(EspError),

    /// Schema version too new (downgrade not supported)
    #[error("stored schema v{stored_version} is newer than this firmware")]
    TooNew { stored_version: u32 },

    /// NVS read/write error
    #[cfg(target_os = "espidf")]
    #[error("NVS I/O: {0}")]
    IoError(#[from] EspError),

    /// Feature not available on this platform
    #[cfg(not(target_os = "espidf"))]
    #[error("NVS not available on this platform")]
    NotAvailable,
}

/// Map an item name onto a valid NVS key.
///
/// Names up to [`NVS_KEY_MAX`] bytes are used as-is; longer names keep
/// their first 8 bytes followed by a 7-digit hex FNV-1a hash.
pub fn nvs_key(name: &str) -> String {
    if name.len() <= NVS_KEY_MAX {
        return name.to_string();
    }
    let mut hash: u32 = 0x811c_9dc5;
    for b in name.bytes() {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    let mut cut = 8;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{:07x}", &name[..cut], hash & 0x0FFF_FFFF)
}

/// Item store over the default NVS partition.
#[cfg(target_os = "espidf")]
pub struct NvsStore {
    nvs: Mutex<EspNvs<NvsDefault>>,
}

#[cfg(target_os = "espidf")]
impl NvsStore {
    /// Open [`NVS_NAMESPACE`] read-write and check the schema stamp.
    pub fn open(partition: EspDefaultNvsPartition) -> Result<Self, NvsError> {
        let mut nvs = EspNvs::new(partition, NVS_NAMESPACE, true).map_err(NvsError::InitFailed)?;

        match nvs.get_u32(VERSION_KEY)?.unwrap_or(0) {
            0 => {
                nvs.set_u32(VERSION_KEY, CURRENT_SCHEMA_VERSION)?;
                info!(namespace = NVS_NAMESPACE, "fresh item namespace");
            }
            v if v > CURRENT_SCHEMA_VERSION => return Err(NvsError::TooNew { stored_version: v }),
            _ => {}
        }

        Ok(Self { nvs: Mutex::new(nvs) })
    }
}

#[cfg(target_os = "espidf")]
impl KeyValueStore for NvsStore {
    fn contains_key(&self, key: &str) -> bool {
        self.nvs.lock().contains(&nvs_key(key)).unwrap_or(false)
    }

    fn get(&self, key: &str, default: &str) -> String {
        let mut buf = [0u8; MAX_VALUE_LEN];
        match self.nvs.lock().get_str(&nvs_key(key), &mut buf) {
            Ok(Some(value)) => value.to_string(),
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!(key, "NVS read failed: {}", e);
                default.to_string()
            }
        }
    }

    fn put(&self, key: &str, value: &str) -> usize {
        match self.nvs.lock().set_str(&nvs_key(key), value) {
            Ok(()) => value.len(),
            Err(e) => {
                warn!(key, "NVS write failed: {}", e);
                0
            }
        }
    }
}
