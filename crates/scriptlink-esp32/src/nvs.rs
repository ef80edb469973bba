//! NVS (Non-Volatile Storage) key-value access and the boot counter.
//!
//! Scripts read and write string values in their own namespaces. The `sys`
//! namespace is reserved for internal bookkeeping (the boot counter) and
//! refused at the boundary.

use anyhow::{bail, Result};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::info;

/// Namespace reserved for internal state.
const SYS_NAMESPACE: &str = "sys";

/// Key holding the boot counter within the `sys` namespace.
const BOOT_COUNT_KEY: &str = "boot_count";

/// Largest string value read back from NVS.
const MAX_VALUE_LEN: usize = 1024;

/// Namespaced key-value store over the default NVS partition.
pub struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    /// Take the default NVS partition.
    pub fn new() -> Result<Self> {
        Ok(Self {
            partition: EspDefaultNvsPartition::take()?,
        })
    }

    /// Read a string value, `None` when the key is unset.
    pub fn read(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let nvs = self.open(namespace, false)?;
        let mut buf = vec![0u8; MAX_VALUE_LEN];
        Ok(nvs.get_str(key, &mut buf)?.map(str::to_string))
    }

    /// Write a string value.
    pub fn write(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut nvs = self.open(namespace, true)?;
        nvs.set_str(key, value)?;
        Ok(())
    }

    /// Remove a key. Returns whether the key existed.
    pub fn erase(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut nvs = self.open(namespace, true)?;
        Ok(nvs.remove(key)?)
    }

    /// Read the boot counter without touching it.
    pub fn boot_count(&self) -> Result<i32> {
        let nvs = EspNvs::new(self.partition.clone(), SYS_NAMESPACE, false)?;
        Ok(nvs.get_i32(BOOT_COUNT_KEY)?.unwrap_or(0))
    }

    /// Increment and persist the boot counter; called once at startup.
    pub fn increment_boot_count(&self) -> Result<i32> {
        let mut nvs = EspNvs::new(self.partition.clone(), SYS_NAMESPACE, true)?;
        let count = nvs.get_i32(BOOT_COUNT_KEY)?.unwrap_or(0) + 1;
        nvs.set_i32(BOOT_COUNT_KEY, count)?;
        info!("boot count: {}", count);
        Ok(count)
    }

    fn open(&self, namespace: &str, writable: bool) -> Result<EspNvs<NvsDefault>> {
        if namespace == SYS_NAMESPACE {
            bail!("namespace '{}' is reserved", SYS_NAMESPACE);
        }
        Ok(EspNvs::new(self.partition.clone(), namespace, writable)?)
    }
}
