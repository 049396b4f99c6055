//! Pack inventory of the shared object cache.
//!
//! Building the inventory walks the whole pack directory, so it is kept behind
//! a [`SharedResourceInvoker`] and rebuilt only after it has gone idle.

use crate::config::MaintenanceConfig;
use crate::core::Result;
use crate::invoker::SharedResourceInvoker;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MULTI_PACK_INDEX_FILE: &str = "multi-pack-index";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub name: String,
    pub size: u64,
    pub has_index: bool,
}

/// Read-only snapshot of `<object cache>/pack`
#[derive(Debug, Clone)]
pub struct PackInventory {
    pack_dir: PathBuf,
    packs: Vec<PackEntry>,
    multi_pack_index: bool,
    scanned_at: DateTime<Utc>,
}

impl PackInventory {
    /// Scan a pack directory. A missing directory is an empty inventory.
    pub fn scan(pack_dir: &Path) -> Result<Self> {
        let mut packs = Vec::new();
        let mut multi_pack_index = false;

        let entries = match fs::read_dir(pack_dir) {
            Ok(entries) => Some(entries),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        for entry in entries.into_iter().flatten() {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();

            if file_name == MULTI_PACK_INDEX_FILE {
                multi_pack_index = true;
                continue;
            }

            if let Some(stem) = file_name.strip_suffix(".pack") {
                let size = entry.metadata()?.len();
                let has_index = pack_dir.join(format!("{}.idx", stem)).exists();
                packs.push(PackEntry {
                    name: file_name,
                    size,
                    has_index,
                });
            }
        }

        packs.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            pack_dir: pack_dir.to_path_buf(),
            packs,
            multi_pack_index,
            scanned_at: Utc::now(),
        })
    }

    pub fn pack_dir(&self) -> &Path {
        &self.pack_dir
    }

    pub fn packs(&self) -> &[PackEntry] {
        &self.packs
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub fn total_pack_bytes(&self) -> u64 {
        self.packs.iter().map(|pack| pack.size).sum()
    }

    /// Packs git cannot use because their `.idx` is missing
    pub fn unindexed_packs(&self) -> usize {
        self.packs.iter().filter(|pack| !pack.has_index).count()
    }

    pub fn has_multi_pack_index(&self) -> bool {
        self.multi_pack_index
    }

    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }
}

/// Invoker that lazily scans the configured object cache
pub fn pack_inventory_invoker(config: &MaintenanceConfig) -> Result<SharedResourceInvoker<PackInventory>> {
    let pack_dir = config.pack_dir();
    SharedResourceInvoker::new(config.invoker_config(), move || PackInventory::scan(&pack_dir))
}
