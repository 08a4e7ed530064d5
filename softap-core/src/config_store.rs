//! 在 AP 会话期间备份/恢复 STA 模式的 wpa_supplicant 配置文件。

use crate::config::SupplicantConfig;
use crate::Result;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

const COPY_CHUNK_SIZE: usize = 2048;
const CONFIG_FILE_MODE: u32 = 0o660;

#[derive(Debug, Clone)]
pub struct ConfigStore {
    live: PathBuf,
    backup: PathBuf,
    owner_uid: u32,
    owner_gid: u32,
}

impl ConfigStore {
    pub fn new(live: impl Into<PathBuf>, backup: impl Into<PathBuf>, owner_uid: u32, owner_gid: u32) -> Self {
        Self {
            live: live.into(),
            backup: backup.into(),
            owner_uid,
            owner_gid,
        }
    }

    pub fn from_config(config: &SupplicantConfig) -> Self {
        Self::new(
            &config.live_config_path,
            &config.backup_config_path,
            config.config_owner_uid,
            config.config_owner_gid,
        )
    }

    pub fn live_path(&self) -> &Path {
        &self.live
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    pub fn has_backup(&self) -> bool {
        self.backup.exists()
    }

    /// Moves the station config out of the live slot into the backup slot.
    /// Nothing to preserve when there is no live file.
    pub fn store(&self) -> Result<()> {
        if !self.live.exists() {
            tracing::debug!("No STA config at {}, nothing to store", self.live.display());
            return Ok(());
        }

        match fs::rename(&self.live, &self.backup) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                tracing::debug!("Backup slot on another filesystem, copying instead");
                copy_into(File::open(&self.live)?, &self.backup)?;
                fs::remove_file(&self.live)?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            "Stored STA config {} -> {}",
            self.live.display(),
            self.backup.display()
        );
        Ok(())
    }

    /// Puts the saved station config back and hands it to the network
    /// service's uid/gid. A missing backup means there is nothing to do.
    pub fn restore(&self) -> Result<()> {
        if !self.backup.exists() {
            tracing::debug!("No stored STA config at {}", self.backup.display());
            return Ok(());
        }

        match fs::rename(&self.backup, &self.live) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                copy_into(File::open(&self.backup)?, &self.live)?;
                fs::remove_file(&self.backup)?;
            }
            Err(e) => return Err(e.into()),
        }

        // The backup is gone by now; a failed chown loses the config.
        if let Err(e) = std::os::unix::fs::chown(&self.live, Some(self.owner_uid), Some(self.owner_gid)) {
            tracing::error!(
                "Failed to chown {} to {}:{}: {}",
                self.live.display(),
                self.owner_uid,
                self.owner_gid,
                e
            );
            let _ = fs::remove_file(&self.live);
            return Err(e.into());
        }

        tracing::info!("Restored STA config to {}", self.live.display());
        Ok(())
    }
}

/// Copies `src` into a fresh `dest` (mode 0660) in fixed-size chunks.
/// A partially written `dest` is removed again.
fn copy_into(src: impl Read, dest: &Path) -> io::Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(CONFIG_FILE_MODE)
        .open(dest)?;
    if let Err(e) = copy_chunked(src, file) {
        tracing::error!("Copy to {} failed: {}", dest.display(), e);
        if let Err(rm) = fs::remove_file(dest) {
            tracing::warn!("Failed to remove partial {}: {}", dest.display(), rm);
        }
        return Err(e);
    }
    Ok(())
}

fn copy_chunked(mut src: impl Read, mut dest: File) -> io::Result<()> {
    let mut buf = [0u8; COPY_CHUNK_SIZE];
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dest.write_all(&buf[..n])?;
    }
    dest.sync_all()
}
