//! Best-effort secure file deletion.
//!
//! Each round overwrites the whole file three times (thread RNG bytes,
//! OS CSPRNG bytes, zeros), syncing to disk after every pass, before the
//! file is renamed and removed.
//!
//! This hinders naive recovery on conventional disks only. Copy-on-write
//! filesystems (btrfs, ZFS, APFS), snapshots, journaling of data blocks
//! and SSD wear levelling can all keep old copies of the content that an
//! in-place overwrite never reaches.

use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::RngCore;
use rand::rngs::OsRng;

const SHRED_BUFFER_SIZE: usize = 64 * 1024;

/// Secure deletion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShredConfig {
    /// Overwrite rounds; each round is three passes. Zero is treated as one.
    pub rounds: u32,
    /// Remove the file after overwriting.
    pub remove: bool,
}

impl Default for ShredConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            remove: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Random,
    Secure,
    Zero,
}

/// Overwrites and removes a single file.
///
/// Symlinks are removed without touching their target.
pub fn shred_file(path: &Path, config: &ShredConfig) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        if config.remove {
            std::fs::remove_file(path)?;
        }
        return Ok(());
    }
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a regular file: {}", path.display()),
        ));
    }

    let len = meta.len();
    {
        let mut file = std::fs::OpenOptions::new().write(true).open(path)?;
        for _ in 0..config.rounds.max(1) {
            for pass in [Pass::Random, Pass::Secure, Pass::Zero] {
                overwrite(&mut file, len, pass)?;
            }
        }
    }

    if config.remove {
        let target = scrambled_name(path);
        let to_remove = match std::fs::rename(path, &target) {
            Ok(()) => target,
            Err(_) => path.to_path_buf(),
        };
        std::fs::remove_file(&to_remove)?;
    }

    tracing::debug!(path = %path.display(), bytes = len, "shredded file");
    Ok(())
}

/// Shreds every file below `dir`, recursing into subdirectories.
///
/// Keeps going after failures. Returns the number of files shredded and
/// the failures; directories themselves are left in place.
pub fn shred_dir(dir: &Path, config: &ShredConfig) -> (usize, Vec<(PathBuf, io::Error)>) {
    let mut shredded = 0;
    let mut failures = Vec::new();
    walk_and_shred(dir, config, &mut shredded, &mut failures);
    (shredded, failures)
}

fn walk_and_shred(
    dir: &Path,
    config: &ShredConfig,
    shredded: &mut usize,
    failures: &mut Vec<(PathBuf, io::Error)>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            failures.push((dir.to_path_buf(), e));
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            walk_and_shred(&path, config, shredded, failures);
            continue;
        }
        match shred_file(&path, config) {
            Ok(()) => *shredded += 1,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to shred file");
                failures.push((path, e));
            }
        }
    }
}

fn overwrite(file: &mut std::fs::File, len: u64, pass: Pass) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = vec![0u8; SHRED_BUFFER_SIZE];
    let mut thread_rng = rand::thread_rng();
    let mut remaining = len;
    while remaining > 0 {
        let n = (remaining as usize).min(buf.len());
        match pass {
            Pass::Random => thread_rng.fill_bytes(&mut buf[..n]),
            Pass::Secure => OsRng.fill_bytes(&mut buf[..n]),
            Pass::Zero => buf[..n].fill(0),
        }
        file.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    file.flush()?;
    file.sync_data()
}

/// Random sibling name so the original file name does not linger in the
/// directory entry after removal.
fn scrambled_name(path: &Path) -> PathBuf {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    let name: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    path.with_file_name(name)
}
