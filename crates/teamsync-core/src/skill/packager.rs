//! Skill packaging: validation, checksums, archive pack/unpack and
//! directory swaps.
//!
//! ## Archive format
//!
//! ```text
//! zstd( postcard( SkillArchive { version: 1, entries: [ArchiveEntry ..] } ) )
//! ```
//!
//! Entries are sorted by relative path. The checksum is a SHA-256 over the
//! sorted entries (`path`, NUL, little-endian length, content) and is the
//! same whether computed from a directory on disk or from a decoded
//! archive, so a receiver can verify a download in memory before any file
//! is written.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{TeamError, TeamResult};
use crate::skill::manifest::{read_manifest, SKILL_MANIFEST};
use crate::types::new_id;

/// Current archive layout version
pub const ARCHIVE_VERSION: u8 = 1;
/// Maximum decompressed archive size (64 MB)
pub const MAX_ARCHIVE_SIZE: u64 = 64 * 1024 * 1024;
/// zstd level used for packing
const COMPRESSION_LEVEL: i32 = 3;

/// Prefix of sibling directories used while swapping content into place
const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".backup-";

/// Outcome of validating a skill directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub category: String,
    pub source_type: String,
    /// Relative slash-separated paths, sorted
    pub files: Vec<String>,
    pub total_size: u64,
    /// Metadata fields the publisher still has to supply
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A regular file inside a skill directory
#[derive(Debug, Clone)]
pub struct SkillFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
}

/// One file in an archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub data: Vec<u8>,
    pub executable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SkillArchive {
    version: u8,
    entries: Vec<ArchiveEntry>,
}

/// A packed skill ready to serve
#[derive(Debug, Clone)]
pub struct PackedSkill {
    pub bytes: Vec<u8>,
    pub checksum: String,
    pub file_count: usize,
    pub total_size: u64,
}

/// A decoded and verified archive, not yet written anywhere
#[derive(Debug, Clone)]
pub struct UnpackedSkill {
    pub entries: Vec<ArchiveEntry>,
    pub checksum: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════════════════════

/// Validate a skill directory.
///
/// Problems with the directory itself are reported in the result
/// (`valid == false`, `error` set); only unexpected I/O failures while
/// reading an otherwise valid directory become `Err`.
pub fn validate(path: &Path) -> TeamResult<ValidationResult> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ValidationResult::invalid("directory does not exist"));
        }
        Err(e) => return Err(e.into()),
    };
    if !meta.is_dir() {
        return Ok(ValidationResult::invalid("path is not a directory"));
    }
    if !path.join(SKILL_MANIFEST).is_file() {
        return Ok(ValidationResult::invalid(format!(
            "{} not found in directory",
            SKILL_MANIFEST
        )));
    }

    let info = read_manifest(path)?;
    let (files, total_size) = collect_files(path)?;

    let mut missing_fields = Vec::new();
    for (field, value) in [
        ("description", &info.description),
        ("category", &info.category),
        ("author", &info.author),
    ] {
        if value.is_empty() {
            missing_fields.push(field.to_string());
        }
    }

    Ok(ValidationResult {
        valid: true,
        name: info.name,
        description: info.description,
        version: info.version,
        author: info.author,
        category: info.category,
        source_type: info.source_type,
        files: files.into_iter().map(|f| f.rel_path).collect(),
        total_size,
        missing_fields,
        error: None,
    })
}

/// List regular files under `dir`, sorted by relative path.
///
/// Symlinks are skipped, as are leftover staging/backup directories.
pub fn collect_files(dir: &Path) -> TeamResult<(Vec<SkillFile>, u64)> {
    let mut files = Vec::new();
    let mut total_size = 0u64;

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_transient_name(&e.file_name().to_string_lossy()));

    for entry in walker {
        let entry = entry.map_err(|e| TeamError::Io(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| TeamError::Storage(e.to_string()))?;
        let rel_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry
            .metadata()
            .map_err(|e| TeamError::Io(std::io::Error::other(e.to_string())))?
            .len();
        total_size += size;
        files.push(SkillFile {
            rel_path,
            abs_path: entry.path().to_path_buf(),
            size,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok((files, total_size))
}

fn is_transient_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX) || name.starts_with(BACKUP_PREFIX)
}

// ═══════════════════════════════════════════════════════════════════════════
// Checksums
// ═══════════════════════════════════════════════════════════════════════════

/// Checksum over `(path, content)` pairs. Callers must pass them sorted.
pub fn checksum_entries<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut hasher = Sha256::new();
    for (path, data) in entries {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
    }
    hex::encode(hasher.finalize())
}

/// Checksum of a skill directory on disk.
pub fn checksum_dir(dir: &Path) -> TeamResult<String> {
    let entries = read_entries(dir)?;
    Ok(checksum_of(&entries))
}

fn checksum_of(entries: &[ArchiveEntry]) -> String {
    checksum_entries(entries.iter().map(|e| (e.path.as_str(), e.data.as_slice())))
}

fn read_entries(dir: &Path) -> TeamResult<Vec<ArchiveEntry>> {
    let (files, _) = collect_files(dir)?;
    files
        .into_iter()
        .map(|f| {
            let data = std::fs::read(&f.abs_path)?;
            Ok(ArchiveEntry {
                executable: is_executable(&f.abs_path),
                path: f.rel_path,
                data,
            })
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

// ═══════════════════════════════════════════════════════════════════════════
// Pack / Unpack
// ═══════════════════════════════════════════════════════════════════════════

/// Pack a skill directory into a compressed archive.
pub fn pack(dir: &Path) -> TeamResult<PackedSkill> {
    let entries = read_entries(dir)?;
    let checksum = checksum_of(&entries);
    let file_count = entries.len();
    let total_size = entries.iter().map(|e| e.data.len() as u64).sum();

    let archive = SkillArchive {
        version: ARCHIVE_VERSION,
        entries,
    };
    let serialized =
        postcard::to_allocvec(&archive).map_err(|e| TeamError::Serialization(e.to_string()))?;
    let bytes = zstd::encode_all(&serialized[..], COMPRESSION_LEVEL)
        .map_err(|e| TeamError::Serialization(format!("compression failed: {}", e)))?;

    debug!(
        dir = %dir.display(),
        file_count,
        total_size,
        packed = bytes.len(),
        "Packed skill"
    );

    Ok(PackedSkill {
        bytes,
        checksum,
        file_count,
        total_size,
    })
}

/// Decode an archive in memory and verify it against `expected_checksum`.
///
/// Nothing is written to disk. Entries with absolute or parent-relative
/// paths are rejected, and so is an empty `expected_checksum`: every archive
/// is verified.
pub fn unpack(bytes: &[u8], expected_checksum: &str) -> TeamResult<UnpackedSkill> {
    if expected_checksum.trim().is_empty() {
        return Err(TeamError::validation("expected checksum is required"));
    }
    let decoder = zstd::stream::read::Decoder::new(bytes)
        .map_err(|e| TeamError::Serialization(format!("decompression failed: {}", e)))?;
    let mut serialized = Vec::new();
    decoder
        .take(MAX_ARCHIVE_SIZE + 1)
        .read_to_end(&mut serialized)
        .map_err(|e| TeamError::Serialization(format!("decompression failed: {}", e)))?;
    if serialized.len() as u64 > MAX_ARCHIVE_SIZE {
        return Err(TeamError::validation(format!(
            "archive exceeds maximum size of {} bytes",
            MAX_ARCHIVE_SIZE
        )));
    }

    let archive: SkillArchive =
        postcard::from_bytes(&serialized).map_err(|e| TeamError::Serialization(e.to_string()))?;
    if archive.version != ARCHIVE_VERSION {
        return Err(TeamError::Serialization(format!(
            "unsupported archive version {}",
            archive.version
        )));
    }

    let mut entries = archive.entries;
    for entry in &entries {
        safe_relative_path(&entry.path)?;
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    let checksum = checksum_of(&entries);
    if checksum != expected_checksum {
        return Err(TeamError::ChecksumMismatch {
            expected: expected_checksum.to_string(),
            actual: checksum,
        });
    }

    Ok(UnpackedSkill { entries, checksum })
}

fn safe_relative_path(path: &str) -> TeamResult<PathBuf> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(candidate.to_path_buf())
    } else {
        Err(TeamError::validation(format!("invalid file path in archive: {}", path)))
    }
}

impl UnpackedSkill {
    /// Write every entry below `dest`, creating it if needed.
    pub fn write_to(&self, dest: &Path) -> TeamResult<()> {
        std::fs::create_dir_all(dest)?;
        for entry in &self.entries {
            let target = dest.join(safe_relative_path(&entry.path)?);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &entry.data)?;
            if entry.executable {
                set_executable(&target)?;
            }
        }
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Directory Swaps
// ═══════════════════════════════════════════════════════════════════════════

/// Fresh staging directory path beside `target`.
pub fn staging_dir_for(target: &Path) -> PathBuf {
    sibling(target, STAGING_PREFIX)
}

fn sibling(target: &Path, prefix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}{}-{}", prefix, name, new_id()))
}

/// Copy regular files from `src` into `dest` (which must not exist yet).
pub fn copy_dir(src: &Path, dest: &Path) -> TeamResult<()> {
    let (files, _) = collect_files(src)?;
    std::fs::create_dir_all(dest)?;
    for file in files {
        let target = dest.join(safe_relative_path(&file.rel_path)?);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&file.abs_path, &target)?;
    }
    Ok(())
}

/// Move a fully-written `staging` directory into place at `target`.
///
/// An existing `target` is first renamed aside and only deleted after the
/// new content is in place; if the final rename fails it is restored, so a
/// failed swap never leaves `target` missing or half-written.
pub fn replace_dir(staging: &Path, target: &Path) -> TeamResult<()> {
    let backup = swap_dir(staging, target)?;
    discard_backup(backup);
    Ok(())
}

/// Like [`replace_dir`], but the previous `target` (if any) is kept aside
/// and its path returned, for [`restore_backup`] or [`discard_backup`].
pub fn swap_dir(staging: &Path, target: &Path) -> TeamResult<Option<PathBuf>> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let backup = if target.exists() {
        let backup = sibling(target, BACKUP_PREFIX);
        std::fs::rename(target, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staging, target) {
        if let Some(backup) = &backup {
            if let Err(restore_err) = std::fs::rename(backup, target) {
                warn!(
                    target = %target.display(),
                    error = %restore_err,
                    "Failed to restore previous directory"
                );
            }
        }
        let _ = std::fs::remove_dir_all(staging);
        return Err(e.into());
    }
    Ok(backup)
}

/// Put a [`swap_dir`] backup back at `target`, dropping the newer content.
/// With no backup, `target` is simply removed.
pub fn restore_backup(target: &Path, backup: Option<PathBuf>) -> TeamResult<()> {
    match std::fs::remove_dir_all(target) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Some(backup) = backup {
        std::fs::rename(&backup, target)?;
    }
    Ok(())
}

pub fn discard_backup(backup: Option<PathBuf>) {
    if let Some(backup) = backup {
        if let Err(e) = std::fs::remove_dir_all(&backup) {
            warn!(backup = %backup.display(), error = %e, "Failed to remove old directory");
        }
    }
}

/// Remove leftover staging/backup siblings inside `dir`.
pub fn clean_transient_dirs(dir: &Path) -> usize {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in read_dir.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_transient_name(&name) && std::fs::remove_dir_all(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}
