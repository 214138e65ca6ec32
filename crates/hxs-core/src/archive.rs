//! Archive pipeline: unpack to a scratch directory, patch qualifying files,
//! repack in the original format.
//!
//! Extraction defends against common archive attacks:
//! - Path traversal (`../`, absolute paths, Windows drive prefixes)
//! - Symlink/hardlink/device entries
//! - Resource exhaustion (too many files / too much total content)
//!
//! The scratch directory is a [`tempfile::TempDir`], removed when the call
//! returns on every path.

use std::{
    collections::HashSet,
    fs,
    io::{self, Cursor, Read, Write},
    path::{Component, Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tar::Archive;
use zip::{write::FileOptions, ZipArchive, ZipWriter};

use crate::{
    domain::{ArchiveKind, SwapRule},
    errors::Error,
    patch::patch,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ExtractLimits {
    /// Maximum number of regular files extracted.
    pub max_files: usize,
    /// Maximum total bytes extracted across all regular files.
    pub max_total_bytes: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_files: 10_000,
            max_total_bytes: 256 * 1024 * 1024, // 256MB
        }
    }
}

#[derive(Clone, Debug)]
pub struct ArchiveSettings {
    /// Inputs larger than this are rejected before unpacking.
    pub max_input_bytes: u64,
    /// File-name suffix marking an entry as a patchable payload.
    pub payload_suffix: String,
    /// Parent directory for per-call scratch directories.
    pub scratch_parent: PathBuf,
    pub limits: ExtractLimits,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            max_input_bytes: 50 * 1024 * 1024,
            payload_suffix: ".dat".to_string(),
            scratch_parent: std::env::temp_dir(),
            limits: ExtractLimits::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Patched { rules: usize },
    PassedThrough,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryReport {
    /// `/`-separated path inside the archive.
    pub path: String,
    pub outcome: EntryOutcome,
}

#[derive(Clone, Debug)]
pub struct ArchiveOutput {
    pub bytes: Vec<u8>,
    pub entries: Vec<EntryReport>,
}

impl ArchiveOutput {
    pub fn patched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Patched { .. }))
            .count()
    }
}

/// One unpacked entry, in archive order.
#[derive(Clone, Debug)]
struct ScratchEntry {
    rel: PathBuf,
    is_dir: bool,
}

pub fn detect_archive_kind(file_name: &str) -> Option<ArchiveKind> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".zip") {
        return Some(ArchiveKind::Zip);
    }
    if lower.ends_with(".tar") {
        return Some(ArchiveKind::Tar);
    }
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        return Some(ArchiveKind::TarGz);
    }
    None
}

/// Patch every qualifying entry of `input` with `rules` and return the repacked archive.
///
/// All-or-nothing: any failing entry fails the whole call.
pub fn process_archive(
    input: &[u8],
    kind: ArchiveKind,
    rules: &[SwapRule],
    settings: &ArchiveSettings,
) -> Result<ArchiveOutput> {
    let size = input.len() as u64;
    if size > settings.max_input_bytes {
        return Err(Error::SizeExceeded {
            size,
            max: settings.max_input_bytes,
        });
    }

    fs::create_dir_all(&settings.scratch_parent)?;
    let scratch = tempfile::Builder::new()
        .prefix("hxs-archive-")
        .tempdir_in(&settings.scratch_parent)?;
    let root = scratch.path();

    let entries = unpack(input, kind, root, settings.limits).map_err(|e| match e {
        Error::UnpackFailed(_) => e,
        other => Error::UnpackFailed(other.to_string()),
    })?;

    let mut report = Vec::with_capacity(entries.len());
    for entry in &entries {
        let path = archive_name(&entry.rel);
        if entry.is_dir {
            report.push(EntryReport {
                path,
                outcome: EntryOutcome::Directory,
            });
            continue;
        }
        if !is_qualifying(&entry.rel, &settings.payload_suffix) {
            report.push(EntryReport {
                path,
                outcome: EntryOutcome::PassedThrough,
            });
            continue;
        }

        let full = root.join(&entry.rel);
        let content = fs::read(&full)?;
        let patched = patch(&content, rules).map_err(|e| {
            tracing::warn!(entry = %path, error = %e, "archive entry failed to patch");
            e
        })?;
        fs::write(&full, &patched.bytes)?;
        report.push(EntryReport {
            path,
            outcome: EntryOutcome::Patched {
                rules: patched.applied,
            },
        });
    }

    let bytes = repack(kind, root, &entries).map_err(|e| Error::RepackFailed(e.to_string()))?;

    Ok(ArchiveOutput {
        bytes,
        entries: report,
    })
}

fn is_qualifying(rel: &Path, suffix: &str) -> bool {
    rel.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix))
}

fn archive_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============== Unpack ==============

/// Running totals enforced while extracting.
struct Tally {
    limits: ExtractLimits,
    files: usize,
    total: u64,
    seen: HashSet<PathBuf>,
    entries: Vec<ScratchEntry>,
}

impl Tally {
    fn new(limits: ExtractLimits) -> Self {
        Self {
            limits,
            files: 0,
            total: 0,
            seen: HashSet::new(),
            entries: Vec::new(),
        }
    }

    fn admit_file(&mut self, rel: &Path, declared: u64) -> Result<()> {
        self.files += 1;
        if self.files > self.limits.max_files {
            return Err(Error::Security(format!(
                "archive exceeds max_files limit ({})",
                self.limits.max_files
            )));
        }
        if self.total.saturating_add(declared) > self.limits.max_total_bytes {
            return Err(Error::Security(format!(
                "archive exceeds max_total_bytes limit ({}) at {}",
                self.limits.max_total_bytes,
                rel.display()
            )));
        }
        Ok(())
    }

    /// Bytes still allowed for the next file.
    fn remaining(&self) -> u64 {
        self.limits.max_total_bytes.saturating_sub(self.total)
    }

    fn add_copied(&mut self, rel: &Path, copied: u64) -> Result<()> {
        if copied > self.remaining() {
            return Err(Error::Security(format!(
                "archive exceeds max_total_bytes while extracting: {}",
                rel.display()
            )));
        }
        self.total += copied;
        Ok(())
    }

    /// Record an entry; a repeated path keeps its first position.
    fn record(&mut self, rel: PathBuf, is_dir: bool) {
        if self.seen.insert(rel.clone()) {
            self.entries.push(ScratchEntry { rel, is_dir });
        }
    }
}

fn unpack(
    input: &[u8],
    kind: ArchiveKind,
    dest_dir: &Path,
    limits: ExtractLimits,
) -> Result<Vec<ScratchEntry>> {
    match kind {
        ArchiveKind::Zip => unpack_zip(input, dest_dir, limits),
        ArchiveKind::Tar => unpack_tar(input, dest_dir, limits),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(input), dest_dir, limits),
    }
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::UnpackFailed(format!("zip error: {e}"))
}

fn unpack_zip(input: &[u8], dest_dir: &Path, limits: ExtractLimits) -> Result<Vec<ScratchEntry>> {
    let mut zip = ZipArchive::new(Cursor::new(input)).map_err(zip_err)?;
    let mut tally = Tally::new(limits);

    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(zip_err)?;
        let name = entry.name().replace('\\', "/");
        if name.is_empty() {
            continue;
        }

        // Zip symlinks are commonly encoded via unix mode bits. Disallow them.
        if let Some(mode) = entry.unix_mode() {
            if mode & 0o170000 == 0o120000 {
                return Err(Error::Security(format!(
                    "archive contains symlink entry: {name}"
                )));
            }
        }

        let rel = sanitize_rel_path(Path::new(&name))?;
        if rel.as_os_str().is_empty() {
            if entry.is_dir() {
                continue;
            }
            return Err(Error::Security(format!("archive contains empty path: {name}")));
        }
        let out_path = dest_dir.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            tally.record(rel, true);
            continue;
        }

        tally.admit_file(&rel, entry.size())?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&out_path)?;
        // Enforce the bound even if zip metadata lies.
        let mut limited = entry.take(tally.remaining() + 1);
        let copied = io::copy(&mut limited, &mut out)?;
        tally.add_copied(&rel, copied)?;
        tally.record(rel, false);
    }

    Ok(tally.entries)
}

fn unpack_tar<R: Read>(r: R, dest_dir: &Path, limits: ExtractLimits) -> Result<Vec<ScratchEntry>> {
    let mut archive = Archive::new(r);
    let mut tally = Tally::new(limits);

    for entry in archive.entries()? {
        let entry = entry?;
        let entry_type = entry.header().entry_type();

        // Disallow symlinks/hardlinks/devices/etc.
        if !entry_type.is_file() && !entry_type.is_dir() {
            let p = entry
                .path()
                .ok()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(Error::Security(format!(
                "archive contains non-file/non-dir entry: {p}"
            )));
        }

        let rel = sanitize_rel_path(&entry.path()?)?;
        if rel.as_os_str().is_empty() {
            // `./`, written first by `tar -cf out.tar .`
            if entry_type.is_dir() {
                continue;
            }
            return Err(Error::Security("archive contains empty path".to_string()));
        }
        let out_path = dest_dir.join(&rel);

        if entry_type.is_dir() {
            fs::create_dir_all(&out_path)?;
            tally.record(rel, true);
            continue;
        }

        tally.admit_file(&rel, entry.header().size().unwrap_or(0))?;
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = fs::File::create(&out_path)?;
        let mut limited = entry.take(tally.remaining() + 1);
        let copied = io::copy(&mut limited, &mut out)?;
        tally.add_copied(&rel, copied)?;
        tally.record(rel, false);
    }

    Ok(tally.entries)
}

/// Relative path with `.` components dropped. Empty for a root-only path such as `./`.
fn sanitize_rel_path(p: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::Normal(os) => out.push(os),
            Component::ParentDir => {
                return Err(Error::Security(format!(
                    "archive contains path traversal: {}",
                    p.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Security(format!(
                    "archive contains absolute path: {}",
                    p.display()
                )));
            }
        }
    }

    Ok(out)
}

// ============== Repack ==============

fn repack(kind: ArchiveKind, root: &Path, entries: &[ScratchEntry]) -> io::Result<Vec<u8>> {
    match kind {
        ArchiveKind::Zip => repack_zip(root, entries),
        ArchiveKind::Tar => repack_tar(Vec::new(), root, entries),
        ArchiveKind::TarGz => {
            let gz = GzEncoder::new(Vec::new(), Compression::default());
            repack_tar(gz, root, entries)?.finish()
        }
    }
}

fn repack_zip(root: &Path, entries: &[ScratchEntry]) -> io::Result<Vec<u8>> {
    let to_io = |e: zip::result::ZipError| io::Error::new(io::ErrorKind::Other, e);
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    for entry in entries {
        let name = archive_name(&entry.rel);
        if entry.is_dir {
            zw.add_directory(name, options).map_err(to_io)?;
            continue;
        }
        zw.start_file(name, options).map_err(to_io)?;
        let mut f = fs::File::open(root.join(&entry.rel))?;
        io::copy(&mut f, &mut zw)?;
    }

    Ok(zw.finish().map_err(to_io)?.into_inner())
}

fn repack_tar<W: Write>(w: W, root: &Path, entries: &[ScratchEntry]) -> io::Result<W> {
    let mut builder = tar::Builder::new(w);
    builder.mode(tar::HeaderMode::Deterministic);

    for entry in entries {
        let src = root.join(&entry.rel);
        if entry.is_dir {
            builder.append_dir(&entry.rel, &src)?;
        } else {
            builder.append_path_with_name(&src, &entry.rel)?;
        }
    }

    builder.into_inner()
}
