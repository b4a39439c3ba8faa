//! Streaming tarball rewrite.
//!
//! Reads a (optionally gzipped) package tarball and writes a new tarball in
//! which the manifest entry has been sanitized for republishing. Every other
//! record, including GNU long-name and PAX extension records, is copied
//! through with its original header bytes and payload. The one exception is
//! a PAX `size` key in front of the manifest, which is dropped so the
//! rewritten header size applies.
//!
//! Only the manifest and extension record payloads are ever buffered. All
//! other payloads are copied from the decoder straight into the output, so
//! memory use does not grow with the size of the archive.

use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::Path;

use anyhow::Context;
use flate2::read::MultiGzDecoder;
use flate2::{Compression, GzBuilder};
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, Header};
use thiserror::Error;

use crate::core::manifest::{sanitize, Manifest, MANIFEST_NAME};

/// Gzip member magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on the manifest payload we are willing to buffer.
pub const MAX_MANIFEST_BYTES: u64 = 8 * 1024 * 1024;

/// Framing applied to the rewritten archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    /// Gzip-compressed tar (`.tgz`), what `npm publish` expects.
    #[default]
    Gzip,
    /// Plain tar.
    None,
}

impl OutputCompression {
    /// Conventional file extension, including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputCompression::Gzip => ".tgz",
            OutputCompression::None => ".tar",
        }
    }
}

impl std::str::FromStr for OutputCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gzip" | "gz" => Ok(OutputCompression::Gzip),
            "none" | "tar" => Ok(OutputCompression::None),
            _ => Err(format!(
                "invalid output compression '{}'; expected 'gzip' or 'none'",
                s
            )),
        }
    }
}

/// Options for a single rewrite.
#[derive(Debug, Clone)]
pub struct RewriteOptions {
    /// File name (last path component) of the manifest entry.
    pub manifest_name: String,

    /// Output framing.
    pub compression: OutputCompression,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        RewriteOptions {
            manifest_name: MANIFEST_NAME.to_string(),
            compression: OutputCompression::Gzip,
        }
    }
}

/// Details of the manifest entry that was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenManifest {
    /// Full path of the entry inside the archive.
    pub path: String,
    /// Payload size before the rewrite.
    pub original_size: u64,
    /// Payload size after the rewrite.
    pub size: u64,
    /// `name` field of the manifest.
    pub name: Option<String>,
    /// `version` field of the manifest.
    pub version: Option<String>,
}

/// What a rewrite did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    /// Number of archive members (extension records not included).
    pub entries: usize,
    /// Number of GNU long-name/long-link and PAX records passed through.
    pub extension_records: usize,
    /// The replaced manifest entry.
    pub manifest: Option<RewrittenManifest>,
}

/// Errors from rewriting an archive.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The input could not be decompressed or read as tar, or the output
    /// could not be written.
    #[error("archive stream error: {0}")]
    Archive(#[from] io::Error),

    /// The manifest entry is not valid JSON.
    #[error("malformed manifest `{path}`: {source}")]
    MalformedManifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest entry is larger than we are willing to buffer.
    #[error("manifest `{path}` is too large ({size} bytes)")]
    ManifestTooLarge { path: String, size: u64 },

    /// No entry carried the manifest file name.
    #[error("archive has no `{name}` entry")]
    ManifestMissing { name: String },

    /// The sanitized manifest could not be serialized.
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Rewrite a package tarball from `input` into `output`.
///
/// Gzip framing on the input is detected from its magic bytes. Output
/// framing follows `opts.compression`. The output archive is finalized only
/// after the input reports its end-of-archive; on error the output must be
/// discarded.
pub fn rewrite<R: Read, W: Write>(
    input: R,
    output: W,
    opts: &RewriteOptions,
) -> Result<RewriteSummary, RewriteError> {
    let reader = decode_input(input)?;

    match opts.compression {
        OutputCompression::Gzip => {
            let encoder = GzBuilder::new()
                .mtime(0)
                .operating_system(255)
                .write(output, Compression::default());
            let (summary, encoder) = rewrite_tar(reader, encoder, opts)?;
            encoder.finish()?;
            Ok(summary)
        }
        OutputCompression::None => {
            let (summary, mut output) = rewrite_tar(reader, output, opts)?;
            output.flush()?;
            Ok(summary)
        }
    }
}

/// Rewrite a tarball on disk.
///
/// The archive is written to a temporary file next to `output` and moved
/// into place only once the rewrite has succeeded, so a failed rewrite never
/// leaves an archive behind.
pub fn rewrite_file(
    input: &Path,
    output: &Path,
    opts: &RewriteOptions,
) -> anyhow::Result<RewriteSummary> {
    let reader = File::open(input)
        .with_context(|| format!("failed to open archive: {}", input.display()))?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".ferry-")
        .suffix(opts.compression.extension())
        .tempfile_in(dir)
        .with_context(|| format!("failed to create archive in {}", dir.display()))?;

    let summary = {
        let mut writer = BufWriter::new(staged.as_file_mut());
        let summary = rewrite(reader, &mut writer, opts)
            .with_context(|| format!("failed to rewrite {}", input.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write archive: {}", output.display()))?;
        summary
    };

    staged
        .persist(output)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to create archive: {}", output.display()))?;

    Ok(summary)
}

/// Wrap the input in a gzip decoder if it starts with the gzip magic.
fn decode_input<'a, R: Read + 'a>(mut input: R) -> io::Result<Box<dyn Read + 'a>> {
    let mut head = [0u8; 2];
    let mut filled = 0;
    while filled < head.len() {
        match input.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let is_gzip = filled == head.len() && head == GZIP_MAGIC;
    let rejoined = Cursor::new(head[..filled].to_vec()).chain(input);

    if is_gzip {
        Ok(Box::new(MultiGzDecoder::new(rejoined)))
    } else {
        Ok(Box::new(rejoined))
    }
}

fn rewrite_tar<R: Read, W: Write>(
    reader: R,
    writer: W,
    opts: &RewriteOptions,
) -> Result<(RewriteSummary, W), RewriteError> {
    let mut archive = Archive::new(reader);
    let mut builder = Builder::new(writer);
    let mut summary = RewriteSummary::default();

    // Extension records for the next member. They are held back until that
    // member is seen, since a PAX `size` in front of the manifest has to go.
    let mut held: Vec<(Header, Vec<u8>)> = Vec::new();
    // Path announced by a GNU long-name or PAX record for the next member.
    let mut long_path: Option<Vec<u8>> = None;

    for entry in archive.entries()?.raw(true) {
        let mut entry = entry?;
        let header = entry.header().clone();
        let kind = header.entry_type();

        if kind.is_gnu_longname()
            || kind.is_gnu_longlink()
            || kind.is_pax_local_extensions()
            || kind.is_pax_global_extensions()
        {
            let data = read_small(&mut entry)?;
            summary.extension_records += 1;

            let announced = if kind.is_gnu_longname() {
                Some(trim_nul(&data).to_vec())
            } else if kind.is_pax_local_extensions() {
                pax_value(&data, "path")
            } else {
                None
            };
            if announced.is_some() {
                long_path = announced;
            }
            held.push((header, data));
            continue;
        }

        summary.entries += 1;
        let path = long_path
            .take()
            .unwrap_or_else(|| header.path_bytes().into_owned());

        let is_manifest = summary.manifest.is_none()
            && kind.is_file()
            && base_name(&path) == opts.manifest_name.as_bytes();

        if !is_manifest {
            for (ext, data) in held.drain(..) {
                builder.append(&ext, data.as_slice())?;
            }
            builder.append(&header, &mut entry)?;
            continue;
        }

        let path = String::from_utf8_lossy(&path).into_owned();
        let original_size = header.size()?;
        if original_size > MAX_MANIFEST_BYTES {
            return Err(RewriteError::ManifestTooLarge {
                path,
                size: original_size,
            });
        }

        let raw = read_small(&mut entry)?;
        let mut manifest =
            Manifest::from_slice(&raw).map_err(|source| RewriteError::MalformedManifest {
                path: path.clone(),
                source,
            })?;
        sanitize(&mut manifest);
        let body = manifest.to_pretty_vec().map_err(RewriteError::Serialize)?;

        for (mut ext, data) in held.drain(..) {
            let data = if ext.entry_type().is_pax_local_extensions() {
                match pax_without(&data, "size") {
                    Some(stripped) => {
                        ext.set_size(stripped.len() as u64);
                        ext.set_cksum();
                        stripped
                    }
                    None => data,
                }
            } else {
                data
            };
            builder.append(&ext, data.as_slice())?;
        }

        let mut new_header = header.clone();
        new_header.set_size(body.len() as u64);
        new_header.set_cksum();
        builder.append(&new_header, body.as_slice())?;

        tracing::debug!(
            "rewrote {} ({} -> {} bytes)",
            path,
            original_size,
            body.len()
        );

        summary.manifest = Some(RewrittenManifest {
            path,
            original_size,
            size: body.len() as u64,
            name: manifest.name().map(str::to_string),
            version: manifest.version().map(str::to_string),
        });
    }

    for (ext, data) in held.drain(..) {
        builder.append(&ext, data.as_slice())?;
    }

    // Drain padding and the gzip trailer so a truncated stream is an error.
    io::copy(&mut archive.into_inner(), &mut io::sink())?;

    if summary.manifest.is_none() {
        return Err(RewriteError::ManifestMissing {
            name: opts.manifest_name.clone(),
        });
    }

    let writer = builder.into_inner()?;
    Ok((summary, writer))
}

fn read_small<R: Read>(entry: &mut R) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Last `/`-separated component of an archive path.
fn base_name(path: &[u8]) -> &[u8] {
    let trimmed = match path.last() {
        Some(b'/') => &path[..path.len() - 1],
        _ => path,
    };
    match trimmed.iter().rposition(|&b| b == b'/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

fn trim_nul(data: &[u8]) -> &[u8] {
    match data.iter().position(|&b| b == 0) {
        Some(i) => &data[..i],
        None => data,
    }
}

/// Split a PAX extended header payload into `(record, key, value)` triples.
///
/// Records have the form `"<len> <key>=<value>\n"`, where `<len>` counts the
/// whole record including itself. Parsing stops at the first malformed
/// record.
fn pax_records(data: &[u8]) -> Vec<(&[u8], &[u8], &[u8])> {
    let mut records = Vec::new();
    let mut rest = data;

    while !rest.is_empty() {
        let Some(space) = rest.iter().position(|&b| b == b' ') else {
            break;
        };
        let Some(len) = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|n| n.parse::<usize>().ok())
        else {
            break;
        };
        if len <= space || len > rest.len() {
            break;
        }

        let body = &rest[space + 1..len];
        let body = body.strip_suffix(b"\n").unwrap_or(body);
        if let Some(eq) = body.iter().position(|&b| b == b'=') {
            records.push((&rest[..len], &body[..eq], &body[eq + 1..]));
        }

        rest = &rest[len..];
    }

    records
}

/// Value of the last `key` record in a PAX payload.
fn pax_value(data: &[u8], key: &str) -> Option<Vec<u8>> {
    pax_records(data)
        .into_iter()
        .filter(|(_, k, _)| *k == key.as_bytes())
        .last()
        .map(|(_, _, v)| v.to_vec())
}

/// The PAX payload with every `key` record removed, or `None` if it had none.
fn pax_without(data: &[u8], key: &str) -> Option<Vec<u8>> {
    let records = pax_records(data);
    if !records.iter().any(|(_, k, _)| *k == key.as_bytes()) {
        return None;
    }

    let mut kept = Vec::with_capacity(data.len());
    for (record, k, _) in records {
        if k != key.as_bytes() {
            kept.extend_from_slice(record);
        }
    }
    Some(kept)
}
