//! Test fixtures for common test scenarios.
//!
//! Package tarballs are built in memory with the `tar` crate using GNU
//! headers, a fixed mtime and root ownership, so two builds of the same
//! fixture are byte-identical.

use std::io::{self, Read};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tar::{Archive, Builder, EntryType, Header};

/// Modification time stamped on every fixture entry.
pub const FIXTURE_MTIME: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
enum FixtureEntry {
    File {
        path: String,
        data: Vec<u8>,
        mode: u32,
    },
    Dir {
        path: String,
    },
    Pax {
        records: Vec<u8>,
    },
}

/// An in-memory package tarball.
#[derive(Debug, Clone, Default)]
pub struct TarballFixture {
    entries: Vec<FixtureEntry>,
}

impl TarballFixture {
    /// Create an empty fixture.
    pub fn new() -> Self {
        TarballFixture::default()
    }

    /// A typical npm package: a compact `package/package.json`, an entry
    /// point and a readme, in that order.
    pub fn npm_package(manifest: Value) -> Self {
        let body = serde_json::to_vec(&manifest).unwrap();
        TarballFixture::new()
            .file("package/package.json", &body)
            .file("package/index.js", b"module.exports = require('./lib');\n")
            .file("package/README.md", b"# fixture\n")
    }

    /// Add a regular file with mode 0644.
    pub fn file(self, path: &str, data: &[u8]) -> Self {
        self.file_with_mode(path, data, 0o644)
    }

    /// Add a regular file with an explicit mode.
    pub fn file_with_mode(mut self, path: &str, data: &[u8], mode: u32) -> Self {
        self.entries.push(FixtureEntry::File {
            path: path.to_string(),
            data: data.to_vec(),
            mode,
        });
        self
    }

    /// Add a directory entry.
    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(FixtureEntry::Dir {
            path: path.to_string(),
        });
        self
    }

    /// Add a PAX extended header record applying to the next entry.
    pub fn pax(mut self, records: &[(&str, &str)]) -> Self {
        let mut data = Vec::new();
        for (key, value) in records {
            data.extend_from_slice(&pax_record(key, value));
        }
        self.entries.push(FixtureEntry::Pax { records: data });
        self
    }

    /// Serialize as an uncompressed tar.
    pub fn to_tar(&self) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());

        for entry in &self.entries {
            let mut header = Header::new_gnu();
            header.set_mtime(FIXTURE_MTIME);
            header.set_uid(0);
            header.set_gid(0);

            match entry {
                FixtureEntry::File { path, data, mode } => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(*mode);
                    header.set_size(data.len() as u64);
                    builder
                        .append_data(&mut header, path, data.as_slice())
                        .unwrap();
                }
                FixtureEntry::Dir { path } => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    builder.append_data(&mut header, path, io::empty()).unwrap();
                }
                FixtureEntry::Pax { records } => {
                    let mut header = Header::new_ustar();
                    header.set_mtime(FIXTURE_MTIME);
                    header.set_entry_type(EntryType::XHeader);
                    header.set_mode(0o644);
                    header.set_path("././@PaxHeader").unwrap();
                    header.set_size(records.len() as u64);
                    header.set_cksum();
                    builder.append(&header, records.as_slice()).unwrap();
                }
            }
        }

        builder.into_inner().unwrap()
    }

    /// Serialize as a gzip-compressed tar.
    pub fn to_tgz(&self) -> Vec<u8> {
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.to_tar()).unwrap();
        encoder.finish().unwrap()
    }
}

/// Encode one `"<len> <key>=<value>\n"` PAX record.
fn pax_record(key: &str, value: &str) -> Vec<u8> {
    // space, '=' and newline
    let body = key.len() + value.len() + 3;
    let mut len = body;
    loop {
        let total = body + len.to_string().len();
        if total == len {
            break;
        }
        len = total;
    }
    format!("{len} {key}={value}\n").into_bytes()
}

/// One tar record as it appears on the wire.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// The 512 header bytes.
    pub header: Vec<u8>,
    /// Path stored in the header itself (extension records not applied).
    pub path: String,
    /// Payload.
    pub data: Vec<u8>,
    pub size: u64,
    pub mode: u32,
    pub mtime: u64,
}

/// Every record of an uncompressed tar, extension records included.
pub fn read_raw_entries(tar: &[u8]) -> Vec<RawEntry> {
    let mut archive = Archive::new(tar);
    let mut out = Vec::new();

    for entry in archive.entries().unwrap().raw(true) {
        let mut entry = entry.unwrap();
        let header = entry.header().clone();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();

        out.push(RawEntry {
            header: header.as_bytes().to_vec(),
            path: String::from_utf8_lossy(&header.path_bytes()).into_owned(),
            data,
            size: header.size().unwrap(),
            mode: header.mode().unwrap(),
            mtime: header.mtime().unwrap(),
        });
    }

    out
}

/// Decompress a (possibly multi-member) gzip stream.
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pax_record_length_counts_itself() {
        assert_eq!(pax_record("size", "1"), b"9 size=1\n");
        assert_eq!(pax_record("size", "29"), b"11 size=29\n");
        let long = "x".repeat(95);
        let record = pax_record("path", &long);
        assert_eq!(record.len(), 105);
        assert!(record.starts_with(b"105 path="));
    }

    #[test]
    fn test_npm_package_layout() {
        let fixture = TarballFixture::npm_package(json!({"name": "acme-widgets"}));
        let entries = read_raw_entries(&fixture.to_tar());

        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["package/package.json", "package/index.js", "package/README.md"]
        );
        assert_eq!(entries[0].data, br#"{"name":"acme-widgets"}"#);
        assert_eq!(entries[0].mtime, FIXTURE_MTIME);
        assert_eq!(entries[0].mode, 0o644);
    }

    #[test]
    fn test_fixture_is_reproducible() {
        let fixture = TarballFixture::new()
            .file("a.txt", b"a")
            .file_with_mode("bin/run", b"#!/bin/sh\n", 0o755);

        assert_eq!(fixture.to_tar(), fixture.to_tar());
        assert_eq!(gunzip(&fixture.to_tgz()), fixture.to_tar());
    }

    #[test]
    fn test_long_path_emits_extension_record() {
        let long = format!("package/{}/x.js", "d".repeat(120));
        let entries = read_raw_entries(&TarballFixture::new().file(&long, b"x").to_tar());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].header[156], b'L');
        assert_eq!(entries[1].data, b"x");
    }
}
