//! Minimal ustar reader for snowball auto-extract.
//!
//! `PUT` with `X-Amz-Meta-Snowball-Auto-Extract: true` uploads a TAR archive
//! whose regular-file entries become individual objects. Only the header
//! fields needed for that (name, prefix, size, typeflag) are read; links,
//! devices, and pax extensions are skipped.

use bytes::Bytes;
use objvault_common::Error;

const BLOCK: usize = 512;

/// One extractable archive entry.
#[derive(Debug)]
pub struct TarEntry {
    pub name: String,
    pub data: Bytes,
}

/// Walk the archive and return its regular files in order.
pub fn entries(archive: &Bytes) -> Result<Vec<TarEntry>, Error> {
    let mut out = Vec::new();
    let mut offset = 0usize;

    while offset + BLOCK <= archive.len() {
        let header = &archive[offset..offset + BLOCK];
        if header.iter().all(|b| *b == 0) {
            // End-of-archive marker.
            break;
        }

        let size = parse_octal(&header[124..136])
            .ok_or_else(|| Error::InvalidArgument("corrupt tar header: size".into()))?;
        let typeflag = header[156];
        let name = entry_name(header)
            .ok_or_else(|| Error::InvalidArgument("corrupt tar header: name".into()))?;

        let data_start = offset + BLOCK;
        let data_end = data_start + size;
        if data_end > archive.len() {
            return Err(Error::InvalidArgument("truncated tar archive".into()));
        }

        // '0' and NUL are regular files; everything else (directories,
        // links, pax headers) is skipped over by size.
        if (typeflag == b'0' || typeflag == 0) && !name.is_empty() && !name.ends_with('/') {
            out.push(TarEntry {
                name,
                data: archive.slice(data_start..data_end),
            });
        }

        offset = data_start + size.div_ceil(BLOCK) * BLOCK;
    }

    Ok(out)
}

fn entry_name(header: &[u8]) -> Option<String> {
    let name = nul_str(&header[0..100])?;
    // ustar prefix field extends the name for deep paths.
    let magic = &header[257..262];
    if magic == b"ustar" {
        if let Some(prefix) = nul_str(&header[345..500]) {
            if !prefix.is_empty() {
                return Some(format!("{prefix}/{name}"));
            }
        }
    }
    Some(name)
}

fn nul_str(field: &[u8]) -> Option<String> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).ok().map(str::to_string)
}

fn parse_octal(field: &[u8]) -> Option<usize> {
    let text = nul_str(field)?;
    let text = text.trim_matches([' ', '\0']);
    if text.is_empty() {
        return Some(0);
    }
    usize::from_str_radix(text, 8).ok()
}
