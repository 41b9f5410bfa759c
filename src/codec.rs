//! Defines the DFS wire codec.
//!
//! A request body is one compact frame; the first `' '` or `'\0'` byte
//! decides its shape. Responses are plain text except `cat`/`snap`, which
//! return raw bytes. The shape-specific decoders below recover the typed
//! results of `df`, `stat`, `ls`, and the matrix-valued aggregates.


use std::net::IpAddr;

use crate::error::{Error, Result};

/// A decoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// No body at all.
    Empty,
    /// A single path (or other bare string).
    Path(String),
    /// A path, a NUL separator, and an uninterpreted binary payload.
    PathBlob(String, Vec<u8>),
    /// Two space-separated strings.
    PathString(String, String),
    /// A path with the trailing force marker (` !`).
    PathFlag(String, bool),
}

/// Decodes a request body into a [`Frame`].
///
/// The grammar is unambiguous: the first `' '` selects the two-field text
/// form, the first `'\0'` selects the path+blob form, and a body without
/// either terminator is a bare path. Truncated input cannot panic; text
/// fields that are not UTF-8 fail with [`Error::Decode`].
pub fn decode(body: &[u8]) -> Result<Frame> {
    if body.is_empty() {
        return Ok(Frame::Empty);
    }
    match body.iter().position(|b| *b == b' ' || *b == b'\0') {
        None => Ok(Frame::Path(utf8(body)?)),
        Some(at) if body[at] == b'\0' => {
            Ok(Frame::PathBlob(utf8(&body[..at])?, body[at + 1..].to_vec()))
        }
        Some(at) => {
            let path = utf8(&body[..at])?;
            let rest = &body[at + 1..];
            if rest == b"!" {
                Ok(Frame::PathFlag(path, true))
            } else {
                Ok(Frame::PathString(path, utf8(rest)?))
            }
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::Decode("text field is not valid utf-8".to_owned()))
}

/// Expects an empty body.
pub fn as_empty(frame: Frame) -> Result<()> {
    match frame {
        Frame::Empty => Ok(()),
        _ => Err(Error::Decode("expected an empty body".to_owned())),
    }
}

/// Expects a single path.
pub fn as_path(frame: Frame) -> Result<String> {
    match frame {
        Frame::Path(path) => Ok(path),
        _ => Err(Error::Decode("expected a single path".to_owned())),
    }
}

/// Expects either an empty body or a single path.
pub fn as_optional_path(frame: Frame) -> Result<Option<String>> {
    match frame {
        Frame::Empty => Ok(None),
        Frame::Path(path) => Ok(Some(path)),
        _ => Err(Error::Decode("expected an optional path".to_owned())),
    }
}

/// Expects a path with an optional trailing force marker.
pub fn as_flagged_path(frame: Frame) -> Result<(String, bool)> {
    match frame {
        Frame::Path(path) => Ok((path, false)),
        Frame::PathFlag(path, force) => Ok((path, force)),
        _ => Err(Error::Decode("expected a path with an optional force marker".to_owned())),
    }
}

/// Expects two space-separated strings.
pub fn as_pair(frame: Frame) -> Result<(String, String)> {
    match frame {
        Frame::PathString(first, second) => Ok((first, second)),
        _ => Err(Error::Decode("expected two space-separated paths".to_owned())),
    }
}

/// Expects a path followed by a binary payload.
pub fn as_blob(frame: Frame) -> Result<(String, Vec<u8>)> {
    match frame {
        Frame::PathBlob(path, blob) => Ok((path, blob)),
        _ => Err(Error::Decode("expected a path and a binary payload".to_owned())),
    }
}

/// Encodes a single path.
pub fn encode_path(path: &str) -> Vec<u8> {
    path.as_bytes().to_vec()
}

/// Encodes two space-separated strings.
pub fn encode_pair(first: &str, second: &str) -> Vec<u8> {
    format!("{first} {second}").into_bytes()
}

/// Encodes a path with the trailing force marker when `force` is set.
pub fn encode_flagged_path(path: &str, force: bool) -> Vec<u8> {
    if force {
        format!("{path} !").into_bytes()
    } else {
        path.as_bytes().to_vec()
    }
}

/// Encodes a path and a binary payload, NUL-separated. This is the only
/// frame that may carry non-UTF-8 bytes.
pub fn encode_blob(path: &str, blob: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(path.len() + 1 + blob.len());
    body.extend_from_slice(path.as_bytes());
    body.push(b'\0');
    body.extend_from_slice(blob);
    body
}

/// Encodes an ordered sequence as a space-joined string.
pub fn encode_list<S: AsRef<str>>(items: &[S]) -> Vec<u8> {
    items.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(" ").into_bytes()
}

/// Decodes a whitespace-separated list.
pub fn decode_list(body: &[u8]) -> Result<Vec<String>> {
    Ok(utf8(body)?.split_whitespace().map(str::to_owned).collect())
}

/// Encodes the `(total, used, free)` result of `df`.
pub fn encode_df(usage: (u64, u64, u64)) -> Vec<u8> {
    let (total, used, free) = usage;
    format!("{total} {used} {free}").into_bytes()
}

/// Decodes the `(total, used, free)` result of `df`.
pub fn decode_df(body: &[u8]) -> Result<(u64, u64, u64)> {
    let text = utf8(body)?;
    let mut fields = text.split_whitespace().map(|f| {
        f.parse::<u64>().map_err(|_| Error::Decode(format!("bad df field {f:?}")))
    });
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(total), Some(used), Some(free), None) => Ok((total?, used?, free?)),
        _ => Err(Error::Decode("df expects exactly three integers".to_owned())),
    }
}

/// Encodes the `(path, size, mode)` result of `stat`.
pub fn encode_stat(stat: &(String, u64, u32)) -> Vec<u8> {
    let (path, size, mode) = stat;
    format!("{path} {size} {mode}").into_bytes()
}

/// Decodes the `(path, size, mode)` result of `stat`.
pub fn decode_stat(body: &[u8]) -> Result<(String, u64, u32)> {
    let text = utf8(body)?;
    let mut fields = text.split_whitespace();
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(path), Some(size), Some(mode), None) => Ok((
            path.to_owned(),
            size.parse().map_err(|_| Error::Decode(format!("bad stat size {size:?}")))?,
            mode.parse().map_err(|_| Error::Decode(format!("bad stat mode {mode:?}")))?,
        )),
        _ => Err(Error::Decode("stat expects path, size and mode".to_owned())),
    }
}

/// Encodes a matrix: rows joined with `'\n'`, cells with `'\t'`.
pub fn encode_matrix(rows: &[Vec<String>]) -> Vec<u8> {
    rows.iter().map(|row| row.join("\t")).collect::<Vec<_>>().join("\n").into_bytes()
}

/// Decodes a matrix encoded by [`encode_matrix`].
pub fn decode_matrix(body: &[u8]) -> Result<Vec<Vec<String>>> {
    let text = utf8(body)?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(text.split('\n').map(|row| row.split('\t').map(str::to_owned).collect()).collect())
}

/// Decodes a `/nodes/join` handshake body.
///
/// The body is `"[public_url ][host:]port id"`. A missing host falls back to
/// the TCP source address of the request; this is the one place where the
/// name node learns how to call a data node back.
pub fn decode_join(body: &[u8], source_ip: IpAddr) -> Result<(Option<String>, String, String)> {
    let text = utf8(body)?;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let (public_url, endpoint, id) = match tokens.as_slice() {
        [endpoint, id] => (None, *endpoint, *id),
        [public_url, endpoint, id] => (Some((*public_url).to_owned()), *endpoint, *id),
        _ => return Err(Error::Decode("join expects \"[public_url ][host:]port id\"".to_owned())),
    };
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => (host.to_owned(), port),
        None => (source_ip.to_string(), endpoint),
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Decode(format!("bad port {port:?} in join request")));
    }
    Ok((public_url, format!("http://{host}:{port}/"), id.to_owned()))
}

/// Decodes an `/add_node` body: `"[public_url ]url id"`.
pub fn decode_add_node(body: &[u8]) -> Result<(Option<String>, String, String)> {
    let text = utf8(body)?;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [url, id] => Ok((None, (*url).to_owned(), (*id).to_owned())),
        [public_url, url, id] => {
            Ok((Some((*public_url).to_owned()), (*url).to_owned(), (*id).to_owned()))
        }
        _ => Err(Error::Decode("add_node expects \"[public_url ]url id\"".to_owned())),
    }
}
