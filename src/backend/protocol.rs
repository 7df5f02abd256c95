//! Framed wire protocol for talking to backend nodes
//!
//! The backend speaks a RESP-style text protocol: commands are arrays of
//! bulk strings, responses are simple strings, errors, integers, or bulk
//! strings. Only the five operations the cache core needs are modeled
//! (`GET`, `SET`, `DEL`, `DELPAT`, `PING`).

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// A single protocol frame, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Vec<Frame>),
}

impl Frame {
    /// Build a command frame from its parts, e.g. `["SET", key, value, ttl]`.
    pub fn command(parts: &[&str]) -> Frame {
        Frame::Array(
            parts
                .iter()
                .map(|p| Frame::Bulk(Some(p.to_string())))
                .collect(),
        )
    }

    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    pub fn pong() -> Frame {
        Frame::Simple("PONG".to_string())
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_slice(format!("+{}\r\n", s).as_bytes());
            }
            Frame::Error(e) => {
                dst.put_slice(format!("-{}\r\n", e).as_bytes());
            }
            Frame::Integer(i) => {
                dst.put_slice(format!(":{}\r\n", i).as_bytes());
            }
            Frame::Bulk(Some(s)) => {
                dst.put_slice(format!("${}\r\n{}\r\n", s.len(), s).as_bytes());
            }
            Frame::Bulk(None) => {
                dst.put_slice(b"$-1\r\n");
            }
            Frame::Array(items) => {
                dst.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode_into(dst);
                }
            }
        }
    }
}

/// Codec implementing `Decoder`/`Encoder` over the frame grammar.
pub struct WireCodec;

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse_frame(src)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

/// Parse one frame from `src`. Returns the frame and the number of bytes
/// it occupied, or `None` if the buffer does not yet hold a full frame.
fn parse_frame(src: &[u8]) -> io::Result<Option<(Frame, usize)>> {
    if src.is_empty() {
        return Ok(None);
    }

    match src[0] {
        b'+' => parse_line(src).map(|opt| {
            opt.map(|(line, consumed)| (Frame::Simple(line), consumed))
        }),
        b'-' => parse_line(src).map(|opt| {
            opt.map(|(line, consumed)| (Frame::Error(line), consumed))
        }),
        b':' => match parse_line(src)? {
            Some((line, consumed)) => {
                let value = line
                    .parse::<i64>()
                    .map_err(|_| invalid_data("invalid integer"))?;
                Ok(Some((Frame::Integer(value), consumed)))
            }
            None => Ok(None),
        },
        b'$' => parse_bulk(src),
        b'*' => parse_array(src),
        _ => Err(invalid_data("unknown frame type")),
    }
}

fn parse_line(src: &[u8]) -> io::Result<Option<(String, usize)>> {
    match find_crlf(src, 1) {
        Some(pos) => {
            let line = String::from_utf8_lossy(&src[1..pos]).to_string();
            Ok(Some((line, pos + 2)))
        }
        None => Ok(None),
    }
}

fn parse_bulk(src: &[u8]) -> io::Result<Option<(Frame, usize)>> {
    let (line, header_len) = match parse_line(src)? {
        Some(parsed) => parsed,
        None => return Ok(None),
    };
    let len = line
        .parse::<i64>()
        .map_err(|_| invalid_data("invalid bulk length"))?;

    if len == -1 {
        return Ok(Some((Frame::Bulk(None), header_len)));
    }
    if len < 0 {
        return Err(invalid_data("negative bulk length"));
    }

    let data_end = header_len + len as usize;
    let frame_end = data_end + 2;
    if src.len() < frame_end {
        return Ok(None);
    }
    if &src[data_end..frame_end] != b"\r\n" {
        return Err(invalid_data("bulk string missing terminator"));
    }

    let data = String::from_utf8_lossy(&src[header_len..data_end]).to_string();
    Ok(Some((Frame::Bulk(Some(data)), frame_end)))
}

fn parse_array(src: &[u8]) -> io::Result<Option<(Frame, usize)>> {
    let (line, header_len) = match parse_line(src)? {
        Some(parsed) => parsed,
        None => return Ok(None),
    };
    let count = line
        .parse::<i64>()
        .map_err(|_| invalid_data("invalid array length"))?;
    if count < 0 {
        return Ok(Some((Frame::Array(Vec::new()), header_len)));
    }

    let mut items = Vec::with_capacity(count as usize);
    let mut offset = header_len;
    for _ in 0..count {
        match parse_frame(&src[offset..])? {
            Some((item, consumed)) => {
                items.push(item);
                offset += consumed;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((Frame::Array(items), offset)))
}

fn find_crlf(src: &[u8], start: usize) -> Option<usize> {
    if src.len() < 2 {
        return None;
    }
    (start..src.len() - 1).find(|&i| src[i] == b'\r' && src[i + 1] == b'\n')
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
