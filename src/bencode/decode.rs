//! Bencode decoder
//!
//! Works on a byte slice with an explicit cursor; byte strings are copied
//! verbatim and may hold any bytes, including NUL.

use std::collections::BTreeMap;
use tracing::trace;

use super::value::Value;
use crate::error::BencodeError;

/// Maximum list/dict nesting accepted before bailing out
pub const MAX_DEPTH: usize = 64;

/// Decodes exactly one value spanning the whole buffer.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let (value, consumed) = decode_at(data, 0)?;
    if consumed != data.len() {
        return Err(BencodeError::TrailingData { position: consumed });
    }
    Ok(value)
}

/// Decodes one value starting at `position`.
///
/// Returns the value and the number of bytes it occupied.
pub fn decode_at(data: &[u8], position: usize) -> Result<(Value, usize), BencodeError> {
    trace!("Decoding bencode value at offset {} of {}", position, data.len());
    let mut decoder = Decoder { data, pos: position, depth: 0 };
    let value = decoder.value()?;
    Ok((value, decoder.pos - position))
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn value(&mut self) -> Result<Value, BencodeError> {
        match self.peek() {
            None => Err(BencodeError::UnexpectedEof { position: self.pos }),
            Some(b'0'..=b'9') => self.bytes().map(Value::Bytes),
            Some(b'i') => self.integer(),
            Some(b'l') => self.list(),
            Some(b'd') => self.dict(),
            Some(tag) => Err(BencodeError::UnsupportedTag { position: self.pos, tag }),
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>, BencodeError> {
        let start = self.pos;
        let colon = self.data[start..]
            .iter()
            .position(|&b| !b.is_ascii_digit())
            .map(|offset| start + offset)
            .filter(|&idx| self.data[idx] == b':')
            .ok_or(BencodeError::MalformedLength { position: start })?;

        // Only ASCII digits precede the colon
        let length: usize = std::str::from_utf8(&self.data[start..colon])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(BencodeError::MalformedLength { position: start })?;

        let body = colon + 1;
        let end = body
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or(BencodeError::UnexpectedEof { position: self.data.len() })?;

        self.pos = end;
        Ok(self.data[body..end].to_vec())
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        let start = self.pos;
        let digits_start = start + 1;
        let mut idx = digits_start;
        loop {
            match self.data.get(idx) {
                None => return Err(BencodeError::UnexpectedEof { position: idx }),
                Some(b'e') => break,
                Some(b'-') | Some(b'0'..=b'9') => idx += 1,
                Some(_) => return Err(BencodeError::MalformedInteger { position: idx }),
            }
        }

        let text = &self.data[digits_start..idx];
        let malformed = BencodeError::MalformedInteger { position: start };
        let digits = text.strip_prefix(b"-").unwrap_or(text);
        if digits.is_empty() || digits.contains(&b'-') {
            return Err(malformed);
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(malformed);
        }
        if text.len() != digits.len() && digits == b"0" {
            return Err(malformed);
        }

        let value: i64 = std::str::from_utf8(text)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(malformed)?;

        self.pos = idx + 1;
        Ok(Value::Integer(value))
    }

    fn enter(&mut self) -> Result<(), BencodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(BencodeError::NestingTooDeep { position: self.pos });
        }
        Ok(())
    }

    fn list(&mut self) -> Result<Value, BencodeError> {
        let start = self.pos;
        self.enter()?;
        self.pos += 1;

        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(BencodeError::UnterminatedList { position: start }),
                Some(b'e') => break,
                Some(_) => items.push(self.value()?),
            }
        }

        self.pos += 1;
        self.depth -= 1;
        Ok(Value::List(items))
    }

    fn dict(&mut self) -> Result<Value, BencodeError> {
        let start = self.pos;
        self.enter()?;
        self.pos += 1;

        let mut entries = BTreeMap::new();
        loop {
            match self.peek() {
                None => return Err(BencodeError::UnterminatedDict { position: start }),
                Some(b'e') => break,
                Some(b'0'..=b'9') => {
                    let key = self.bytes()?;
                    if self.peek().is_none() {
                        return Err(BencodeError::UnterminatedDict { position: start });
                    }
                    let value = self.value()?;
                    entries.insert(key, value);
                }
                Some(_) => return Err(BencodeError::NonStringKey { position: self.pos }),
            }
        }

        self.pos += 1;
        self.depth -= 1;
        Ok(Value::Dict(entries))
    }
}
