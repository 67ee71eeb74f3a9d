use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipcwire_transport::Fd;

use crate::error::{CodecError, Result};
use crate::marker::Marker;
use crate::value::Value;

/// Encode a value into its wire bytes and the descriptors it carries.
///
/// Wire format (all integers native byte order):
/// ```text
/// value  := marker(4B) payload
/// INT64  := i64 (8B)            DOUBLE := f64 (8B)
/// STRING := len(4B) utf8 NUL    BYTES  := len(4B) raw
/// FD     := index(4B) into the returned descriptor list
/// ARRAY_START value* ARRAY_END
/// DICT_START (key value)* DICT_END
/// ```
///
/// Descriptors move out of the value into the returned list, in preorder.
pub fn encode(value: Value) -> Result<(Bytes, Vec<Fd>)> {
    let mut dst = BytesMut::new();
    let mut fds = Vec::new();
    let mut work = vec![Step::Value(value)];

    while let Some(step) = work.pop() {
        let mut value = match step {
            Step::Value(value) => value,
            Step::End(marker) => {
                dst.put_u32_ne(marker.as_u32());
                continue;
            }
        };
        match &mut value {
            Value::Null => dst.put_u32_ne(Marker::None.as_u32()),
            Value::Bool(false) => dst.put_u32_ne(Marker::False.as_u32()),
            Value::Bool(true) => dst.put_u32_ne(Marker::True.as_u32()),
            Value::Int(i) => {
                dst.put_u32_ne(Marker::Int64.as_u32());
                dst.put_i64_ne(*i);
            }
            Value::Double(d) => {
                dst.put_u32_ne(Marker::Double.as_u32());
                dst.put_f64_ne(*d);
            }
            Value::String(s) => {
                dst.put_u32_ne(Marker::String.as_u32());
                put_len(&mut dst, s.len(), "string")?;
                dst.put_slice(s.as_bytes());
                dst.put_u8(0);
            }
            Value::Bytes(b) => {
                dst.put_u32_ne(Marker::Bytes.as_u32());
                put_len(&mut dst, b.len(), "bytes")?;
                dst.put_slice(b);
            }
            Value::Array(items) => {
                dst.put_u32_ne(Marker::ArrayStart.as_u32());
                work.push(Step::End(Marker::ArrayEnd));
                work.extend(std::mem::take(items).into_iter().rev().map(Step::Value));
            }
            Value::Dict(pairs) => {
                dst.put_u32_ne(Marker::DictStart.as_u32());
                work.push(Step::End(Marker::DictEnd));
                for (key, value) in std::mem::take(pairs).into_iter().rev() {
                    work.push(Step::Value(value));
                    work.push(Step::Value(key));
                }
            }
            Value::Fd(fd) => {
                if !fd.is_owned() {
                    return Err(CodecError::encoder(format!(
                        "{fd} no longer owns its descriptor"
                    )));
                }
                let index = u32::try_from(fds.len())
                    .map_err(|_| CodecError::encoder("too many file descriptors"))?;
                dst.put_u32_ne(Marker::Fd.as_u32());
                dst.put_u32_ne(index);
                fds.push(fd.transfer());
            }
        }
    }

    Ok((dst.freeze(), fds))
}

enum Step {
    Value(Value),
    End(Marker),
}

fn put_len(dst: &mut BytesMut, len: usize, what: &str) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| CodecError::encoder(format!("{what} too long: {len} bytes")))?;
    dst.put_u32_ne(len);
    Ok(())
}

/// Decode a complete buffer, moving referenced descriptors into the value.
///
/// The whole buffer must be consumed. Descriptors that the value does not
/// reference are closed. Nesting depth is limited only by memory.
pub fn decode(mut src: &[u8], fds: Vec<Fd>) -> Result<Value> {
    let mut slots: Vec<Option<Fd>> = fds.into_iter().map(Some).collect();
    let mut open: Vec<Container> = Vec::new();

    let root = loop {
        let raw = read_u32(&mut src, "marker")?;
        let marker = Marker::from_u32(raw)
            .ok_or_else(|| CodecError::decoder(format!("unknown marker {raw}")))?;

        let value = match marker {
            Marker::False => Value::Bool(false),
            Marker::True => Value::Bool(true),
            Marker::None => Value::Null,
            Marker::Int64 => {
                ensure(&src, 8, "int64")?;
                Value::Int(src.get_i64_ne())
            }
            Marker::Double => {
                ensure(&src, 8, "double")?;
                Value::Double(src.get_f64_ne())
            }
            Marker::String => {
                let len = read_u32(&mut src, "string length")? as usize;
                ensure(&src, len + 1, "string")?;
                let text = std::str::from_utf8(&src[..len])
                    .map_err(|e| CodecError::decoder(format!("invalid utf-8 in string: {e}")))?
                    .to_owned();
                if src[len] != 0 {
                    return Err(CodecError::decoder("string is not NUL-terminated"));
                }
                src.advance(len + 1);
                Value::String(text)
            }
            Marker::Bytes => {
                let len = read_u32(&mut src, "bytes length")? as usize;
                ensure(&src, len, "bytes")?;
                let bytes = src[..len].to_vec();
                src.advance(len);
                Value::Bytes(bytes)
            }
            Marker::Fd => {
                let index = read_u32(&mut src, "fd index")? as usize;
                let count = slots.len();
                let slot = slots.get_mut(index).ok_or_else(|| {
                    CodecError::decoder(format!(
                        "fd index {index} out of range ({count} descriptors)"
                    ))
                })?;
                let fd = slot.take().ok_or_else(|| {
                    CodecError::decoder(format!("fd index {index} referenced twice"))
                })?;
                Value::Fd(fd)
            }
            Marker::ArrayStart => {
                open.push(Container::Array(Vec::new()));
                continue;
            }
            Marker::DictStart => {
                open.push(Container::Dict {
                    pairs: Vec::new(),
                    key: None,
                });
                continue;
            }
            Marker::ArrayEnd => match open.pop() {
                Some(Container::Array(items)) => Value::Array(items),
                _ => return Err(unexpected(marker)),
            },
            Marker::DictEnd => match open.pop() {
                Some(Container::Dict { pairs, key: None }) => Value::Dict(pairs),
                _ => return Err(unexpected(marker)),
            },
        };

        match open.last_mut() {
            None => break value,
            Some(Container::Array(items)) => items.push(value),
            Some(Container::Dict { pairs, key }) => match key.take() {
                None => *key = Some(value),
                Some(k) => pairs.push((k, value)),
            },
        }
    };

    if src.has_remaining() {
        return Err(CodecError::decoder(format!(
            "{} trailing bytes after value",
            src.remaining()
        )));
    }
    Ok(root)
}

enum Container {
    Array(Vec<Value>),
    Dict {
        pairs: Vec<(Value, Value)>,
        key: Option<Value>,
    },
}

fn unexpected(marker: Marker) -> CodecError {
    CodecError::decoder(format!("unexpected {marker} where a value was expected"))
}

fn ensure(src: &[u8], needed: usize, what: &str) -> Result<()> {
    if src.len() < needed {
        return Err(CodecError::decoder(format!(
            "truncated {what}: {needed} bytes needed, {} available",
            src.len()
        )));
    }
    Ok(())
}

fn read_u32(src: &mut &[u8], what: &str) -> Result<u32> {
    ensure(src, 4, what)?;
    Ok(src.get_u32_ne())
}
