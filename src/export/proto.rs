//! Minimal protobuf wire encoding for the ONNX message subset we emit.

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// An encoded protobuf message under construction.
#[derive(Debug, Default, Clone)]
pub(crate) struct Message {
    buf: Vec<u8>,
}

impl Message {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn key(&mut self, field: u32, wire: u8) {
        write_varint(&mut self.buf, (u64::from(field) << 3) | u64::from(wire));
    }

    pub(crate) fn int64(mut self, field: u32, value: i64) -> Self {
        self.key(field, WIRE_VARINT);
        write_varint(&mut self.buf, value as u64);
        self
    }

    /// Repeated int64, one tag per element.
    pub(crate) fn int64s(mut self, field: u32, values: &[i64]) -> Self {
        for &value in values {
            self = self.int64(field, value);
        }
        self
    }

    pub(crate) fn float(mut self, field: u32, value: f32) -> Self {
        self.key(field, WIRE_FIXED32);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub(crate) fn bytes(mut self, field: u32, value: &[u8]) -> Self {
        self.key(field, WIRE_LEN);
        write_varint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
        self
    }

    pub(crate) fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    pub(crate) fn message(self, field: u32, value: Message) -> Self {
        self.bytes(field, &value.buf)
    }

    pub(crate) fn messages(mut self, field: u32, values: Vec<Message>) -> Self {
        for value in values {
            self = self.message(field, value);
        }
        self
    }
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decoded field value, for inspecting emitted models in tests.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Field<'a> {
    Varint(u64),
    Fixed32([u8; 4]),
    Bytes(&'a [u8]),
}

/// Split one message into `(field, value)` pairs; `None` on malformed input.
#[cfg(test)]
pub(crate) fn parse(mut data: &[u8]) -> Option<Vec<(u32, Field<'_>)>> {
    fn varint(data: &mut &[u8]) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let (&byte, rest) = data.split_first()?;
            *data = rest;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    let mut fields = Vec::new();
    while !data.is_empty() {
        let key = varint(&mut data)?;
        let field = (key >> 3) as u32;
        let value = match (key & 0x7) as u8 {
            WIRE_VARINT => Field::Varint(varint(&mut data)?),
            WIRE_FIXED32 => {
                let (head, rest) = data.split_at_checked(4)?;
                data = rest;
                Field::Fixed32(head.try_into().ok()?)
            }
            WIRE_LEN => {
                let len = varint(&mut data)? as usize;
                let (head, rest) = data.split_at_checked(len)?;
                data = rest;
                Field::Bytes(head)
            }
            _ => return None,
        };
        fields.push((field, value));
    }
    Some(fields)
}
