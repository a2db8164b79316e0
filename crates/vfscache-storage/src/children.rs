//! Directory children codec
//!
//! ```text
//! count:INT | delta_1:INT | ... | delta_count:INT
//! child_i = child_(i-1) + delta_i,   child_0 = owning record id
//! ```

use crate::varint::{read_int, write_int};
use bytes::{Buf, Bytes, BytesMut};
use vfscache_common::{Error, RecordId, Result};

/// Codec for the children attribute payload
pub struct ChildrenCodec;

impl ChildrenCodec {
    fn read_count(buf: &mut &[u8]) -> Result<usize> {
        let count = read_int(buf)?;
        let count = usize::try_from(count)
            .map_err(|_| Error::corrupt(format!("negative child count {count}")))?;
        // Every delta takes at least one byte
        if count > buf.remaining() {
            return Err(Error::corrupt(format!(
                "child count {count} exceeds the {} bytes that follow",
                buf.remaining()
            )));
        }
        Ok(count)
    }

    /// Number of children, without decoding the ids
    pub fn count(raw: Option<&[u8]>) -> Result<usize> {
        match raw {
            None => Ok(0),
            Some(mut buf) => Self::read_count(&mut buf),
        }
    }

    /// Decode child ids in on-disk order
    pub fn decode(owner: RecordId, raw: Option<&[u8]>) -> Result<Vec<RecordId>> {
        let Some(mut buf) = raw else {
            return Ok(Vec::new());
        };

        let count = Self::read_count(&mut buf)?;
        let mut children = Vec::with_capacity(count);
        let mut previous = owner.get() as i32;
        for index in 0..count {
            let delta = read_int(&mut buf)?;
            previous = previous.wrapping_add(delta);
            let id = u32::try_from(previous)
                .ok()
                .filter(|&id| id != 0)
                .ok_or_else(|| {
                    Error::corrupt(format!(
                        "child {index} of record {owner} decodes to invalid id {previous}"
                    ))
                })?;
            children.push(RecordId::new(id));
        }
        Ok(children)
    }

    /// Encode child ids relative to their owner
    pub fn encode(owner: RecordId, children: &[RecordId]) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + children.len() * 2);
        write_int(&mut buf, children.len() as i32);
        let mut previous = owner.get() as i32;
        for child in children {
            let id = child.get() as i32;
            write_int(&mut buf, id.wrapping_sub(previous));
            previous = id;
        }
        buf.freeze()
    }
}
