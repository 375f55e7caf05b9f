//! Binary serialization of test cases.
//!
//! The wire form is little-endian, length-prefixed, and self-describing:
//!
//! ```text
//! TestCase     := u32 call_count, FunctionCall * call_count
//! FunctionCall := u32 func_id, Value receiver, u8 is_ctor,
//!                 u32 arg_count, Value * arg_count
//! Value        := u8 kind, kind-specific payload
//! ```
//!
//! Both sides additionally maintain a rolling index over value slots: the
//! receiver and every argument occupy one slot each, and one return-value
//! slot is reserved per call between the receiver and the arguments. A value
//! handle that reappears is written as a back-reference (kind 8) to its
//! previous slot, and a placeholder targeting call `k` is written as a
//! back-reference to call `k`'s reserved return slot. This keeps array
//! identity and return-value references intact across the AFL boundary.

use crate::pool::ObjectPool;
use crate::testcase::{FunctionCall, TestCase};
use crate::value::{ValueData, ValueId, ValueKind};
use std::collections::HashMap;
use thiserror::Error;

/// Errors produced while decoding a test case. All of them are fatal for
/// the test case at hand.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("test case truncated at offset {0}")]
    UnexpectedEof(usize),

    #[error("unknown value kind tag {tag} at offset {offset}")]
    UnknownKind { tag: u8, offset: usize },

    #[error("back-reference to unassigned value slot {slot}")]
    BadBackref { slot: usize },

    #[error("count {count} at offset {offset} exceeds the remaining input")]
    CountOverflow { count: u32, offset: usize },
}

/// Serializes `tc` to its wire form. Encoding is total over well-formed
/// test cases; a placeholder referencing a call that does not precede it is
/// an invariant violation and panics.
pub fn encode(pool: &ObjectPool, tc: &TestCase) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(&mut out, pool, tc);
    out
}

/// Serializes `tc`, appending to `out`.
pub fn encode_into(out: &mut Vec<u8>, pool: &ObjectPool, tc: &TestCase) {
    let mut encoder = Encoder {
        out,
        pool,
        seen: HashMap::new(),
        return_slots: Vec::with_capacity(tc.len()),
        next_slot: 0,
    };
    encoder.test_case(tc);
}

/// Deserializes one test case from `bytes` into `pool`. Trailing bytes
/// after the final call are ignored.
pub fn decode(bytes: &[u8], pool: &mut ObjectPool) -> Result<TestCase, DecodeError> {
    let mut decoder = Decoder {
        bytes,
        pos: 0,
        pool,
        slots: Vec::new(),
        call_index: 0,
    };
    decoder.test_case()
}

struct Encoder<'a> {
    out: &'a mut Vec<u8>,
    pool: &'a ObjectPool,
    /// Slot index assigned to each slot-occupying value handle, keyed by
    /// the first slot the handle appeared in.
    seen: HashMap<ValueId, u32>,
    /// Reserved return-value slot per call.
    return_slots: Vec<u32>,
    next_slot: u32,
}

impl Encoder<'_> {
    fn test_case(&mut self, tc: &TestCase) {
        self.u32(tc.len() as u32);
        for call in tc.calls() {
            self.call(call);
        }
    }

    fn call(&mut self, call: &FunctionCall) {
        self.u32(call.func_id);
        self.slot_value(call.this);
        // The return-value slot sits between the receiver and the
        // arguments; nothing is written for it.
        let slot = self.alloc_slot();
        self.return_slots.push(slot);
        self.out.push(call.is_constructor as u8);
        self.u32(call.args.len() as u32);
        for &arg in &call.args {
            self.slot_value(arg);
        }
    }

    /// Encodes a slot-occupying value (a receiver or an argument).
    fn slot_value(&mut self, value: ValueId) {
        let slot = self.alloc_slot();
        if self.backref(value) {
            return;
        }
        self.seen.insert(value, slot);
        self.value_body(value);
    }

    /// Encodes a value in nested position (an array element). Nested values
    /// occupy no slot and are not registered for back-references, so two
    /// interned siblings serialize as two full payloads.
    fn nested_value(&mut self, value: ValueId) {
        if self.backref(value) {
            return;
        }
        self.value_body(value);
    }

    /// Emits a kind-8 back-reference when `value` calls for one. True when
    /// something was written.
    fn backref(&mut self, value: ValueId) -> bool {
        let slot = match self.pool.data(value) {
            ValueData::Placeholder(target) => match self.return_slots.get(*target) {
                Some(&slot) => slot,
                None => panic!(
                    "placeholder references call {} which has not been serialized",
                    target
                ),
            },
            _ => match self.seen.get(&value) {
                Some(&slot) => slot,
                None => return false,
            },
        };
        self.out.push(ValueKind::Placeholder.wire_tag());
        self.u32(slot);
        true
    }

    fn value_body(&mut self, value: ValueId) {
        let data = self.pool.data(value);
        self.out.push(data.kind().wire_tag());
        match data {
            ValueData::Undefined | ValueData::Null => {}
            ValueData::Boolean(b) => self.out.push(*b as u8),
            ValueData::String(bytes) => {
                self.u32(bytes.len() as u32);
                self.out.extend_from_slice(bytes);
            }
            ValueData::Function(func_id) => self.u32(*func_id),
            ValueData::Integer(x) => self.u32(*x as u32),
            ValueData::Float(x) => self.out.extend_from_slice(&x.to_le_bytes()),
            ValueData::Array(elements) => {
                self.u32(elements.len() as u32);
                for &element in elements {
                    self.nested_value(element);
                }
            }
            // Handled by `backref` before we get here.
            ValueData::Placeholder(_) => unreachable!(),
        }
    }

    fn alloc_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }
}

/// One entry of the decoder's slot vector.
enum Slot {
    /// A decoded receiver or argument.
    Value(ValueId),
    /// The reserved return slot of the call at this index.
    Return(usize),
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    pool: &'a mut ObjectPool,
    slots: Vec<Slot>,
    call_index: usize,
}

impl Decoder<'_> {
    fn test_case(&mut self) -> Result<TestCase, DecodeError> {
        let call_count = self.counted_u32()? as usize;
        let mut tc = TestCase::new();
        for index in 0..call_count {
            self.call_index = index;
            let call = self.call()?;
            tc.push_call(call);
        }
        Ok(tc)
    }

    fn call(&mut self) -> Result<FunctionCall, DecodeError> {
        let func_id = self.u32()?;
        let this = self.slot_value()?;
        self.slots.push(Slot::Return(self.call_index));
        let is_constructor = self.u8()? != 0;
        let arg_count = self.counted_u32()? as usize;

        let mut call = FunctionCall::new(func_id, this);
        call.is_constructor = is_constructor;
        call.args.reserve(arg_count);
        for _ in 0..arg_count {
            let arg = self.slot_value()?;
            call.args.push(arg);
        }
        Ok(call)
    }

    /// Decodes a slot-occupying value and records it in the slot vector.
    fn slot_value(&mut self) -> Result<ValueId, DecodeError> {
        let value = self.value()?;
        self.slots.push(Slot::Value(value));
        Ok(value)
    }

    fn value(&mut self) -> Result<ValueId, DecodeError> {
        let offset = self.pos;
        let tag = self.u8()?;
        let kind = ValueKind::from_wire_tag(tag)
            .ok_or(DecodeError::UnknownKind { tag, offset })?;
        Ok(match kind {
            ValueKind::Undefined => self.pool.undefined(),
            ValueKind::Null => self.pool.null(),
            ValueKind::Boolean => {
                let value = self.u8()? != 0;
                self.pool.boolean(value)
            }
            ValueKind::String => {
                let len = self.counted_u32()? as usize;
                let bytes = self.take(len)?.to_vec();
                self.pool.string(&bytes)
            }
            ValueKind::Function => {
                let func_id = self.u32()?;
                self.pool.function(func_id)
            }
            ValueKind::Integer => {
                let value = self.u32()? as i32;
                self.pool.integer(value)
            }
            ValueKind::Float => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(self.take(8)?);
                self.pool.float(f64::from_le_bytes(bytes))
            }
            ValueKind::Array => {
                let len = self.counted_u32()? as usize;
                let array = self.pool.new_array();
                for _ in 0..len {
                    let element = self.value()?;
                    self.pool.push_element(array, element);
                }
                array
            }
            ValueKind::Placeholder => {
                let slot = self.u32()? as usize;
                match self.slots.get(slot) {
                    Some(Slot::Value(value)) => *value,
                    // A return slot resolves back to a placeholder, except
                    // for the still-open call, whose return slot is not
                    // assigned yet.
                    Some(Slot::Return(call)) if *call < self.call_index => {
                        self.pool.placeholder(*call)
                    }
                    _ => return Err(DecodeError::BadBackref { slot }),
                }
            }
        })
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(DecodeError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a u32 element count and rejects counts that cannot possibly
    /// fit in the remaining input (every element takes at least one byte).
    /// Keeps hostile counts from turning into four-billion-iteration loops.
    fn counted_u32(&mut self) -> Result<u32, DecodeError> {
        let offset = self.pos;
        let count = self.u32()?;
        if count as usize > self.bytes.len() - self.pos {
            return Err(DecodeError::CountOverflow { count, offset });
        }
        Ok(count)
    }

    fn take(&mut self, len: usize) -> Result<&[u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof(self.bytes.len()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}
