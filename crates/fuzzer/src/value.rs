//! The typed value universe.
//!
//! Every receiver and argument of a call is a [`ValueId`]: a handle into the
//! [`ObjectPool`](crate::pool::ObjectPool) that owns all value nodes.
//! Values form a closed sum over the JavaScript shapes the harness can
//! reconstruct; there is no open extension after the catalog is loaded.

use std::fmt;

/// Marks handles into the pool region that `ObjectPool::clear` drops.
const TRANSIENT_BIT: u32 = 1 << 31;

/// Handle to a value node in an [`ObjectPool`](crate::pool::ObjectPool).
///
/// Handles are dense indices and equality is handle equality: interned
/// variants are referentially unique, so two handles to the same logical
/// interned value always compare equal. Handles into the transient pool
/// region are invalidated by `ObjectPool::clear` and must not be observed
/// afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    pub(crate) const fn persistent(index: usize) -> ValueId {
        ValueId(index as u32)
    }

    pub(crate) fn transient(index: usize) -> ValueId {
        debug_assert!((index as u32) & TRANSIENT_BIT == 0);
        ValueId(index as u32 | TRANSIENT_BIT)
    }

    pub(crate) fn is_transient(self) -> bool {
        self.0 & TRANSIENT_BIT != 0
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & !TRANSIENT_BIT) as usize
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_transient() {
            write!(f, "t{}", self.index())
        } else {
            write!(f, "p{}", self.index())
        }
    }
}

/// The kind of a value. Discriminants double as the wire tags of the binary
/// test-case encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    String = 3,
    Function = 4,
    Integer = 5,
    Float = 6,
    Array = 7,
    Placeholder = 8,
}

impl ValueKind {
    /// The tag byte this kind serializes as.
    pub fn wire_tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ValueKind::wire_tag`].
    pub fn from_wire_tag(tag: u8) -> Option<ValueKind> {
        Some(match tag {
            0 => ValueKind::Undefined,
            1 => ValueKind::Null,
            2 => ValueKind::Boolean,
            3 => ValueKind::String,
            4 => ValueKind::Function,
            5 => ValueKind::Integer,
            6 => ValueKind::Float,
            7 => ValueKind::Array,
            8 => ValueKind::Placeholder,
            _ => return None,
        })
    }
}

/// Payload of a value node.
#[derive(Clone, Debug)]
pub enum ValueData {
    Undefined,
    Null,
    Boolean(bool),
    /// Byte string. Generated strings draw from a printable alphabet, but
    /// decoded strings may carry arbitrary bytes and must round-trip.
    String(Vec<u8>),
    /// Catalog function id.
    Function(u32),
    Integer(i32),
    Float(f64),
    /// Element handles into the same pool. Arrays are identity-bearing and
    /// never interned; the reachable element graph is a DAG.
    Array(Vec<ValueId>),
    /// The return value of the call at this index within the owning test
    /// case. A placeholder in call `k` references only calls in `[0, k)`.
    Placeholder(usize),
}

impl ValueData {
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueData::Undefined => ValueKind::Undefined,
            ValueData::Null => ValueKind::Null,
            ValueData::Boolean(_) => ValueKind::Boolean,
            ValueData::String(_) => ValueKind::String,
            ValueData::Function(_) => ValueKind::Function,
            ValueData::Integer(_) => ValueKind::Integer,
            ValueData::Float(_) => ValueKind::Float,
            ValueData::Array(_) => ValueKind::Array,
            ValueData::Placeholder(_) => ValueKind::Placeholder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_round_trip() {
        for tag in 0..=8u8 {
            let kind = ValueKind::from_wire_tag(tag).unwrap();
            assert_eq!(kind.wire_tag(), tag);
        }
        assert!(ValueKind::from_wire_tag(9).is_none());
        assert!(ValueKind::from_wire_tag(0xff).is_none());
    }

    #[test]
    fn handles_distinguish_regions() {
        let p = ValueId::persistent(3);
        let t = ValueId::transient(3);
        assert_ne!(p, t);
        assert_eq!(p.index(), t.index());
        assert!(t.is_transient());
        assert!(!p.is_transient());
    }
}
