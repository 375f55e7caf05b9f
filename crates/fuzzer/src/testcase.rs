//! The test-case data model.
//!
//! A test case is an ordered sequence of function calls over the value
//! universe. Test cases are created by the generator or the deserializer,
//! transformed by the mutator, and consumed by the serializer or the script
//! synthesizer. Values outlive individual test cases only through the
//! object pool.

use crate::pool::ObjectPool;
use crate::value::{ValueData, ValueId};

/// One invocation of a catalog function.
#[derive(Clone, Debug)]
pub struct FunctionCall {
    /// Catalog id of the callee.
    pub func_id: u32,
    /// Receiver value. An absent receiver is represented by the `undefined`
    /// singleton; the wire format does not distinguish the two.
    pub this: ValueId,
    /// Whether the harness replays this call with construction semantics.
    pub is_constructor: bool,
    /// Argument handles, in call order.
    pub args: Vec<ValueId>,
}

impl FunctionCall {
    pub fn new(func_id: u32, this: ValueId) -> FunctionCall {
        FunctionCall {
            func_id,
            this,
            is_constructor: false,
            args: Vec::new(),
        }
    }
}

/// An ordered sequence of function calls.
#[derive(Clone, Debug, Default)]
pub struct TestCase {
    calls: Vec<FunctionCall>,
}

impl TestCase {
    pub fn new() -> TestCase {
        TestCase { calls: Vec::new() }
    }

    pub fn calls(&self) -> &[FunctionCall] {
        &self.calls
    }

    pub fn calls_mut(&mut self) -> &mut [FunctionCall] {
        &mut self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn push_call(&mut self, call: FunctionCall) {
        self.calls.push(call);
    }

    pub fn insert_call(&mut self, index: usize, call: FunctionCall) {
        self.calls.insert(index, call);
    }

    pub fn remove_call(&mut self, index: usize) -> FunctionCall {
        self.calls.remove(index)
    }

    /// Structural equality against another test case, resolving handles
    /// through the respective pools. Two test cases are equal when their
    /// call sequences match and every receiver and argument lowers to the
    /// same value tree.
    pub fn structural_eq(&self, pool: &ObjectPool, other: &TestCase, other_pool: &ObjectPool) -> bool {
        self.calls.len() == other.calls.len()
            && self.calls.iter().zip(&other.calls).all(|(a, b)| {
                a.func_id == b.func_id
                    && a.is_constructor == b.is_constructor
                    && a.args.len() == b.args.len()
                    && values_eq(pool, a.this, other_pool, b.this)
                    && a.args
                        .iter()
                        .zip(&b.args)
                        .all(|(&x, &y)| values_eq(pool, x, other_pool, y))
            })
    }

    /// Panics unless every placeholder at call index `k` references a call
    /// in `[0, k)` and the value graph reachable from receivers and
    /// arguments is acyclic. Generator and mutator outputs maintain both
    /// properties; this is the sanity check behind that claim.
    pub fn assert_well_formed(&self, pool: &ObjectPool) {
        for (index, call) in self.calls.iter().enumerate() {
            check_value(pool, call.this, index, &mut Vec::new());
            for &arg in &call.args {
                check_value(pool, arg, index, &mut Vec::new());
            }
        }
    }
}

fn values_eq(pool: &ObjectPool, a: ValueId, other_pool: &ObjectPool, b: ValueId) -> bool {
    match (pool.data(a), other_pool.data(b)) {
        (ValueData::Undefined, ValueData::Undefined) => true,
        (ValueData::Null, ValueData::Null) => true,
        (ValueData::Boolean(x), ValueData::Boolean(y)) => x == y,
        (ValueData::String(x), ValueData::String(y)) => x == y,
        (ValueData::Function(x), ValueData::Function(y)) => x == y,
        (ValueData::Integer(x), ValueData::Integer(y)) => x == y,
        // Bit equality, so NaN equals NaN and 0.0 differs from -0.0.
        (ValueData::Float(x), ValueData::Float(y)) => x.to_bits() == y.to_bits(),
        (ValueData::Array(xs), ValueData::Array(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|(&x, &y)| values_eq(pool, x, other_pool, y))
        }
        (ValueData::Placeholder(x), ValueData::Placeholder(y)) => x == y,
        _ => false,
    }
}

fn check_value(pool: &ObjectPool, value: ValueId, call_index: usize, stack: &mut Vec<ValueId>) {
    match pool.data(value) {
        ValueData::Placeholder(target) => {
            assert!(
                *target < call_index,
                "placeholder at call {} references call {}",
                call_index,
                target
            );
        }
        ValueData::Array(elements) => {
            assert!(
                !stack.contains(&value),
                "cycle through array {:?} in call {}",
                value,
                call_index
            );
            stack.push(value);
            for &element in elements {
                check_value(pool, element, call_index, stack);
            }
            stack.pop();
        }
        _ => {}
    }
}
