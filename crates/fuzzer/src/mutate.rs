//! Test-case mutation strategies.
//!
//! The mutator derives a new test case from one existing test case (plus an
//! optional splice candidate) using a fixed menu of structural and
//! value-level transformations. Mutation is non-destructive at the value
//! level: transformed values get fresh pool handles and existing pool
//! entries are never overwritten, so values shared between test cases stay
//! intact. Given the same seed, inputs, and pool state the mutator is fully
//! reproducible.

use crate::generate::{Generator, GeneratorOptions, FLOAT_DICTIONARY};
use crate::pool::ObjectPool;
use crate::testcase::TestCase;
use crate::value::{ValueData, ValueId};
use caf_store::CafStore;
use rand::rngs::SmallRng;
use rand::Rng;

/// Probability of replacing an argument with a freshly generated value
/// instead of mutating the existing one.
const FRESH_ARGUMENT_PROB: f64 = 0.1;
/// Probability of keeping a function value (or a placeholder) as-is.
const KEEP_VALUE_PROB: f64 = 0.5;
/// Bound on the magnitude of arithmetic mutation deltas.
const ARITH_MAX: i32 = 35;

/// Derives new test cases from existing ones.
pub struct Mutator<'a> {
    gen: Generator<'a>,
    splice_with: Option<&'a TestCase>,
}

impl<'a> Mutator<'a> {
    pub fn new(store: &'a CafStore, pool: &'a mut ObjectPool, rng: &'a mut SmallRng) -> Mutator<'a> {
        Mutator {
            gen: Generator::new(store, pool, rng),
            splice_with: None,
        }
    }

    pub fn with_options(
        store: &'a CafStore,
        pool: &'a mut ObjectPool,
        rng: &'a mut SmallRng,
        opts: GeneratorOptions,
    ) -> Mutator<'a> {
        Mutator {
            gen: Generator::with_options(store, pool, rng, opts),
            splice_with: None,
        }
    }

    /// Registers a second test case as the splice source. The candidate must
    /// have been decoded into (or built against) the same pool as the test
    /// cases handed to [`Mutator::mutate`].
    pub fn set_splice_candidate(&mut self, candidate: &'a TestCase) {
        self.splice_with = Some(candidate);
    }

    /// Produces a new test case from `tc`.
    pub fn mutate(&mut self, tc: &TestCase) -> TestCase {
        let mutated = if self.gen.rng.gen_range(0..2) == 0 {
            log::trace!("sequence mutation of a {}-call test case", tc.len());
            self.mutate_sequence(tc)
        } else {
            log::trace!("argument mutation of a {}-call test case", tc.len());
            self.mutate_argument(tc)
        };
        if cfg!(debug_assertions) {
            mutated.assert_well_formed(self.gen.pool);
        }
        mutated
    }

    fn mutate_sequence(&mut self, tc: &TestCase) -> TestCase {
        // Splice is only on the menu when a candidate was supplied.
        let choices = if self.splice_with.is_some() { 3 } else { 2 };
        let mut mutated = match self.gen.rng.gen_range(0..choices) {
            0 => self.insert_call(tc),
            1 => self.remove_call(tc),
            _ => self.splice(tc),
        };
        self.fix_placeholders(&mut mutated);
        mutated
    }

    /// Concatenates a prefix of `tc` with a suffix of the splice candidate.
    fn splice(&mut self, tc: &TestCase) -> TestCase {
        let source = self.splice_with.expect("splice without a candidate");
        let bound = tc.len().min(source.len());
        let point = self.gen.rng.gen_range(0..=bound);

        let mut out = TestCase::new();
        for call in &tc.calls()[..point] {
            out.push_call(call.clone());
        }
        for call in &source.calls()[point..] {
            out.push_call(call.clone());
        }
        out
    }

    /// Generates one call and inserts it at a random position.
    fn insert_call(&mut self, tc: &TestCase) -> TestCase {
        let index = self.gen.rng.gen_range(0..=tc.len());
        let call = self.gen.generate_call(index);
        let mut out = tc.clone();
        out.insert_call(index, call);
        out
    }

    /// Drops one call. A test case is never shrunk below one call; the
    /// mutation is rejected instead and the input comes back unchanged.
    fn remove_call(&mut self, tc: &TestCase) -> TestCase {
        let mut out = tc.clone();
        if out.len() > 1 {
            let index = self.gen.rng.gen_range(0..out.len());
            out.remove_call(index);
        }
        out
    }

    /// Replaces every placeholder whose referenced index is no longer below
    /// its owning call index with a freshly generated value. Runs after any
    /// sequence mutation; the check is structural only, so placeholders
    /// still in range survive even when they now name a different call.
    fn fix_placeholders(&mut self, tc: &mut TestCase) {
        for index in 0..tc.len() {
            let this = tc.calls()[index].this;
            let args = tc.calls()[index].args.clone();

            let fixed_this = self.fix_value(this, index);
            let fixed_args: Vec<ValueId> =
                args.iter().map(|&arg| self.fix_value(arg, index)).collect();

            let call = &mut tc.calls_mut()[index];
            call.this = fixed_this;
            call.args = fixed_args;
        }
    }

    fn fix_value(&mut self, value: ValueId, call_index: usize) -> ValueId {
        match self.gen.pool.data(value) {
            ValueData::Placeholder(target) if *target >= call_index => {
                self.gen.generate_value(0, call_index)
            }
            ValueData::Array(elements) => {
                let elements = elements.clone();
                let fixed: Vec<ValueId> = elements
                    .iter()
                    .map(|&element| self.fix_value(element, call_index))
                    .collect();
                if fixed == elements {
                    value
                } else {
                    let array = self.gen.pool.new_array();
                    for element in fixed {
                        self.gen.pool.push_element(array, element);
                    }
                    array
                }
            }
            _ => value,
        }
    }

    /// Picks a call and one of its arguments and transforms it. Calls with
    /// no arguments reject the mutation and return the input unchanged.
    fn mutate_argument(&mut self, tc: &TestCase) -> TestCase {
        let mut out = tc.clone();
        if out.is_empty() {
            return out;
        }
        let call_index = self.gen.rng.gen_range(0..out.len());
        if out.calls()[call_index].args.is_empty() {
            return out;
        }
        let arg_index = self.gen.rng.gen_range(0..out.calls()[call_index].args.len());
        let current = out.calls()[call_index].args[arg_index];

        let replacement = if self.gen.rng.gen_bool(FRESH_ARGUMENT_PROB) {
            self.gen.generate_value(0, call_index)
        } else {
            self.mutate_value(current, call_index, 0)
        };

        out.calls_mut()[call_index].args[arg_index] = replacement;
        out
    }

    /// Applies one value-level transformation, dispatched on kind. Returns a
    /// new handle; the value behind `value` is left untouched.
    fn mutate_value(&mut self, value: ValueId, call_index: usize, depth: usize) -> ValueId {
        let data = self.gen.pool.data(value).clone();
        match data {
            ValueData::Boolean(b) => self.gen.pool.boolean(!b),
            ValueData::Integer(x) => {
                let mutated = self.mutate_integer(x);
                self.gen.pool.integer(mutated)
            }
            ValueData::Float(x) => {
                let mutated = self.mutate_float(x);
                self.gen.pool.float(mutated)
            }
            ValueData::String(bytes) => {
                let mutated = self.mutate_string(bytes);
                self.gen.pool.string(&mutated)
            }
            ValueData::Array(elements) => self.mutate_array(elements, call_index, depth),
            ValueData::Function(func_id) => {
                if self.gen.rng.gen_bool(KEEP_VALUE_PROB) {
                    return value;
                }
                let new_id = match self.gen.store.group_containing(func_id) {
                    Some(group) => group[self.gen.rng.gen_range(0..group.len())],
                    None => self.gen.select_function(),
                };
                self.gen.pool.function(new_id)
            }
            ValueData::Placeholder(_) => {
                if self.gen.rng.gen_bool(KEEP_VALUE_PROB) {
                    value
                } else {
                    self.gen.generate_value(depth, call_index)
                }
            }
            ValueData::Undefined | ValueData::Null => self.gen.generate_value(depth, call_index),
        }
    }

    fn mutate_integer(&mut self, value: i32) -> i32 {
        let bits = value as u32;
        let mutated = match self.gen.rng.gen_range(0..10) {
            strategy @ 0..=2 => {
                let width = 1u32 << strategy;
                let offset = self.gen.rng.gen_range(0..=32 - width);
                flip_bits(bits, width, offset)
            }
            strategy @ 3..=5 => {
                let width = 1usize << (strategy - 3);
                let offset = self.gen.rng.gen_range(0..=4 - width);
                flip_bytes(bits, width, offset)
            }
            strategy @ 6..=8 => {
                let width = 1usize << (strategy - 6);
                let offset = self.gen.rng.gen_range(0..=4 - width);
                let delta = self.gen.rng.gen_range(-ARITH_MAX..=ARITH_MAX);
                arith(bits, width, offset, delta)
            }
            _ => return value.wrapping_neg(),
        };
        mutated as i32
    }

    fn mutate_float(&mut self, value: f64) -> f64 {
        match self.gen.rng.gen_range(0..3) {
            0 => value + self.gen.rng.gen_range(-(ARITH_MAX as f64)..=ARITH_MAX as f64),
            1 => -value,
            _ => FLOAT_DICTIONARY[self.gen.rng.gen_range(0..FLOAT_DICTIONARY.len())],
        }
    }

    fn mutate_string(&mut self, mut bytes: Vec<u8>) -> Vec<u8> {
        // Everything except insertion needs at least one byte to work with.
        let strategy = if bytes.is_empty() {
            0
        } else {
            self.gen.rng.gen_range(0..4)
        };
        match strategy {
            0 => {
                let position = self.gen.rng.gen_range(0..=bytes.len());
                let byte = self.gen.generate_string_byte();
                bytes.insert(position, byte);
            }
            1 => {
                let position = self.gen.rng.gen_range(0..bytes.len());
                bytes.remove(position);
            }
            2 => {
                let position = self.gen.rng.gen_range(0..bytes.len());
                bytes[position] = self.gen.generate_string_byte();
            }
            _ => {
                let a = self.gen.rng.gen_range(0..bytes.len());
                let b = self.gen.rng.gen_range(0..bytes.len());
                bytes.swap(a, b);
            }
        }
        bytes
    }

    fn mutate_array(
        &mut self,
        mut elements: Vec<ValueId>,
        call_index: usize,
        depth: usize,
    ) -> ValueId {
        // Removal, element mutation, and swaps need a non-empty array.
        let strategy = if elements.is_empty() {
            0
        } else {
            self.gen.rng.gen_range(0..4)
        };
        match strategy {
            0 => {
                let element = self.gen.generate_value(depth + 1, call_index);
                elements.push(element);
            }
            1 => {
                let index = self.gen.rng.gen_range(0..elements.len());
                elements.remove(index);
            }
            2 => {
                let index = self.gen.rng.gen_range(0..elements.len());
                // Recurse while the depth budget lasts, then fall back to
                // fresh generation.
                elements[index] = if depth < self.gen.opts.max_depth {
                    self.mutate_value(elements[index], call_index, depth + 1)
                } else {
                    self.gen.generate_value(depth + 1, call_index)
                };
            }
            _ => {
                let a = self.gen.rng.gen_range(0..elements.len());
                let b = self.gen.rng.gen_range(0..elements.len());
                elements.swap(a, b);
            }
        }

        let array = self.gen.pool.new_array();
        for element in elements {
            self.gen.pool.push_element(array, element);
        }
        array
    }
}

/// XORs `width` adjacent bits at `offset` within the 32-bit representation.
pub(crate) fn flip_bits(bits: u32, width: u32, offset: u32) -> u32 {
    debug_assert!(matches!(width, 1 | 2 | 4) && offset + width <= 32);
    let mask = ((1u64 << width) - 1) as u32;
    bits ^ (mask << offset)
}

/// XORs `width` adjacent bytes at byte `offset` with `0xff`.
pub(crate) fn flip_bytes(bits: u32, width: usize, offset: usize) -> u32 {
    debug_assert!(matches!(width, 1 | 2 | 4) && offset + width <= 4);
    let mask = match width {
        1 => 0xffu32,
        2 => 0xffffu32,
        _ => 0xffff_ffffu32,
    };
    bits ^ (mask << (offset * 8))
}

/// Treats `width` bytes at byte `offset` as a signed little-endian integer
/// and adds `delta` to it, wrapping.
pub(crate) fn arith(bits: u32, width: usize, offset: usize, delta: i32) -> u32 {
    debug_assert!(matches!(width, 1 | 2 | 4) && offset + width <= 4);
    let mut bytes = bits.to_le_bytes();
    match width {
        1 => {
            let window = bytes[offset] as i8;
            bytes[offset] = window.wrapping_add(delta as i8) as u8;
        }
        2 => {
            let window = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            let mutated = window.wrapping_add(delta as i16).to_le_bytes();
            bytes[offset] = mutated[0];
            bytes[offset + 1] = mutated[1];
        }
        _ => {
            let window = i32::from_le_bytes(bytes);
            bytes = window.wrapping_add(delta).to_le_bytes();
        }
    }
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::FunctionCall;
    use caf_store::ApiFunction;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn test_store(count: u32) -> CafStore {
        CafStore::from_functions(
            (0..count)
                .map(|id| ApiFunction {
                    id,
                    name: format!("api{}", id),
                })
                .collect(),
        )
        .unwrap()
    }

    fn two_call_case(pool: &mut ObjectPool) -> TestCase {
        let mut tc = TestCase::new();
        tc.push_call(FunctionCall::new(0, pool.undefined()));
        let mut second = FunctionCall::new(1, pool.undefined());
        second.args.push(pool.placeholder(0));
        tc.push_call(second);
        tc
    }

    #[test]
    fn bit_flips() {
        assert_eq!(flip_bits(0, 1, 0), 1);
        assert_eq!(flip_bits(0, 2, 1), 0b110);
        assert_eq!(flip_bits(0, 4, 28), 0xf000_0000);
        assert_eq!(flip_bits(0xffff_ffff, 4, 4), 0xffff_ff0f);
        // Flipping twice restores the input.
        assert_eq!(flip_bits(flip_bits(0x1234, 4, 8), 4, 8), 0x1234);
    }

    #[test]
    fn byte_flips() {
        assert_eq!(flip_bytes(0, 1, 0), 0xff);
        assert_eq!(flip_bytes(0, 1, 3), 0xff00_0000);
        assert_eq!(flip_bytes(0, 2, 1), 0x00ff_ff00);
        assert_eq!(flip_bytes(0x1234_5678, 4, 0), !0x1234_5678);
    }

    #[test]
    fn windowed_arith() {
        // Single byte at offset 0: 0x78 + 1.
        assert_eq!(arith(0x1234_5678, 1, 0, 1), 0x1234_5679);
        // Single byte wraps as a signed value.
        assert_eq!(arith(0x0000_007f, 1, 0, 1), 0x0000_0080);
        // Two bytes at offset 2: 0x1234 - 1 = 0x1233.
        assert_eq!(arith(0x1234_5678, 2, 2, -1), 0x1233_5678);
        // Full width behaves like plain i32 addition.
        assert_eq!(arith(5u32, 4, 0, -7) as i32, -2);
    }

    #[test]
    fn remove_call_on_single_call_is_a_no_op() {
        let store = test_store(2);
        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(0);

        let mut tc = TestCase::new();
        tc.push_call(FunctionCall::new(0, pool.undefined()));

        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        let out = mutator.remove_call(&tc);
        assert_eq!(out.len(), 1);
        assert_eq!(out.calls()[0].func_id, 0);
    }

    #[test]
    fn removing_the_referenced_call_regenerates_the_placeholder() {
        let store = test_store(2);
        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(11);

        let tc = two_call_case(&mut pool);

        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        // Drop call 0 by hand, then run the post-sequence fix pass.
        let mut out = tc.clone();
        out.remove_call(0);
        mutator.fix_placeholders(&mut out);

        assert_eq!(out.len(), 1);
        let arg = out.calls()[0].args[0];
        // The placeholder sat at what is now call 0, so nothing it could
        // reference exists; the fix pass must have replaced it, and never
        // with another placeholder.
        assert_ne!(pool.kind(arg), crate::value::ValueKind::Placeholder);
        out.assert_well_formed(&pool);
    }

    #[test]
    fn in_range_placeholders_survive_sequence_fixups() {
        let store = test_store(2);
        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(3);

        let mut tc = two_call_case(&mut pool);
        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        mutator.fix_placeholders(&mut tc);

        assert!(matches!(
            pool.data(tc.calls()[1].args[0]),
            ValueData::Placeholder(0)
        ));
    }

    #[test]
    fn nested_placeholders_are_fixed_too() {
        let store = test_store(2);
        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(5);

        // Call 0 carrying an array argument that hides a placeholder.
        let mut tc = TestCase::new();
        let mut call = FunctionCall::new(0, pool.undefined());
        let array = pool.new_array();
        let inner = pool.placeholder(1);
        pool.push_element(array, inner);
        call.args.push(array);
        tc.push_call(call);

        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        mutator.fix_placeholders(&mut tc);
        tc.assert_well_formed(&pool);
        // The array was rebuilt, not patched in place.
        assert_ne!(tc.calls()[0].args[0], array);
        match pool.data(array) {
            ValueData::Array(elements) => assert_eq!(elements.as_slice(), &[inner][..]),
            _ => unreachable!(),
        }
    }

    #[test]
    fn splice_concatenates_prefix_and_suffix() {
        let store = test_store(4);
        let mut pool = ObjectPool::new();

        let mut primary = TestCase::new();
        for id in 0..3 {
            primary.push_call(FunctionCall::new(id, pool.undefined()));
        }
        let mut candidate = TestCase::new();
        for id in 0..3 {
            candidate.push_call(FunctionCall::new(id + 1, pool.undefined()));
        }

        for seed in 0..32 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
            mutator.set_splice_candidate(&candidate);
            let out = mutator.splice(&primary);
            // A prefix of the primary followed by the candidate's suffix:
            // call i came from position i of one of the two inputs, and
            // once the candidate takes over it keeps the floor.
            assert_eq!(out.len(), 3);
            let mut switched = false;
            for (i, call) in out.calls().iter().enumerate() {
                if call.func_id == i as u32 + 1 {
                    switched = true;
                } else {
                    assert_eq!(call.func_id, i as u32);
                    assert!(!switched, "primary call after the splice point");
                }
            }
        }
    }

    #[test]
    fn argument_mutation_on_argless_calls_is_a_no_op() {
        let store = test_store(1);
        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(1);

        let mut tc = TestCase::new();
        tc.push_call(FunctionCall::new(0, pool.undefined()));

        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        let out = mutator.mutate_argument(&tc);
        assert!(out.structural_eq(&pool, &tc, &pool));
    }

    #[test]
    fn function_mutation_stays_in_the_callback_group() {
        let mut callbacks = HashMap::new();
        callbacks.insert(9u64, vec![0u32, 2]);
        let store = CafStore::from_parts(
            (0..4)
                .map(|id| ApiFunction {
                    id,
                    name: format!("api{}", id),
                })
                .collect(),
            callbacks,
        )
        .unwrap();

        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(17);
        let func = pool.function(0);
        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        for _ in 0..64 {
            let out = mutator.mutate_value(func, 0, 0);
            match mutator.gen.pool.data(out) {
                ValueData::Function(id) => assert!([0u32, 2].contains(id)),
                other => panic!("function mutated into {:?}", other.kind()),
            }
        }
    }

    #[test]
    fn boolean_mutation_flips() {
        let store = test_store(1);
        let mut pool = ObjectPool::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let t = pool.boolean(true);
        let f = pool.boolean(false);
        let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
        assert_eq!(mutator.mutate_value(t, 0, 0), f);
        assert_eq!(mutator.mutate_value(f, 0, 0), t);
    }

    #[test]
    fn mutation_is_deterministic_per_seed() {
        let store = test_store(6);

        let build = || {
            let mut pool = ObjectPool::new();
            let mut rng = SmallRng::seed_from_u64(23);
            let mut gen = Generator::new(&store, &mut pool, &mut rng);
            let tc = gen.generate();
            (pool, tc)
        };

        let (mut pool_a, tc_a) = build();
        let (mut pool_b, tc_b) = build();

        let mut rng_a = SmallRng::seed_from_u64(41);
        let mut rng_b = SmallRng::seed_from_u64(41);
        let out_a = Mutator::new(&store, &mut pool_a, &mut rng_a).mutate(&tc_a);
        let out_b = Mutator::new(&store, &mut pool_b, &mut rng_b).mutate(&tc_b);

        assert!(out_a.structural_eq(&pool_a, &out_b, &pool_b));
    }

    #[test]
    fn repeated_mutation_keeps_invariants() {
        let store = test_store(5);
        for seed in 0..24 {
            let mut pool = ObjectPool::new();
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut tc = Generator::new(&store, &mut pool, &mut rng).generate();
            let candidate = Generator::new(&store, &mut pool, &mut rng).generate();
            for _ in 0..32 {
                let mut mutator = Mutator::new(&store, &mut pool, &mut rng);
                mutator.set_splice_candidate(&candidate);
                tc = mutator.mutate(&tc);
                tc.assert_well_formed(&pool);
            }
        }
    }
}
