//! Test-case generation.
//!
//! The generator samples fresh test cases and fresh values, biased by a set
//! of tunables and a mixable integer/float dictionary. All generation is
//! total: any seed and any validated catalog produce a well-formed test
//! case.

use crate::pool::ObjectPool;
use crate::testcase::{FunctionCall, TestCase};
use crate::value::{ValueId, ValueKind};
use caf_store::CafStore;
use rand::rngs::SmallRng;
use rand::Rng;

/// Probability of generating an explicit receiver for a call.
const GENERATE_THIS_PROB: f64 = 0.5;
/// Probability of drawing an integer from the dictionary instead of
/// uniformly.
const DICT_INTEGER_PROB: f64 = 0.6;
/// Probability of drawing a float from the dictionary instead of uniformly.
const DICT_FLOAT_PROB: f64 = 0.2;
/// Probability of reusing an existing pool value instead of creating one.
const REUSE_VALUE_PROB: f64 = 0.2;

/// Upper bound (inclusive) on the number of arguments generated per call.
const MAX_CALL_ARGS: usize = 5;

/// Power-of-two neighborhoods plus the usual suspects around integer
/// boundaries.
pub(crate) const INTEGER_DICTIONARY: &[i32] = &[
    -1,
    0,
    1,
    2,
    3,
    4,
    7,
    8,
    9,
    15,
    16,
    17,
    31,
    32,
    33,
    63,
    64,
    65,
    127,
    128,
    129,
    255,
    256,
    257,
    511,
    512,
    513,
    1023,
    1024,
    1025,
    4095,
    4096,
    4097,
    32767,
    32768,
    32769,
    65535,
    65536,
    65537,
    i8::MIN as i32,
    i16::MIN as i32,
    i32::MIN,
    i32::MAX,
];

pub(crate) const FLOAT_DICTIONARY: &[f64] = &[
    0.0,
    -0.0,
    1.0,
    -1.0,
    f64::EPSILON,
    f64::INFINITY,
    f64::NEG_INFINITY,
    f64::NAN,
];

/// Alphabet generated string bytes are drawn from.
pub(crate) const CHARACTER_SET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyz\
      ABCDEFGHIJKLMNOPQRSTUVWXYZ\
      0123456789\
      ~!@#$%^&*()-=_+\
      `[]\\{}|;':\",./<>? \n\t\r";

/// Tunables for the generator and, through it, the mutator.
#[derive(Clone, Debug)]
pub struct GeneratorOptions {
    /// Maximum number of calls in a generated test case.
    pub max_calls: usize,
    /// Maximum array nesting depth.
    pub max_depth: usize,
    /// Maximum length of a generated string.
    pub max_string_len: usize,
    /// Maximum length of a generated array.
    pub max_array_len: usize,
}

impl Default for GeneratorOptions {
    fn default() -> GeneratorOptions {
        GeneratorOptions {
            max_calls: 8,
            max_depth: 2,
            max_string_len: 16,
            max_array_len: 8,
        }
    }
}

/// Samples fresh test cases and fresh values.
pub struct Generator<'a> {
    pub(crate) store: &'a CafStore,
    pub(crate) pool: &'a mut ObjectPool,
    pub(crate) rng: &'a mut SmallRng,
    pub(crate) opts: GeneratorOptions,
}

impl<'a> Generator<'a> {
    pub fn new(store: &'a CafStore, pool: &'a mut ObjectPool, rng: &'a mut SmallRng) -> Generator<'a> {
        Generator::with_options(store, pool, rng, GeneratorOptions::default())
    }

    pub fn with_options(
        store: &'a CafStore,
        pool: &'a mut ObjectPool,
        rng: &'a mut SmallRng,
        opts: GeneratorOptions,
    ) -> Generator<'a> {
        Generator {
            store,
            pool,
            rng,
            opts,
        }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.opts
    }

    pub fn options_mut(&mut self) -> &mut GeneratorOptions {
        &mut self.opts
    }

    /// Produces one fresh test case.
    pub fn generate(&mut self) -> TestCase {
        let count = self.rng.gen_range(1..=self.opts.max_calls.max(1));
        log::trace!("generating a test case with {} calls", count);
        let mut tc = TestCase::new();
        for index in 0..count {
            let call = self.generate_call(index);
            tc.push_call(call);
        }
        if cfg!(debug_assertions) {
            tc.assert_well_formed(self.pool);
        }
        tc
    }

    /// Generates a single call for position `index` of a test case.
    /// Placeholders are reachable only when `index > 0`.
    pub fn generate_call(&mut self, index: usize) -> FunctionCall {
        let func_id = self.select_function();
        let this = if self.rng.gen_bool(GENERATE_THIS_PROB) {
            self.generate_value(0, index)
        } else {
            self.pool.undefined()
        };
        let mut call = FunctionCall::new(func_id, this);
        let arg_count = self.rng.gen_range(0..=MAX_CALL_ARGS);
        for _ in 0..arg_count {
            let arg = self.generate_value(0, index);
            call.args.push(arg);
        }
        call
    }

    /// Generates one value for a slot of the call at `call_index`, at array
    /// nesting depth `depth`.
    pub fn generate_value(&mut self, depth: usize, call_index: usize) -> ValueId {
        let reusable = self.pool.reusable_values().len();
        if reusable > 0 && self.rng.gen_bool(REUSE_VALUE_PROB) {
            let pick = self.rng.gen_range(0..reusable);
            return self.pool.reusable_values()[pick];
        }

        match self.pick_kind(depth < self.opts.max_depth, call_index > 0) {
            ValueKind::Undefined => self.pool.undefined(),
            ValueKind::Null => self.pool.null(),
            ValueKind::Boolean => {
                let value = self.rng.gen::<bool>();
                self.pool.boolean(value)
            }
            ValueKind::String => {
                let bytes = self.generate_string_bytes();
                self.pool.string(&bytes)
            }
            ValueKind::Function => {
                let func_id = self.select_function();
                self.pool.function(func_id)
            }
            ValueKind::Integer => {
                let value = self.generate_integer();
                self.pool.integer(value)
            }
            ValueKind::Float => {
                let value = self.generate_float();
                self.pool.float(value)
            }
            ValueKind::Array => {
                let len = self.rng.gen_range(0..=self.opts.max_array_len);
                let array = self.pool.new_array();
                for _ in 0..len {
                    let element = self.generate_value(depth + 1, call_index);
                    self.pool.push_element(array, element);
                }
                array
            }
            ValueKind::Placeholder => {
                let target = self.rng.gen_range(0..call_index);
                self.pool.placeholder(target)
            }
        }
    }

    pub(crate) fn select_function(&mut self) -> u32 {
        self.rng.gen_range(0..self.store.len() as u32)
    }

    pub(crate) fn generate_integer(&mut self) -> i32 {
        if self.rng.gen_bool(DICT_INTEGER_PROB) {
            INTEGER_DICTIONARY[self.rng.gen_range(0..INTEGER_DICTIONARY.len())]
        } else {
            self.rng.gen::<i32>()
        }
    }

    pub(crate) fn generate_float(&mut self) -> f64 {
        if self.rng.gen_bool(DICT_FLOAT_PROB) {
            FLOAT_DICTIONARY[self.rng.gen_range(0..FLOAT_DICTIONARY.len())]
        } else {
            // Uniform bits rather than a uniform real: plain f64 sampling
            // never produces NaN payloads, subnormals, or most exponents.
            f64::from_bits(self.rng.gen::<u64>())
        }
    }

    pub(crate) fn generate_string_byte(&mut self) -> u8 {
        CHARACTER_SET[self.rng.gen_range(0..CHARACTER_SET.len())]
    }

    fn generate_string_bytes(&mut self) -> Vec<u8> {
        let len = self.rng.gen_range(0..=self.opts.max_string_len);
        (0..len).map(|_| self.generate_string_byte()).collect()
    }

    fn pick_kind(&mut self, allow_array: bool, allow_placeholder: bool) -> ValueKind {
        let mut candidates = [ValueKind::Undefined; 9];
        candidates[..7].copy_from_slice(&[
            ValueKind::Undefined,
            ValueKind::Null,
            ValueKind::Boolean,
            ValueKind::String,
            ValueKind::Function,
            ValueKind::Integer,
            ValueKind::Float,
        ]);
        let mut count = 7;
        if allow_array {
            candidates[count] = ValueKind::Array;
            count += 1;
        }
        if allow_placeholder {
            candidates[count] = ValueKind::Placeholder;
            count += 1;
        }
        candidates[self.rng.gen_range(0..count)]
    }
}
