//! AFL++ custom-mutator entry points.
//!
//! This crate builds the shared object AFL++ loads through
//! `AFL_CUSTOM_MUTATOR_LIBRARY`. AFL is the sole scheduler: each exported
//! callback runs to completion on AFL's thread, there is no internal
//! concurrency, and the catalog, object pool, RNG, and output buffer are
//! process-scoped state owned by the callbacks.
//!
//! Within one `afl_custom_fuzz` invocation the order is strict:
//! clear the pool, decode the primary buffer, decode the optional splice
//! buffer, mutate, serialize. The returned buffer stays stable until the
//! next callback; it may grow but is never freed.
//!
//! Fatal conditions (missing `CAF_STORE`, a malformed catalog, a corrupt
//! test case) print a one-line reason to stderr and exit with status 1,
//! which AFL reports alongside the offending input.

use caf_fuzzer::{codec, Mutator, ObjectPool, ScriptTarget, Synthesizer};
use caf_store::CafStore;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::fmt::Display;
use std::os::raw::c_void;
use std::path::Path;
use std::sync::{Mutex, Once};
use std::{env, process, slice};

/// Mutable state shared by the callbacks. AFL drives a single thread, so
/// the mutex is never contended; it only makes the static safe to hold.
static STATE: Mutex<Option<FuzzerState>> = Mutex::new(None);

struct FuzzerState {
    store: CafStore,
    pool: ObjectPool,
    rng: SmallRng,
    /// Process-static output buffer handed back to AFL.
    out: Vec<u8>,
}

fn die(reason: impl Display) -> ! {
    eprintln!("caf: {}", reason);
    process::exit(1);
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        drop(env_logger::try_init());
    });
}

/// Loads the catalog named by `CAF_STORE`, initializes the object pool, and
/// seeds the RNG with the AFL-provided seed.
///
/// # Safety
///
/// Called by AFL with its own state pointer, which is unused here.
#[no_mangle]
pub unsafe extern "C" fn afl_custom_init(_afl: *mut c_void, seed: u32) {
    init_logging();

    let path = match env::var("CAF_STORE") {
        Ok(path) => path,
        Err(_) => die("CAF_STORE not set"),
    };
    log::info!("loading CAF metadata store from {:?}", path);
    let store = match CafStore::load(Path::new(&path)) {
        Ok(store) => store,
        Err(err) => die(format!("failed to load CAF store: {}", err)),
    };
    log::info!("catalog lists {} API functions", store.len());

    *STATE.lock().unwrap() = Some(FuzzerState {
        store,
        pool: ObjectPool::new(),
        rng: SmallRng::seed_from_u64(seed as u64),
        out: Vec::new(),
    });
}

/// Decodes the primary buffer (and the optional splice buffer), mutates,
/// serializes the result into the process-static buffer, and hands it back
/// through `buf`.
///
/// # Safety
///
/// `buf` must point at a readable buffer of `buf_size` bytes, and
/// `add_buf`, when non-null, at one of `add_buf_size` bytes, per the AFL++
/// custom-mutator contract.
#[no_mangle]
pub unsafe extern "C" fn afl_custom_fuzz(
    _afl: *mut c_void,
    buf: *mut *mut u8,
    buf_size: usize,
    add_buf: *mut u8,
    add_buf_size: usize,
    max_size: usize,
) -> usize {
    let mut guard = STATE.lock().unwrap();
    let state = match guard.as_mut() {
        Some(state) => state,
        None => die("afl_custom_fuzz called before afl_custom_init"),
    };
    let FuzzerState {
        store,
        pool,
        rng,
        out,
    } = state;

    pool.clear();

    let primary = slice::from_raw_parts(*buf, buf_size);
    let tc = match codec::decode(primary, pool) {
        Ok(tc) => tc,
        Err(err) => die(format!("corrupt test case: {}", err)),
    };

    let splice = if add_buf.is_null() {
        None
    } else {
        let bytes = slice::from_raw_parts(add_buf, add_buf_size);
        match codec::decode(bytes, pool) {
            Ok(tc) => Some(tc),
            Err(err) => die(format!("corrupt splice candidate: {}", err)),
        }
    };

    let mut mutator = Mutator::new(store, pool, rng);
    if let Some(candidate) = splice.as_ref() {
        mutator.set_splice_candidate(candidate);
    }
    let mutated = mutator.mutate(&tc);

    out.clear();
    codec::encode_into(out, pool, &mutated);
    if out.len() > max_size {
        // Rare with realistic max_size; hand the input back untouched
        // rather than truncating a length-delimited stream.
        log::warn!(
            "mutated test case ({} bytes) exceeds max_size ({}), keeping input",
            out.len(),
            max_size
        );
        return buf_size;
    }

    *buf = out.as_mut_ptr();
    out.len()
}

/// Decodes a test case and synthesizes the JavaScript replaying it; used by
/// the Chrome build in place of raw binary test cases.
///
/// # Safety
///
/// `data` must point at a readable buffer of `size` bytes and `new_data` at
/// a writable pointer slot.
#[no_mangle]
pub unsafe extern "C" fn afl_pre_save_handler(
    data: *mut u8,
    size: usize,
    new_data: *mut *mut u8,
) -> usize {
    let mut guard = STATE.lock().unwrap();
    let state = match guard.as_mut() {
        Some(state) => state,
        None => die("afl_pre_save_handler called before afl_custom_init"),
    };

    state.pool.clear();
    let bytes = slice::from_raw_parts(data, size);
    let tc = match codec::decode(bytes, &mut state.pool) {
        Ok(tc) => tc,
        Err(err) => die(format!("corrupt test case: {}", err)),
    };

    let script = Synthesizer::new(&state.store, ScriptTarget::Js).synthesize(&state.pool, &tc);

    state.out.clear();
    state.out.extend_from_slice(script.as_bytes());
    *new_data = state.out.as_mut_ptr();
    state.out.len()
}

/// Trim is not supported: zero trim steps.
#[no_mangle]
pub extern "C" fn afl_custom_init_trim(_buf: *mut u8, _buf_size: usize) -> u32 {
    0
}

/// Unreachable; `afl_custom_init_trim` reports zero steps.
#[no_mangle]
pub extern "C" fn afl_custom_trim(_out_buf: *mut *mut u8, _out_buf_size: *mut usize) {
    unreachable!("afl_custom_trim called with zero trim steps");
}

/// Unreachable; `afl_custom_init_trim` reports zero steps.
#[no_mangle]
pub extern "C" fn afl_custom_post_trim(_success: u8) -> u32 {
    unreachable!("afl_custom_post_trim called with zero trim steps");
}
