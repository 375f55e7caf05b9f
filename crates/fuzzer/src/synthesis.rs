//! Script synthesis.
//!
//! Renders a test case as a JavaScript program fragment whose execution
//! replays the call sequence with real language values. Rendering targets
//! differ only in the prelude and in how a catalog function name resolves to
//! a callable; the value lowering rules are shared.

use crate::pool::ObjectPool;
use crate::testcase::TestCase;
use crate::value::{ValueData, ValueId, ValueKind};
use caf_store::CafStore;
use std::collections::HashMap;
use std::fmt::Write;

/// Rendering target of the synthesizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptTarget {
    /// Plain JavaScript: catalog names are global bindings, no prelude.
    Js,
    /// Node.js embedding: catalog functions live on the native module the
    /// harness installs.
    Nodejs,
}

impl ScriptTarget {
    fn prelude(self, out: &mut String) {
        match self {
            ScriptTarget::Js => {}
            ScriptTarget::Nodejs => {
                out.push_str("const caf_v8lib = require('caf_v8lib');\n");
            }
        }
    }

    fn callee(self, name: &str) -> String {
        match self {
            ScriptTarget::Js => name.to_string(),
            ScriptTarget::Nodejs => {
                if is_js_identifier(name) {
                    format!("caf_v8lib.{}", name)
                } else {
                    format!("caf_v8lib[\"{}\"]", escape_js_bytes(name.as_bytes()))
                }
            }
        }
    }
}

/// Renders test cases for one catalog and target.
pub struct Synthesizer<'a> {
    store: &'a CafStore,
    target: ScriptTarget,
}

impl<'a> Synthesizer<'a> {
    pub fn new(store: &'a CafStore, target: ScriptTarget) -> Synthesizer<'a> {
        Synthesizer { store, target }
    }

    /// Renders `tc` as a script, one statement per line. Every call result
    /// is bound to a fresh variable so later calls can reference it.
    pub fn synthesize(&self, pool: &ObjectPool, tc: &TestCase) -> String {
        let mut cx = Context {
            pool,
            out: String::new(),
            vars: HashMap::new(),
            return_vars: Vec::with_capacity(tc.len()),
            next_var: 0,
        };
        self.target.prelude(&mut cx.out);

        for call in tc.calls() {
            let receiver = if pool.kind(call.this) == ValueKind::Undefined {
                None
            } else {
                Some(self.lower(&mut cx, call.this))
            };
            let args: Vec<String> = call.args.iter().map(|&arg| self.lower(&mut cx, arg)).collect();

            let result = cx.fresh_var();
            let callee = self.target.callee(&self.store.function(call.func_id).name);
            if call.is_constructor {
                let _ = writeln!(cx.out, "let {} = new {}({});", result, callee, args.join(", "));
            } else if let Some(receiver) = receiver {
                let _ = writeln!(
                    cx.out,
                    "let {} = {}.apply({}, [{}]);",
                    result,
                    callee,
                    receiver,
                    args.join(", ")
                );
            } else {
                let _ = writeln!(cx.out, "let {} = {}({});", result, callee, args.join(", "));
            }
            cx.return_vars.push(result);
        }

        cx.out
    }

    /// Lowers a value to the name of a variable holding it, emitting the
    /// definitions it needs. Lowered values are memoized per handle, so a
    /// shared array (or interned scalar) is defined once and reused.
    fn lower(&self, cx: &mut Context<'_>, value: ValueId) -> String {
        if let ValueData::Placeholder(target) = cx.pool.data(value) {
            return cx.return_vars[*target].clone();
        }
        if let Some(name) = cx.vars.get(&value) {
            return name.clone();
        }
        let name = cx.fresh_var();
        cx.vars.insert(value, name.clone());
        match cx.pool.data(value) {
            ValueData::Array(elements) => {
                let _ = writeln!(cx.out, "let {} = [];", name);
                for &element in elements {
                    let lowered = self.lower(cx, element);
                    let _ = writeln!(cx.out, "{}.push({});", name, lowered);
                }
            }
            data => {
                let literal = self.literal(data);
                let _ = writeln!(cx.out, "let {} = {};", name, literal);
            }
        }
        name
    }

    fn literal(&self, data: &ValueData) -> String {
        match data {
            ValueData::Undefined => "undefined".to_string(),
            ValueData::Null => "null".to_string(),
            ValueData::Boolean(true) => "true".to_string(),
            ValueData::Boolean(false) => "false".to_string(),
            ValueData::Integer(x) => x.to_string(),
            ValueData::Float(x) => js_number(*x),
            ValueData::String(bytes) => format!("\"{}\"", escape_js_bytes(bytes)),
            ValueData::Function(func_id) => {
                self.target.callee(&self.store.function(*func_id).name)
            }
            ValueData::Array(_) | ValueData::Placeholder(_) => {
                unreachable!("handled in lower()")
            }
        }
    }
}

struct Context<'a> {
    pool: &'a ObjectPool,
    out: String,
    vars: HashMap<ValueId, String>,
    return_vars: Vec<String>,
    next_var: u32,
}

impl Context<'_> {
    fn fresh_var(&mut self) -> String {
        let name = format!("_{}", self.next_var);
        self.next_var += 1;
        name
    }
}

/// Spells a double the way JavaScript reads it back.
fn js_number(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x == f64::INFINITY {
        "Infinity".to_string()
    } else if x == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        // Rust never formats finite doubles in exponent notation, so the
        // plain decimal spelling is always a valid JS literal.
        format!("{}", x)
    }
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Escapes a byte string for a double-quoted JS literal: quotes and the
/// usual whitespace escapes by name, any other non-printable byte as
/// `\xHH`.
pub(crate) fn escape_js_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", byte);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcase::FunctionCall;
    use caf_store::ApiFunction;

    fn test_store(names: &[&str]) -> CafStore {
        CafStore::from_functions(
            names
                .iter()
                .enumerate()
                .map(|(id, name)| ApiFunction {
                    id: id as u32,
                    name: name.to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn return_value_reference_lowered_to_variable() {
        let store = test_store(&["f", "g"]);
        let mut pool = ObjectPool::new();

        let mut tc = TestCase::new();
        tc.push_call(FunctionCall::new(0, pool.undefined()));
        let mut second = FunctionCall::new(1, pool.undefined());
        second.args.push(pool.placeholder(0));
        tc.push_call(second);

        let script = Synthesizer::new(&store, ScriptTarget::Js).synthesize(&pool, &tc);
        assert_eq!(script, "let _0 = f();\nlet _1 = g(_0);\n");
    }

    #[test]
    fn string_with_quotes_is_escaped() {
        let store = test_store(&["f"]);
        let mut pool = ObjectPool::new();

        let mut call = FunctionCall::new(0, pool.undefined());
        call.args.push(pool.string(b"he said \"hi\""));
        let mut tc = TestCase::new();
        tc.push_call(call);

        let script = Synthesizer::new(&store, ScriptTarget::Js).synthesize(&pool, &tc);
        assert!(script.contains("let _0 = \"he said \\\"hi\\\"\";"));
    }

    #[test]
    fn non_printable_bytes_use_hex_escapes() {
        assert_eq!(escape_js_bytes(b"a\x00b\x7f"), "a\\x00b\\x7f");
        assert_eq!(escape_js_bytes(b"'\n\t\r"), "\\'\\n\\t\\r");
    }

    #[test]
    fn arrays_lower_to_push_statements_and_share_definitions() {
        let store = test_store(&["f"]);
        let mut pool = ObjectPool::new();

        let array = pool.new_array();
        let one = pool.integer(1);
        pool.push_element(array, one);
        pool.push_element(array, one);

        let mut call = FunctionCall::new(0, pool.undefined());
        call.args.push(array);
        call.args.push(array);
        let mut tc = TestCase::new();
        tc.push_call(call);

        let script = Synthesizer::new(&store, ScriptTarget::Js).synthesize(&pool, &tc);
        assert_eq!(
            script,
            "let _0 = [];\n\
             let _1 = 1;\n\
             _0.push(_1);\n\
             _0.push(_1);\n\
             let _2 = f(_0, _0);\n"
        );
    }

    #[test]
    fn receivers_use_apply_and_constructors_use_new() {
        let store = test_store(&["f"]);
        let mut pool = ObjectPool::new();

        let mut with_receiver = FunctionCall::new(0, pool.integer(5));
        with_receiver.args.push(pool.boolean(true));
        let mut ctor = FunctionCall::new(0, pool.undefined());
        ctor.is_constructor = true;
        ctor.args.push(pool.null());

        let mut tc = TestCase::new();
        tc.push_call(with_receiver);
        tc.push_call(ctor);

        let script = Synthesizer::new(&store, ScriptTarget::Js).synthesize(&pool, &tc);
        assert_eq!(
            script,
            "let _0 = 5;\n\
             let _1 = true;\n\
             let _2 = f.apply(_0, [_1]);\n\
             let _3 = null;\n\
             let _4 = new f(_3);\n"
        );
    }

    #[test]
    fn float_literals_are_js_spellings() {
        assert_eq!(js_number(f64::NAN), "NaN");
        assert_eq!(js_number(f64::INFINITY), "Infinity");
        assert_eq!(js_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(js_number(-0.0), "-0");
        assert_eq!(js_number(1.5), "1.5");
        assert_eq!(js_number(1.0), "1");
    }

    #[test]
    fn nodejs_target_adds_prelude_and_module_lookup() {
        let store = test_store(&["print", "weird name"]);
        let mut pool = ObjectPool::new();

        let mut tc = TestCase::new();
        tc.push_call(FunctionCall::new(0, pool.undefined()));
        tc.push_call(FunctionCall::new(1, pool.undefined()));

        let script = Synthesizer::new(&store, ScriptTarget::Nodejs).synthesize(&pool, &tc);
        assert_eq!(
            script,
            "const caf_v8lib = require('caf_v8lib');\n\
             let _0 = caf_v8lib.print();\n\
             let _1 = caf_v8lib[\"weird name\"]();\n"
        );
    }

    #[test]
    fn function_values_lower_to_catalog_names() {
        let store = test_store(&["f", "callback"]);
        let mut pool = ObjectPool::new();

        let mut call = FunctionCall::new(0, pool.undefined());
        call.args.push(pool.function(1));
        let mut tc = TestCase::new();
        tc.push_call(call);

        let script = Synthesizer::new(&store, ScriptTarget::Js).synthesize(&pool, &tc);
        assert_eq!(script, "let _0 = callback;\nlet _1 = f(_0);\n");
    }
}
