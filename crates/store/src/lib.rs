//! The CAF API catalog.
//!
//! The catalog (or *store*) is the immutable table of API functions the
//! program-analysis front-end discovered in the target engine, plus optional
//! callback-signature groups: sets of functions that are interchangeable
//! where a callable of a given signature is expected. It is loaded once from
//! a JSON file at startup and consulted by the generator, the mutator, and
//! the script synthesizer.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// A single API function exposed by the target engine.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ApiFunction {
    /// Function id. Ids are dense over `[0, N)` for a catalog of `N`
    /// functions.
    pub id: u32,
    /// Symbol name the harness resolves this function by.
    pub name: String,
}

/// Errors produced while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog lists no API functions")]
    Empty,

    #[error("duplicate function id {0}")]
    DuplicateId(u32),

    #[error("duplicate function name `{0}`")]
    DuplicateName(String),

    #[error("function id {id} is out of range for a catalog of {count} functions")]
    SparseId { id: u32, count: usize },

    #[error("callback group key `{0}` is not a decimal integer")]
    BadGroupKey(String),

    #[error("callback group {group} references unknown function id {id}")]
    BadGroupMember { group: u64, id: u32 },
}

/// On-disk shape of the catalog file.
#[derive(Deserialize)]
struct RawStore {
    apis: Vec<ApiFunction>,
    #[serde(default)]
    callbacks: HashMap<String, Vec<u32>>,
}

/// The immutable API catalog.
#[derive(Debug)]
pub struct CafStore {
    /// Functions indexed by id.
    funcs: Vec<ApiFunction>,
    /// Callback-signature groups, keyed by opaque signature id.
    callbacks: HashMap<u64, Vec<u32>>,
}

impl CafStore {
    /// Builds a catalog from a function list, rejecting duplicate or sparse
    /// ids and duplicate names.
    pub fn from_functions(funcs: Vec<ApiFunction>) -> Result<CafStore, StoreError> {
        CafStore::from_parts(funcs, HashMap::new())
    }

    /// Builds a catalog from a function list and callback-signature groups.
    pub fn from_parts(
        funcs: Vec<ApiFunction>,
        callbacks: HashMap<u64, Vec<u32>>,
    ) -> Result<CafStore, StoreError> {
        if funcs.is_empty() {
            return Err(StoreError::Empty);
        }

        let count = funcs.len();
        let mut by_id: Vec<Option<ApiFunction>> = (0..count).map(|_| None).collect();
        let mut names = HashSet::new();
        for func in funcs {
            if func.id as usize >= count {
                return Err(StoreError::SparseId { id: func.id, count });
            }
            if !names.insert(func.name.clone()) {
                return Err(StoreError::DuplicateName(func.name));
            }
            let slot = &mut by_id[func.id as usize];
            if slot.is_some() {
                return Err(StoreError::DuplicateId(func.id));
            }
            *slot = Some(func);
        }

        // Every slot is filled: ids were in range and distinct.
        let funcs = by_id.into_iter().map(|f| f.unwrap()).collect::<Vec<_>>();

        for (&group, members) in &callbacks {
            for &id in members {
                if id as usize >= funcs.len() {
                    return Err(StoreError::BadGroupMember { group, id });
                }
            }
        }

        Ok(CafStore { funcs, callbacks })
    }

    /// Parses and validates a catalog from its JSON text.
    pub fn from_json(json: &str) -> Result<CafStore, StoreError> {
        let raw: RawStore = serde_json::from_str(json)?;
        let mut callbacks = HashMap::with_capacity(raw.callbacks.len());
        for (key, members) in raw.callbacks {
            let group = key
                .parse::<u64>()
                .map_err(|_| StoreError::BadGroupKey(key))?;
            callbacks.insert(group, members);
        }
        CafStore::from_parts(raw.apis, callbacks)
    }

    /// Loads and validates a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<CafStore, StoreError> {
        let text = fs::read_to_string(path)?;
        CafStore::from_json(&text)
    }

    /// Number of functions in the catalog.
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// Whether the catalog is empty. Validated catalogs never are.
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// All functions, indexed by id.
    pub fn functions(&self) -> &[ApiFunction] {
        &self.funcs
    }

    /// Looks up a function by id.
    pub fn get(&self, id: u32) -> Option<&ApiFunction> {
        self.funcs.get(id as usize)
    }

    /// Looks up a function by id, panicking on ids that are not in the
    /// catalog. Test cases only ever carry ids a validated catalog handed
    /// out, so a miss here is an invariant violation.
    pub fn function(&self, id: u32) -> &ApiFunction {
        self.get(id)
            .unwrap_or_else(|| panic!("function id {} is not in the catalog", id))
    }

    /// The callback group registered for a signature id, if any.
    pub fn callback_group(&self, signature: u64) -> Option<&[u32]> {
        self.callbacks.get(&signature).map(|v| v.as_slice())
    }

    /// The first callback group containing `func_id`, if any. Used when
    /// mutating a function value: functions stay within their signature
    /// group when one is known.
    pub fn group_containing(&self, func_id: u32) -> Option<&[u32]> {
        let mut groups = self.callbacks.iter().collect::<Vec<_>>();
        // HashMap iteration order is unspecified; keep lookups stable for
        // reproducible mutation.
        groups.sort_by_key(|(signature, _)| **signature);
        groups
            .into_iter()
            .map(|(_, members)| members.as_slice())
            .find(|members| members.contains(&func_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(id: u32, name: &str) -> ApiFunction {
        ApiFunction {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn parses_catalog_with_callbacks() {
        let store = CafStore::from_json(
            r#"{
                "apis": [
                    { "id": 0, "name": "print" },
                    { "id": 1, "name": "parseInt" },
                    { "id": 2, "name": "setTimeout" }
                ],
                "callbacks": { "7": [0, 1] }
            }"#,
        )
        .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.function(1).name, "parseInt");
        assert_eq!(store.callback_group(7), Some(&[0, 1][..]));
        assert_eq!(store.callback_group(8), None);
        assert_eq!(store.group_containing(1), Some(&[0, 1][..]));
        assert_eq!(store.group_containing(2), None);
    }

    #[test]
    fn callbacks_are_optional() {
        let store = CafStore::from_json(r#"{ "apis": [{ "id": 0, "name": "f" }] }"#).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.callback_group(0).is_none());
    }

    #[test]
    fn rejects_duplicate_id() {
        let err = CafStore::from_functions(vec![func(0, "f"), func(0, "g")]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(0)));
    }

    #[test]
    fn rejects_duplicate_name() {
        let err = CafStore::from_functions(vec![func(0, "f"), func(1, "f")]).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(name) if name == "f"));
    }

    #[test]
    fn rejects_sparse_ids() {
        let err = CafStore::from_functions(vec![func(0, "f"), func(2, "g")]).unwrap_err();
        assert!(matches!(err, StoreError::SparseId { id: 2, count: 2 }));
    }

    #[test]
    fn rejects_empty_catalog() {
        let err = CafStore::from_json(r#"{ "apis": [] }"#).unwrap_err();
        assert!(matches!(err, StoreError::Empty));
    }

    #[test]
    fn rejects_bad_callback_references() {
        let err = CafStore::from_json(
            r#"{ "apis": [{ "id": 0, "name": "f" }], "callbacks": { "1": [9] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::BadGroupMember { group: 1, id: 9 }));

        let err = CafStore::from_json(
            r#"{ "apis": [{ "id": 0, "name": "f" }], "callbacks": { "sig": [0] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::BadGroupKey(key) if key == "sig"));
    }
}
