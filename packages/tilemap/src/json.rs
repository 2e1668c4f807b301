//! Lenient reading of JSON descriptor objects.
//!
//! Descriptor files are read field by field. A missing or malformed field is
//! logged and recorded, but reading carries on so that a partially loaded
//! descriptor can still be inspected or repaired.

use serde::de::DeserializeOwned;
use serde_json::{
    Map,
    Value,
};


/// Reads fields from one JSON object, tracking whether all reads succeeded.
#[derive(Debug)]
pub struct JsonReader<'a> {
    obj: Option<&'a Map<String, Value>>,
    // what is being read, for log messages
    what: &'a str,
    ok: bool,
}

impl<'a> JsonReader<'a> {
    pub fn new(value: &'a Value, what: &'a str) -> Self {
        let obj = value.as_object();
        if obj.is_none() {
            warn!(%what, "expected json object");
        }
        JsonReader {
            obj,
            what,
            ok: obj.is_some(),
        }
    }

    /// Whether every read so far has succeeded.
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Read a field into `dst`. On failure `dst` is left untouched, a warning
    /// is logged, and false is returned.
    pub fn read<T: DeserializeOwned>(&mut self, key: &str, dst: &mut T) -> bool {
        match self.try_read(key) {
            Some(val) => {
                *dst = val;
                true
            }
            None => {
                self.ok = false;
                false
            }
        }
    }

    /// Read a field, returning `None` and recording failure if missing or
    /// malformed.
    pub fn try_read<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let what = self.what;
        let Some(val) = self.obj.and_then(|obj| obj.get(key)) else {
            warn!(%what, %key, "missing json field");
            self.ok = false;
            return None;
        };
        match serde_json::from_value(val.clone()) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!(%what, %key, %e, "malformed json field");
                self.ok = false;
                None
            }
        }
    }

    /// Sub-object under `key`, if present.
    pub fn chunk(&self, key: &str) -> Option<&'a Value> {
        self.obj.and_then(|obj| obj.get(key))
    }

    /// Elements of the array under `key`. Absent arrays are empty.
    pub fn chunks(&self, key: &str) -> &'a [Value] {
        self.obj
            .and_then(|obj| obj.get(key))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Fold the result of reading a nested object into this one.
    pub fn merge(&mut self, ok: bool) {
        self.ok &= ok;
    }
}


#[test]
fn test_partial_read() {
    let value = serde_json::json!({
        "name": "ground",
        "depth": "not a number",
        "items": [1, 2],
    });
    let mut reader = JsonReader::new(&value, "test");
    let mut name = String::new();
    let mut depth = 7i32;
    let mut width = 3u32;
    assert!(reader.read("name", &mut name));
    assert!(!reader.read("depth", &mut depth));
    assert!(!reader.read("width", &mut width));
    assert_eq!(name, "ground");
    assert_eq!(depth, 7);
    assert_eq!(width, 3);
    assert_eq!(reader.chunks("items").len(), 2);
    assert!(reader.chunks("missing").is_empty());
    assert!(!reader.ok());
}
