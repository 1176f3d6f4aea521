//! `application/x-www-form-urlencoded` encoding of JSON values.
//!
//! Nested arrays and objects use bracket keys (`a[0]=x&b[k]=y`), booleans
//! become `1`/`0` and nulls are left out, which is what the backends parse.

use serde_json::Value;
use url::form_urlencoded::Serializer;

/// Encode `data` as a query string. Scalars at the top level encode to `""`.
#[must_use]
pub fn build_query(data: &Value) -> String {
    let mut serializer = Serializer::new(String::new());
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                append(&mut serializer, key, value);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                append(&mut serializer, &index.to_string(), value);
            }
        }
        _ => {}
    }
    serializer.finish()
}

/// Encode ordered key/value pairs.
pub(crate) fn build_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = Serializer::new(String::new());
    serializer.extend_pairs(pairs);
    serializer.finish()
}

fn append(serializer: &mut Serializer<'_, String>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            serializer.append_pair(key, if *b { "1" } else { "0" });
        }
        Value::Number(n) => {
            serializer.append_pair(key, &n.to_string());
        }
        Value::String(s) => {
            serializer.append_pair(key, s);
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                append(serializer, &format!("{key}[{index}]"), item);
            }
        }
        Value::Object(map) => {
            for (sub, item) in map {
                append(serializer, &format!("{key}[{sub}]"), item);
            }
        }
    }
}
