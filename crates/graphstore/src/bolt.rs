//! Conversions from the pipeline value model into Bolt parameter values.
//!
//! neo4rs accepts scalars and homogeneous lists directly, but bulk UNWIND
//! writes need full row maps; these helpers build them from `PropValue`s and
//! JSON values.

use neo4rs::{BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType};
use serde_json::Value;

use schema::PropValue;

pub fn bolt_string(s: &str) -> BoltType {
    BoltType::String(BoltString::from(s))
}

pub fn bolt_int(i: i64) -> BoltType {
    BoltType::Integer(BoltInteger::new(i))
}

pub fn bolt_float(f: f64) -> BoltType {
    BoltType::Float(BoltFloat::new(f))
}

pub fn bolt_bool(b: bool) -> BoltType {
    BoltType::Boolean(BoltBoolean::new(b))
}

pub fn bolt_null() -> BoltType {
    BoltType::Null(BoltNull)
}

pub fn prop_to_bolt(value: &PropValue) -> BoltType {
    match value {
        PropValue::Str(s) => bolt_string(s),
        PropValue::Int(i) => bolt_int(*i),
        PropValue::Float(f) => bolt_float(*f),
        PropValue::Bool(b) => bolt_bool(*b),
        PropValue::Timestamp(ts) => bolt_string(&ts.to_rfc3339()),
        PropValue::StrList(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(bolt_string(item));
            }
            BoltType::List(list)
        }
    }
}

pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => bolt_null(),
        Value::Bool(b) => bolt_bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                bolt_int(i)
            } else {
                bolt_float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => bolt_string(s),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt_map = BoltMap::new();
            for (key, item) in map {
                bolt_map.put(BoltString::from(key.as_str()), json_to_bolt(item));
            }
            BoltType::Map(bolt_map)
        }
    }
}

/// Builder for one UNWIND row.
#[derive(Default)]
pub struct RowMap {
    map: BoltMap,
}

impl RowMap {
    pub fn new() -> Self {
        Self { map: BoltMap::new() }
    }

    pub fn put(mut self, key: &str, value: BoltType) -> Self {
        self.map.put(BoltString::from(key), value);
        self
    }

    pub fn put_props(
        self,
        key: &str,
        props: &std::collections::BTreeMap<String, PropValue>,
    ) -> Self {
        let mut bolt_map = BoltMap::new();
        for (name, value) in props {
            bolt_map.put(BoltString::from(name.as_str()), prop_to_bolt(value));
        }
        self.put(key, BoltType::Map(bolt_map))
    }

    pub fn build(self) -> BoltType {
        BoltType::Map(self.map)
    }
}

/// Collect rows into one Bolt list parameter.
pub fn rows_param(rows: Vec<BoltType>) -> BoltType {
    let mut list = BoltList::new();
    for row in rows {
        list.push(row);
    }
    BoltType::List(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_convert() {
        assert!(matches!(prop_to_bolt(&PropValue::Int(8080)), BoltType::Integer(_)));
        assert!(matches!(prop_to_bolt(&PropValue::Bool(true)), BoltType::Boolean(_)));
        assert!(matches!(
            prop_to_bolt(&PropValue::Str("nginx".into())),
            BoltType::String(_)
        ));
    }

    #[test]
    fn string_lists_convert() {
        let value = PropValue::StrList(vec!["a".into(), "b".into()]);
        match prop_to_bolt(&value) {
            BoltType::List(list) => assert_eq!(list.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn json_objects_become_maps() {
        let value = serde_json::json!({"port": 8080, "tls": true, "tags": ["a"]});
        match json_to_bolt(&value) {
            BoltType::Map(map) => assert_eq!(map.len(), 3),
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn row_map_builds() {
        let row = RowMap::new()
            .put("uid", bolt_string("Service:nginx"))
            .put("confidence", bolt_float(1.0))
            .build();
        assert!(matches!(row, BoltType::Map(_)));
    }
}
