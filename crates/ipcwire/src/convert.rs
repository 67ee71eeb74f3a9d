use ipcwire_codec::Value;
use serde_json::{Map, Number, Value as Json};

/// Map JSON onto codec values.
///
/// Integers that fit `i64` become `Int`, every other number becomes `Double`.
/// Object members keep their order.
pub fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => number_to_value(&n),
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(json_to_value).collect()),
        Json::Object(members) => Value::Dict(
            members
                .into_iter()
                .map(|(k, v)| (Value::String(k), json_to_value(v)))
                .collect(),
        ),
    }
}

fn number_to_value(n: &Number) -> Value {
    match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// Render a codec value as JSON for output.
///
/// Bytes become an array of numbers, descriptors become `{"fd": n}`, and
/// non-string dict keys are rendered through their JSON text.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Double(d) => Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|byte| Json::from(*byte)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Dict(pairs) => {
            let mut map = Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = match k {
                    Value::String(s) => s.clone(),
                    other => value_to_json(other).to_string(),
                };
                map.insert(key, value_to_json(v));
            }
            Json::Object(map)
        }
        Value::Fd(fd) => {
            let mut map = Map::new();
            map.insert("fd".to_string(), Json::from(fd.raw()));
            Json::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn numbers_split_into_int_and_double() {
        assert_eq!(json_to_value(json!(3)), Value::Int(3));
        assert_eq!(json_to_value(json!(-3)), Value::Int(-3));
        assert_eq!(json_to_value(json!(1.5)), Value::Double(1.5));
        assert_eq!(
            json_to_value(json!(u64::MAX)),
            Value::Double(u64::MAX as f64)
        );
    }

    #[test]
    fn objects_keep_member_order() {
        let json: Json = serde_json::from_str(r#"{"z": 1, "a": [true, null], "m": "x"}"#).unwrap();
        let value = json_to_value(json);
        let keys: Vec<&str> = value
            .as_dict()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, ["z", "a", "m"]);
        assert_eq!(
            value.get("a"),
            Some(&Value::Array(vec![Value::Bool(true), Value::Null]))
        );
    }

    #[test]
    fn renders_bytes_and_non_string_keys() {
        let value = Value::Dict(vec![
            (Value::Int(1), Value::Bytes(vec![0, 255])),
            (Value::from("s"), Value::Double(0.5)),
        ]);
        assert_eq!(value_to_json(&value), json!({"1": [0, 255], "s": 0.5}));
        assert_eq!(value_to_json(&Value::Double(f64::NAN)), Json::Null);
    }
}
