use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A staged field that may either hold a concrete value or the `"auto"` sentinel.
///
/// Replaces the stringly-typed `"auto"` literal used elsewhere in this domain: `active`
/// fields are plain `T`, so "active never contains auto" is enforced by the type system
/// rather than by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<T> {
    Auto,
    Concrete(T),
}

impl<T> Value<T> {
    pub fn is_auto(&self) -> bool {
        matches!(self, Value::Auto)
    }

    pub fn as_concrete(&self) -> Option<&T> {
        match self {
            Value::Auto => None,
            Value::Concrete(v) => Some(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Value<U> {
        match self {
            Value::Auto => Value::Auto,
            Value::Concrete(v) => Value::Concrete(f(v)),
        }
    }
}

impl<T> Default for Value<T> {
    fn default() -> Self {
        Value::Auto
    }
}

impl<T> From<T> for Value<T> {
    fn from(value: T) -> Self {
        Value::Concrete(value)
    }
}

impl<T: Serialize> Serialize for Value<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Auto => serializer.serialize_str("auto"),
            Value::Concrete(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Value<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor<T>(std::marker::PhantomData<T>);

        impl<'de, T: Deserialize<'de>> de::Visitor<'de> for ValueVisitor<T> {
            type Value = Value<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"auto\" or a concrete value")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v == "auto" {
                    Ok(Value::Auto)
                } else {
                    T::deserialize(de::value::StrDeserializer::new(v)).map(Value::Concrete)
                }
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::BoolDeserializer::new(v)).map(Value::Concrete)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::U64Deserializer::new(v)).map(Value::Concrete)
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                T::deserialize(de::value::I64Deserializer::new(v)).map(Value::Concrete)
            }
        }

        deserializer.deserialize_any(ValueVisitor(std::marker::PhantomData))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_auto() {
        let v: Value<u16> = Value::Auto;
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"auto\"");
        let back: Value<u16> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn round_trips_concrete() {
        let v: Value<u16> = Value::Concrete(5004);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "5004");
        let back: Value<u16> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
