//! JSON encoding for `f32` buffers.
//!
//! JSON has no literal for infinities or NaN, those are written as the
//! strings `"inf"`, `"-inf"` and `"NaN"` so every buffer decodes back to the
//! exact values that were sent.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Float {
    Number(f32),
    Text(String),
}

impl From<f32> for Float {
    fn from(value: f32) -> Self {
        if value.is_finite() {
            Float::Number(value)
        } else {
            Float::Text(value.to_string())
        }
    }
}

impl Float {
    fn into_f32<E: de::Error>(self) -> Result<f32, E> {
        match self {
            Float::Number(value) => Ok(value),
            Float::Text(text) => text
                .parse()
                .map_err(|_| E::custom(format!("invalid float {text:?}"))),
        }
    }
}

struct Seq<'a>(&'a [f32]);

impl Serialize for Seq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|&value| Float::from(value)))
    }
}

fn decode<E: de::Error>(values: Vec<Float>) -> Result<Vec<f32>, E> {
    values.into_iter().map(Float::into_f32).collect()
}

pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
    Seq(values).serialize(serializer)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
    decode(Vec::deserialize(deserializer)?)
}

pub mod option {
    use super::*;

    pub fn serialize<S>(values: &Option<Vec<f32>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        values.as_deref().map(Seq).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<f32>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Vec<Float>>::deserialize(deserializer)?
            .map(decode)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use crate::specs::object::TensorSpec;

    #[test]
    fn test_non_finite_values_survive_json() {
        let spec = TensorSpec {
            shape: vec![4],
            data: vec![1.5, f32::INFINITY, f32::NEG_INFINITY, f32::NAN],
            requires_grad: true,
            grad: Some(vec![f32::INFINITY, 0.0, -2.0, 1.0]),
        };

        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("null"));

        let back: TensorSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data[..3], [1.5, f32::INFINITY, f32::NEG_INFINITY]);
        assert!(back.data[3].is_nan());
        assert_eq!(back.grad, spec.grad);
    }

    #[test]
    fn test_rejects_unknown_text() {
        let json = r#"{"shape":[1],"data":["one"],"requires_grad":false}"#;
        assert!(serde_json::from_str::<TensorSpec>(json).is_err());
    }
}
