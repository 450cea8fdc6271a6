use serde::{Deserialize, Deserializer};

/// A PATCH body field: left out, explicitly `null`, or set.
///
/// Pair with `#[serde(default)]` so a missing key becomes `Omitted`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Omitted,
    Null,
    Value(T),
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            None => Patch::Null,
            Some(value) => Patch::Value(value),
        })
    }
}

impl<T> Patch<T> {
    pub fn is_omitted(&self) -> bool {
        matches!(self, Patch::Omitted)
    }
}

impl Patch<String> {
    /// Applies a nullable text patch; blank strings clear the field.
    pub fn apply_text(self, target: &mut Option<String>) {
        match self {
            Patch::Omitted => {}
            Patch::Null => *target = None,
            Patch::Value(value) => *target = normalize_text(Some(value)),
        }
    }
}

/// Trims and turns blank strings into `None`.
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
