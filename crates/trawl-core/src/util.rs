/// Serde adapter for `Option<Duration>` expressed as integer milliseconds.
///
/// `{"timeout": 100}` means 100 ms, matching how job options are written.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, ser};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => {
                let millis = u64::try_from(d.as_millis()).map_err(|_| {
                    <S::Error as ser::Error>::custom(format!(
                        "duration of {d:?} does not fit in u64 milliseconds"
                    ))
                })?;
                serializer.serialize_some(&millis)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
