//! Serde helpers for the encodings the REST API uses.

// used for `#[serde(skip_serializing_if = "is_false")]` attrs
#[inline]
pub fn is_false(b: &bool) -> bool {
    !*b
}

/// int64/uint64 values are sent as JSON strings, but some endpoints (and
/// hand-written fixtures) use plain numbers. Both are accepted on the way in,
/// strings are always written on the way out.
pub mod int64 {
    use std::fmt;
    use std::marker::PhantomData;
    use std::str::FromStr;

    use serde::de;

    struct Int64Visitor<T>(PhantomData<fn(T)>);

    impl<T> de::Visitor<'_> for Int64Visitor<T>
    where
        T: FromStr + TryFrom<i64> + TryFrom<u64>,
    {
        type Value = T;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer, or a string containing an integer")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            v.parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            <T as TryFrom<i64>>::try_from(v)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            <T as TryFrom<u64>>::try_from(v)
                .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }
    }

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: fmt::Display,
        S: serde::Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr + TryFrom<i64> + TryFrom<u64>,
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(Int64Visitor(PhantomData))
    }

    pub mod optional {
        use std::fmt;
        use std::marker::PhantomData;
        use std::str::FromStr;

        use serde::de;

        struct OptionalVisitor<T>(PhantomData<fn(T)>);

        impl<'de, T> de::Visitor<'de> for OptionalVisitor<T>
        where
            T: FromStr + TryFrom<i64> + TryFrom<u64>,
        {
            type Value = Option<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an optional integer")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(None)
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                super::deserialize(deserializer).map(Some)
            }
        }

        pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
        where
            T: fmt::Display,
            S: serde::Serializer,
        {
            match value {
                Some(value) => serializer.collect_str(value),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
        where
            T: FromStr + TryFrom<i64> + TryFrom<u64>,
            D: serde::Deserializer<'de>,
        {
            deserializer.deserialize_option(OptionalVisitor(PhantomData))
        }
    }
}

/// Timestamps encoded as int64 milliseconds since the unix epoch.
pub mod timestamp_ms {
    pub mod optional {
        use serde::de::Error as _;
        use time::OffsetDateTime;

        pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            let millis = value.map(|ts| (ts.unix_timestamp_nanos() / 1_000_000) as i64);
            super::super::int64::optional::serialize(&millis, serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let millis: Option<i64> = super::super::int64::optional::deserialize(deserializer)?;
            let Some(millis) = millis else {
                return Ok(None);
            };

            OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
                .map(Some)
                .map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::OffsetDateTime;

    #[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "super::int64::optional"
        )]
        num_rows: Option<u64>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "super::timestamp_ms::optional"
        )]
        creation_time: Option<OffsetDateTime>,
    }

    #[test]
    fn test_int64_accepts_strings_and_numbers() {
        let from_str: Sample = serde_json::from_value(json!({ "numRows": "42" })).unwrap();
        let from_num: Sample = serde_json::from_value(json!({ "numRows": 42 })).unwrap();
        let missing: Sample = serde_json::from_value(json!({ "numRows": null })).unwrap();

        assert_eq!(from_str.num_rows, Some(42));
        assert_eq!(from_num.num_rows, Some(42));
        assert_eq!(missing.num_rows, None);

        assert_eq!(serde_json::to_value(&from_num).unwrap(), json!({ "numRows": "42" }));
    }

    #[test]
    fn test_timestamp_ms() {
        let sample: Sample =
            serde_json::from_value(json!({ "creationTime": "1718236800457" })).unwrap();

        let ts = sample.creation_time.unwrap();
        assert_eq!(ts.unix_timestamp(), 1718236800);
        assert_eq!(ts.millisecond(), 457);

        assert_eq!(
            serde_json::to_value(&sample).unwrap(),
            json!({ "creationTime": "1718236800457" })
        );
    }
}
