//! JSON encoding and decoding under configurable wire conventions.
//!
//! The client applies one [`Conventions`] value to every response it decodes and
//! every body it sends, so Rust types can keep snake_case fields regardless of
//! how the API spells them.
//!
//! Key casing applies to every object key. The date format only applies to
//! fields that opt in through the [`date`] serde helpers; other strings are
//! never touched.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::cell::RefCell;

/// How object keys are spelled on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyCasing {
    /// Keys are used unchanged.
    #[default]
    AsIs,
    /// The API uses camelCase. Keys are converted to snake_case before decoding
    /// and back to camelCase when encoding request bodies.
    CamelCase,
}

/// How timestamps are written on the wire.
///
/// Read and written by fields annotated with [`date`] or [`date::option`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DateFormat {
    /// RFC 3339, which is also what `chrono`'s own serde support uses.
    #[default]
    Rfc3339,
    /// A chrono `strftime` pattern such as `"%Y-%m-%d %H:%M:%S"`, interpreted as UTC.
    ///
    /// A pattern without time fields is read as midnight.
    Custom(String),
}

impl DateFormat {
    /// Parses `s` in this format, or returns `None` if it does not match.
    pub fn parse(&self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|date| date.with_timezone(&Utc)),
            DateFormat::Custom(pattern) => parse_custom_date(s, pattern),
        }
    }

    pub fn format(&self, date: &DateTime<Utc>) -> String {
        match self {
            DateFormat::Rfc3339 => date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            DateFormat::Custom(pattern) => date.format(pattern).to_string(),
        }
    }
}

/// Key and date conventions shared by all calls of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conventions {
    pub key_casing: KeyCasing,
    pub date_format: DateFormat,
}

impl Conventions {
    pub fn new(key_casing: KeyCasing, date_format: DateFormat) -> Self {
        Self {
            key_casing,
            date_format,
        }
    }
}

thread_local! {
    static DATE_FORMAT: RefCell<Option<DateFormat>> = const { RefCell::new(None) };
}

/// Runs `f` with `format` as the format seen by the [`date`] helpers on this
/// thread. Scopes nest; the previous format is restored when `f` returns or
/// unwinds.
///
/// [`decode`] and [`Endpoint::with_body_using`](crate::Endpoint::with_body_using)
/// already do this, so callers only need it when serializing by hand.
pub fn with_date_format<R>(format: &DateFormat, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<DateFormat>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            DATE_FORMAT.with(|cell| *cell.borrow_mut() = previous);
        }
    }

    let previous = DATE_FORMAT.with(|cell| cell.replace(Some(format.clone())));
    let _restore = Restore(previous);
    f()
}

fn current_date_format() -> DateFormat {
    DATE_FORMAT
        .with(|cell| cell.borrow().clone())
        .unwrap_or_default()
}

/// Serde helpers for `DateTime<Utc>` fields that follow the client's
/// [`DateFormat`].
///
/// ```
/// use chrono::{DateTime, Utc};
/// use fetchkit::decode::{decode, Conventions, DateFormat, KeyCasing};
/// use http::StatusCode;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Event {
///     title: String,
///     #[serde(with = "fetchkit::decode::date")]
///     starts_at: DateTime<Utc>,
/// }
///
/// let conventions = Conventions::new(KeyCasing::AsIs, DateFormat::Custom("%Y-%m-%d".into()));
/// let body = br#"{"title": "2024-03-01", "starts_at": "2024-03-01"}"#;
/// let event: Event = decode(StatusCode::OK, body, &conventions).unwrap();
/// assert_eq!(event.title, "2024-03-01");
/// assert_eq!(event.starts_at.to_rfc3339(), "2024-03-01T00:00:00+00:00");
/// ```
///
/// Outside of a [`with_date_format`] scope the helpers read and write RFC 3339.
pub mod date {
    use super::current_date_format;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        date: &DateTime<Utc>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&current_date_format().format(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse::<D::Error>(&raw)
    }

    fn parse<E: serde::de::Error>(raw: &str) -> std::result::Result<DateTime<Utc>, E> {
        let format = current_date_format();
        format
            .parse(raw)
            .ok_or_else(|| E::custom(format!("`{}` does not match date format {:?}", raw, format)))
    }

    /// The same for `Option<DateTime<Utc>>`. Pair with `#[serde(default)]` to
    /// accept a missing field.
    pub mod option {
        use super::{current_date_format, parse};
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            date: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.serialize_some(&current_date_format().format(date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| parse::<D::Error>(&raw))
                .transpose()
        }
    }
}

/// Decodes a successful response body into `T`.
///
/// An empty body decodes as JSON `null`, so `()` and `Option<_>` work for
/// `204 No Content`. Fields using the [`date`] helpers read
/// `conventions.date_format`.
///
/// # Errors
///
/// Any mismatch between the payload and `T` (missing field, wrong type,
/// malformed date, invalid JSON) returns [`Error::DecodeFailure`].
///
/// # Examples
///
/// ```
/// use fetchkit::decode::{decode, Conventions, KeyCasing, DateFormat};
/// use http::StatusCode;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User { user_id: u64, display_name: String }
///
/// let conventions = Conventions::new(KeyCasing::CamelCase, DateFormat::Rfc3339);
/// let body = br#"{"userId": 7, "displayName": "Ada"}"#;
/// let user: User = decode(StatusCode::OK, body, &conventions).unwrap();
/// assert_eq!(user.user_id, 7);
/// ```
pub fn decode<T: DeserializeOwned>(
    status: StatusCode,
    bytes: &[u8],
    conventions: &Conventions,
) -> Result<T> {
    with_date_format(&conventions.date_format, || decode_inner(bytes, conventions)).map_err(|e| {
        Error::DecodeFailure {
            message: e.to_string(),
            raw_response: String::from_utf8_lossy(bytes).into_owned(),
            status,
        }
    })
}

fn decode_inner<T: DeserializeOwned>(
    bytes: &[u8],
    conventions: &Conventions,
) -> std::result::Result<T, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(Value::Null);
    }
    match conventions.key_casing {
        KeyCasing::AsIs => serde_json::from_slice(bytes),
        KeyCasing::CamelCase => {
            let value: Value = serde_json::from_slice(bytes)?;
            serde_json::from_value(rename_keys(value, &camel_to_snake))
        }
    }
}

/// Serializes a request body for the wire, converting keys per
/// `conventions.key_casing`.
///
/// Dates were already rendered when the body was attached to its endpoint.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] if the body cannot be rendered as JSON.
pub fn encode_body(body: &Value, conventions: &Conventions) -> Result<Vec<u8>> {
    let encoded = match conventions.key_casing {
        KeyCasing::AsIs => serde_json::to_vec(body),
        KeyCasing::CamelCase => serde_json::to_vec(&rename_keys(body.clone(), &snake_to_camel)),
    };
    encoded.map_err(|e| Error::invalid_request(format!("Failed to serialize body: {}", e)))
}

fn rename_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| (rename(&key), rename_keys(v, rename)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| rename_keys(v, rename))
                .collect(),
        ),
        other => other,
    }
}

fn parse_custom_date(s: &str, pattern: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(s, pattern).ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// `userId` -> `user_id`, `htmlURLValue` -> `html_url_value`.
pub(crate) fn camel_to_snake(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_ascii_uppercase() => next.is_some_and(|n| n.is_ascii_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `user_id` -> `userId`. Leading underscores are kept.
pub(crate) fn snake_to_camel(key: &str) -> String {
    let trimmed = key.trim_start_matches('_');
    let mut out = String::with_capacity(key.len());
    out.push_str(&key[..key.len() - trimmed.len()]);
    for (i, part) in trimmed.split('_').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}
