//! Built-in transformers.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::rng::row_rng;
use super::{RowContext, Transformer};
use crate::core::Value;
use crate::error::{MaskError, Result};

type HmacSha2 = Hmac<Sha256>;

/// Truncate an ASCII digest string to `maxlen` when `maxlen` is positive.
fn truncate(mut s: String, maxlen: usize) -> String {
    if maxlen > 0 && maxlen < s.len() {
        s.truncate(maxlen);
    }
    s
}

/// Salted SHA-256 digest, hex-encoded.
pub struct HashSha256 {
    salt: String,
    maxlen: usize,
}

impl HashSha256 {
    pub fn new(salt: impl Into<String>, maxlen: usize) -> Self {
        Self {
            salt: salt.into(),
            maxlen,
        }
    }
}

impl Transformer for HashSha256 {
    fn name(&self) -> &str {
        "HashSha256"
    }

    fn transform(&self, value: Value, _row: &RowContext) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(value.display_string().as_bytes());
        let out = hex::encode(hasher.finalize());
        Ok(Value::Text(truncate(out, self.maxlen)))
    }
}

/// HMAC-SHA-256 keyed by the salt, hex-encoded.
pub struct HmacSha256 {
    key: Vec<u8>,
    maxlen: usize,
}

impl HmacSha256 {
    pub fn new(salt: impl Into<String>, maxlen: usize) -> Self {
        Self {
            key: salt.into().into_bytes(),
            maxlen,
        }
    }
}

impl Transformer for HmacSha256 {
    fn name(&self) -> &str {
        "HmacSha256"
    }

    fn transform(&self, value: Value, _row: &RowContext) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mut mac = HmacSha2::new_from_slice(&self.key)
            .map_err(|e| MaskError::Config(format!("HMAC key: {e}")))?;
        mac.update(value.display_string().as_bytes());
        let out = hex::encode(mac.finalize().into_bytes());
        Ok(Value::Text(truncate(out, self.maxlen)))
    }
}

/// Short stable token: lowercase unpadded base32 of the salted digest.
///
/// The salt comes from the row context, so the same input tokenizes
/// identically across tables and columns within a run.
pub struct StableTokenize {
    maxlen: usize,
}

impl StableTokenize {
    pub fn new(maxlen: usize) -> Self {
        Self { maxlen }
    }
}

impl Transformer for StableTokenize {
    fn name(&self) -> &str {
        "StableTokenize"
    }

    fn transform(&self, value: Value, row: &RowContext) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mut hasher = Sha256::new();
        hasher.update(row.salt.as_bytes());
        hasher.update(value.display_string().as_bytes());
        let mut out = BASE32_NOPAD.encode(&hasher.finalize()).to_lowercase();
        if self.maxlen > 0 {
            out = truncate(out, self.maxlen);
        } else if out.len() > 16 {
            out.truncate(16);
        }
        Ok(Value::Text(out))
    }
}

/// Replace every match of a pattern in the string form of the value.
pub struct RegexReplace {
    re: Regex,
    replace: String,
}

impl RegexReplace {
    /// Compile the pattern; an invalid pattern is a configuration error.
    pub fn new(pattern: &str, replace: impl Into<String>) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| MaskError::Config(format!("invalid regex {pattern:?}: {e}")))?;
        Ok(Self {
            re,
            replace: replace.into(),
        })
    }
}

impl Transformer for RegexReplace {
    fn name(&self) -> &str {
        "RegexReplace"
    }

    fn transform(&self, value: Value, _row: &RowContext) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let s = value.display_string();
        Ok(Value::Text(
            self.re.replace_all(&s, self.replace.as_str()).into_owned(),
        ))
    }
}

/// Always NULL.
pub struct SetNull;

impl Transformer for SetNull {
    fn name(&self) -> &str {
        "SetNull"
    }

    fn transform(&self, _value: Value, _row: &RowContext) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Always the configured literal.
pub struct SetValue {
    value: Value,
}

impl SetValue {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Transformer for SetValue {
    fn name(&self) -> &str {
        "SetValue"
    }

    fn transform(&self, _value: Value, _row: &RowContext) -> Result<Value> {
        Ok(self.value.clone())
    }
}

/// Replace by table lookup on the string form; misses pass the string form
/// through unchanged.
pub struct MapReplace {
    map: BTreeMap<String, String>,
}

impl MapReplace {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self { map }
    }
}

impl Transformer for MapReplace {
    fn name(&self) -> &str {
        "MapReplace"
    }

    fn transform(&self, value: Value, _row: &RowContext) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let s = value.display_string();
        match self.map.get(&s) {
            Some(mapped) => Ok(Value::Text(mapped.clone())),
            None => Ok(Value::Text(s)),
        }
    }
}

const FIRST_NAMES: &[&str] = &[
    "Alex", "Jamie", "Taylor", "Jordan", "Morgan", "Casey", "Riley", "Avery", "Parker", "Reese",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Lee", "Brown", "Davis", "Miller", "Wilson", "Moore", "Clark", "Hall",
];
const EMAIL_DOMAINS: &[&str] = &["example.com", "mail.local", "demo.test", "sample.org"];
const STREET_NAMES: &[&str] = &[
    "Oak", "Maple", "Cedar", "Pine", "Elm", "Birch", "Willow", "Lake", "Hill", "Sunset",
];
const CITY_NAMES: &[&str] = &[
    "Springfield",
    "Riverton",
    "Fairview",
    "Franklin",
    "Greenville",
    "Bristol",
    "Clinton",
    "Georgetown",
];
const STATE_CODES: &[&str] = &["CA", "NY", "TX", "FL", "WA", "IL", "PA", "AZ"];

/// Synthesized full name from the fixed word lists.
pub struct FakerName;

impl Transformer for FakerName {
    fn name(&self) -> &str {
        "FakerName"
    }

    fn transform(&self, _value: Value, row: &RowContext) -> Result<Value> {
        let mut rng = row_rng(row);
        let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
        Ok(Value::Text(format!("{first} {last}")))
    }
}

/// Synthesized email address.
pub struct FakerEmail;

impl Transformer for FakerEmail {
    fn name(&self) -> &str {
        "FakerEmail"
    }

    fn transform(&self, _value: Value, row: &RowContext) -> Result<Value> {
        let mut rng = row_rng(row);
        let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())].to_lowercase();
        let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())].to_lowercase();
        let domain = EMAIL_DOMAINS[rng.gen_range(0..EMAIL_DOMAINS.len())];
        Ok(Value::Text(format!("{first}.{last}@{domain}")))
    }
}

/// Synthesized street address.
pub struct FakerAddress;

impl Transformer for FakerAddress {
    fn name(&self) -> &str {
        "FakerAddress"
    }

    fn transform(&self, _value: Value, row: &RowContext) -> Result<Value> {
        let mut rng = row_rng(row);
        let num = rng.gen_range(0..8999) + 100;
        let street = STREET_NAMES[rng.gen_range(0..STREET_NAMES.len())];
        let city = CITY_NAMES[rng.gen_range(0..CITY_NAMES.len())];
        let state = STATE_CODES[rng.gen_range(0..STATE_CODES.len())];
        let zip = rng.gen_range(0..89999) + 10000;
        Ok(Value::Text(format!("{num} {street} St, {city}, {state} {zip}")))
    }
}

/// Synthesized phone number.
pub struct FakerPhone;

impl Transformer for FakerPhone {
    fn name(&self) -> &str {
        "FakerPhone"
    }

    fn transform(&self, _value: Value, row: &RowContext) -> Result<Value> {
        let mut rng = row_rng(row);
        let area = rng.gen_range(0..800) + 200;
        let prefix = rng.gen_range(0..800) + 200;
        let line = rng.gen_range(0..9000) + 1000;
        Ok(Value::Text(format!("{area}-{prefix}-{line}")))
    }
}

/// Shift date-like values by a per-row number of days in
/// `[-max_days, +max_days]`.
///
/// Integers are treated as Unix seconds. Strings are parsed as RFC 3339,
/// then as `YYYY-MM-DD`; unparseable strings and every other storage class
/// pass through unchanged.
pub struct DateShift {
    max_days: i64,
}

impl DateShift {
    pub fn new(max_days: i64) -> Self {
        let max_days = if max_days <= 0 { 30 } else { max_days };
        Self { max_days }
    }
}

impl Transformer for DateShift {
    fn name(&self) -> &str {
        "DateShift"
    }

    fn transform(&self, value: Value, row: &RowContext) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let days = row_rng(row).gen_range(0..(self.max_days * 2 + 1)) - self.max_days;
        match value {
            Value::Integer(secs) => Ok(Value::Integer(secs + days * 86_400)),
            Value::Text(s) => {
                if let Ok(ts) = DateTime::parse_from_rfc3339(&s) {
                    let shifted = ts + Duration::days(days);
                    return Ok(Value::Text(
                        shifted.to_rfc3339_opts(SecondsFormat::Secs, true),
                    ));
                }
                if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                    let shifted = date + Duration::days(days);
                    return Ok(Value::Text(shifted.format("%Y-%m-%d").to_string()));
                }
                Ok(Value::Text(s))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::test_row;

    fn assert_deterministic(tr: &dyn Transformer) {
        let row = test_row();
        let a = tr.transform(Value::Text("input".into()), &row).unwrap();
        let b = tr.transform(Value::Text("input".into()), &row).unwrap();
        assert_eq!(a, b, "{} not deterministic", tr.name());
    }

    #[test]
    fn test_all_builtins_deterministic() {
        let cases: Vec<Box<dyn Transformer>> = vec![
            Box::new(HashSha256::new("salt", 0)),
            Box::new(HmacSha256::new("salt", 0)),
            Box::new(StableTokenize::new(16)),
            Box::new(FakerName),
            Box::new(FakerEmail),
            Box::new(FakerAddress),
            Box::new(FakerPhone),
            Box::new(DateShift::new(7)),
        ];
        for tr in &cases {
            assert_deterministic(tr.as_ref());
        }
    }

    #[test]
    fn test_hash_null_passthrough() {
        let row = test_row();
        for tr in [
            Box::new(HashSha256::new("salt", 8)) as Box<dyn Transformer>,
            Box::new(HmacSha256::new("salt", 8)),
            Box::new(StableTokenize::new(8)),
            Box::new(RegexReplace::new("a", "b").unwrap()),
            Box::new(MapReplace::new(BTreeMap::new())),
            Box::new(DateShift::new(7)),
        ] {
            assert_eq!(tr.transform(Value::Null, &row).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_hash_sha256_known_value() {
        // SHA-256("saltinput") with no truncation.
        let row = test_row();
        let out = HashSha256::new("salt", 0)
            .transform(Value::Text("input".into()), &row)
            .unwrap();
        let Value::Text(s) = out else { panic!("expected text") };
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));

        let truncated = HashSha256::new("salt", 12)
            .transform(Value::Text("input".into()), &row)
            .unwrap();
        assert_eq!(truncated, Value::Text(s[..12].to_string()));
    }

    #[test]
    fn test_hmac_ignores_seed() {
        let tr = HmacSha256::new("salt", 16);
        let mut row_a = test_row();
        row_a.seed = 1;
        let mut row_b = test_row();
        row_b.seed = 999;
        let a = tr.transform(Value::Text("user1@example.com".into()), &row_a).unwrap();
        let b = tr.transform(Value::Text("user1@example.com".into()), &row_b).unwrap();
        assert_eq!(a, b);
        let Value::Text(s) = a else { panic!("expected text") };
        assert_eq!(s.len(), 16);
    }

    #[test]
    fn test_stable_tokenize_default_length() {
        let row = test_row();
        let out = StableTokenize::new(0)
            .transform(Value::Text("input".into()), &row)
            .unwrap();
        let Value::Text(s) = out else { panic!("expected text") };
        assert_eq!(s.len(), 16);
        assert_eq!(s, s.to_lowercase());
    }

    #[test]
    fn test_regex_replace() {
        let tr = RegexReplace::new("[0-9]+", "X").unwrap();
        let out = tr
            .transform(Value::Text("abc123def".into()), &test_row())
            .unwrap();
        assert_eq!(out, Value::Text("abcXdef".into()));
    }

    #[test]
    fn test_regex_invalid_pattern_fails_at_build() {
        assert!(matches!(
            RegexReplace::new("[", "X"),
            Err(MaskError::Config(_))
        ));
    }

    #[test]
    fn test_set_null_and_set_value() {
        let row = test_row();
        assert_eq!(
            SetNull.transform(Value::Text("x".into()), &row).unwrap(),
            Value::Null
        );
        assert_eq!(
            SetValue::new(Value::Text("redacted".into()))
                .transform(Value::Integer(5), &row)
                .unwrap(),
            Value::Text("redacted".into())
        );
    }

    #[test]
    fn test_map_replace_hit_and_miss() {
        let mut map = BTreeMap::new();
        map.insert("US".to_string(), "XX".to_string());
        let tr = MapReplace::new(map);
        let row = test_row();
        assert_eq!(
            tr.transform(Value::Text("US".into()), &row).unwrap(),
            Value::Text("XX".into())
        );
        assert_eq!(
            tr.transform(Value::Text("CA".into()), &row).unwrap(),
            Value::Text("CA".into())
        );
        // Misses convert to the string form.
        assert_eq!(
            tr.transform(Value::Integer(7), &row).unwrap(),
            Value::Text("7".into())
        );
    }

    #[test]
    fn test_faker_outputs_from_word_lists() {
        let mut row_a = test_row();
        row_a.pk = vec![Value::Integer(1)];
        let mut row_b = test_row();
        row_b.pk = vec![Value::Integer(2)];

        for row in [&row_a, &row_b] {
            let out = FakerName.transform(Value::Null, row).unwrap();
            let Value::Text(name) = out else { panic!("expected text") };
            let (first, last) = name.split_once(' ').unwrap();
            assert!(FIRST_NAMES.contains(&first));
            assert!(LAST_NAMES.contains(&last));

            // Stable across repeated invocations.
            assert_eq!(
                FakerName.transform(Value::Null, row).unwrap(),
                Value::Text(name)
            );
        }
    }

    #[test]
    fn test_faker_email_shape() {
        let out = FakerEmail.transform(Value::Null, &test_row()).unwrap();
        let Value::Text(email) = out else { panic!("expected text") };
        let (local, domain) = email.split_once('@').unwrap();
        assert!(EMAIL_DOMAINS.contains(&domain));
        let (first, last) = local.split_once('.').unwrap();
        assert!(FIRST_NAMES.iter().any(|n| n.to_lowercase() == first));
        assert!(LAST_NAMES.iter().any(|n| n.to_lowercase() == last));
    }

    #[test]
    fn test_faker_phone_ranges() {
        let out = FakerPhone.transform(Value::Null, &test_row()).unwrap();
        let Value::Text(phone) = out else { panic!("expected text") };
        let parts: Vec<i64> = phone.split('-').map(|p| p.parse().unwrap()).collect();
        assert_eq!(parts.len(), 3);
        assert!((200..=999).contains(&parts[0]));
        assert!((200..=999).contains(&parts[1]));
        assert!((1000..=9999).contains(&parts[2]));
    }

    #[test]
    fn test_date_shift_formats() {
        let tr = DateShift::new(7);
        let row = test_row();

        // Unix seconds shift by whole days.
        let out = tr.transform(Value::Integer(1_700_000_000), &row).unwrap();
        let Value::Integer(shifted) = out else { panic!("expected integer") };
        let delta = shifted - 1_700_000_000;
        assert_eq!(delta % 86_400, 0);
        assert!((-7 * 86_400..=7 * 86_400).contains(&delta));

        // Plain dates keep their format.
        let out = tr.transform(Value::Text("2024-03-01".into()), &row).unwrap();
        let Value::Text(s) = out else { panic!("expected text") };
        assert!(NaiveDate::parse_from_str(&s, "%Y-%m-%d").is_ok());

        // RFC 3339 keeps its format.
        let out = tr
            .transform(Value::Text("2024-03-01T12:00:00Z".into()), &row)
            .unwrap();
        let Value::Text(s) = out else { panic!("expected text") };
        assert!(DateTime::parse_from_rfc3339(&s).is_ok());

        // Unparseable strings pass through unchanged.
        assert_eq!(
            tr.transform(Value::Text("not a date".into()), &row).unwrap(),
            Value::Text("not a date".into())
        );
        // So do reals and blobs.
        assert_eq!(
            tr.transform(Value::Real(1.5), &row).unwrap(),
            Value::Real(1.5)
        );
    }
}
