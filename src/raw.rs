//! Provider-shaped records as they come off the wire, before normalization.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One flat record from a provider: a parquet row, a CSV line or a scraped table row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: BTreeMap<String, RawValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: RawValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: RawValue) {
        self.fields.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.fields.get(key)
    }

    /// Trimmed, non-empty text. Numbers are rendered so ids stored as ints still read back.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            RawValue::Text(s) => {
                let t = s.trim();
                (!t.is_empty() && !t.eq_ignore_ascii_case("na")).then(|| t.to_string())
            }
            RawValue::Int(n) => Some(n.to_string()),
            RawValue::Float(f) if f.is_finite() => Some(f.to_string()),
            RawValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            RawValue::Int(n) => Some(*n),
            RawValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            RawValue::Bool(b) => Some(i64::from(*b)),
            RawValue::Text(s) => parse_int_text(s),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            RawValue::Int(n) => Some(*n as f64),
            RawValue::Float(f) if f.is_finite() => Some(*f),
            RawValue::Text(s) => {
                let t = s.trim().trim_end_matches('%').replace(',', "");
                t.parse::<f64>().ok().filter(|f| f.is_finite())
            }
            _ => None,
        }
    }

    /// 0/1 indicator columns. `None` when the provider left the cell empty.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.fields.get(key)? {
            RawValue::Bool(b) => Some(*b),
            RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" => Some(true),
                "false" | "f" => Some(false),
                other => parse_int_text(other).map(|n| n != 0),
            },
            _ => self.int(key).map(|n| n != 0),
        }
    }
}

fn parse_int_text(raw: &str) -> Option<i64> {
    let t = raw.trim().replace(',', "");
    if t.is_empty() {
        return None;
    }
    if let Ok(n) = t.parse::<i64>() {
        return Some(n);
    }
    let f = t.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_reads_are_lenient_about_encoding() {
        let rec = RawRecord::new()
            .with("a", RawValue::Text(" 12 ".into()))
            .with("b", RawValue::Float(3.0))
            .with("c", RawValue::Text("1,204".into()))
            .with("d", RawValue::Text("NA".into()))
            .with("e", RawValue::Text("87%".into()))
            .with("f", RawValue::Float(1.0));
        assert_eq!(rec.int("a"), Some(12));
        assert_eq!(rec.int("b"), Some(3));
        assert_eq!(rec.int("c"), Some(1204));
        assert_eq!(rec.text("d"), None);
        assert_eq!(rec.float("e"), Some(87.0));
        assert_eq!(rec.flag("f"), Some(true));
        assert_eq!(rec.int("missing"), None);
    }
}
