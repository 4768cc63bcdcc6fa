// src/parser/fields.rs
use std::str::FromStr;

use crate::errors::PeerLocatorError;

/// Raw value of a `key=value` pair
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldValue<'a> {
    /// Double-quoted string literal, quotes stripped
    Quoted(&'a str),
    Bare(&'a str),
}

impl<'a> FieldValue<'a> {
    fn text(&self) -> &'a str {
        match self {
            FieldValue::Quoted(s) | FieldValue::Bare(s) => s,
        }
    }
}

/// Fields of the bracketed `[key=value, ...]` segment of a log line
#[derive(Debug, Clone, PartialEq)]
pub struct Fields<'a> {
    entries: Vec<(&'a str, FieldValue<'a>)>,
}

impl<'a> Fields<'a> {
    /// Split the segment between the first `[` and the last `]`.
    ///
    /// Commas inside double quotes do not separate fields. Pieces without
    /// `=` are ignored.
    pub fn parse(line: &'a str) -> Result<Self, PeerLocatorError> {
        let start = line.find('[').ok_or(PeerLocatorError::NoFieldSegment)?;
        let end = line.rfind(']').ok_or(PeerLocatorError::NoFieldSegment)?;
        if end <= start {
            return Err(PeerLocatorError::NoFieldSegment);
        }
        let segment = &line[start + 1..end];

        let entries = split_outside_quotes(segment)
            .filter_map(|piece| {
                let (key, value) = piece.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key, classify(value.trim())))
            })
            .collect();

        Ok(Self { entries })
    }

    fn get(&self, key: &str) -> Option<FieldValue<'a>> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    }

    /// Required field coerced to `T`
    pub fn required<T: FromStr>(&self, key: &'static str) -> Result<T, PeerLocatorError> {
        let value = self.get(key).ok_or(PeerLocatorError::MissingField(key))?;
        coerce(key, value.text())
    }

    /// Required field taken as a string, quoted or not
    pub fn string(&self, key: &'static str) -> Result<String, PeerLocatorError> {
        self.get(key)
            .map(|value| value.text().to_string())
            .ok_or(PeerLocatorError::MissingField(key))
    }

    /// Boolean presence flag, false when absent
    pub fn flag(&self, key: &'static str) -> Result<bool, PeerLocatorError> {
        match self.get(key) {
            None => Ok(false),
            Some(value) => parse_bool(value.text()).ok_or_else(|| PeerLocatorError::InvalidField {
                field: key,
                value: value.text().to_string(),
            }),
        }
    }

    /// Optional field, read only if its companion flag is set
    pub fn gated<T: FromStr>(
        &self,
        key: &'static str,
        flag: &'static str,
    ) -> Result<Option<T>, PeerLocatorError> {
        if self.flag(flag)? {
            self.required(key).map(Some)
        } else {
            Ok(None)
        }
    }
}

fn classify(value: &str) -> FieldValue<'_> {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        FieldValue::Quoted(&value[1..value.len() - 1])
    } else {
        FieldValue::Bare(value)
    }
}

fn coerce<T: FromStr>(key: &'static str, text: &str) -> Result<T, PeerLocatorError> {
    text.parse().map_err(|_| PeerLocatorError::InvalidField {
        field: key,
        value: text.to_string(),
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn split_outside_quotes(segment: &str) -> impl Iterator<Item = &str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut piece_start = 0;

    for (i, c) in segment.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                pieces.push(&segment[piece_start..i]);
                piece_start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&segment[piece_start..]);

    pieces.into_iter().filter(|piece| !piece.trim().is_empty())
}
