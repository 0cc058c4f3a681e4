// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Sensor line protocol decoder
//!
//! The device firmware has gone through several output formats. Each one is
//! a pure matcher; they are tried in a fixed order and the first match wins.
//! Lines matching none of them are dropped.

use crate::core::{CLEAR, SLOT_COUNT, TRIPPED};

/// Analog values below this read as flame present
pub const ANALOG_THRESHOLD: i64 = 500;

/// A matcher turns one line into a reading, or declines
pub type Matcher = fn(&str) -> Option<[u8; SLOT_COUNT]>;

/// Line formats understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `0,1,1`
    Csv,
    /// `SENSORS:1,0,1`
    Prefixed,
    /// `FIRE D2 D4`, `FLAME 1`
    Keyword,
    /// `120 800 900` analog values
    Analog,
    /// `S2:0`
    Single,
}

/// Formats in priority order
pub const FORMATS: [(LineFormat, Matcher); 5] = [
    (LineFormat::Csv, match_csv),
    (LineFormat::Prefixed, match_prefixed),
    (LineFormat::Keyword, match_keyword),
    (LineFormat::Analog, match_analog),
    (LineFormat::Single, match_single),
];

/// Decode one line into a canonical reading
pub fn decode(line: &str) -> Option<[u8; SLOT_COUNT]> {
    decode_with_format(line).map(|(_, sensors)| sensors)
}

/// Decode one line, also reporting which format matched
pub fn decode_with_format(line: &str) -> Option<(LineFormat, [u8; SLOT_COUNT])> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    FORMATS
        .iter()
        .find_map(|(format, matcher)| matcher(line).map(|sensors| (*format, sensors)))
}

fn coerce(value: i64) -> u8 {
    if value == 0 {
        TRIPPED
    } else {
        CLEAR
    }
}

fn three_ints<'a>(mut parts: impl Iterator<Item = &'a str>) -> Option<[i64; SLOT_COUNT]> {
    let mut values = [0i64; SLOT_COUNT];
    for slot in values.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(values)
}

pub fn match_csv(line: &str) -> Option<[u8; SLOT_COUNT]> {
    let values = three_ints(line.split(','))?;
    Some(values.map(coerce))
}

pub fn match_prefixed(line: &str) -> Option<[u8; SLOT_COUNT]> {
    let rest = line.strip_prefix("SENSORS:")?;
    match_csv(rest.trim())
}

pub fn match_keyword(line: &str) -> Option<[u8; SLOT_COUNT]> {
    let upper = line.to_ascii_uppercase();
    if !upper.contains("FIRE") && !upper.contains("FLAME") {
        return None;
    }

    const TOKENS: [[&str; 2]; SLOT_COUNT] = [["D2", "1"], ["D3", "2"], ["D4", "3"]];

    let words: Vec<&str> = upper
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    // No matching token leaves the reading all clear
    let mut sensors = [CLEAR; SLOT_COUNT];
    for (slot, tokens) in TOKENS.iter().enumerate() {
        if words.iter().any(|w| tokens.contains(w)) {
            sensors[slot] = TRIPPED;
        }
    }
    Some(sensors)
}

pub fn match_analog(line: &str) -> Option<[u8; SLOT_COUNT]> {
    let values = three_ints(line.split_whitespace())?;
    Some(values.map(|v| if v < ANALOG_THRESHOLD { TRIPPED } else { CLEAR }))
}

pub fn match_single(line: &str) -> Option<[u8; SLOT_COUNT]> {
    let rest = line.strip_prefix('S')?;
    let (index, value) = rest.split_once(':')?;
    let slot = match index.trim() {
        "1" => 0,
        "2" => 1,
        "3" => 2,
        _ => return None,
    };
    let value = match value.trim() {
        "0" => TRIPPED,
        "1" => CLEAR,
        _ => return None,
    };

    let mut sensors = [CLEAR; SLOT_COUNT];
    sensors[slot] = value;
    Some(sensors)
}
