// ABOUTME: Size-bounded entity codec mapping a LogRecord to and from a table property set.
// ABOUTME: Truncates free text, swaps oversize records for a placeholder, and decodes corrupt rows to a placeholder.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::record::LogRecord;

/// The property set of one table entity.
pub type Properties = BTreeMap<String, String>;

/// Property holding the JSON serialization of the record minus its free-text fields.
pub const SERIALIZED_RECORD: &str = "SerializedRecord";
/// Property holding the (truncated) primary free-text field.
pub const DETAIL: &str = "Detail";
/// Property holding the (truncated) secondary free-text field.
pub const SECONDARY_DETAIL: &str = "SecondaryDetail";

/// Store-specific size limits. Text is measured in UTF-16 code units, the
/// unit table stores count in; `bytes_per_unit` is what one unit costs in the
/// store's encoding (2 for UTF-16, 3 bounds UTF-8 since an astral character
/// is two units and four bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    pub max_property_bytes: usize,
    pub bytes_per_unit: usize,
    pub excerpt_units: usize,
}

/// Smallest per-property budget, in units, that still holds an oversize
/// placeholder with room for its message.
pub const MIN_PROPERTY_UNITS: usize = 512;

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_property_bytes: 64_000,
            bytes_per_unit: 2,
            excerpt_units: 4_000,
        }
    }
}

impl CodecLimits {
    /// Unit budget of a single property.
    pub fn max_units(&self) -> usize {
        self.max_property_bytes / self.bytes_per_unit.max(1)
    }

    /// Size of `value` in bytes as the store would account for it.
    pub fn property_size(&self, value: &str) -> usize {
        utf16_len(value) * self.bytes_per_unit
    }
}

/// A record whose serialization does not fit in one property.
#[derive(Debug, Error)]
#[error("serialized record is {units} units, property limit is {limit} units")]
pub struct TooLarge {
    pub serialized: String,
    pub units: usize,
    pub limit: usize,
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Longest prefix of `text` that is at most `max_units` UTF-16 units,
/// cut on a character boundary.
fn truncate_units(text: &str, max_units: usize) -> String {
    let mut used = 0;
    for (idx, c) in text.char_indices() {
        used += c.len_utf16();
        if used > max_units {
            return text[..idx].to_string();
        }
    }
    text.to_string()
}

/// First stage of encoding: truncate the free-text fields and serialize the
/// rest. Fails only when the remaining fields alone exceed the budget.
pub fn try_encode(record: &LogRecord, limits: &CodecLimits) -> Result<Properties, TooLarge> {
    let max_units = limits.max_units();

    let detail = record
        .detail
        .as_deref()
        .map(|d| truncate_units(d, max_units));
    let secondary_detail = record
        .secondary_detail
        .as_deref()
        .map(|d| truncate_units(d, max_units));

    let mut stripped = record.clone();
    stripped.detail = None;
    stripped.secondary_detail = None;

    // LogRecord has only string-keyed fields, serialization cannot fail.
    let serialized = serde_json::to_string(&stripped).unwrap_or_default();
    let units = utf16_len(&serialized);
    if units > max_units {
        return Err(TooLarge {
            serialized,
            units,
            limit: max_units,
        });
    }

    let mut properties = Properties::new();
    properties.insert(SERIALIZED_RECORD.to_string(), serialized);
    if let Some(detail) = detail {
        properties.insert(DETAIL.to_string(), detail);
    }
    if let Some(secondary_detail) = secondary_detail {
        properties.insert(SECONDARY_DETAIL.to_string(), secondary_detail);
    }
    Ok(properties)
}

/// Serialize `placeholder`, shortening its message and then its host until
/// it fits in `max_units`. None when even the bare placeholder is too large.
fn fit_placeholder(mut placeholder: LogRecord, max_units: usize) -> Option<String> {
    loop {
        let serialized = serde_json::to_string(&placeholder).unwrap_or_default();
        let over = utf16_len(&serialized).saturating_sub(max_units);
        if over == 0 {
            return Some(serialized);
        }

        let field = if !placeholder.message.is_empty() {
            &mut placeholder.message
        } else if !placeholder.host.is_empty() {
            &mut placeholder.host
        } else {
            return None;
        };
        // Each unit removed from the raw text removes at least one unit of JSON.
        let keep = utf16_len(field).saturating_sub(over);
        let shortened = truncate_units(field, keep);
        *field = shortened;
    }
}

/// Second stage of encoding: the property set of the oversize placeholder.
/// Every property fits in `limits`. A budget too small for the placeholder
/// itself keeps only the detail, which decodes as a corrupted entry.
pub fn encode_fallback(too_large: &TooLarge, limits: &CodecLimits) -> Properties {
    let max_units = limits.max_units();
    let excerpt_units = limits.excerpt_units.min(max_units / 2);
    let excerpt = truncate_units(&too_large.serialized, excerpt_units);

    let mut placeholder = LogRecord::oversize(&excerpt);
    let detail = placeholder
        .detail
        .take()
        .map(|d| truncate_units(&d, max_units))
        .unwrap_or_default();

    let mut properties = Properties::new();
    match fit_placeholder(placeholder, max_units) {
        Some(serialized) => {
            properties.insert(SERIALIZED_RECORD.to_string(), serialized);
        }
        None => tracing::warn!(
            "property limit of {} units cannot hold the oversize placeholder, keeping detail only",
            max_units
        ),
    }
    properties.insert(DETAIL.to_string(), detail);
    properties
}

/// Encode a record into a property set that always respects `limits`.
pub fn encode(record: &LogRecord, limits: &CodecLimits) -> Properties {
    match try_encode(record, limits) {
        Ok(properties) => properties,
        Err(too_large) => {
            tracing::warn!(
                "record of kind {} replaced by oversize placeholder: {}",
                record.kind,
                too_large
            );
            encode_fallback(&too_large, limits)
        }
    }
}

/// Decode a property set. Never fails: a missing or unreadable primary
/// property yields a corrupted-entry placeholder.
pub fn decode(properties: &Properties) -> LogRecord {
    let Some(serialized) = properties.get(SERIALIZED_RECORD) else {
        tracing::warn!("table entity has no {} property", SERIALIZED_RECORD);
        return LogRecord::corrupted(None);
    };

    let mut record: LogRecord = match serde_json::from_str(serialized) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("table entity has unreadable {}: {}", SERIALIZED_RECORD, e);
            return LogRecord::corrupted(Some(&e.to_string()));
        }
    };

    if let Some(detail) = properties.get(DETAIL) {
        record.detail = Some(detail.clone());
    }
    if let Some(secondary_detail) = properties.get(SECONDARY_DETAIL) {
        record.secondary_detail = Some(secondary_detail.clone());
    }

    record
}
