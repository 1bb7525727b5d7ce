//! Indian-market bedroom shorthand: `NBHK` (bedroom, hall, kitchen) and `1RK`
//! (room, kitchen).

use std::sync::LazyLock;

use parcel_core::{ParamValue, Parameters};
use regex::Regex;

/// Largest BHK count recognized.
pub const MAX_BHK: u8 = 10;

/// Matches `2BHK`, `2 bhk`, `1RK`, `1 Rk` and similar.
static SHORTHAND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"(?i)\b(\d{1,2})\s*(bhk|rk)\b") {
        Ok(regex) => regex,
        Err(err) => panic!("Bedroom shorthand regex is invalid: {err}"),
    });

/// Bedroom count read from a shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bedrooms {
    /// Number of bedrooms
    pub count: u8,
    /// Set for `1RK`, a studio apartment
    pub studio: bool,
}

impl Bedrooms {
    /// Writes `bedrooms` (and `studio` for RK) into `parameters`.
    pub fn apply(self, parameters: &mut Parameters) {
        parameters.insert(
            "bedrooms".to_owned(),
            ParamValue::Integer(i64::from(self.count)),
        );
        if self.studio {
            parameters.insert("studio".to_owned(), ParamValue::Bool(true));
        }
    }
}

/// First valid bedroom shorthand in `text`.
///
/// Case-insensitive with optional whitespace between number and suffix.
/// `BHK` accepts 1 to 10; `RK` accepts only 1. Out-of-range matches are
/// skipped.
pub fn normalize(text: &str) -> Option<Bedrooms> {
    SHORTHAND_REGEX.captures_iter(text).find_map(|caps| {
        let count: u8 = caps.get(1)?.as_str().parse().ok()?;
        let suffix = caps.get(2)?.as_str().to_ascii_lowercase();
        match suffix.as_str() {
            "bhk" if (1..=MAX_BHK).contains(&count) => Some(Bedrooms {
                count,
                studio: false,
            }),
            "rk" if count == 1 => Some(Bedrooms {
                count: 1,
                studio: true,
            }),
            _ => None,
        }
    })
}

/// Prompt table listing every recognized spelling.
pub fn shorthand_table() -> String {
    let mut table: String = (1..=MAX_BHK)
        .map(|count| {
            let noun = if count == 1 { "bedroom" } else { "bedrooms" };
            format!("- {count}BHK, {count} BHK, {count}bhk, {count} bhk: {count} {noun}\n")
        })
        .collect();
    table.push_str("- 1RK, 1 RK, 1rk, 1 rk: 1 bedroom (considered as a studio apartment)\n");
    table
}
