//! GS1 DataMatrix payload normalisation and "Честный Знак" field parsing.
//!
//! ## Why normalisation is nontrivial
//!
//! A marking code is nominally `01` + GTIN(14) + `21` + serial(≤20) + GS +
//! (`91`|`93`) + key(4) [+ `92` + crypto], with GS being the single byte
//! `0x1D`. In practice scanners and upstream integrations deliver the group
//! separator in half a dozen encodings: the AIM symbology prefix `]d2`, an
//! FNC1 sentinel byte, visible tokens like `<GS>` or escape text `\x1d`, or
//! (worst of all) the literal letters `GS`. Everything downstream (the
//! sink, the parser, the resume protocol) depends on seeing exactly one
//! canonical form, so every payload passes through [`normalize_gs1_raw`]
//! before it is stored anywhere.
//!
//! The literal-letters repair is offset-aware: `GS91`/`GS92`/`GS93` is only
//! rewritten from offset 18 onward (`01` + 14-digit GTIN + `21` + at least
//! one serial character), because a serial is allowed to contain those very
//! letters.
//!
//! Parsing never fails: on any structural mismatch the fields recovered so
//! far are kept and the rest stay `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// ASCII Group Separator, the canonical GS1 field terminator.
pub const GS: char = '\u{1D}';

/// AI introducing the serial number.
const AI_SERIAL: &str = "21";
/// AIs introducing the 4-character verification key (two scheme variants).
const AI_KEYS: [&str; 2] = ["91", "93"];
/// AI introducing the crypto tail.
const AI_CRYPTO: &str = "92";
/// Service AIs that may follow a literal-letters `GS` miscoding.
const AI_AFTER_GS: [&str; 3] = ["91", "92", "93"];

/// Symbology / FNC1 prefixes some scanners prepend to the payload.
const LEADING_PREFIXES: [&str; 2] = ["]d2", "<FNC1>"];

/// Visible and escaped spellings of the group separator.
static VISIBLE_GS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(<gs>|\[gs\]|\{gs\}|␝|\\x1d|\\u001d|\^\])").unwrap());

/// First offset at which a literal `GS` can be a miscoded separator:
/// `01` + GTIN(14) + `21` + at least one serial character.
const LETTER_GS_MIN_OFFSET: usize = 18;

/// Maximum serial length when no terminator is found.
const SERIAL_MAX_LEN: usize = 20;

/// A parsed "Честный Знак" marking code.
///
/// `raw` always holds the *normalised* payload, not the untouched scanner
/// output. The optional fields are filled on a best-effort basis; their
/// absence is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HonestMarkCode {
    /// Normalised payload (group separators canonicalised to `0x1D`).
    pub raw: String,
    /// GTIN, exactly 14 decimal digits when present.
    pub gtin: Option<String>,
    /// Serial number, at most 20 characters.
    pub serial: Option<String>,
    /// Verification key, exactly 4 characters when present.
    pub verification_key: Option<String>,
    /// Crypto tail (everything after AI `92`).
    pub crypto: Option<String>,
}

impl HonestMarkCode {
    fn new(raw: String) -> Self {
        Self {
            raw,
            gtin: None,
            serial: None,
            verification_key: None,
            crypto: None,
        }
    }

    /// A code is considered valid when both mandatory fields parsed.
    pub fn is_valid(&self) -> bool {
        self.gtin.is_some() && self.serial.is_some()
    }
}

/// Canonicalise a raw DataMatrix payload so that every group separator is
/// the single character `0x1D`.
///
/// Idempotent: `normalize_gs1_raw(normalize_gs1_raw(p)) == normalize_gs1_raw(p)`.
pub fn normalize_gs1_raw(raw_code: &str) -> String {
    let code = strip_leading_markers(raw_code.trim());
    let replaced = VISIBLE_GS_RE.replace_all(code, "\u{1D}");
    // Token replacement can expose a fresh leading separator (payloads like
    // `<GS>01…`); strip again so a second normalisation is a no-op.
    let mut code = strip_leading_markers(&replaced).to_owned();
    repair_letter_gs(&mut code);
    code
}

/// Strip stacked symbology/FNC1/GS prefixes until stable.
fn strip_leading_markers(mut code: &str) -> &str {
    let mut changed = true;
    while changed && !code.is_empty() {
        changed = false;
        for prefix in LEADING_PREFIXES {
            if let Some(rest) = code.strip_prefix(prefix) {
                code = rest;
                changed = true;
            }
        }
        // Some integrations deliver FNC1 as the byte 0xE8.
        if let Some(rest) = code.strip_prefix('\u{E8}') {
            code = rest;
            changed = true;
        }
        if let Some(rest) = code.strip_prefix(GS) {
            code = rest;
            changed = true;
        }
    }
    code
}

/// Rewrite `GS91` / `GS92` / `GS93` to `0x1D` + AI, but only from
/// [`LETTER_GS_MIN_OFFSET`] onward; earlier text belongs to the serial.
fn repair_letter_gs(code: &mut String) {
    for ai in AI_AFTER_GS {
        let marker = format!("GS{ai}");
        let mut start = LETTER_GS_MIN_OFFSET;
        loop {
            while start < code.len() && !code.is_char_boundary(start) {
                start += 1;
            }
            if start >= code.len() {
                break;
            }
            let Some(rel) = code[start..].find(&marker) else {
                break;
            };
            let idx = start + rel;
            code.replace_range(idx..idx + 2, "\u{1D}");
            start = idx + 1;
        }
    }
}

/// Parse a DataMatrix payload into a [`HonestMarkCode`].
///
/// The input is normalised first; all searches below run on the normalised
/// buffer. Supports payloads with and without explicit GS separators.
pub fn parse_honest_mark(raw_code: &str) -> HonestMarkCode {
    let code = normalize_gs1_raw(raw_code);
    let mut result = HonestMarkCode::new(code.clone());

    // AI 01 — GTIN, always 14 digits.
    let Some(idx) = code.find("01") else {
        return result;
    };
    let Some(gtin) = code.get(idx + 2..idx + 16) else {
        return result;
    };
    if !gtin.bytes().all(|b| b.is_ascii_digit()) {
        return result;
    }
    result.gtin = Some(gtin.to_string());
    let mut rest: &str = code.get(idx + 16..).unwrap_or("");

    // AI 21 — serial, variable length up to a GS or a service AI.
    if let Some(serial_data) = rest.strip_prefix(AI_SERIAL) {
        let gs_pos = serial_data.find(GS);
        let ai_pos = AI_KEYS
            .iter()
            .chain(std::iter::once(&AI_CRYPTO))
            .filter_map(|ai| serial_data.find(ai))
            .filter(|&pos| pos <= SERIAL_MAX_LEN)
            .min();
        // Literal "GS" in place of 0x1D, again.
        let letter_gs_pos = AI_KEYS
            .iter()
            .chain(std::iter::once(&AI_CRYPTO))
            .filter_map(|ai| serial_data.find(&format!("GS{ai}")))
            .filter(|&pos| pos <= SERIAL_MAX_LEN)
            .min();

        if let Some(pos) = gs_pos {
            result.serial = Some(serial_data[..pos].to_string());
            rest = &serial_data[pos + 1..];
        } else if let Some(pos) = letter_gs_pos {
            result.serial = Some(serial_data[..pos].to_string());
            rest = serial_data.get(pos + 2..).unwrap_or("");
        } else if let Some(pos) = ai_pos {
            result.serial = Some(serial_data[..pos].to_string());
            rest = &serial_data[pos..];
        } else {
            let serial: String = serial_data.chars().take(SERIAL_MAX_LEN).collect();
            rest = &serial_data[serial.len()..];
            result.serial = Some(serial);
        }
    }

    // AI 91/93 — verification key, exactly 4 characters.
    let key_pos = AI_KEYS.iter().filter_map(|ai| rest.find(ai)).min();
    if let Some(pos) = key_pos {
        if let Some(key) = rest.get(pos + 2..pos + 6) {
            result.verification_key = Some(key.to_string());
        }
        rest = rest.get(pos + 6..).unwrap_or("");
    }

    // AI 92 — crypto tail, the remainder after an optional separator.
    let rest = rest.strip_prefix("GS").unwrap_or(rest);
    let rest = rest.strip_prefix(GS).unwrap_or(rest);
    if let Some(idx) = rest.find(AI_CRYPTO) {
        result.crypto = Some(rest[idx + 2..].to_string());
    }

    result
}
