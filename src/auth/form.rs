//! Sign-in form scraping
//!
//! The identity provider serves an HTML login page whose sign-in form carries
//! a handful of hidden inputs (`_csrf`, `_phase`, `_process`,
//! `transaction_id`, `cancel`, ...). Every one of them must be echoed back
//! in the login POST, so this module lifts them out of the page verbatim.
//!
//! ```html
//! <form method="post" id="form" class="sso-form sign-in-form">
//!   <input type="hidden" name="_csrf" value="mh4O8Qn7-wyTq2wB-2OR2bzVdzSSZjlqd4iE" />
//!   <input type="hidden" name="_phase" value="authenticate" />
//!   <input type="hidden" name="cancel" value="" id="form-input-cancel" />
//! </form>
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{PowerwallError, Result};

/// Class substring identifying the sign-in form on the login page.
pub const SIGN_IN_FORM_CLASS: &str = "sign-in-form";

/// Hidden fields of one HTML form, keyed by input name.
///
/// Serializes as a flat map so it can be handed straight to
/// `reqwest::RequestBuilder::form`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, String>);

impl FormFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Sets `name` to `value`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no field was collected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"))
}

fn form_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<form\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("valid form regex")
    })
}

fn form_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</form\s*>").expect("valid form close regex"))
}

fn input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<input\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#).expect("valid input regex")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([^\s"'=<>/]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
            .expect("valid attribute regex")
    })
}

/// Extracts the hidden inputs of the first form whose `class` contains
/// `form_class_substring`.
///
/// Only `<input>` elements with `type="hidden"` (case-insensitive) that
/// carry both a `name` and a `value` attribute are collected. Empty values
/// are kept as-is. Inputs outside the matching form are ignored.
///
/// # Errors
///
/// Returns [`PowerwallError::FormNotFound`] when no form matches. An empty
/// field set is never returned in place of that error.
///
/// # Examples
///
/// ```
/// use powerwall::auth::form::extract_hidden_fields;
///
/// let page = r#"<form class="sso-form sign-in-form">
///   <input type="hidden" name="_csrf" value="abc" />
///   <input type="text" name="identity" value="" />
/// </form>"#;
///
/// let fields = extract_hidden_fields(page, "sign-in-form").unwrap();
/// assert_eq!(fields.get("_csrf"), Some("abc"));
/// assert_eq!(fields.get("identity"), None);
/// ```
pub fn extract_hidden_fields(document: &str, form_class_substring: &str) -> Result<FormFields> {
    let document = comment_re().replace_all(document, "");

    for open in form_open_re().captures_iter(&document) {
        let (Some(whole), Some(attrs)) = (open.get(0), open.get(1)) else {
            continue;
        };
        let attrs = parse_attributes(attrs.as_str());
        let class_matches = attrs
            .get("class")
            .map(|class| class.contains(form_class_substring))
            .unwrap_or(false);
        if !class_matches {
            continue;
        }

        let rest = &document[whole.end()..];
        let body = match form_close_re().find(rest) {
            Some(close) => &rest[..close.start()],
            None => rest,
        };
        return Ok(hidden_inputs(body));
    }

    Err(PowerwallError::FormNotFound(format!(
        "no <form> with class containing '{form_class_substring}'"
    ))
    .into())
}

fn hidden_inputs(form_body: &str) -> FormFields {
    let mut fields = FormFields::new();
    for input in input_re().captures_iter(form_body) {
        let Some(raw) = input.get(1) else { continue };
        let attrs = parse_attributes(raw.as_str());

        let is_hidden = attrs
            .get("type")
            .map(|t| t.eq_ignore_ascii_case("hidden"))
            .unwrap_or(false);
        if !is_hidden {
            continue;
        }

        if let (Some(name), Some(value)) = (attrs.get("name"), attrs.get("value")) {
            fields.set(name.clone(), value.clone());
        }
    }
    fields
}

/// Parses a tag's attribute list. Names are lowercased; the first
/// occurrence of a repeated attribute wins, as in HTML.
fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for cap in attr_re().captures_iter(raw) {
        let Some(name) = cap.get(1) else { continue };
        let value = cap
            .get(2)
            .or_else(|| cap.get(3))
            .or_else(|| cap.get(4))
            .map(|m| decode_entities(m.as_str()))
            .unwrap_or_default();
        attrs
            .entry(name.as_str().to_ascii_lowercase())
            .or_insert(value);
    }
    attrs
}

fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let entity = &tail[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
