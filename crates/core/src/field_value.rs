use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

pub const TRUE_TEXT: &str = "true";
pub const FALSE_TEXT: &str = "false";

/// How a form control stores its value. All values travel as strings;
/// checkboxes use `"true"` / `"false"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Select,
}

impl FieldKind {
    /// Canonical form of `raw` for this kind, used to decide whether an
    /// incoming value differs from what is displayed.
    pub fn normalize(&self, raw: &str) -> String {
        match self {
            Self::Checkbox => encode_bool(parse_bool(raw)).to_string(),
            Self::Text | Self::Select => raw.to_string(),
        }
    }

    pub fn same_value(&self, displayed: &str, incoming: &str) -> bool {
        match self {
            Self::Checkbox => parse_bool(displayed) == parse_bool(incoming),
            Self::Text | Self::Select => displayed == incoming,
        }
    }
}

pub fn encode_bool(b: bool) -> &'static str {
    if b { TRUE_TEXT } else { FALSE_TEXT }
}

/// Only the literal `"true"` is checked; anything else (including an empty
/// string from a never-saved field) is unchecked.
pub fn parse_bool(s: &str) -> bool {
    s == TRUE_TEXT
}

/// The field-keyed forms attached to a show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormName {
    Advance,
    Schedule,
    PostNotes,
}

impl FormName {
    pub const ALL: [FormName; 3] = [Self::Advance, Self::Schedule, Self::PostNotes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Schedule => "schedule",
            Self::PostNotes => "postnotes",
        }
    }
}

impl FromStr for FormName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advance" => Ok(Self::Advance),
            "schedule" => Ok(Self::Schedule),
            "postnotes" => Ok(Self::PostNotes),
            _ => Err(CoreError::InvalidData(format!("unknown form: {s}"))),
        }
    }
}

impl fmt::Display for FormName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkbox_comparison_is_boolean() {
        assert!(FieldKind::Checkbox.same_value("true", "true"));
        assert!(FieldKind::Checkbox.same_value("false", ""));
        assert!(!FieldKind::Checkbox.same_value("false", "true"));
        assert_eq!(FieldKind::Checkbox.normalize("yes"), "false");
    }

    #[test]
    fn text_comparison_is_exact() {
        assert!(FieldKind::Text.same_value("3:00pm", "3:00pm"));
        assert!(!FieldKind::Text.same_value("3:00pm", "3:00 pm"));
        assert!(!FieldKind::Select.same_value("", "Yes"));
    }

    #[test]
    fn form_names_parse() {
        for form in FormName::ALL {
            assert_eq!(form.as_str().parse::<FormName>().unwrap(), form);
        }
        assert!("contacts".parse::<FormName>().is_err());
    }
}
