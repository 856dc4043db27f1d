//! Author name normalization.
//!
//! Derives the two keys the disambiguation engine works with:
//! a truncated key (first initial + last name token) used for bucketing, and a
//! stripped key (name without whitespace or hyphens) used as a strict fallback.

use crate::error::{Result, TaxoError};

/// ASCII hyphen plus the Unicode hyphen and dash variants seen in author names
const HYPHENS: &[char] = &[
    '\u{002D}', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}',
    '\u{2043}', '\u{FE63}', '\u{FF0D}',
];

/// Keys derived from a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameKeys {
    pub truncated: String,
    pub stripped: String,
}

/// Derive both keys from a display name.
///
/// Fails with `InvalidInput` when the name has no printable characters.
pub fn normalize(display_name: &str) -> Result<NameKeys> {
    Ok(NameKeys {
        truncated: truncated_key(display_name)?,
        stripped: stripped_key(display_name)?,
    })
}

/// First character + " " + last whitespace-delimited token, case preserved.
///
/// A single-token name yields `"M Madonna"` for `"Madonna"`.
pub fn truncated_key(display_name: &str) -> Result<String> {
    let name = printable(display_name)?;
    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| empty_name(display_name))?;
    let last = name.split_whitespace().last().unwrap_or(name);
    Ok(format!("{} {}", first, last))
}

/// The name with all whitespace and hyphen variants removed, case preserved.
///
/// Periods are kept: "J. Smith" and "J Smith" get different stripped keys.
pub fn stripped_key(display_name: &str) -> Result<String> {
    let name = printable(display_name)?;
    Ok(name
        .chars()
        .filter(|c| !c.is_whitespace() && !HYPHENS.contains(c))
        .collect())
}

fn printable(display_name: &str) -> Result<&str> {
    let name = display_name.trim();
    if name.chars().any(|c| !c.is_whitespace() && !c.is_control()) {
        Ok(name)
    } else {
        Err(empty_name(display_name))
    }
}

fn empty_name(display_name: &str) -> TaxoError {
    TaxoError::InvalidInput(format!(
        "display name has no printable characters: {:?}",
        display_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_key() {
        assert_eq!(truncated_key("John Smith").unwrap(), "J Smith");
        assert_eq!(truncated_key("J Smith").unwrap(), "J Smith");
        assert_eq!(truncated_key("Maria de la Cruz").unwrap(), "M Cruz");
        assert_eq!(truncated_key("  anna  Berg ").unwrap(), "a Berg");
    }

    #[test]
    fn test_single_token_name() {
        assert_eq!(truncated_key("Madonna").unwrap(), "M Madonna");
    }

    #[test]
    fn test_non_ascii_initial() {
        assert_eq!(truncated_key("Øystein Åsen").unwrap(), "Ø Åsen");
    }

    #[test]
    fn test_stripped_key() {
        assert_eq!(stripped_key("Jean-Luc Picard").unwrap(), "JeanLucPicard");
        assert_eq!(stripped_key("Jean\u{2010}Luc  Picard").unwrap(), "JeanLucPicard");
        assert_eq!(stripped_key("Jean\u{2013}Luc Picard").unwrap(), "JeanLucPicard");
        // periods are kept
        assert_eq!(stripped_key("J. R. Smith").unwrap(), "J.R.Smith");
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(normalize(""), Err(TaxoError::InvalidInput(_))));
        assert!(matches!(normalize("   "), Err(TaxoError::InvalidInput(_))));
        assert!(matches!(normalize("\u{0007}\t"), Err(TaxoError::InvalidInput(_))));
    }

    #[test]
    fn test_normalize() {
        let keys = normalize("Anne-Marie van Dijk").unwrap();
        assert_eq!(keys.truncated, "A Dijk");
        assert_eq!(keys.stripped, "AnneMarievanDijk");
    }
}
