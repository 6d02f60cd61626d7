//! SMS destination resolution.

use hireport_common::types::first_present;

use crate::executor::DestinationError;

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// Normalise a phone number to `+digits` / `digits` form.
///
/// Spaces, dashes, dots and parentheses are dropped. A leading `+` is kept.
/// Anything else, or a digit count outside E.164 bounds, is invalid.
pub fn normalize_phone(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("phone number is empty".to_string());
    }

    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for ch in rest.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '-' | '.' | '(' | ')' => {}
            other => return Err(format!("phone number contains invalid character '{}'", other)),
        }
    }

    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return Err(format!(
            "phone number must have {}-{} digits, got {}",
            MIN_DIGITS,
            MAX_DIGITS,
            digits.len()
        ));
    }

    Ok(if plus { format!("+{}", digits) } else { digits })
}

/// Pick the first present candidate and validate it.
///
/// Only the winning candidate is validated. A malformed preferred number does
/// not fall through to the next one.
pub fn resolve_phone<'a, I>(candidates: I) -> Result<String, DestinationError>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let raw = first_present(candidates)
        .ok_or_else(|| DestinationError::Unresolvable("no phone number on file".to_string()))?;

    normalize_phone(raw).map_err(DestinationError::Unresolvable)
}
