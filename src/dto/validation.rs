//! Validation helpers for client supplied values.

use std::sync::LazyLock;

use regex::Regex;
use validator::ValidationError;

/// Origin and destination squares: file `a`..=`i`, rank `1`..=`10`.
static MOVE_NOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-i]([1-9]|10)[a-i]([1-9]|10)$").expect("static regex is valid")
});

/// Dot-separated atoms free of address punctuation, or a quoted string.
static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))$"#)
        .expect("static regex is valid")
});

/// An address whose local part follows [`USERNAME_RE`], at a domain name or
/// a bracketed IPv4 literal.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<local>([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("static regex is valid")
});

/// Validates a move written as origin and destination squares.
///
/// # Examples
///
/// ```ignore
/// validate_move_notation("a1a2")   // Ok
/// validate_move_notation("e10e9")  // Ok
/// validate_move_notation("z9z9")   // Err - unknown file
/// validate_move_notation("a11a1")  // Err - rank out of range
/// ```
pub fn validate_move_notation(notation: &str) -> Result<(), ValidationError> {
    if MOVE_NOTATION_RE.is_match(notation) {
        return Ok(());
    }

    let mut err = ValidationError::new("move_notation_format");
    err.message = Some(
        format!("`{notation}` is not a valid move: expected two squares such as `a1a2` or `e10e9`")
            .into(),
    );
    err.add_param("value".into(), &notation);
    Err(err)
}

/// Validates a username, which has the shape of an email local part.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if USERNAME_RE.is_match(username) {
        return Ok(());
    }

    let mut err = ValidationError::new("username_format");
    err.message = Some(format!("`{username}` is not a valid username").into());
    err.add_param("value".into(), &username);
    Err(err)
}

/// Local part of a well-formed email address.
pub fn email_local_part(email: &str) -> Option<&str> {
    EMAIL_RE
        .captures(email)
        .and_then(|captures| captures.name("local"))
        .map(|local| local.as_str())
}
