//! Key addresses given on the command line.
//!
//! A plain number is a linear matrix position; `ROW:COL` names a switch by
//! row and column.

use keybridge_core::{KeyAddress, KeyPosition};

/// Parses `"5"` or `"2:3"` into a [`KeyAddress`].
///
/// # Errors
///
/// A message suitable for a CLI error when either part is not a `u32`.
pub fn parse_key_target(arg: &str) -> Result<KeyAddress, String> {
    let arg = arg.trim();
    match arg.split_once(':') {
        Some((row, col)) => {
            let row = parse_part(row, "row")?;
            let col = parse_part(col, "column")?;
            Ok(KeyAddress::KeyPos(KeyPosition { row, col }))
        }
        None => parse_part(arg, "position").map(KeyAddress::Position),
    }
}

fn parse_part(s: &str, what: &str) -> Result<u32, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("invalid {what} `{s}`: expected a non-negative integer"))
}

/// Short label for progress output.
pub fn describe(address: &KeyAddress) -> String {
    match address {
        KeyAddress::Position(p) => format!("position={p}"),
        KeyAddress::KeyPos(k) => format!("row={} col={}", k.row, k.col),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_linear_position() {
        assert_eq!(parse_key_target("17"), Ok(KeyAddress::Position(17)));
    }

    #[test]
    fn test_parse_row_col() {
        assert_eq!(
            parse_key_target("2:11"),
            Ok(KeyAddress::KeyPos(KeyPosition { row: 2, col: 11 }))
        );
    }

    #[test]
    fn test_parse_rejects_negative_and_garbage() {
        assert!(parse_key_target("-1").is_err());
        assert!(parse_key_target("a:1").is_err());
        assert!(parse_key_target("1:").is_err());
        assert!(parse_key_target("").is_err());
    }

    #[test]
    fn test_describe_both_forms() {
        assert_eq!(describe(&KeyAddress::Position(3)), "position=3");
        assert_eq!(
            describe(&KeyAddress::KeyPos(KeyPosition { row: 1, col: 0 })),
            "row=1 col=0"
        );
    }
}
