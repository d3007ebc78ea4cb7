use bstr::ByteSlice;

use crate::error::RefError;

/// Bytes forbidden anywhere in a ref name, besides control characters.
const FORBIDDEN_CHARS: &[u8] = b" ~^:?*[\\";

/// Whether `name` is usable as a ref or branch name.
///
/// Rejected: an empty name, a lone `@`, control characters or any of
/// ` ~^:?*[\`, a leading `/` or `.`, a trailing `/` or `.lock`, and the
/// sequences `/.`, `..` and `@{`.
pub fn is_valid_name(name: &[u8]) -> bool {
    validate(name).is_ok()
}

/// Like [`is_valid_name`], reporting the failure as a branch-name error.
pub fn check_branch_name(name: &str) -> Result<(), RefError> {
    validate(name.as_bytes()).map_err(|_| RefError::InvalidName(name.to_owned()))
}

fn validate(name: &[u8]) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty");
    }
    if name == b"@" {
        return Err("lone '@'");
    }
    if name
        .iter()
        .any(|&b| b <= 0x20 || b == 0x7f || FORBIDDEN_CHARS.contains(&b))
    {
        return Err("forbidden character");
    }
    if name.starts_with(b".") || name.starts_with(b"/") {
        return Err("bad leading character");
    }
    if name.ends_with(b"/") || name.ends_with(b".lock") {
        return Err("bad suffix");
    }
    for seq in [&b"/."[..], b"..", b"@{"] {
        if name.find(seq).is_some() {
            return Err("forbidden sequence");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        for name in ["master", "topic/feature", "refs/heads/main", "v1.0", "HEAD", "a@b"] {
            assert!(is_valid_name(name.as_bytes()), "{name}");
        }
    }

    #[test]
    fn invalid_names() {
        for name in [
            "",
            "@",
            ".hidden",
            "dir/.hidden",
            "a..b",
            "/abs",
            "trailing/",
            "main.lock",
            "main@{0}",
            "bad name",
            "bad~1",
            "bad^",
            "bad:x",
            "bad?",
            "bad*",
            "bad[",
            "bad\\x",
            "tab\there",
            "del\x7f",
        ] {
            assert!(!is_valid_name(name.as_bytes()), "{name:?}");
        }
    }

    #[test]
    fn branch_error_message() {
        let err = check_branch_name("^").unwrap_err();
        assert_eq!(err.to_string(), "'^' is not a valid branch name.");
    }
}
