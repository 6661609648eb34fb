//! Quoting for values interpolated into remote shell commands
//!
//! Every command we send over ssh is a single string interpreted by the
//! remote login shell, so anything that did not originate in this crate is
//! quoted before it is spliced in.

/// Quotes a single shell word
///
/// Words made only of characters that are never special to POSIX shells are
/// returned as-is so commands stay readable in logs.
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));

    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Quotes a remote path while keeping a leading `~/` expandable
pub fn quote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some("") => "~".to_string(),
        Some(rest) => format!("~/{}", quote(rest)),
        None if path == "~" => "~".to_string(),
        None => quote(path),
    }
}
