use lexiforge_core::fingerprint;

/// File stem for an arbitrary item identifier. Identifiers that had to be
/// altered get a digest suffix so that `a/b` and `a_b` stay distinct.
pub(crate) fn file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    let trimmed = out.trim_matches(|c: char| c == '.' || c.is_whitespace() || c == '_');
    if trimmed == id {
        return trimmed.to_string();
    }

    let digest = &fingerprint([id])[..16];
    if trimmed.is_empty() {
        format!("item-{digest}")
    } else {
        format!("{trimmed}-{digest}")
    }
}
