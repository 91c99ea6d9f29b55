//! Participant identity wire format: `{user_id}_{slug(display_name)}`.

/// Lowercase, ASCII-folded slug with `-` separators. Never contains `_`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

pub fn encode(user_id: i64, display_name: &str) -> String {
    let slug = slug(display_name);
    if slug.is_empty() {
        format!("{user_id}_participant")
    } else {
        format!("{user_id}_{slug}")
    }
}

/// The numeric prefix before the first `_`, or the whole identity if it is
/// purely numeric.
pub fn parse_user_id(identity: &str) -> Option<i64> {
    let prefix = identity.split_once('_').map_or(identity, |(id, _)| id);
    prefix.parse().ok()
}
