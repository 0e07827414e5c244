//! Resolves `@_user_N` placeholders in inbound text and rewrites outbound
//! `@Name(open_id)` markup into the vendor's `<at>` tag.

use serde::{Deserialize, Serialize};

/// One entry from an inbound event's mention list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub key: String,
    pub name: String,
    pub open_id: String,
}

/// Replace every `@_user_N` placeholder in `text` with
/// `@<display_name>(<open_id>)`, using `mentions[N].key == "@_user_N"` to
/// find the matching entry. Placeholders with no matching mention are left
/// untouched.
pub fn resolve_mentions(text: &str, mentions: &[Mention]) -> String {
    let mut out = text.to_string();
    for mention in mentions {
        let resolved = format!("@{}({})", mention.name, mention.open_id);
        out = out.replace(&mention.key, &resolved);
    }
    out
}

/// Rewrite outbound `@Name(open_id)` markers into the vendor's
/// `<at user_id="open_id">Name</at>` tag.
pub fn render_outbound_mentions(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'@' {
            if let Some((name, open_id, consumed)) = parse_mention_at(&text[i..]) {
                out.push_str(&format!(r#"<at user_id="{open_id}">{name}</at>"#));
                i += consumed;
                continue;
            }
        }
        let ch = text[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

/// Try to parse `@Name(open_id)` starting at the beginning of `s` (which
/// itself starts with `@`). Returns `(name, open_id, bytes_consumed)`.
fn parse_mention_at(s: &str) -> Option<(String, String, usize)> {
    let rest = &s[1..];
    let open_paren = rest.find('(')?;
    let name = &rest[..open_paren];
    if name.is_empty() {
        return None;
    }
    let after_paren = &rest[open_paren + 1..];
    let close_paren = after_paren.find(')')?;
    let open_id = &after_paren[..close_paren];
    if open_id.is_empty() {
        return None;
    }
    let consumed = 1 + open_paren + 1 + close_paren + 1;
    Some((name.to_string(), open_id.to_string(), consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_single_placeholder() {
        let mentions = vec![Mention {
            key: "@_user_1".to_string(),
            name: "Ada".to_string(),
            open_id: "ou_ada".to_string(),
        }];
        let out = resolve_mentions("hi @_user_1 !", &mentions);
        assert_eq!(out, "hi @Ada(ou_ada) !");
    }

    #[test]
    fn leaves_unmatched_placeholder() {
        let out = resolve_mentions("hi @_user_9", &[]);
        assert_eq!(out, "hi @_user_9");
    }

    #[test]
    fn renders_outbound_at_tag() {
        let out = render_outbound_mentions("hi @Ada(ou_ada), how are you");
        assert_eq!(out, r#"hi <at user_id="ou_ada">Ada</at>, how are you"#);
    }

    #[test]
    fn renders_multiple_outbound_mentions() {
        let out = render_outbound_mentions("@Ada(ou_1) and @Bob(ou_2)");
        assert_eq!(
            out,
            r#"<at user_id="ou_1">Ada</at> and <at user_id="ou_2">Bob</at>"#
        );
    }

    #[test]
    fn ignores_bare_at_without_parens() {
        let out = render_outbound_mentions("email me @ noon");
        assert_eq!(out, "email me @ noon");
    }
}
