//! Minimal `{{var}}` substitution for the segment filename template (§4.7).
//! Not a full template engine: no conditionals, loops, or escaping beyond
//! literal `{{` matching a known key. An unknown or malformed `{{...}}`
//! is left untouched in the rendered output, same as the original
//! tolerating (and ignoring) a `text/template` execution error mid-render.

use std::collections::HashMap;

/// Render `template`, replacing every `{{key}}` occurrence with its value
/// from `fields`. Keys are looked up verbatim (no trimming of internal
/// whitespace) to keep the substitution a single linear scan.
pub fn render(template: &str, fields: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match fields.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitutes_known_keys() {
        let f = fields(&[("channel", "cam1"), ("suffix", "mp4")]);
        assert_eq!(render("{{channel}}.{{suffix}}", &f), "cam1.mp4");
    }

    #[test]
    fn leaves_unknown_keys_untouched() {
        let f = fields(&[("channel", "cam1")]);
        assert_eq!(render("{{channel}}-{{missing}}", &f), "cam1-{{missing}}");
    }

    #[test]
    fn leaves_unterminated_braces_untouched() {
        let f = HashMap::new();
        assert_eq!(render("prefix-{{unterminated", &f), "prefix-{{unterminated");
    }
}
