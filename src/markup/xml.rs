// Minimal entity handling for WordprocessingML text nodes.

/// Decode the five predefined XML entities plus numeric character references.
pub fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';') {
            Some(semi) if semi <= 10 => {
                let entity = &tail[1..semi];
                match decode_entity(entity) {
                    Some(ch) => out.push(ch),
                    None => out.push_str(&tail[..=semi]),
                }
                rest = &tail[semi + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Escape text for insertion inside a `w:t` element.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_named_entities() {
        assert_eq!(unescape("R&amp;D &lt;ok&gt;"), "R&D <ok>");
        assert_eq!(unescape("l&apos;entreprise"), "l'entreprise");
    }

    #[test]
    fn unescape_numeric_references() {
        assert_eq!(unescape("&#233;t&#xE9;"), "été");
    }

    #[test]
    fn unescape_leaves_unknown_entities() {
        assert_eq!(unescape("a &nbsp; b"), "a &nbsp; b");
        assert_eq!(unescape("lonely & sign"), "lonely & sign");
    }

    #[test]
    fn escape_round_trips_through_unescape() {
        let text = "Tom & Jerry <\"quoted\">";
        assert_eq!(unescape(&escape_text(text)), text);
    }
}
