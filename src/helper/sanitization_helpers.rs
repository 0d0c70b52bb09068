use std::collections::HashSet;

/// Cleans user supplied HTML (post bodies, comments) down to a safe formatting subset.
/// Scripts, event handlers and unknown tags are removed.
pub fn sanitize_html(input: &str) -> String {
    let tags_to_allow = [
        "h1", "h2", "h3", "h4", "h5", "h6", "b", "strong", "i", "em", "u", "p", "br", "a", "ul", "ol", "li",
        "blockquote", "code", "pre", "hr", "img", "table", "thead", "tbody", "tr", "th", "td", "s", "del", "span",
        "div", "sub", "sup",
    ];
    let safe_attributes = ["src", "href", "alt", "title", "class", "width", "height", "align"];

    ammonia::Builder::new()
        .tags(tags_to_allow.iter().cloned().collect::<HashSet<_>>())
        .generic_attributes(safe_attributes.iter().cloned().collect::<HashSet<_>>())
        .link_rel(Some("nofollow ugc"))
        .clean(input)
        .to_string()
}

/// Strips all HTML tags from input, keeping the text. Entities stay encoded.
pub fn strip_all_html(input: &str) -> String {
    ammonia::Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Human readable text of an HTML fragment: tags removed, entities decoded and
/// whitespace collapsed.
pub fn plain_text(input: &str) -> String {
    let stripped = strip_all_html(input);
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short plain-text preview of a post body, cut to `max_chars` characters.
pub fn announce(text: &str, max_chars: usize) -> String {
    let plain = plain_text(text);
    if plain.chars().count() <= max_chars {
        return plain;
    }
    let cut: String = plain.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// File name safe to place on disk: path components, leading dots and anything
/// outside `[A-Za-z0-9._-]` are dropped, spaces become underscores.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches(&['.', '_'][..]).to_string()
}

/// Lower-cased extension of a file name, if it has one.
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_removed_from_post_html() {
        let clean = sanitize_html(r#"<p onclick="x()">Hi<script>alert(1)</script></p><a href="http://e.com">l</a>"#);
        assert!(!clean.contains("script"));
        assert!(!clean.contains("onclick"));
        assert!(clean.contains("<p>Hi</p>"));
        assert!(clean.contains("rel=\"nofollow ugc\""));
    }

    #[test]
    fn plain_text_decodes_entities_and_collapses_whitespace() {
        assert_eq!(plain_text("<p>Fish &amp; chips</p>\n\n<p>today</p>"), "Fish & chips today");
    }

    #[test]
    fn announce_is_cut_on_characters() {
        assert_eq!(announce("<b>short</b>", 10), "short");
        assert_eq!(announce("Привет, мир и все остальные", 6), "Привет...");
    }

    #[test]
    fn unsafe_file_names_are_cleaned() {
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("my photo (1).JPG"), "my_photo_1.JPG");
        assert_eq!(secure_filename(".hidden"), "hidden");
        assert_eq!(secure_filename("..\\evil.png"), "evil.png");
    }

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(file_extension("cat.PNG"), Some("png".into()));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension(".png"), None);
    }
}
