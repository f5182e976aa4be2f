//! Filename conventions shared by content items, directories and new pages.
//!
//! Content follows an optional `NNN-name` pattern: the numeric prefix orders
//! entries, the rest is the human name with dashes standing in for spaces.
//!
//! - `010-Grey-Wolf.jpg` → number 10, title "Grey Wolf"
//! - `IMG_4056.jpeg` → no number, title "IMG_4056"
//! - `020-Travel/` → number 20, title "Travel"
//!
//! Titles derived here are the last-resort default when neither embedded
//! metadata nor a sidecar provides one.

/// Result of parsing a name like `020-My-Best-Photos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Number prefix if present.
    pub number: Option<u32>,
    /// Name after the `NNN-` prefix with dashes preserved; the full input if unnumbered.
    pub name: String,
    /// Name with dashes turned into spaces.
    pub display_title: String,
}

/// Parse an entry name following the `NNN-name` convention.
///
/// - `"020-My-Best-Photos"` → number=Some(20), display_title="My Best Photos"
/// - `"001"` → number=Some(1), display_title=""
/// - `"wip-drafts"` → number=None, display_title="wip drafts"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some((prefix, rest)) = name.split_once('-')
        && let Ok(num) = prefix.parse::<u32>()
    {
        return ParsedName {
            number: Some(num),
            name: rest.to_string(),
            display_title: rest.replace('-', " "),
        };
    }
    if let Ok(num) = name.parse::<u32>() {
        return ParsedName {
            number: Some(num),
            name: String::new(),
            display_title: String::new(),
        };
    }
    ParsedName {
        number: None,
        name: name.to_string(),
        display_title: name.replace('-', " "),
    }
}

/// Default title for a file stem or directory name.
///
/// Number-only names (`001`) have no human part, so the raw stem is used
/// rather than an empty title.
pub fn title_from_stem(stem: &str) -> String {
    let parsed = parse_entry_name(stem);
    let title = parsed.display_title.trim();
    if title.is_empty() {
        stem.to_string()
    } else {
        title.to_string()
    }
}

const MAX_SLUG_LEN: usize = 80;

/// Turn a free-form title into a lowercase, URL-safe slug.
///
/// Non-alphanumerics become dashes, runs of dashes collapse, and long slugs
/// are cut at the last dash before the length limit.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut prev_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');

    if trimmed.len() <= MAX_SLUG_LEN {
        trimmed.to_string()
    } else {
        let truncated = &trimmed[..MAX_SLUG_LEN];
        match truncated.rfind('-') {
            Some(pos) => truncated[..pos].to_string(),
            None => truncated.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_with_multi_word_name() {
        let p = parse_entry_name("020-My-Best-Photos");
        assert_eq!(p.number, Some(20));
        assert_eq!(p.name, "My-Best-Photos");
        assert_eq!(p.display_title, "My Best Photos");
    }

    #[test]
    fn number_only_no_dash() {
        let p = parse_entry_name("001");
        assert_eq!(p.number, Some(1));
        assert_eq!(p.display_title, "");
    }

    #[test]
    fn unnumbered_with_dashes() {
        let p = parse_entry_name("wip-drafts");
        assert_eq!(p.number, None);
        assert_eq!(p.display_title, "wip drafts");
    }

    #[test]
    fn title_from_numbered_stem() {
        assert_eq!(title_from_stem("010-Grey-Wolf"), "Grey Wolf");
    }

    #[test]
    fn title_from_camera_stem_keeps_underscores() {
        assert_eq!(title_from_stem("IMG_4056"), "IMG_4056");
    }

    #[test]
    fn title_from_number_only_stem_falls_back_to_stem() {
        assert_eq!(title_from_stem("001"), "001");
        assert_eq!(title_from_stem("001-"), "001-");
    }

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("My Great Photo!"), "my-great-photo");
        assert_eq!(slugify("  a -- b  "), "a-b");
    }

    #[test]
    fn slugify_drops_non_ascii() {
        assert_eq!(slugify("café au lait"), "caf-au-lait");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn slugify_truncates_at_word_boundary() {
        let title = "word ".repeat(30);
        let slug = slugify(&title);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("word-word"));
    }
}
