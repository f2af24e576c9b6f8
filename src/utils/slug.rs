use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("valid slug regex"));

/// Used when a title has no sluggable characters at all
pub const FALLBACK_SLUG: &str = "blog";

/// Lowercase ASCII slug. Accented letters are folded through NFKD (so
/// "Café" gives "cafe"); whatever is still not ASCII is dropped. Then
/// anything that is not a word char, space or hyphen goes, runs of
/// spaces/hyphens become one hyphen and leading/trailing hyphens and
/// underscores are trimmed.
pub fn slugify(title: &str) -> String {
    let ascii: String = title.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, "");
    let joined = SEPARATORS.replace_all(cleaned.trim(), "-");
    joined.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// First free slug among `base`, `base-1`, `base-2`, ...
pub fn unique_slug(base: &str, taken: &[String]) -> String {
    let taken: HashSet<&str> = taken.iter().map(String::as_str).collect();
    if !taken.contains(base) {
        return base.to_string();
    }

    let mut counter = 1u32;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Slug base for a title, never empty
pub fn slug_base(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust: Ownership & Borrowing!  "), "rust-ownership-borrowing");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("_under_score_"), "under_score");
    }

    #[test]
    fn accents_fold_to_ascii() {
        assert_eq!(slugify("Café au lait"), "cafe-au-lait");
        assert_eq!(slugify("Café Résumé"), "cafe-resume");
        assert_eq!(slugify("Über naïve"), "uber-naive");
        assert_eq!(slugify("ﬁne ½"), "fine-12");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn empty_titles_fall_back() {
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slug_base("!!!"), FALLBACK_SLUG);
    }

    #[test]
    fn unique_slug_counts_up_from_one() {
        let mut taken = Vec::new();
        let mut produced = Vec::new();
        for _ in 0..4 {
            let slug = unique_slug("my-post", &taken);
            taken.push(slug.clone());
            produced.push(slug);
        }
        assert_eq!(produced, vec!["my-post", "my-post-1", "my-post-2", "my-post-3"]);
    }

    #[test]
    fn unique_slug_fills_gaps() {
        let taken = vec!["post".to_string(), "post-2".to_string()];
        assert_eq!(unique_slug("post", &taken), "post-1");
    }
}
