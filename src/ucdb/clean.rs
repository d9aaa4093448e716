use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new("[^0-9a-zA-Z]+").expect("literal regex"));

/// Reduce a place name to lowercase ASCII letters, digits and underscores for
/// use in file names.
///
/// Missing, empty or whitespace-only names (after dropping non-ASCII
/// characters) become `unnamed`.
pub fn clean_str(value: Option<&str>) -> String {
    let ascii: String = value.unwrap_or_default().nfkd().filter(char::is_ascii).collect();
    let ascii = if ascii.chars().all(|c| c == ' ') { "Unnamed".to_string() } else { ascii };
    NON_ALNUM.replace_all(&ascii, "_").to_lowercase().trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accents_and_punctuation() {
        assert_eq!(clean_str(Some("São Paulo")), "sao_paulo");
        assert_eq!(clean_str(Some("Côte d'Ivoire")), "cote_d_ivoire");
        assert_eq!(clean_str(Some("  Port-au-Prince!  ")), "port_au_prince");
    }

    #[test]
    fn unnamed_fallbacks() {
        assert_eq!(clean_str(None), "unnamed");
        assert_eq!(clean_str(Some("")), "unnamed");
        assert_eq!(clean_str(Some("   ")), "unnamed");
        assert_eq!(clean_str(Some("北京")), "unnamed");
    }
}
