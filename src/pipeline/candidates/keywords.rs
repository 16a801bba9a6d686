//! Keyword normalisation shared by the pattern cascade, the prompt hints,
//! validation and checkbox pairing.

use std::collections::BTreeSet;

/// Function words that never make two labels similar.
const STOPWORDS: &[&str] = &[
    "les", "des", "une", "par", "pour", "sur", "dans", "avec", "sans", "son", "ses", "leur",
    "leurs", "est", "sont", "qui", "que", "quoi", "dont", "cet", "cette", "ces", "pas", "plus",
    "vous", "votre", "vos", "nous", "notre", "nos", "aux", "elle", "ils", "etre", "avoir", "tout",
    "tous", "toute", "toutes", "lors", "entre", "ainsi", "selon", "the", "and", "for", "with",
    "from", "this", "that", "your", "are",
];

/// Lowercase and strip French diacritics.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'î' | 'ï' | 'í' | 'ì' => out.push('i'),
            'ô' | 'ö' | 'ó' | 'ò' | 'õ' => out.push('o'),
            'ù' | 'û' | 'ü' | 'ú' => out.push('u'),
            'ç' => out.push('c'),
            'ÿ' => out.push('y'),
            'ñ' => out.push('n'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            other => out.push(other),
        }
    }
    out
}

/// Folded alphanumeric tokens, in order, duplicates kept.
pub fn tokens(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens that carry meaning: three characters or more, not a stopword.
pub fn significant_keywords(text: &str) -> BTreeSet<String> {
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Two keywords match when equal or when both are long and share a 5-char stem
/// (`adresse` / `adresses`, `telephone` / `telephonique`).
pub fn keywords_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let stem = |s: &str| s.chars().take(5).collect::<String>();
    a.chars().count() >= 5 && b.chars().count() >= 5 && stem(a) == stem(b)
}

/// Number of `label` keywords found in `text` keywords.
pub fn shared_count(label: &BTreeSet<String>, text: &BTreeSet<String>) -> usize {
    label
        .iter()
        .filter(|k| text.iter().any(|t| keywords_match(k, t)))
        .count()
}

/// Share of `label` keywords present in `text`, in `[0, 1]`.
pub fn overlap(label: &BTreeSet<String>, text: &BTreeSet<String>) -> f32 {
    if label.is_empty() {
        return 0.0;
    }
    shared_count(label, text) as f32 / label.len() as f32
}

/// Symmetric similarity of two keyword sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f32 / union as f32
}

/// True when all `phrase` tokens appear in `text`, in order and contiguous.
pub fn contains_phrase(text_tokens: &[String], phrase: &str) -> bool {
    let phrase_tokens = tokens(phrase);
    if phrase_tokens.is_empty() || phrase_tokens.len() > text_tokens.len() {
        return false;
    }
    text_tokens
        .windows(phrase_tokens.len())
        .any(|w| w == phrase_tokens.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_strips_french_accents() {
        assert_eq!(fold("Téléphone Siège Œuvre"), "telephone siege oeuvre");
    }

    #[test]
    fn significant_keywords_drop_stopwords_and_short_tokens() {
        let kw = significant_keywords("Numéro SIRET de l'entreprise :");
        assert!(kw.contains("numero"));
        assert!(kw.contains("siret"));
        assert!(kw.contains("entreprise"));
        assert!(!kw.contains("de"));
        assert_eq!(kw.len(), 3);
    }

    #[test]
    fn stem_matching() {
        assert!(keywords_match("adresse", "adresses"));
        assert!(!keywords_match("nom", "noms"));
        assert!(!keywords_match("siret", "siren"));
    }

    #[test]
    fn overlap_is_share_of_label_keywords() {
        let label = significant_keywords("Adresse du siège social");
        let text = significant_keywords("Adresse postale");
        assert!((overlap(&label, &text) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(overlap(&BTreeSet::new(), &text), 0.0);
    }

    #[test]
    fn phrase_detection_is_token_based() {
        let t = tokens("Raison sociale de l'entreprise");
        assert!(contains_phrase(&t, "raison sociale"));
        assert!(!contains_phrase(&tokens("Dénomination"), "nom"));
    }

    #[test]
    fn jaccard_similarity() {
        let a = significant_keywords("chiffre affaires annuel");
        let b = significant_keywords("chiffre affaires global");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-6);
    }
}
