//! Free-text normalization for job descriptions.
//!
//! Produces the canonical token stream that both training and assignment
//! vectorize. Pure and infallible: any input maps to some (possibly empty)
//! string.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Tokens shorter than this (in chars) are dropped.
pub const MIN_TOKEN_LEN: usize = 2;

/// Cleaned text plus the number of surviving tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanText {
    pub text: String,
    pub n_tokens: usize,
}

impl CleanText {
    pub fn is_empty(&self) -> bool {
        self.n_tokens == 0
    }
}

pub struct Normalizer {
    url: Regex,
    email: Regex,
    digits: Regex,
    stopwords: HashSet<&'static str>,
}

impl Normalizer {
    fn new() -> Self {
        Self {
            url: Regex::new(r"(?i)\b(?:https?://|www\.)\S+").unwrap(),
            email: Regex::new(r"(?i)[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)+").unwrap(),
            digits: Regex::new(r"[0-9]+").unwrap(),
            stopwords: FRENCH_STOPWORDS
                .iter()
                .chain(ENGLISH_STOPWORDS.iter())
                .copied()
                .collect(),
        }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    pub fn clean(&self, raw: Option<&str>) -> CleanText {
        let raw = match raw {
            Some(r) if !r.trim().is_empty() => r,
            _ => return CleanText::default(),
        };

        let lowered = raw.to_lowercase();
        let no_urls = self.url.replace_all(&lowered, " ");
        let no_emails = self.email.replace_all(&no_urls, " ");
        let folded = fold_accents(&no_emails);
        let no_digits = self.digits.replace_all(&folded, " ");

        let reduced: String = no_digits
            .chars()
            .map(|c| if is_kept_char(c) { c } else { ' ' })
            .collect();

        let tokens: Vec<&str> = reduced
            .split_whitespace()
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .filter(|t| t.chars().any(|c| c.is_alphabetic()))
            .filter(|t| !self.is_stopword(t))
            .collect();

        CleanText {
            n_tokens: tokens.len(),
            text: tokens.join(" "),
        }
    }
}

/// Singleton normalizer, compiled once at process startup.
pub static NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::new);

/// Normalize raw text with the shared normalizer.
pub fn clean_text(raw: Option<&str>) -> CleanText {
    NORMALIZER.clean(raw)
}

/// Letters, digits, and the two symbols that carry meaning in skill names (`c++`, `c#`).
fn is_kept_char(c: char) -> bool {
    c.is_alphanumeric() || c == '+' || c == '#'
}

/// Fold French/Latin diacritics and ligatures to ASCII. Input is already lowercase.
fn fold_accents(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            'ß' => out.push_str("ss"),
            // Typographic apostrophe splits elisions like l'equipe / d'experience.
            '\u{2019}' | '\'' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

// Accent-folded, since matching happens after folding.
const FRENCH_STOPWORDS: &[&str] = &[
    "au", "aux", "avec", "ce", "ces", "cet", "cette", "dans", "de", "des", "du", "elle",
    "elles", "en", "et", "eux", "il", "ils", "je", "la", "le", "les", "leur", "leurs", "lui",
    "ma", "mais", "me", "meme", "mes", "moi", "mon", "ne", "nos", "notre", "nous", "on", "ou",
    "par", "pas", "pour", "qu", "que", "qui", "sa", "se", "ses", "son", "sur", "ta", "te",
    "tes", "toi", "ton", "tu", "un", "une", "vos", "votre", "vous", "ete", "etre", "avoir",
    "ai", "as", "avons", "avez", "ont", "est", "sont", "sommes", "etes", "suis", "sera",
    "seront", "serait", "etait", "etaient", "fait", "faire", "ainsi", "afin", "aussi",
    "autre", "autres", "chez", "comme", "dont", "donc", "entre", "ici", "lors", "plus",
    "moins", "peu", "tres", "tout", "tous", "toute", "toutes", "sans", "sous", "selon",
    "vers", "via", "deja", "encore", "chaque", "quelle", "quelles", "quel", "quels",
    "cela", "celle", "celui", "ceux", "ni", "si", "ca", "sein", "egalement", "notamment",
    "etc", "hf", "fh",
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "him", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom",
    "why", "will", "with", "would", "you", "your", "yours", "within", "across", "also",
    "etc", "per", "may", "must", "us", "able",
];
