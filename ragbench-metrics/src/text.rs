//! Text primitives shared by the deterministic scorers.

use std::collections::HashMap;

/// Lowercased alphanumeric tokens. Everything else separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Split on sentence-ending punctuation followed by whitespace or end of text.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace());
        if at_boundary {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, s: &str) {
    let s = s.trim();
    if !s.is_empty() {
        sentences.push(s.to_string());
    }
}

/// Length of the longest common subsequence of two token lists.
pub fn lcs_len(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Two rolling rows over the shorter side.
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for x in long {
        for (j, y) in short.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Precision, recall and their harmonic mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Prf {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Prf {
    pub fn new(precision: f64, recall: f64) -> Self {
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
        }
    }

    fn from_counts(matched: usize, candidate_len: usize, reference_len: usize) -> Self {
        Self::new(ratio(matched, candidate_len), ratio(matched, reference_len))
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// ROUGE-L of `candidate` against `reference`.
pub fn rouge_l(candidate: &str, reference: &str) -> Prf {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    Prf::from_counts(lcs_len(&cand, &refr), cand.len(), refr.len())
}

fn counts<'a>(tokens: impl IntoIterator<Item = &'a [String]>) -> HashMap<&'a [String], usize> {
    let mut map = HashMap::new();
    for t in tokens {
        *map.entry(t).or_insert(0) += 1;
    }
    map
}

/// Clipped n-gram matches of `cand` in `refr`, and the candidate n-gram total.
fn ngram_matches(cand: &[String], refr: &[String], n: usize) -> (usize, usize) {
    if cand.len() < n {
        return (0, 0);
    }
    let cand_counts = counts(cand.windows(n));
    let ref_counts = if refr.len() < n {
        HashMap::new()
    } else {
        counts(refr.windows(n))
    };
    let matched = cand_counts
        .iter()
        .map(|(gram, c)| (*c).min(ref_counts.get(gram).copied().unwrap_or(0)))
        .sum();
    (matched, cand.len() + 1 - n)
}

/// Multiset unigram overlap of `candidate` against `reference`.
pub fn token_overlap(candidate: &str, reference: &str) -> Prf {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    let (matched, _) = ngram_matches(&cand, &refr, 1);
    Prf::from_counts(matched, cand.len(), refr.len())
}

const BLEU_MAX_N: usize = 4;

/// Geometric mean of clipped n-gram precisions up to 4-grams, with add-one
/// smoothing above unigrams. No brevity penalty.
pub fn ngram_precision(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    ngram_precision_tokens(&cand, &refr)
}

fn ngram_precision_tokens(cand: &[String], refr: &[String]) -> f64 {
    let max_n = BLEU_MAX_N.min(cand.len());
    if max_n == 0 {
        return 0.0;
    }
    let mut log_sum = 0.0;
    for n in 1..=max_n {
        let (matched, total) = ngram_matches(cand, refr, n);
        let p = if n == 1 {
            ratio(matched, total)
        } else {
            (matched as f64 + 1.0) / (total as f64 + 1.0)
        };
        if p == 0.0 {
            return 0.0;
        }
        log_sum += p.ln();
    }
    (log_sum / max_n as f64).exp()
}

/// Sentence BLEU of `candidate` against a single reference.
pub fn bleu(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    if cand.is_empty() || refr.is_empty() {
        return 0.0;
    }
    let brevity = if cand.len() >= refr.len() {
        1.0
    } else {
        (1.0 - refr.len() as f64 / cand.len() as f64).exp()
    };
    brevity * ngram_precision_tokens(&cand, &refr)
}

/// Cosine similarity of term-frequency vectors.
pub fn tf_cosine(a: &str, b: &str) -> f64 {
    let a_tokens = tokenize(a);
    let b_tokens = tokenize(b);
    let a_tf = counts(a_tokens.chunks(1));
    let b_tf = counts(b_tokens.chunks(1));

    let dot: usize = a_tf
        .iter()
        .map(|(t, c)| c * b_tf.get(t).copied().unwrap_or(0))
        .sum();
    let norm = |tf: &HashMap<&[String], usize>| {
        tf.values().map(|c| (c * c) as f64).sum::<f64>().sqrt()
    };
    let denom = norm(&a_tf) * norm(&b_tf);
    if denom == 0.0 { 0.0 } else { dot as f64 / denom }
}

/// Multiset character n-grams of the tokenised text, tokens joined by one space.
///
/// A non-empty text shorter than `n` characters is a single gram.
fn char_ngrams(text: &str, n: usize) -> HashMap<String, usize> {
    let chars: Vec<char> = tokenize(text).join(" ").chars().collect();
    let mut grams = HashMap::new();
    if chars.is_empty() {
        return grams;
    }
    let n = n.max(1).min(chars.len());
    for window in chars.windows(n) {
        *grams.entry(window.iter().collect::<String>()).or_insert(0) += 1;
    }
    grams
}

/// Dice coefficient of character n-gram multisets.
///
/// Tolerates spelling and inflection differences that token metrics miss.
pub fn char_ngram_dice(a: &str, b: &str, n: usize) -> f64 {
    let a_grams = char_ngrams(a, n);
    let b_grams = char_ngrams(b, n);
    let total: usize = a_grams.values().sum::<usize>() + b_grams.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }
    let shared: usize = a_grams
        .iter()
        .map(|(g, c)| (*c).min(b_grams.get(g).copied().unwrap_or(0)))
        .sum();
    2.0 * shared as f64 / total as f64
}
