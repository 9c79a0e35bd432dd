//! Keyword extraction for peaks.
//!
//! [`clean`] strips the noise every post carries (links, mentions, the query
//! tag itself, retweet markers) and [`extract`] labels the remaining text
//! with its top TextRank keyphrase:
//!
//! 1. Split into sentences and tokenize; drop stopwords, numbers and
//!    one-letter tokens. What remains are the candidate terms.
//! 2. Link candidates that occur within `window` candidates of each other in
//!    the same sentence; edge weight is the co-occurrence count.
//! 3. Rank terms with weighted PageRank (damping 0.85).
//! 4. Keep the top third of terms as keywords, merge runs of adjacent
//!    keywords in the text into phrases (up to three words) and score each
//!    phrase by the sum of its term ranks.
//!
//! The best phrase wins; ties go to the phrase that appears first.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+").expect("valid regex"));
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\S+").expect("valid regex"));
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}][\p{L}\p{N}'_\-]*").expect("valid regex"));
static SENTENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?;]+").expect("valid regex"));

const DAMPING: f64 = 0.85;
const MAX_ITERATIONS: usize = 100;
const CONVERGENCE: f64 = 1e-6;
const MAX_PHRASE_WORDS: usize = 3;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "aren't", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "can't", "cannot", "could", "couldn't", "did",
        "didn't", "do", "does", "doesn't", "doing", "don't", "down", "during", "each", "even",
        "ever", "every", "few", "for", "from", "further", "get", "gets", "got", "had", "hadn't",
        "has", "hasn't", "have", "haven't", "having", "he", "he's", "her", "here", "here's",
        "hers", "herself", "him", "himself", "his", "how", "how's", "i", "i'm", "i've", "i'll",
        "i'd", "if", "in", "into", "is", "isn't", "it", "it's", "its", "itself", "just", "let's",
        "like", "me", "more", "most", "much", "must", "my", "myself", "no", "nor", "not", "now",
        "of", "off", "on", "once", "one", "only", "or", "other", "ought", "our", "ours",
        "ourselves", "out", "over", "own", "really", "same", "she", "she's", "should",
        "shouldn't", "so", "some", "still", "such", "than", "that", "that's", "the", "their",
        "theirs", "them", "themselves", "then", "there", "there's", "these", "they", "they're",
        "they've", "this", "those", "through", "to", "too", "under", "until", "up", "us", "very",
        "via", "was", "wasn't", "we", "we're", "we've", "were", "weren't", "what", "what's",
        "when", "where", "which", "while", "who", "who's", "whom", "why", "will", "with", "won't",
        "would", "wouldn't", "yet", "you", "you're", "you've", "your", "yours", "yourself",
        "amp", "gt", "lt", "rt", "im", "dont", "cant", "u", "ur", "lol", "omg",
    ]
    .into_iter()
    .collect()
});

/// Remove links, mentions, occurrences of `tag`, `RT` markers and line breaks.
///
/// Each pattern is removed once, left to right, so text that a removal
/// splices together (`"RRTT"` becomes `"RT"`) is kept.
pub fn clean(text: &str, tag: &str) -> String {
    let mut out = URL_RE.replace_all(text, "").into_owned();
    out = MENTION_RE.replace_all(&out, "").into_owned();
    if !tag.is_empty() {
        out = out.replace(tag, "");
    }
    out.replace("RT", "").replace('\n', " ").replace('\r', "")
}

/// Top-ranked keyphrase of `text`.
///
/// Fails with [`Error::NoKeyphrase`] when no candidate term survives
/// filtering.
pub fn extract(text: &str, window: usize) -> Result<String> {
    rank_phrases(text, window)
        .into_iter()
        .next()
        .map(|(phrase, _)| phrase)
        .ok_or(Error::NoKeyphrase)
}

/// Join peak texts the way they are ranked: one sentence per post.
pub fn join_texts(texts: &[String]) -> String {
    texts.join(".")
}

/// Clean and label one peak's texts.
pub fn label_peak(texts: &[String], tag: &str, window: usize) -> Result<String> {
    extract(&clean(&join_texts(texts), tag), window)
}

fn is_candidate(token: &str) -> bool {
    token.chars().count() > 1
        && !STOPWORDS.contains(token)
        && !token.chars().all(|c| c.is_numeric() || c == '\'' || c == '-' || c == '_')
}

/// Sentences as token lists, each token `(lowercased, is_candidate)`.
fn tokenize(text: &str) -> Vec<Vec<(String, bool)>> {
    SENTENCE_RE
        .split(text)
        .map(|sentence| {
            TOKEN_RE
                .find_iter(sentence)
                .map(|m| {
                    let t = m.as_str().to_lowercase();
                    let keep = is_candidate(&t);
                    (t, keep)
                })
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Candidate terms scored by weighted PageRank over the co-occurrence graph.
fn rank_terms(sentences: &[Vec<(String, bool)>], window: usize) -> HashMap<String, f64> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut terms: Vec<&str> = Vec::new();
    for sentence in sentences {
        for (t, keep) in sentence {
            if *keep && !index.contains_key(t.as_str()) {
                index.insert(t.as_str(), terms.len());
                terms.push(t.as_str());
            }
        }
    }

    let n = terms.len();
    let mut weights: Vec<HashMap<usize, f64>> = vec![HashMap::new(); n];
    for sentence in sentences {
        let ids: Vec<usize> = sentence
            .iter()
            .filter(|(_, keep)| *keep)
            .map(|(t, _)| index[t.as_str()])
            .collect();
        for (a, &u) in ids.iter().enumerate() {
            for &v in ids.iter().skip(a + 1).take(window.saturating_sub(1)) {
                if u != v {
                    *weights[u].entry(v).or_insert(0.0) += 1.0;
                    *weights[v].entry(u).or_insert(0.0) += 1.0;
                }
            }
        }
    }

    let out_weight: Vec<f64> = weights.iter().map(|w| w.values().sum()).collect();
    let mut scores = vec![1.0; n];
    for _ in 0..MAX_ITERATIONS {
        let mut next = vec![1.0 - DAMPING; n];
        for (u, edges) in weights.iter().enumerate() {
            if out_weight[u] == 0.0 {
                continue;
            }
            for (&v, &w) in edges {
                next[v] += DAMPING * scores[u] * w / out_weight[u];
            }
        }
        let delta: f64 = next
            .iter()
            .zip(scores.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        scores = next;
        if delta < CONVERGENCE {
            break;
        }
    }

    terms
        .into_iter()
        .zip(scores)
        .map(|(t, s)| (t.to_string(), s))
        .collect()
}

/// All keyphrases, best first.
fn rank_phrases(text: &str, window: usize) -> Vec<(String, f64)> {
    let sentences = tokenize(text);
    let scores = rank_terms(&sentences, window);
    if scores.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(&String, &f64)> = scores.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let keep = (ranked.len() / 3).max(1);
    let keywords: HashSet<&str> = ranked
        .into_iter()
        .take(keep)
        .map(|(t, _)| t.as_str())
        .collect();

    // phrase -> (score, first occurrence)
    let mut phrases: HashMap<String, (f64, usize)> = HashMap::new();
    let mut flush = |run: &mut Vec<&str>, position: usize| {
        if !run.is_empty() {
            let score = run.iter().map(|w| scores[*w]).sum();
            phrases.entry(run.join(" ")).or_insert((score, position));
            run.clear();
        }
    };
    let mut position = 0usize;
    for sentence in &sentences {
        let mut run: Vec<&str> = Vec::new();
        for (t, _) in sentence {
            position += 1;
            if !keywords.contains(t.as_str()) {
                flush(&mut run, position);
                continue;
            }
            if run.len() == MAX_PHRASE_WORDS {
                flush(&mut run, position);
            }
            run.push(t.as_str());
        }
        flush(&mut run, position);
    }

    let mut out: Vec<(String, f64, usize)> = phrases
        .into_iter()
        .map(|(p, (s, pos))| (p, s, pos))
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.2.cmp(&b.2)));
    out.into_iter().map(|(p, s, _)| (p, s)).collect()
}
