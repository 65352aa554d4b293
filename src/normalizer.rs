//! Error-line normalization into stable signatures.
//!
//! A signature is the message text with its variable parts (numbers, hex
//! literals, hashes, paths, URLs) replaced by fixed markers, so that the
//! same failure reported with different ids or timings aggregates under one
//! key. Substitutions run in a fixed order; reordering them changes output.

use std::sync::LazyLock;

use regex::Regex;

/// Marker substituted for standalone decimal integers.
pub const NUM_MARKER: &str = "<NUM>";
/// Marker substituted for `0x`-prefixed hexadecimal literals.
pub const HEX_MARKER: &str = "<HEX>";
/// Marker substituted for bare hex runs of eight or more characters.
pub const HASH_MARKER: &str = "<HASH>";
/// Marker substituted for slash-led path fragments.
pub const PATH_MARKER: &str = "<PATH>";
/// Marker substituted for `http(s)://` URLs.
pub const URL_MARKER: &str = "<URL>";

/// Maximum signature length in characters before truncation.
pub const MAX_SIGNATURE_CHARS: usize = 500;
/// Appended to signatures cut at [`MAX_SIGNATURE_CHARS`].
pub const TRUNCATION_MARKER: &str = "...";

/// Compiled substitution passes, in application order.
struct Patterns {
    prefix: Regex,
    number: Regex,
    hex: Regex,
    hash: Regex,
    path: Regex,
    url: Regex,
    whitespace: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    prefix: compile(r"^\[.*?\]\s*\[.*?\]\s*"),
    number: compile(r"\b[0-9]+\b"),
    hex: compile(r"\b0x[0-9a-fA-F]+\b"),
    hash: compile(r"\b[0-9a-fA-F]{8,}\b"),
    path: compile(r"/\S+"),
    url: compile(r"https?://\S+"),
    whitespace: compile(r"[\s\x00]+"),
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in normalizer pattern must compile")
}

/// Collapse a raw log line into its error signature.
///
/// Total over all string input: empty or whitespace-only lines yield an
/// empty signature. NUL characters count as whitespace, so signatures never
/// contain them. Deterministic, no I/O.
pub fn normalize(line: &str) -> String {
    let p = &*PATTERNS;

    let trimmed = trim_blank(line);
    let body = p.prefix.replace(trimmed, "");

    let sig = p.number.replace_all(&body, NUM_MARKER);
    let sig = p.hex.replace_all(&sig, HEX_MARKER);
    let sig = p.hash.replace_all(&sig, HASH_MARKER);
    let sig = p.path.replace_all(&sig, PATH_MARKER);
    let sig = p.url.replace_all(&sig, URL_MARKER);
    let sig = p.whitespace.replace_all(&sig, " ");

    truncate(trim_blank(&sig))
}

fn trim_blank(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

/// Cut `sig` to [`MAX_SIGNATURE_CHARS`] characters, appending the marker
/// when anything was removed.
fn truncate(sig: &str) -> String {
    match sig.char_indices().nth(MAX_SIGNATURE_CHARS) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut.saturating_add(TRUNCATION_MARKER.len()));
            out.push_str(&sig[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => sig.to_owned(),
    }
}
