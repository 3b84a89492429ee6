//! Text normalization for speech synthesis. Rewrites ASCII-printable runs so
//! a Japanese TTS engine pronounces code-flavored text naturally; non-ASCII
//! runs pass through untouched. The whole pipeline is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

/// Well-known filenames and acronyms, substituted on word boundaries.
const TOKEN_TABLE: &[(&str, &str)] = &[
    ("README", "リードミー"),
    ("LICENSE", "ライセンス"),
    ("CHANGELOG", "チェンジログ"),
    ("TODO", "トゥードゥー"),
    ("Makefile", "メイクファイル"),
    ("Dockerfile", "ドッカーファイル"),
    ("Cargo", "カーゴ"),
    ("npm", "エヌピーエム"),
    ("API", "エーピーアイ"),
    ("CLI", "シーエルアイ"),
    ("URL", "ユーアールエル"),
    ("HTTP", "エイチティーティーピー"),
    ("HTTPS", "エイチティーティーピーエス"),
    ("JSON", "ジェイソン"),
    ("YAML", "ヤムル"),
    ("SQL", "エスキューエル"),
    ("CI", "シーアイ"),
    ("ID", "アイディー"),
];

/// Spoken names for file extensions, applied to the token after a dot marker.
const EXT_TABLE: &[(&str, &str)] = &[
    ("rs", "アールエス"),
    ("go", "ゴー"),
    ("py", "パイ"),
    ("js", "ジェイエス"),
    ("ts", "ティーエス"),
    ("tsx", "ティーエスエックス"),
    ("jsx", "ジェイエスエックス"),
    ("md", "マークダウン"),
    ("json", "ジェイソン"),
    ("jsonl", "ジェイソンエル"),
    ("yaml", "ヤムル"),
    ("yml", "ヤムル"),
    ("toml", "トムル"),
    ("txt", "テキスト"),
    ("html", "エイチティーエムエル"),
    ("css", "シーエスエス"),
    ("sh", "エスエイチ"),
    ("sql", "エスキューエル"),
    ("csv", "シーエスブイ"),
    ("lock", "ロック"),
];

/// Readable labels for hosts the narrator mentions often.
const DOMAIN_TABLE: &[(&str, &str)] = &[
    ("github.com", "ギットハブ"),
    ("gitlab.com", "ギットラボ"),
    ("google.com", "グーグル"),
    ("stackoverflow.com", "スタックオーバーフロー"),
    ("crates.io", "クレーツ"),
    ("docs.rs", "ドックスアールエス"),
    ("localhost", "ローカルホスト"),
];

const DOT_MARKER: &str = " ドット ";
const SLASH_WORD: &str = " スラッシュ ";

static TOKEN_RES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    TOKEN_TABLE
        .iter()
        .map(|(from, to)| {
            let re = Regex::new(&format!(r"\b{}\b", regex::escape(from)))
                .expect("token pattern is valid");
            (re, *to)
        })
        .collect()
});

/// Rewrite `input` for speech synthesis.
pub fn normalize_for_speech(input: &str) -> String {
    let trimmed = input.trim();

    if let Some(host) = url_host(trimmed) {
        return normalize_runs(&domain_label(&host));
    }

    let shaped = abbreviate_path(trimmed)
        .or_else(|| abbreviate_filename(trimmed))
        .unwrap_or_else(|| trimmed.to_string());

    normalize_runs(&shaped)
}

/// Host of `input` when the whole input is one URL.
pub(crate) fn url_host(input: &str) -> Option<String> {
    if input.chars().any(|c| c.is_whitespace()) {
        return None;
    }
    let rest = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))?;
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("");
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

fn domain_label(host: &str) -> String {
    for (domain, label) in DOMAIN_TABLE {
        if host.eq_ignore_ascii_case(domain) {
            return (*label).to_string();
        }
    }
    format!("{} ドメイン", host)
}

/// Paths with more than four significant segments collapse to
/// `first/…/grandparent/parent/last`.
fn abbreviate_path(input: &str) -> Option<String> {
    if !input.contains('/') || input.contains("://") || input.chars().any(|c| c.is_whitespace()) {
        return None;
    }
    let segments: Vec<&str> = input.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 4 {
        return None;
    }
    let n = segments.len();
    Some(format!(
        "{}/…/{}/{}/{}",
        segments[0],
        segments[n - 3],
        segments[n - 2],
        segments[n - 1]
    ))
}

/// Filenames with more than five word-parts keep the first two and last
/// three parts around an ellipsis.
fn abbreviate_filename(input: &str) -> Option<String> {
    if input.contains('/') || input.chars().any(|c| c.is_whitespace()) {
        return None;
    }
    let parts = split_word_parts(input);
    if parts.len() <= 5 {
        return None;
    }
    let n = parts.len();
    Some(
        [
            parts[0].as_str(),
            parts[1].as_str(),
            "…",
            parts[n - 3].as_str(),
            parts[n - 2].as_str(),
            parts[n - 1].as_str(),
        ]
        .join("_"),
    )
}

/// Split on `_`, `-` and CamelCase boundaries.
fn split_word_parts(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for chunk in input.split(['_', '-']) {
        if chunk.is_empty() {
            continue;
        }
        parts.extend(split_camel(chunk));
    }
    parts
}

fn split_camel(chunk: &str) -> Vec<String> {
    let chars: Vec<char> = chunk.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars
                .get(i + 1)
                .map(|n| n.is_ascii_lowercase())
                .unwrap_or(false);
            // lower→Upper transition, or the last capital of an acronym run
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn is_ascii_printable(c: char) -> bool {
    (' '..='~').contains(&c)
}

/// Apply the ordered run rules to each maximal ASCII-printable run.
fn normalize_runs(input: &str) -> String {
    let mut out = String::new();
    let mut run = String::new();

    for c in input.chars() {
        if is_ascii_printable(c) {
            run.push(c);
        } else {
            if !run.is_empty() {
                out.push_str(&normalize_ascii_run(&run, false));
                run.clear();
            }
            out.push(c);
        }
    }
    if !run.is_empty() {
        out.push_str(&normalize_ascii_run(&run, true));
    }
    out
}

fn normalize_ascii_run(run: &str, at_text_end: bool) -> String {
    let mut s = run.to_string();

    for (re, replacement) in TOKEN_RES.iter() {
        s = re.replace_all(&s, *replacement).into_owned();
    }

    s = expand_dots(&s, at_text_end);
    s = split_hyphens(&s);
    s = s.replace("://", "、");
    s = s.replace('/', SLASH_WORD);
    s = s.replace('_', " ");
    s = split_digit_runs(&s);

    collapse_spaces(&s)
}

/// A dot terminates a sentence only at end of text or before whitespace;
/// otherwise it becomes a spoken marker and the following token is re-matched
/// against the extension table.
fn expand_dots(s: &str, at_text_end: bool) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '.' {
            out.push(c);
            i += 1;
            continue;
        }

        let is_terminator = match chars.get(i + 1) {
            Some(next) => next.is_whitespace(),
            None => at_text_end,
        };
        if is_terminator {
            out.push('.');
            i += 1;
            continue;
        }

        let mut j = i + 1;
        let mut token = String::new();
        while j < chars.len() && chars[j].is_ascii_alphanumeric() {
            token.push(chars[j]);
            j += 1;
        }

        out.push_str(DOT_MARKER);
        match ext_label(&token) {
            Some(label) => out.push_str(label),
            None => out.push_str(&token),
        }
        i = j;
    }

    out
}

fn ext_label(token: &str) -> Option<&'static str> {
    let lower = token.to_ascii_lowercase();
    EXT_TABLE
        .iter()
        .find(|(ext, _)| *ext == lower)
        .map(|(_, label)| *label)
}

/// An ASCII hyphen between two letters reads as a pause.
fn split_hyphens(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        let between_letters = c == '-'
            && i > 0
            && chars[i - 1].is_ascii_alphabetic()
            && chars
                .get(i + 1)
                .map(|n| n.is_ascii_alphabetic())
                .unwrap_or(false);
        out.push(if between_letters { ' ' } else { c });
    }

    out
}

/// Unbroken digit sequences of four or more digits are read in groups of
/// four.
fn split_digit_runs(s: &str) -> String {
    let mut out = String::new();
    let mut digits = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            flush_digits(&mut out, &mut digits);
            out.push(c);
        }
    }
    flush_digits(&mut out, &mut digits);
    out
}

fn flush_digits(out: &mut String, digits: &mut String) {
    if digits.is_empty() {
        return;
    }
    if digits.len() <= 4 {
        out.push_str(digits);
    } else {
        let chunks: Vec<String> = digits
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect();
        out.push_str(&chunks.join(" "));
    }
    digits.clear();
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::new();
    let mut prev_space = false;
    for c in s.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_expands_inside_token() {
        assert_eq!(normalize_for_speech("main.go"), "main ドット ゴー");
    }

    #[test]
    fn test_dot_terminates_sentence() {
        assert_eq!(normalize_for_speech("done."), "done.");
        assert_eq!(normalize_for_speech("done. next"), "done. next");
    }

    #[test]
    fn test_extension_respelling() {
        assert_eq!(normalize_for_speech("lib.rs"), "lib ドット アールエス");
        assert_eq!(normalize_for_speech("notes.md"), "notes ドット マークダウン");
    }

    #[test]
    fn test_known_token_substitution() {
        assert_eq!(
            normalize_for_speech("README.md"),
            "リードミー ドット マークダウン"
        );
    }

    #[test]
    fn test_hyphen_between_letters() {
        assert_eq!(normalize_for_speech("dry-run"), "dry run");
        // hyphen next to a digit is untouched
        assert_eq!(normalize_for_speech("utf-8"), "utf-8");
    }

    #[test]
    fn test_underscore_becomes_space() {
        assert_eq!(normalize_for_speech("snake_case"), "snake case");
    }

    #[test]
    fn test_slash_becomes_separator_word() {
        assert_eq!(normalize_for_speech("src/lib.rs"), "src スラッシュ lib ドット アールエス");
    }

    #[test]
    fn test_digit_run_boundaries() {
        // exactly 4 digits stay one group; 5 digits become 4+1
        assert_eq!(normalize_for_speech("1234"), "1234");
        assert_eq!(normalize_for_speech("12345"), "1234 5");
        assert_eq!(normalize_for_speech("123456789"), "1234 5678 9");
    }

    #[test]
    fn test_url_known_domain() {
        assert_eq!(normalize_for_speech("https://github.com/owner/repo"), "ギットハブ");
        assert_eq!(normalize_for_speech("https://www.google.com"), "グーグル");
    }

    #[test]
    fn test_url_unknown_domain() {
        assert_eq!(
            normalize_for_speech("https://example.org/x"),
            "example ドット org ドメイン"
        );
    }

    #[test]
    fn test_path_abbreviation_boundary() {
        // 4 segments stay verbatim (modulo slash/dot spelling)
        assert_eq!(
            normalize_for_speech("a/b/c/d"),
            "a スラッシュ b スラッシュ c スラッシュ d"
        );
        // 5 segments collapse to first/…/three last
        assert_eq!(
            normalize_for_speech("a/b/c/d/e"),
            "a スラッシュ … スラッシュ c スラッシュ d スラッシュ e"
        );
    }

    #[test]
    fn test_filename_abbreviation_boundary() {
        // five word-parts stay verbatim
        assert_eq!(
            normalize_for_speech("one_two_three_four_five"),
            "one two three four five"
        );
        // six collapse around an ellipsis
        assert_eq!(
            normalize_for_speech("one_two_three_four_five_six"),
            "one two … four five six"
        );
    }

    #[test]
    fn test_camel_case_counts_as_word_parts() {
        assert_eq!(
            normalize_for_speech("VeryLongCamelCaseFileName"),
            "Very Long … Case File Name"
        );
    }

    #[test]
    fn test_non_ascii_passes_through() {
        assert_eq!(normalize_for_speech("ファイルを読み込みます"), "ファイルを読み込みます");
        assert_eq!(
            normalize_for_speech("main.rsを編集します"),
            "main ドット アールエスを編集します"
        );
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "src/parser/claude_code.rs",
            "https://github.com/owner/repo",
            "a/b/c/d/e/f/g",
            "one_two_three_four_five_six",
            "git commit -m 'x' 1234567",
            "README.md",
            "done.",
            "",
        ];
        for sample in samples {
            let once = normalize_for_speech(sample);
            let twice = normalize_for_speech(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
        }
    }
}
