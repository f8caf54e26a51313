#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Verdict used when the model returned nothing usable.
pub const FEEDBACK_FAILED: &str = "X: 피드백 생성 실패";

/// Maximum number of characters kept in a verdict body.
pub const MAX_BODY_CHARS: usize = 200;

/// Appended to a clipped verdict body.
pub const ELLIPSIS: char = '…';

/// Characters treated as line boundaries when picking the first line.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\x0b'
            | '\x0c'
            | '\x1c'
            | '\x1d'
            | '\x1e'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Rewrites `O...`/`X...` heads that are missing the colon into `O: ...`.
fn fix_head(line: &str, letter: char) -> Option<String> {
    let rest = line.strip_prefix(letter)?;
    if rest.starts_with(':') {
        return None;
    }
    let rest = rest.trim_start_matches([':', ' ']).trim();
    Some(format!("{letter}: {rest}"))
}

/// Coerces a free-form model response into a single `O: <body>` or
/// `X: <body>` line.
///
/// * empty, absent or whitespace-only input yields [`FEEDBACK_FAILED`]
/// * only the first line is kept
/// * a line that cannot be read as a verdict is tagged `X`
/// * the body is clipped to [`MAX_BODY_CHARS`] characters plus [`ELLIPSIS`]
pub fn normalize(text: Option<&str>) -> String {
    let text = match text.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return FEEDBACK_FAILED.to_string(),
    };

    let first = text.split(is_line_break).next().unwrap_or_default().trim();

    let mut line = fix_head(first, 'O')
        .or_else(|| fix_head(first, 'X'))
        .unwrap_or_else(|| first.to_string());

    if !(line.starts_with("O:") || line.starts_with("X:")) {
        line = format!("X: {line}");
    }

    let (head, body) = line.split_once(':').unwrap_or((line.as_str(), ""));
    let head = head.trim();
    let body = body.trim();

    if body.chars().count() > MAX_BODY_CHARS {
        let clipped: String = body.chars().take(MAX_BODY_CHARS).collect();
        format!("{head}: {clipped}{ELLIPSIS}")
    } else {
        format!("{head}: {body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_absent_fail() {
        assert_eq!(normalize(None), FEEDBACK_FAILED);
        assert_eq!(normalize(Some("")), FEEDBACK_FAILED);
        assert_eq!(normalize(Some("  \n\t ")), FEEDBACK_FAILED);
    }

    #[test]
    fn canonical_lines_are_untouched() {
        assert_eq!(normalize(Some("O: 잘했어요")), "O: 잘했어요");
        assert_eq!(normalize(Some("X: 다시 생각해 보세요")), "X: 다시 생각해 보세요");
    }

    #[test]
    fn missing_colon_is_repaired() {
        assert_eq!(normalize(Some("O 맞습니다 대충")), "O: 맞습니다 대충");
        assert_eq!(normalize(Some("X  : 틀렸어요")), "X: 틀렸어요");
    }

    #[test]
    fn tight_colon_gets_a_space() {
        assert_eq!(normalize(Some("O:정답")), "O: 정답");
    }

    #[test]
    fn unprefixed_defaults_to_fail() {
        assert_eq!(normalize(Some("그냥 아무말")), "X: 그냥 아무말");
        assert_eq!(normalize(Some("note: colon inside")), "X: note: colon inside");
    }

    #[test]
    fn only_first_line_is_kept() {
        assert_eq!(normalize(Some("\n  O: 첫 줄\nX: 둘째 줄")), "O: 첫 줄");
        assert_eq!(normalize(Some("O: 하나\r둘")), "O: 하나");
        assert_eq!(normalize(Some("O: 하나\u{2028}둘")), "O: 하나");
    }

    #[test]
    fn long_bodies_are_clipped() {
        let body = "가".repeat(300);
        let out = normalize(Some(&format!("O: {body}")));
        let (_, clipped) = out.split_once(": ").unwrap();
        assert_eq!(clipped.chars().count(), MAX_BODY_CHARS + 1);
        assert!(clipped.ends_with(ELLIPSIS));

        let exact = "a".repeat(MAX_BODY_CHARS);
        assert_eq!(normalize(Some(&format!("X: {exact}"))), format!("X: {exact}"));
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let inputs = ["O 좋아요", "무슨 말", "X:짧음", &format!("O: {}", "b".repeat(250))];
        for input in inputs {
            let once = normalize(Some(input));
            assert_eq!(normalize(Some(&once)), once);
        }
    }
}
