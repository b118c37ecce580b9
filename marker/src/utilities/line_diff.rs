//! Line-oriented comparison of expected and actual program output.
//!
//! Lines are compared position by position. Trailing whitespace on a line and
//! trailing blank lines at the end of the output are not significant.

fn significant_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// Returns `None` when both outputs agree, otherwise a listing of every
/// differing line:
///
/// ```text
/// @@ line 2
/// - expected
/// + actual
/// ```
pub fn line_diff(expected: &str, actual: &str) -> Option<String> {
    let expected = significant_lines(expected);
    let actual = significant_lines(actual);

    let mut out = String::new();
    for i in 0..expected.len().max(actual.len()) {
        let e = expected.get(i);
        let a = actual.get(i);
        if e == a {
            continue;
        }
        out.push_str(&format!("@@ line {}\n", i + 1));
        if let Some(e) = e {
            out.push_str(&format!("- {e}\n"));
        }
        if let Some(a) = a {
            out.push_str(&format!("+ {a}\n"));
        }
    }

    if out.is_empty() { None } else { Some(out) }
}
