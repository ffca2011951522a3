//! Complexity analyzer (peripheral per the overview).
//!
//! Works directly on chunk source text rather than the AST: per-line
//! classification into blank/comment/code, decision-point counting by
//! keyword and operator, and brace- or indentation-based nesting depth.
//! Tracks C-family `/* */` block comments and Python triple-quoted strings
//! across line boundaries so a multi-line docstring or block comment isn't
//! misclassified as code. Still pragmatic rather than exhaustive — it does
//! not track ordinary string literals, so a `//` or `#` inside a quoted
//! string is miscounted as a comment marker.

const DECISION_KEYWORDS: &[&str] = &["if", "elif", "for", "while", "case", "catch"];

/// Bucketed complexity rating derived from cyclomatic complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityRating {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ComplexityRating {
    fn from_cyclomatic(cyclomatic: u32) -> Self {
        match cyclomatic {
            0..=5 => Self::Low,
            6..=10 => Self::Medium,
            11..=20 => Self::High,
            _ => Self::VeryHigh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// Complexity measurements for a single chunk of source text.
#[derive(Debug, Clone)]
pub struct ComplexityReport {
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub max_nesting_depth: u32,
    pub code_lines: u32,
    pub comment_lines: u32,
    pub blank_lines: u32,
    pub return_count: u32,
    pub rating: ComplexityRating,
    pub suggestions: Vec<String>,
}

/// Analyze a chunk's source text. `language` is a [`crate::types::Language`]
/// tag (`"python"` gets indentation-based nesting; everything else uses
/// brace counting).
pub fn analyze(content: &str, language: &str) -> ComplexityReport {
    let mut blank_lines = 0u32;
    let mut comment_lines = 0u32;
    let mut code_lines = 0u32;
    let mut decision_points = 0u32;
    let mut return_count = 0u32;
    let mut brace_depth: i32 = 0;
    let mut max_nesting_depth: u32 = 0;

    let is_python = language.eq_ignore_ascii_case("python");

    let mut in_block_comment = false;
    let mut triple_quote_delim: Option<&'static str> = None;

    for line in content.lines() {
        let trimmed = line.trim();

        if in_block_comment {
            comment_lines += 1;
            if let Some(end) = trimmed.find("*/") {
                in_block_comment = false;
                score_code_fragment(
                    &trimmed[end + 2..],
                    &mut decision_points,
                    &mut return_count,
                );
            }
            continue;
        }

        if let Some(delim) = triple_quote_delim {
            comment_lines += 1;
            if trimmed.contains(delim) {
                triple_quote_delim = None;
            }
            continue;
        }

        if trimmed.is_empty() {
            blank_lines += 1;
            continue;
        }
        if trimmed.starts_with("//") || trimmed.starts_with('#') {
            comment_lines += 1;
            continue;
        }
        if is_python && (trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''")) {
            comment_lines += 1;
            let delim = &trimmed[..3];
            if !trimmed[3..].contains(delim) {
                triple_quote_delim = Some(if delim == "\"\"\"" { "\"\"\"" } else { "'''" });
            }
            continue;
        }
        if trimmed.starts_with("/*") {
            comment_lines += 1;
            if let Some(end) = trimmed[2..].find("*/") {
                score_code_fragment(&trimmed[2 + end + 2..], &mut decision_points, &mut return_count);
            } else {
                in_block_comment = true;
            }
            continue;
        }

        code_lines += 1;
        score_code_fragment(line, &mut decision_points, &mut return_count);

        if is_python {
            let indent = line.chars().take_while(|c| *c == ' ').count()
                + line.chars().take_while(|c| *c == '\t').count() * 4;
            let depth = (indent / 4) as u32;
            max_nesting_depth = max_nesting_depth.max(depth);
        } else {
            for ch in line.chars() {
                match ch {
                    '{' => {
                        brace_depth += 1;
                        max_nesting_depth = max_nesting_depth.max(brace_depth.max(0) as u32);
                    }
                    '}' => brace_depth = (brace_depth - 1).max(0),
                    _ => {}
                }
            }
        }
    }

    let cyclomatic = 1 + decision_points;
    let cognitive = cyclomatic + 2 * max_nesting_depth;
    let rating = ComplexityRating::from_cyclomatic(cyclomatic);
    let suggestions = build_suggestions(cyclomatic, max_nesting_depth, code_lines, return_count, comment_lines);

    ComplexityReport {
        cyclomatic,
        cognitive,
        max_nesting_depth,
        code_lines,
        comment_lines,
        blank_lines,
        return_count,
        rating,
        suggestions,
    }
}

/// Score decision points and return-statements in a code fragment (a whole
/// line, or the trailing remainder after a comment closes mid-line).
fn score_code_fragment(fragment: &str, decision_points: &mut u32, return_count: &mut u32) {
    for token in tokenize(fragment) {
        if DECISION_KEYWORDS.contains(&token) {
            *decision_points += 1;
        }
        if token == "return" {
            *return_count += 1;
        }
        if token == "select" {
            *decision_points += 1;
        }
    }
    *decision_points += fragment.matches("&&").count() as u32;
    *decision_points += fragment.matches("||").count() as u32;
    *decision_points += fragment.matches('?').count() as u32;
    *decision_points += fragment.matches("=>").count() as u32;
}

fn tokenize(line: &str) -> Vec<&str> {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .collect()
}

fn build_suggestions(
    cyclomatic: u32,
    max_nesting_depth: u32,
    code_lines: u32,
    return_count: u32,
    comment_lines: u32,
) -> Vec<String> {
    let mut suggestions = Vec::new();
    if cyclomatic > 10 {
        suggestions.push("cyclomatic complexity exceeds 10; consider splitting into smaller functions".to_string());
    }
    if max_nesting_depth > 4 {
        suggestions.push("nesting depth exceeds 4; consider early returns or extracting nested blocks".to_string());
    }
    if code_lines > 50 {
        suggestions.push("function body exceeds 50 lines; consider extracting helper functions".to_string());
    }
    if return_count > 5 {
        suggestions.push("more than 5 return points; consider consolidating exit paths".to_string());
    }
    if code_lines > 20 && (f64::from(comment_lines) / f64::from(code_lines)) < 0.1 {
        suggestions.push("low comment-to-code ratio; consider documenting intent".to_string());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_code_has_cyclomatic_complexity_one() {
        let content = "let a = 1;\nlet b = 2;\nlet c = a + b;\n";
        let report = analyze(content, "rust");
        assert_eq!(report.cyclomatic, 1);
        assert_eq!(report.rating, ComplexityRating::Low);
    }

    #[test]
    fn branching_code_increments_cyclomatic_per_decision_point() {
        let content = "if a {\n  if b {\n    return 1;\n  }\n} else if c {\n  return 2;\n}\n";
        let report = analyze(content, "rust");
        // two `if` tokens plus one `elif`-equivalent `else if` counted via its `if` token = 3 decisions
        assert_eq!(report.cyclomatic, 4);
        assert_eq!(report.max_nesting_depth, 2);
    }

    #[test]
    fn python_nesting_is_indentation_based() {
        let content = "def f():\n    if a:\n        if b:\n            return 1\n";
        let report = analyze(content, "python");
        assert_eq!(report.max_nesting_depth, 3);
    }

    #[test]
    fn blank_and_comment_lines_are_classified_separately() {
        let content = "// a comment\n\nlet x = 1;\n# also a comment\n";
        let report = analyze(content, "rust");
        assert_eq!(report.comment_lines, 2);
        assert_eq!(report.blank_lines, 1);
        assert_eq!(report.code_lines, 1);
    }

    #[test]
    fn high_cyclomatic_triggers_split_suggestion() {
        let mut content = String::new();
        for i in 0..12 {
            content.push_str(&format!("if cond_{i} {{ do_thing(); }}\n"));
        }
        let report = analyze(&content, "rust");
        assert!(report.cyclomatic > 10);
        assert!(report
            .suggestions
            .iter()
            .any(|s| s.contains("splitting into smaller functions")));
    }

    #[test]
    fn c_family_block_comment_spans_lines_as_comment_not_code() {
        let content = "let a = 1;\n/*\nif this were code it would count\nas three decisions\n*/\nlet b = 2;\n";
        let report = analyze(content, "rust");
        assert_eq!(report.code_lines, 2);
        assert_eq!(report.comment_lines, 4);
        assert_eq!(report.cyclomatic, 1);
    }

    #[test]
    fn python_triple_quoted_docstring_spans_lines_as_comment() {
        let content = "def f():\n    \"\"\"\n    if this counted it would be wrong\n    \"\"\"\n    return 1\n";
        let report = analyze(content, "python");
        assert_eq!(report.comment_lines, 3);
        assert_eq!(report.cyclomatic, 1);
    }

    #[test]
    fn single_line_block_comment_does_not_leak_state_to_next_line() {
        let content = "/* inline */\nif a { return 1; }\n";
        let report = analyze(content, "rust");
        assert_eq!(report.comment_lines, 1);
        assert_eq!(report.code_lines, 1);
        assert_eq!(report.cyclomatic, 2);
    }

    #[test]
    fn rating_buckets_match_thresholds() {
        assert_eq!(ComplexityRating::from_cyclomatic(5), ComplexityRating::Low);
        assert_eq!(ComplexityRating::from_cyclomatic(10), ComplexityRating::Medium);
        assert_eq!(ComplexityRating::from_cyclomatic(20), ComplexityRating::High);
        assert_eq!(ComplexityRating::from_cyclomatic(21), ComplexityRating::VeryHigh);
    }
}
