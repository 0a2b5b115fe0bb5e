use serde::Deserialize;

use crate::error::{Error, Result};

/// Outcome of one review pass. `Issues` always carries at least one entry;
/// a reviewer that flags problems without naming any is unusable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Issues(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawVerdict {
    Approved,
    #[serde(rename = "needs_fix")]
    NeedsFix,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct ReviewOutput {
    verdict: RawVerdict,
    issues: Vec<String>,
}

/// Strip markdown code fences the model sometimes wraps output in, then
/// parse the reviewer's JSON verdict.
pub fn parse_review_output(raw: &str) -> Result<Verdict> {
    let json = strip_markdown_fences(raw);
    let output: ReviewOutput = serde_json::from_str(&json)
        .map_err(|e| Error::Upstream(format!("failed to parse reviewer JSON: {e}")))?;

    let issues: Vec<String> = output
        .issues
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();

    match output.verdict {
        // An approval that still lists defects is contradictory; take the
        // defects at face value and run another round.
        RawVerdict::Approved if issues.is_empty() => Ok(Verdict::Approved),
        RawVerdict::Approved => Ok(Verdict::Issues(issues)),
        RawVerdict::NeedsFix if issues.is_empty() => Err(Error::Upstream(
            "reviewer flagged issues but listed none".to_string(),
        )),
        RawVerdict::NeedsFix => Ok(Verdict::Issues(issues)),
    }
}

/// Remove markdown code fences from a string, returning the inner content.
/// Handles ` ```json `, ` ``` `, and bare JSON.
fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();

    // Look for opening fence: ```json or ```
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the optional language tag (e.g. "json") on the opening fence line
        let after_tag = if let Some(pos) = rest.find('\n') {
            &rest[pos + 1..]
        } else {
            return String::new();
        };

        // Strip closing fence
        if let Some(pos) = after_tag.rfind("```") {
            return after_tag[..pos].trim().to_string();
        }
        // No closing fence — return everything after opening
        return after_tag.trim().to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_approved() {
        let json = r#"{"verdict": "approved", "issues": []}"#;
        assert_eq!(parse_review_output(json).unwrap(), Verdict::Approved);
    }

    #[test]
    fn test_parse_valid_needs_fix() {
        let json = r#"{
            "verdict": "needs_fix",
            "issues": [
                "Row 2 misquotes the statement in paragraph 14",
                "Row 5 attributes the statement to the wrong speaker"
            ]
        }"#;
        let verdict = parse_review_output(json).unwrap();
        assert_eq!(
            verdict,
            Verdict::Issues(vec![
                "Row 2 misquotes the statement in paragraph 14".to_string(),
                "Row 5 attributes the statement to the wrong speaker".to_string(),
            ])
        );
    }

    #[test]
    fn test_parse_missing_field_errors() {
        let json = r#"{"verdict": "approved"}"#;
        let err = parse_review_output(json).unwrap_err();
        assert!(err.to_string().contains("failed to parse reviewer JSON"));
    }

    #[test]
    fn test_parse_invalid_verdict_errors() {
        let json = r#"{"verdict": "maybe", "issues": []}"#;
        assert!(parse_review_output(json).is_err());
    }

    #[test]
    fn test_parse_free_text_errors() {
        let err = parse_review_output("The chart looks fine to me.").unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[test]
    fn test_needs_fix_with_empty_issues_errors() {
        let json = r#"{"verdict": "needs_fix", "issues": []}"#;
        let err = parse_review_output(json).unwrap_err();
        assert!(err.to_string().contains("listed none"));
    }

    #[test]
    fn test_needs_fix_with_only_blank_issues_errors() {
        let json = r#"{"verdict": "needs_fix", "issues": ["", "   "]}"#;
        assert!(parse_review_output(json).is_err());
    }

    #[test]
    fn test_approved_with_issues_becomes_issues() {
        let json = r#"{"verdict": "approved", "issues": ["Row 1 cites the wrong paragraph"]}"#;
        let verdict = parse_review_output(json).unwrap();
        assert_eq!(
            verdict,
            Verdict::Issues(vec!["Row 1 cites the wrong paragraph".to_string()])
        );
    }

    #[test]
    fn test_issues_are_trimmed_and_blanks_dropped() {
        let json = r#"{"verdict": "needs_fix", "issues": ["  padded  ", "", "real issue"]}"#;
        let verdict = parse_review_output(json).unwrap();
        assert_eq!(
            verdict,
            Verdict::Issues(vec!["padded".to_string(), "real issue".to_string()])
        );
    }

    #[test]
    fn test_strip_markdown_json_fence() {
        let input = "```json\n{\"verdict\": \"approved\"}\n```";
        assert_eq!(strip_markdown_fences(input), r#"{"verdict": "approved"}"#);
    }

    #[test]
    fn test_strip_markdown_bare_fence() {
        let input = "```\n{\"verdict\": \"approved\"}\n```";
        assert_eq!(strip_markdown_fences(input), r#"{"verdict": "approved"}"#);
    }

    #[test]
    fn test_strip_no_fence_passthrough() {
        let input = r#"{"verdict": "approved"}"#;
        assert_eq!(strip_markdown_fences(input), r#"{"verdict": "approved"}"#);
    }

    #[test]
    fn test_strip_fence_with_surrounding_whitespace() {
        let input = "\n  ```json\n{\"verdict\": \"approved\"}\n```  \n";
        assert_eq!(strip_markdown_fences(input), r#"{"verdict": "approved"}"#);
    }

    #[test]
    fn test_parse_fenced_verdict() {
        let fenced =
            "```json\n{\n  \"verdict\": \"needs_fix\",\n  \"issues\": [\"Row 3 date is wrong\"]\n}\n```";
        let verdict = parse_review_output(fenced).unwrap();
        assert_eq!(verdict, Verdict::Issues(vec!["Row 3 date is wrong".to_string()]));
    }
}
