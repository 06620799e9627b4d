//! Reversible escaping of `{{ ... }}` template expressions.
//!
//! YAML has its own meaning for `{` and `}`, so an unquoted template
//! expression in a suite file would either fail to parse or turn into a flow
//! mapping. Before parsing, every expression is swapped for an inert token;
//! after parsing, tokens are turned back into expressions right before
//! evaluation. The expression text is carried verbatim in both directions.

use once_cell::sync::Lazy;
use regex::Regex;

pub const OPEN_TOKEN: &str = "__XPRIN_TMPL_OPEN__";
pub const CLOSE_TOKEN: &str = "__XPRIN_TMPL_CLOSE__";

static EXPRESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("expression pattern is valid"));

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "{}(.*?){}",
        regex::escape(OPEN_TOKEN),
        regex::escape(CLOSE_TOKEN)
    ))
    .expect("token pattern is valid")
});

/// Replaces every `{{ expr }}` with an inert token.
pub fn encode(text: &str) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }
    EXPRESSION_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{OPEN_TOKEN}{}{CLOSE_TOKEN}", &caps[1])
        })
        .into_owned()
}

/// Exact inverse of [`encode`].
pub fn decode(text: &str) -> String {
    if !contains_tokens(text) {
        return text.to_string();
    }
    TOKEN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| format!("{{{{{}}}}}", &caps[1]))
        .into_owned()
}

/// True when `text` carries at least one encoded expression.
pub fn contains_tokens(text: &str) -> bool {
    text.contains(OPEN_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_text() {
        let samples = [
            "",
            "plain text",
            "{{ .Inputs.XR }}",
            "{{.Inputs.XR}}",
            "cat {{ .Outputs.Render }} | grep {{ .Repositories.lib }}",
            "run: {{   index .Outputs.Rendered \"Pod/x\"   }}",
        ];
        for s in samples {
            assert_eq!(decode(&encode(s)), s, "round trip of {s:?}");
        }
    }

    #[test]
    fn encode_is_noop_without_expressions() {
        assert_eq!(encode("kind: Pod\nname: a"), "kind: Pod\nname: a");
        assert_eq!(decode("kind: Pod"), "kind: Pod");
    }

    #[test]
    fn encoded_text_has_no_braces() {
        let encoded = encode("xr: {{ .Tests.a.Outputs.XR }}");
        assert!(!encoded.contains('{'));
        assert!(contains_tokens(&encoded));
    }
}
