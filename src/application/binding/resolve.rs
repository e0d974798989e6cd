//! Argument substitution for bound values.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::domain::PrefValue;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\d+)\}").expect("placeholder pattern is valid"))
}

/// Applies a binding's arguments to a raw value.
///
/// Callables are invoked with the arguments. Text with a non-empty argument
/// list is treated as a positional `{n}` template. Anything else passes through.
pub fn substitute(raw: PrefValue, args: &[String]) -> PrefValue {
    match raw {
        PrefValue::Callable(callable) => callable.call(args),
        PrefValue::Text(template) if !args.is_empty() => {
            PrefValue::Text(format_message(&template, args))
        }
        other => other,
    }
}

/// Replaces `{n}` with the n-th argument; out-of-range placeholders stay as written.
pub fn format_message(template: &str, args: &[String]) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|idx| args.get(idx))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Callable;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn given_template_when_substituting_then_replaces_positions() {
        let out = format_message("{1} says {0}, {0}!", &args(&["hi", "bob"]));
        assert_eq!(out, "bob says hi, hi!");
    }

    #[test]
    fn given_missing_argument_when_substituting_then_placeholder_kept() {
        let out = format_message("{0} and {3}", &args(&["a"]));
        assert_eq!(out, "a and {3}");
    }

    #[test]
    fn given_text_without_args_when_substituting_then_untouched() {
        let raw = PrefValue::text("{0}");
        assert_eq!(substitute(raw.clone(), &[]), raw);
    }

    #[test]
    fn given_callable_when_substituting_then_invoked_with_args() {
        let raw = PrefValue::Callable(Callable::new(|a| PrefValue::Int(a.len() as i64)));
        assert_eq!(substitute(raw, &args(&["x", "y"])), PrefValue::Int(2));
    }
}
