//! Canonical diagnostic message texts.
//!
//! Message wording is part of the tool's observable contract (editors and
//! test suites match on it), so every caller goes through these helpers
//! instead of formatting ad hoc.

/// `Argument {n} to "{callee}" has incompatible type "{got}"; expected "{want}"`
pub fn incompatible_argument(n: usize, callee: &str, got: &str, want: &str) -> String {
    format!("Argument {n} to \"{callee}\" has incompatible type \"{got}\"; expected \"{want}\"")
}

/// `Incompatible return value type (got "{got}", expected "{want}")`
pub fn incompatible_return(got: &str, want: &str) -> String {
    format!("Incompatible return value type (got \"{got}\", expected \"{want}\")")
}

/// `Cannot find implementation or library stub for module named "{module}"`
pub fn missing_module_stub(module: &str) -> String {
    format!("Cannot find implementation or library stub for module named \"{module}\"")
}

/// `Name "{name}" is not defined`
pub fn name_not_defined(name: &str) -> String {
    format!("Name \"{name}\" is not defined")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn argument_message_shape() {
        assert_eq!(
            incompatible_argument(1, "f", "int", "bool"),
            "Argument 1 to \"f\" has incompatible type \"int\"; expected \"bool\""
        );
    }

    #[test]
    fn module_stub_message_shape() {
        assert_eq!(
            missing_module_stub("a"),
            "Cannot find implementation or library stub for module named \"a\""
        );
    }
}
