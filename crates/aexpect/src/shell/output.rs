//! Cleanup of raw command output.

/// Drop the first line of `output` if it is the echoed `cmd`.
#[must_use]
pub fn remove_command_echo(output: &str, cmd: &str) -> String {
    match output.split_once('\n') {
        Some((first, rest)) if first.trim() == cmd.trim() => rest.to_string(),
        None if output.trim() == cmd.trim() && !output.is_empty() => String::new(),
        _ => output.to_string(),
    }
}

/// Drop the last line with non-whitespace content (the prompt), keeping the
/// line endings of everything before it.
#[must_use]
pub fn remove_last_nonempty_line(output: &str) -> String {
    let trimmed = output.trim_end();
    match trimmed.rfind('\n') {
        Some(end) => trimmed[..=end].to_string(),
        None => String::new(),
    }
}

/// The first line consisting only of digits, as an exit status.
#[must_use]
pub fn parse_status(output: &str) -> Option<i32> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|line| line.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_echo() {
        assert_eq!(remove_command_echo("echo hi\nhi\n$ ", "echo hi"), "hi\n$ ");
        assert_eq!(remove_command_echo("echo hi  \nhi\n", "echo hi"), "hi\n");
        assert_eq!(remove_command_echo("hi\n", "echo hi"), "hi\n");
        assert_eq!(remove_command_echo("echo hi", "echo hi"), "");
        assert_eq!(remove_command_echo("", ""), "");
    }

    #[test]
    fn strips_prompt_line() {
        assert_eq!(remove_last_nonempty_line("hello\n$ "), "hello\n");
        assert_eq!(remove_last_nonempty_line("a\nb\n$ \n\n"), "a\nb\n");
        assert_eq!(remove_last_nonempty_line("$ "), "");
        assert_eq!(remove_last_nonempty_line(""), "");
        assert_eq!(remove_last_nonempty_line("a\n\n$ "), "a\n\n");
    }

    #[test]
    fn parses_status() {
        assert_eq!(parse_status("0\n$ "), Some(0));
        assert_eq!(parse_status("echo $?\n127\n"), Some(127));
        assert_eq!(parse_status("  3  \n"), Some(3));
        assert_eq!(parse_status("sh: oops\n$ "), None);
        assert_eq!(parse_status("99999999999\n"), None);
    }

    proptest! {
        #[test]
        fn prompt_removal_is_a_prefix(lines in prop::collection::vec("[a-z $]{0,6}", 0..8)) {
            let output = lines.join("\n");
            let stripped = remove_last_nonempty_line(&output);
            prop_assert!(output.starts_with(&stripped));
            prop_assert!(stripped.is_empty() || stripped.ends_with('\n'));
            // What was removed holds at most one non-empty line.
            let removed = &output[stripped.len()..];
            prop_assert!(removed.lines().filter(|l| !l.trim().is_empty()).count() <= 1);
        }
    }
}
