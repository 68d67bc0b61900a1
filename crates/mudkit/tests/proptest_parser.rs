//! Property-based tests for the tokenizer and parser
//!
//! Uses proptest to generate random lines and verify parsing never panics and
//! always gives the same answer for the same input.

use mudkit::ShellOptions;
use mudkit::parser::{CommandParser, tokenize};
use proptest::prelude::*;

mod strategies {
    use proptest::prelude::*;

    /// Arbitrary text, including operators, quotes and history marks
    pub fn arbitrary_line() -> impl Strategy<Value = String> {
        prop::string::string_regex(".{0,80}").unwrap()
    }

    /// Text drawn mostly from characters the grammar cares about
    pub fn shell_soup() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-z0-9 $.=<>|;&'\"!`\\\\^:*?\\[\\]-]{0,60}").unwrap()
    }

    pub fn word() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-z][a-z0-9_/-]{0,12}").unwrap()
    }

    pub fn operator() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just(" && "), Just(" || "), Just(" | "), Just(" |& "), Just("; ")]
    }

    /// A well-formed command list
    pub fn command_list() -> impl Strategy<Value = String> {
        (
            prop::collection::vec(word(), 1..4),
            prop::collection::vec((operator(), prop::collection::vec(word(), 1..4)), 0..4),
        )
            .prop_map(|(first, rest)| {
                let mut line = first.join(" ");
                for (op, words) in rest {
                    line.push_str(op);
                    line.push_str(&words.join(" "));
                }
                line
            })
    }
}

fn session() -> ShellOptions {
    ShellOptions::default()
        .alias("l", "look $*")
        .alias("'", "say")
        .variable("hp", "42")
        .history(["look", "get sword from chest", "cd /realms"])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn tokenizer_never_panics(line in strategies::arbitrary_line()) {
        let _ = tokenize(&line, &session());
    }

    #[test]
    fn parser_never_panics(line in strategies::shell_soup()) {
        let _ = CommandParser::new(line.as_str(), session()).parse_line();
    }

    #[test]
    fn parser_never_panics_restricted(line in strategies::shell_soup()) {
        let _ = CommandParser::new(line.as_str(), ShellOptions::restricted()).parse_line();
    }

    #[test]
    fn parse_is_deterministic(line in strategies::shell_soup()) {
        let first = CommandParser::new(line.as_str(), session()).parse().map_err(|e| e.to_string());
        let second = CommandParser::new(line.as_str(), session()).parse().map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn well_formed_lists_parse(line in strategies::command_list()) {
        let cmd = CommandParser::new(line.as_str(), ShellOptions::default()).parse();
        prop_assert!(cmd.is_ok(), "{line}: {cmd:?}");
        prop_assert!(cmd.unwrap().is_some());
    }
}
