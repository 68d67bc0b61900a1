//! Parser and history integration tests
//!
//! Drive the public API the way a driver does: a line and a set of session
//! options in, a command tree out.

use mudkit::parser::{
    CommandParser, CommandType, Operator, PipeTarget, RedirectKind, TokenType, tokenize,
};
use mudkit::{Error, ShellOptions, parse};
use pretty_assertions::assert_eq;

fn tree(line: &str) -> mudkit::ParsedCommand {
    parse(line, &ShellOptions::default())
        .expect("line should parse")
        .expect("line should not be blank")
}

fn expanded(line: &str, history: &[&str]) -> String {
    let options = ShellOptions::default().history(history.iter().copied());
    CommandParser::new(line, options)
        .parse_line()
        .expect("history should resolve")
        .expanded
}

#[test]
fn test_ls_token_stream() {
    let tokens = tokenize("ls -la /tmp", &ShellOptions::default()).unwrap();
    let kinds: Vec<(TokenType, &str)> = tokens
        .iter()
        .map(|t| (t.token_type, t.value.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (TokenType::Word, "ls"),
            (TokenType::Whitespace, " "),
            (TokenType::Word, "-la"),
            (TokenType::Whitespace, " "),
            (TokenType::Word, "/tmp"),
        ]
    );
}

#[test]
fn test_and_or_linking() {
    let head = tree("a && b || c");
    assert_eq!(head.verb, "a");
    assert_eq!(head.operator, Some(Operator::And));
    assert_eq!(head.conditions.len(), 1);
    assert_eq!(head.conditions[0].verb, "b");
    assert_eq!(head.alternate.as_ref().map(|c| c.verb.as_str()), Some("c"));
    assert!(head.next_command.is_none());
}

#[test]
fn test_reparse_is_deterministic() {
    for line in ["a && b || c", "look | grep sword; inventory > /tmp/inv", "say 'a;b' && wave"] {
        assert_eq!(tree(line), tree(line), "{line}");
    }
}

#[test]
fn test_pipeline_redirect_sequence() {
    let head = tree("who |& sort > /tmp/who.txt; look");
    assert_eq!(head.verb, "who");
    assert_eq!(head.pipe_target, Some(PipeTarget::StdoutAndStderr));

    let sort = head.next_command.as_ref().unwrap();
    assert_eq!(sort.verb, "sort");
    assert!(sort.args.is_empty());
    assert_eq!(sort.redirects.len(), 1);
    assert_eq!(sort.redirects[0].kind, RedirectKind::Output);
    assert_eq!(sort.redirects[0].target, "/tmp/who.txt");

    assert_eq!(sort.next_command.as_ref().unwrap().verb, "look");
}

#[test]
fn test_history_references() {
    let history = ["cd /tmp", "ls -la"];
    assert_eq!(expanded("!!", &history), "ls -la");
    assert_eq!(expanded("!!:$", &history), "-la");
    assert_eq!(expanded("!cd", &history), "cd /tmp");
}

#[test]
fn test_history_reference_inside_line() {
    let options = ShellOptions::default().history(["get sword"]);
    let cmd = CommandParser::new("!! && wield sword", options)
        .parse()
        .unwrap()
        .unwrap();
    assert_eq!(cmd.verb, "get");
    assert_eq!(cmd.args, vec!["sword"]);
    assert_eq!(cmd.conditions[0].verb, "wield");
}

#[test]
fn test_event_not_found() {
    let options = ShellOptions::default().history(["look"]);
    let err = CommandParser::new("!zap", options).parse().unwrap_err();
    assert!(err.is_history(), "{err}");
}

#[test]
fn test_unterminated_quote() {
    let err = parse("echo \"abc", &ShellOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnterminatedString { quote: '"', .. }), "{err}");
    assert!(err.is_syntax());
}

#[test]
fn test_trailing_operator_is_error() {
    for line in ["look &&", "look |", "look ;"] {
        let err = parse(line, &ShellOptions::default()).unwrap_err();
        assert!(err.is_syntax(), "{line}: {err}");
    }
}

#[test]
fn test_leading_operator_has_position() {
    let err = parse("look;\n&& north", &ShellOptions::default()).unwrap_err();
    match err {
        Error::ParseAt { line, column, .. } => {
            assert_eq!((line, column), (2, 1));
        }
        other => panic!("expected a located error, got {other:?}"),
    }
}

#[test]
fn test_background_unsupported() {
    let err = parse("dig &", &ShellOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_expression_command() {
    let cmd = tree("$hp = 10");
    assert_eq!(cmd.cmd_type, CommandType::ExpressionCommand);
    assert_eq!(cmd.verb, "$hp");
    assert_eq!(cmd.args, vec!["=", "10"]);
}

#[test]
fn test_alias_with_positionals() {
    let options = ShellOptions::default().alias("gt", "give $2 to $1");
    let cmd = CommandParser::new("gt bob sword", options)
        .parse()
        .unwrap()
        .unwrap();
    assert_eq!(cmd.verb, "give");
    assert_eq!(cmd.args, vec!["sword", "to", "bob"]);
}

#[test]
fn test_restricted_options_keep_operators_literal() {
    let cmd = parse("say hi && bye > file", &ShellOptions::restricted())
        .unwrap()
        .unwrap();
    assert_eq!(cmd.args, vec!["hi", "&&", "bye", ">", "file"]);
    assert!(cmd.conditions.is_empty());
    assert!(cmd.redirects.is_empty());
}

#[test]
fn test_apostrophe_in_restricted_verb() {
    let mut settings = std::collections::HashMap::new();
    settings.insert("say".to_string(), ShellOptions::restricted());
    let cmd = CommandParser::new("say don't go", ShellOptions::default())
        .with_settings(&settings)
        .parse()
        .unwrap()
        .unwrap();
    assert_eq!(cmd.cmd_type, CommandType::ShellCommand);
    assert_eq!(cmd.args, vec!["don't", "go"]);

    let cmd = parse("emote says \"hi", &ShellOptions::restricted())
        .unwrap()
        .unwrap();
    assert_eq!(cmd.args, vec!["says", "\"hi"]);

    // Quoting still applies under the shell-wide defaults
    let err = parse("say don't go", &ShellOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnterminatedString { quote: '\'', .. }));
}

#[test]
fn test_alias_argument_text_kept_literal() {
    let options = ShellOptions::default().alias("x", "cmd $1 $2");
    let cmd = parse("x a '$1'", &options).unwrap().unwrap();
    assert_eq!(cmd.verb, "cmd");
    assert_eq!(cmd.args, vec!["a", "$1"]);
}
