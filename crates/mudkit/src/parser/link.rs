//! Command chain builder
//!
//! The parser hands over a flat list of commands, each paired with the
//! operator that followed it. This module folds that list into a tree with
//! the usual precedence, tightest first:
//!
//! 1. `|` / `|&`: pipeline stages chained through `next_command`, with
//!    `pipe_target` set on every stage that feeds another.
//! 2. `&&` / `||`: `&&` appends a pipeline to the anchor's `conditions`;
//!    `||` becomes the anchor's `alternate` and then the new anchor.
//! 3. `;`: the next list hangs off `next_command` of the last stage of the
//!    first anchor's pipeline.
//!
//! So `a && b || c` gives `a { conditions: [b], alternate: c }`.

use super::command::{Operator, ParsedCommand, PipeTarget};
use crate::error::{Error, Result};

/// `&&`-joined pipelines; the first is the anchor.
type Segment = Vec<Vec<ParsedCommand>>;
/// `||`-joined segments.
type AndOr = Vec<Segment>;

/// Link `(command, following operator)` pairs into a single tree.
///
/// Every operator but the last must be `Some`; the last must be `None`.
pub fn link(commands: Vec<(ParsedCommand, Option<Operator>)>) -> Result<Option<ParsedCommand>> {
    let mut lists: Vec<AndOr> = Vec::new();
    let mut and_or: AndOr = Vec::new();
    let mut segment: Segment = Vec::new();
    let mut pipeline: Vec<ParsedCommand> = Vec::new();

    let count = commands.len();
    for (index, (mut cmd, op)) in commands.into_iter().enumerate() {
        if op.is_none() && index + 1 != count {
            return Err(Error::Internal(
                "command without an operator in the middle of a chain".to_string(),
            ));
        }
        cmd.operator = op;
        match op {
            Some(Operator::Pipe) => {
                cmd.pipe_target = Some(PipeTarget::Stdout);
                pipeline.push(cmd);
            }
            Some(Operator::PipeAll) => {
                cmd.pipe_target = Some(PipeTarget::StdoutAndStderr);
                pipeline.push(cmd);
            }
            Some(Operator::And) => {
                pipeline.push(cmd);
                segment.push(std::mem::take(&mut pipeline));
            }
            Some(Operator::Or) => {
                pipeline.push(cmd);
                segment.push(std::mem::take(&mut pipeline));
                and_or.push(std::mem::take(&mut segment));
            }
            Some(Operator::Sequence) | None => {
                pipeline.push(cmd);
                segment.push(std::mem::take(&mut pipeline));
                and_or.push(std::mem::take(&mut segment));
                lists.push(std::mem::take(&mut and_or));
            }
        }
    }

    if !pipeline.is_empty() || !segment.is_empty() || !and_or.is_empty() {
        return Err(Error::Internal("chain ended on an operator".to_string()));
    }

    let mut tail: Option<ParsedCommand> = None;
    for list in lists.into_iter().rev() {
        tail = build_and_or(list, tail);
    }
    Ok(tail)
}

/// Build one `&&`/`||` list; `tail` is the `;` successor.
fn build_and_or(and_or: AndOr, tail: Option<ParsedCommand>) -> Option<ParsedCommand> {
    let mut tail = tail;
    let mut alternate: Option<ParsedCommand> = None;
    for (index, segment) in and_or.into_iter().enumerate().rev() {
        // Only the first anchor carries the sequence successor
        let seq = if index == 0 { tail.take() } else { None };
        let mut pipelines = segment.into_iter();
        let Some(first) = pipelines.next() else {
            continue;
        };
        let mut anchor = build_pipeline(first, seq)?;
        anchor.conditions = pipelines.filter_map(|p| build_pipeline(p, None)).collect();
        anchor.alternate = alternate.take().map(Box::new);
        alternate = Some(anchor);
    }
    alternate
}

/// Chain pipeline stages; `tail` attaches to the last stage.
fn build_pipeline(stages: Vec<ParsedCommand>, tail: Option<ParsedCommand>) -> Option<ParsedCommand> {
    let mut stages = stages;
    if let Some(last) = stages.last_mut() {
        last.pipe_target = None;
        last.next_command = tail.map(Box::new);
    }
    stages.into_iter().rev().reduce(|next, mut prev| {
        prev.next_command = Some(Box::new(next));
        prev
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::command::CommandType;
    use crate::parser::tokens::{Token, TokenType};

    fn cmd(verb: &str) -> ParsedCommand {
        let mut c = ParsedCommand::new(
            Token::new(TokenType::Word, 0).finish(verb, verb.len()),
            CommandType::MudCommand,
        );
        c.verb = verb.to_string();
        c
    }

    fn chain(parts: &[(&str, Option<Operator>)]) -> ParsedCommand {
        link(parts.iter().map(|(v, op)| (cmd(v), *op)).collect())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_single() {
        let head = chain(&[("look", None)]);
        assert_eq!(head.verb, "look");
        assert!(head.next_command.is_none());
    }

    #[test]
    fn test_and_or() {
        let head = chain(&[
            ("a", Some(Operator::And)),
            ("b", Some(Operator::Or)),
            ("c", None),
        ]);
        assert_eq!(head.verb, "a");
        assert_eq!(head.conditions.len(), 1);
        assert_eq!(head.conditions[0].verb, "b");
        assert_eq!(head.alternate.as_ref().unwrap().verb, "c");
        assert_eq!(head.operator, Some(Operator::And));
    }

    #[test]
    fn test_pipeline_then_sequence() {
        let head = chain(&[
            ("a", Some(Operator::Pipe)),
            ("b", Some(Operator::Sequence)),
            ("c", None),
        ]);
        assert_eq!(head.pipe_target, Some(PipeTarget::Stdout));
        let b = head.next_command.as_ref().unwrap();
        assert_eq!(b.verb, "b");
        assert_eq!(b.pipe_target, None);
        assert_eq!(b.next_command.as_ref().unwrap().verb, "c");
    }

    #[test]
    fn test_sequence_hangs_off_first_anchor() {
        let head = chain(&[
            ("a", Some(Operator::Or)),
            ("b", Some(Operator::Sequence)),
            ("c", None),
        ]);
        assert_eq!(head.next_command.as_ref().unwrap().verb, "c");
        let alt = head.alternate.as_ref().unwrap();
        assert!(alt.next_command.is_none());
    }

    #[test]
    fn test_pipe_all_in_condition() {
        let head = chain(&[
            ("a", Some(Operator::And)),
            ("b", Some(Operator::PipeAll)),
            ("c", None),
        ]);
        let b = &head.conditions[0];
        assert_eq!(b.pipe_target, Some(PipeTarget::StdoutAndStderr));
        assert_eq!(b.next_command.as_ref().unwrap().verb, "c");
    }

    #[test]
    fn test_empty() {
        assert!(link(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_dangling_operator_is_internal_error() {
        let err = link(vec![(cmd("a"), Some(Operator::And))]).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
