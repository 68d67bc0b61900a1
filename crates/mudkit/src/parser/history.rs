//! History expansion
//!
//! Resolves `!` references against the session's history list. The grammar
//! follows csh/bash:
//!
//! | Form | Selects |
//! |------|---------|
//! | `!!` | the previous line |
//! | `!N` / `!-N` | line N (1-based) / the Nth line back |
//! | `!str` / `!?str?` | most recent line starting with / containing `str` |
//! | `!$` `!^` `!*` | shorthand for `!!:$`, `!!:^`, `!!:*` |
//!
//! followed by an optional word designator (`:0 :^ :$ :* :N :N-M :N- :N*`)
//! and any number of modifiers (`:s/a/b/ :gs/a/b/ :& :g& :h :t :r :e :p`),
//! applied strictly left to right.
//!
//! All functions here are pure: they never mutate the history or the input.

use crate::error::{Error, Result};

/// The pattern and replacement of the last `:s` or `^old^new^`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub pattern: String,
    pub replacement: String,
}

/// A resolved history reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Text that replaces the reference
    pub text: String,
    /// Bytes of the input taken by the reference
    pub consumed: usize,
    /// The `:p` modifier was present
    pub print_only: bool,
    /// Substitution performed while resolving, if any
    pub substitution: Option<Substitution>,
}

/// Characters that end an event search string.
fn ends_event(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ':' | ';' | '|' | '&' | '<' | '>' | '"' | '\'' | '`')
}

/// Resolve the reference at the start of `input` (which begins with `!`).
pub fn resolve(
    input: &str,
    history: &[String],
    last_substitution: Option<&Substitution>,
) -> Result<Resolved> {
    debug_assert!(input.starts_with('!'));
    let rest = &input[1..];
    let (entry, mut pos, implied_designator) = select_event(input, rest, history)?;
    let expr_end = |pos: usize| &input[..(1 + pos).min(input.len())];

    let mut text = entry.to_string();
    let mut print_only = false;
    let mut substitution = None;
    let mut last_sub = last_substitution.cloned();

    // Word designator, either implied by !$ !^ !* or written as :X
    if let Some(designator) = implied_designator {
        text = select_words(&text, designator, expr_end(pos))?;
    } else if rest[pos..].starts_with(':') {
        let after = &rest[pos + 1..];
        if after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '^' | '$' | '*' | '-'))
        {
            let len = designator_len(after);
            let designator = &after[..len];
            pos += 1 + len;
            text = select_words(&text, designator, expr_end(pos))?;
        }
    }

    // Modifiers
    while rest[pos..].starts_with(':') {
        let after = &rest[pos + 1..];
        let mut chars = after.chars();
        let Some(first) = chars.next() else {
            return Err(Error::History(format!(
                "{}: missing history modifier",
                expr_end(pos + 1)
            )));
        };
        match first {
            'h' => {
                text = match text.rfind('/') {
                    Some(0) => "/".to_string(),
                    Some(idx) => text[..idx].to_string(),
                    None => text,
                };
                pos += 2;
            }
            't' => {
                if let Some(idx) = text.rfind('/') {
                    text = text[idx + 1..].to_string();
                }
                pos += 2;
            }
            'r' => {
                if let Some(idx) = extension_dot(&text) {
                    text.truncate(idx);
                }
                pos += 2;
            }
            'e' => {
                text = match extension_dot(&text) {
                    Some(idx) => text[idx..].to_string(),
                    None => String::new(),
                };
                pos += 2;
            }
            'p' => {
                print_only = true;
                pos += 2;
            }
            '&' => {
                let sub = last_sub
                    .clone()
                    .ok_or_else(|| Error::History(":&: no previous substitution".to_string()))?;
                text = apply_substitution(&text, &sub, false, expr_end(pos + 2))?;
                pos += 2;
            }
            'g' if after[1..].starts_with('&') => {
                let sub = last_sub
                    .clone()
                    .ok_or_else(|| Error::History(":g&: no previous substitution".to_string()))?;
                text = apply_substitution(&text, &sub, true, expr_end(pos + 3))?;
                pos += 3;
            }
            's' | 'g' => {
                let global = first == 'g';
                let body = if global { &after[1..] } else { after };
                if global && !body.starts_with('s') {
                    return Err(Error::History(format!(
                        "{}: unrecognized history modifier",
                        expr_end(pos + 2)
                    )));
                }
                let (sub, len) = parse_substitution(&body[1..], last_sub.as_ref())?;
                let prefix = 1 + usize::from(global) + 1;
                text = apply_substitution(&text, &sub, global, expr_end(pos + prefix + len))?;
                pos += prefix + len;
                last_sub = Some(sub.clone());
                substitution = Some(sub);
            }
            other => {
                return Err(Error::History(format!(
                    "{}: unrecognized history modifier",
                    expr_end(pos + 1 + other.len_utf8())
                )));
            }
        }
    }

    Ok(Resolved {
        text,
        consumed: 1 + pos,
        print_only,
        substitution,
    })
}

/// Rewrite a `^old^new^rest` line into the previous line with `old`
/// replaced by `new`, followed by `rest`.
///
/// Returns the new line and the substitution to remember.
pub fn caret_substitute(line: &str, history: &[String]) -> Result<(String, Substitution)> {
    debug_assert!(line.starts_with('^'));
    let last = history
        .last()
        .ok_or_else(|| Error::EventNotFound(line.to_string()))?;

    let body = &line[1..];
    let (pattern, remainder) = body.split_once('^').unwrap_or((body, ""));
    let (replacement, trailing) = remainder.split_once('^').unwrap_or((remainder, ""));
    let sub = Substitution {
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
    };

    let expr = &line[..line.len() - trailing.len()];
    let mut text = apply_substitution(last, &sub, false, expr)?;
    text.push_str(trailing);
    Ok((text, sub))
}

/// Pick the history entry named by the event part. Returns the entry, the
/// position just past the event within `rest`, and an implied designator.
fn select_event<'h>(
    input: &str,
    rest: &str,
    history: &'h [String],
) -> Result<(&'h str, usize, Option<&'static str>)> {
    let not_found = |len: usize| Error::EventNotFound(input[..(1 + len).min(input.len())].to_string());
    let last = || history.last().map(String::as_str);

    let Some(first) = rest.chars().next() else {
        return Err(not_found(0));
    };

    match first {
        '!' => last().map(|e| (e, 1, None)).ok_or_else(|| not_found(1)),
        '$' => last().map(|e| (e, 1, Some("$"))).ok_or_else(|| not_found(1)),
        '^' => last().map(|e| (e, 1, Some("^"))).ok_or_else(|| not_found(1)),
        '*' => last().map(|e| (e, 1, Some("*"))).ok_or_else(|| not_found(1)),
        '-' | '0'..='9' => {
            let negative = first == '-';
            let digits_start = usize::from(negative);
            let digits: String = rest[digits_start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            let len = digits_start + digits.len();
            let n: usize = digits.parse().map_err(|_| not_found(len))?;
            let index = if negative {
                history.len().checked_sub(n).filter(|_| n > 0)
            } else {
                n.checked_sub(1).filter(|i| *i < history.len())
            };
            index
                .map(|i| (history[i].as_str(), len, None))
                .ok_or_else(|| not_found(len))
        }
        '?' => {
            let body = &rest[1..];
            let (needle, len) = match body.find('?') {
                Some(end) => (&body[..end], end + 2),
                None => {
                    let end = body.find(char::is_whitespace).unwrap_or(body.len());
                    (&body[..end], end + 1)
                }
            };
            if needle.is_empty() {
                return Err(not_found(len));
            }
            history
                .iter()
                .rev()
                .find(|e| e.contains(needle))
                .map(|e| (e.as_str(), len, None))
                .ok_or_else(|| not_found(len))
        }
        c if ends_event(c) => Err(not_found(0)),
        _ => {
            let len = rest.find(ends_event).unwrap_or(rest.len());
            let prefix = &rest[..len];
            history
                .iter()
                .rev()
                .find(|e| e.starts_with(prefix))
                .map(|e| (e.as_str(), len, None))
                .ok_or_else(|| not_found(len))
        }
    }
}

/// Length of the word designator at the start of `s`.
fn designator_len(s: &str) -> usize {
    let mut chars = s.char_indices().peekable();
    match chars.next() {
        Some((_, '^' | '$' | '*')) => 1,
        Some((_, c)) if c.is_ascii_digit() || c == '-' => {
            let mut end = c.len_utf8();
            for (idx, ch) in chars {
                if ch.is_ascii_digit() || ch == '-' || ch == '$' {
                    end = idx + ch.len_utf8();
                } else if ch == '*' {
                    end = idx + 1;
                    break;
                } else {
                    break;
                }
            }
            end
        }
        _ => 0,
    }
}

/// Apply a word designator to a history line.
fn select_words(text: &str, designator: &str, expr: &str) -> Result<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let bad = || Error::History(format!("{expr}: bad word specifier"));
    if words.is_empty() {
        return Err(bad());
    }
    let last = words.len() - 1;

    let parse_index = |s: &str| -> Result<usize> {
        match s {
            "^" => Ok(1),
            "$" => Ok(last),
            _ => s.parse().map_err(|_| bad()),
        }
    };

    let (from, to) = match designator {
        "*" => {
            if last == 0 {
                return Ok(String::new());
            }
            (1, last)
        }
        d if d.ends_with('*') => (parse_index(&d[..d.len() - 1])?, last),
        d if d.starts_with('-') => (0, parse_index(&d[1..])?),
        d if d.ends_with('-') => {
            let from = parse_index(&d[..d.len() - 1])?;
            (from, last.checked_sub(1).ok_or_else(bad)?)
        }
        d => match d.split_once('-') {
            Some((a, b)) => (parse_index(a)?, parse_index(b)?),
            None => {
                let i = parse_index(d)?;
                (i, i)
            }
        },
    };

    if from > to || to > last {
        return Err(bad());
    }
    Ok(words[from..=to].join(" "))
}

/// Parse `old/new/` (after the `s`), returning the substitution and the bytes
/// consumed including the delimiter.
fn parse_substitution(s: &str, last: Option<&Substitution>) -> Result<(Substitution, usize)> {
    let mut chars = s.char_indices();
    let Some((_, delim)) = chars.next() else {
        return Err(Error::History(":s: missing substitution delimiter".to_string()));
    };

    let mut fields = [String::new(), String::new()];
    let mut field = 0;
    let mut consumed = s.len();
    let mut escaped = false;
    for (idx, ch) in chars {
        if escaped {
            if ch != delim && ch != '\\' {
                fields[field].push('\\');
            }
            fields[field].push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == delim {
            if field == 1 {
                consumed = idx + ch.len_utf8();
                break;
            }
            field = 1;
        } else if field == 1 && ch.is_whitespace() {
            consumed = idx;
            break;
        } else {
            fields[field].push(ch);
        }
    }

    let [pattern, replacement] = fields;
    let pattern = if pattern.is_empty() {
        last.map(|sub| sub.pattern.clone())
            .ok_or_else(|| Error::History(":s: no previous substitution".to_string()))?
    } else {
        pattern
    };
    Ok((
        Substitution {
            pattern,
            replacement,
        },
        consumed,
    ))
}

fn apply_substitution(text: &str, sub: &Substitution, global: bool, expr: &str) -> Result<String> {
    if sub.pattern.is_empty() || !text.contains(&sub.pattern) {
        return Err(Error::History(format!("{expr}: substitution failed")));
    }
    // `&` in the replacement stands for the matched pattern
    let mut replacement = String::new();
    let mut chars = sub.replacement.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'&') => {
                replacement.push('&');
                chars.next();
            }
            '&' => replacement.push_str(&sub.pattern),
            _ => replacement.push(ch),
        }
    }
    Ok(if global {
        text.replace(&sub.pattern, &replacement)
    } else {
        text.replacen(&sub.pattern, &replacement, 1)
    })
}

/// Byte index of the `.` starting the extension of the last path component.
fn extension_dot(text: &str) -> Option<usize> {
    let base_start = text.rfind('/').map_or(0, |i| i + 1);
    text[base_start..]
        .rfind('.')
        .filter(|i| *i > 0)
        .map(|i| base_start + i)
}
