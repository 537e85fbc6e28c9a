//! Details lexer.
//!
//! Three states, driven left to right over the input:
//!
//! ```text
//!   KEY ──'─▶ QUOTED_VALUE ──┐
//!    │                       ├─ `,` / end ─▶ KEY
//!    └────▶ UNQUOTED_VALUE ──┘
//! ```
//!
//! A quoted value ends at the first `'` that is followed (after optional
//! whitespace) by `,` or by the end of input. Quotes are never escaped, so
//! this lookahead is the only way to tell an apostrophe from a delimiter; an
//! input that leaves no such quote is rejected rather than guessed at.
//!
//! A string holding a single assignment (one `=` once any leading
//! `[instance = N]` marker is consumed) is not split at all: its value runs
//! to the end of input, commas and apostrophes included.

use crate::{
  CHECKED, ParsedDetails, UNCHECKED,
  error::{Error, Result},
};

const INSTANCE_MARKER: &str = "[instance";

enum State {
  Key,
  UnquotedValue { key: String },
  QuotedValue { key: String, opened_at: usize },
}

struct Lexer<'a> {
  input: &'a str,
  pos:   usize,
}

impl<'a> Lexer<'a> {
  fn rest(&self) -> &'a str { &self.input[self.pos..] }

  fn at_end(&self) -> bool { self.pos >= self.input.len() }

  fn peek(&self) -> Option<char> { self.rest().chars().next() }

  fn skip_ws(&mut self) {
    let rest = self.rest();
    self.pos += rest.len() - rest.trim_start().len();
  }

  /// After a value: consume one `,`, or accept the end of input.
  fn end_of_value(&mut self) -> Result<()> {
    self.skip_ws();
    match self.peek() {
      None => Ok(()),
      Some(',') => {
        self.pos += 1;
        Ok(())
      }
      Some(_) => Err(Error::UnexpectedInput {
        offset: self.pos,
        found:  self.rest().chars().take(16).collect(),
      }),
    }
  }

  /// `[instance = N]`
  fn instance_marker(&mut self) -> Result<u32> {
    let rest = self.rest();
    let close = rest
      .find(']')
      .ok_or_else(|| Error::MalformedInstance(rest.to_string()))?;
    let marker = &rest[..=close];
    let number = rest[INSTANCE_MARKER.len()..close]
      .trim()
      .strip_prefix('=')
      .map(str::trim)
      .and_then(|n| n.parse::<u32>().ok())
      .filter(|n| *n >= 1)
      .ok_or_else(|| Error::MalformedInstance(marker.to_string()))?;
    self.pos += close + 1;
    Ok(number)
  }

  /// Read a key up to `=`. A `,` before any `=` means the segment is not an
  /// assignment at all.
  fn key(&mut self) -> Result<String> {
    let start = self.pos;
    let rest = self.rest();
    let Some(eq) = rest.find(['=', ',']).filter(|i| rest.as_bytes()[*i] == b'=')
    else {
      let segment = rest.split(',').next().unwrap_or(rest).trim();
      return Err(Error::MissingAssignment {
        offset:  start,
        segment: segment.to_string(),
      });
    };

    let key = rest[..eq].trim();
    if key.is_empty() {
      return Err(Error::EmptyKey { offset: start });
    }
    self.pos += eq + 1;
    Ok(key.to_string())
  }

  /// Everything up to the next `,` (or end), with checkbox tokens mapped to
  /// their numeric values.
  fn unquoted_value(&mut self) -> String {
    let rest = self.rest();
    let end = rest.find(',').unwrap_or(rest.len());
    self.pos += end;
    token_value(&rest[..end])
  }

  /// The rest of the input as one `key = value`. One pair of outer quotes is
  /// stripped; an unquoted value gets the checkbox substitution.
  fn single_assignment(&mut self) -> Result<(String, String)> {
    let key = self.key()?;
    self.skip_ws();
    let opened_at = self.pos;
    let raw = self.rest().trim_end();
    let raw = raw.strip_suffix(',').map(str::trim_end).unwrap_or(raw);
    self.pos = self.input.len();

    match raw.strip_prefix('\'') {
      Some(inner) => match inner.strip_suffix('\'') {
        Some(value) => Ok((key, value.to_string())),
        None => Err(Error::UnterminatedQuote { key, offset: opened_at }),
      },
      None => Ok((key, token_value(raw))),
    }
  }

  /// Called with `pos` just past the opening quote.
  fn quoted_value(&mut self, key: &str, opened_at: usize) -> Result<String> {
    let rest = self.rest();
    for (i, c) in rest.char_indices() {
      if c != '\'' {
        continue;
      }
      let after = rest[i + 1..].trim_start();
      if after.is_empty() || after.starts_with(',') {
        self.pos += i + 1;
        return Ok(rest[..i].to_string());
      }
    }
    Err(Error::UnterminatedQuote {
      key:    key.to_string(),
      offset: opened_at,
    })
  }
}

fn token_value(token: &str) -> String {
  match token.trim() {
    "checked" => CHECKED.to_string(),
    "unchecked" => UNCHECKED.to_string(),
    token => token.to_string(),
  }
}

pub(crate) fn lex(input: &str) -> Result<ParsedDetails> {
  let mut parsed = ParsedDetails::default();
  let mut lexer = Lexer { input, pos: 0 };

  lexer.skip_ws();
  if lexer.rest().starts_with(INSTANCE_MARKER) {
    parsed.instance = Some(lexer.instance_marker()?);
    lexer.end_of_value()?;
  }
  if lexer.rest().matches('=').count() == 1 {
    let (key, value) = lexer.single_assignment()?;
    parsed.fields.insert(key, value);
    return Ok(parsed);
  }

  let mut state = State::Key;

  loop {
    state = match state {
      State::Key => {
        lexer.skip_ws();
        if lexer.at_end() {
          break;
        }
        if lexer.rest().starts_with(INSTANCE_MARKER) {
          parsed.instance = Some(lexer.instance_marker()?);
          lexer.end_of_value()?;
          State::Key
        } else {
          let key = lexer.key()?;
          lexer.skip_ws();
          if lexer.peek() == Some('\'') {
            let opened_at = lexer.pos;
            lexer.pos += 1;
            State::QuotedValue { key, opened_at }
          } else {
            State::UnquotedValue { key }
          }
        }
      }

      State::UnquotedValue { key } => {
        let value = lexer.unquoted_value();
        parsed.fields.insert(key, value);
        lexer.end_of_value()?;
        State::Key
      }

      State::QuotedValue { key, opened_at } => {
        let value = lexer.quoted_value(&key, opened_at)?;
        parsed.fields.insert(key, value);
        lexer.end_of_value()?;
        State::Key
      }
    };
  }

  Ok(parsed)
}
