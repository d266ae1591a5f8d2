//! Filter expression parser.
//!
//! Hand-written recursive descent over the small filter grammar:
//!
//! ```text
//! filter_list := filter (';' filter)*
//! filter      := target '|' [hint '|'] rule
//! rule        := 'pct:' ('<=' | '>=') number
//!              | 'val:' op number
//!              | 'cat:exclude(' label (',' label)* ')'
//! ```
//!
//! Errors carry the character offset into the full input so callers can
//! render a caret under the offending position.

use std::collections::BTreeSet;

use crate::domain::error::ParseError;
use crate::domain::factor::Direction;
use crate::domain::rule::{CompareOp, FilterRule, PercentileSide};

/// A parsed filter whose target has not yet been resolved against the
/// factor list.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFilter {
    pub target: String,
    pub weighting_hint: Option<Direction>,
    pub rule: FilterRule,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            end: input.len(),
        }
    }

    /// Parser over `input[start..end]` that reports offsets into `input`.
    fn segment(input: &'a str, start: usize, end: usize) -> Self {
        Self {
            input,
            pos: start,
            end,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..self.end]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn consume_exact(&mut self, s: &str) -> bool {
        if self.remaining().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn peek_word(&self) -> String {
        let word = self.scan_label();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word.to_string()
        }
    }

    fn scan_label(&self) -> &'a str {
        let remaining = self.remaining();
        let len = remaining
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        &remaining[..len]
    }

    fn parse_label(&mut self, what: &str) -> Result<String, ParseError> {
        self.skip_whitespace();
        let label = self.scan_label();
        if label.is_empty() {
            return Err(ParseError {
                message: format!("expected {}, found '{}'", what, self.peek_word()),
                position: self.pos,
            });
        }
        self.pos += label.len();
        Ok(label.to_string())
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut has_exp = false;
        let mut digits = 0;

        if matches!(self.peek(), Some('-') | Some('+')) {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot && !has_exp {
                has_dot = true;
                self.advance();
            } else if (ch == 'e' || ch == 'E') && digits > 0 && !has_exp {
                has_exp = true;
                self.advance();
                if matches!(self.peek(), Some('-') | Some('+')) {
                    self.advance();
                }
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: format!("expected number, found '{}'", self.peek_word()),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ParseError> {
        self.skip_whitespace();
        // Two-character operators first so "<=" is not read as "<".
        let ops = [
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
            ("=", CompareOp::Eq),
        ];
        for (text, op) in ops {
            if self.consume_exact(text) {
                return Ok(op);
            }
        }
        Err(ParseError {
            message: format!(
                "expected comparison operator (<=, >=, <, >, ==, !=), found '{}'",
                self.peek_word()
            ),
            position: self.pos,
        })
    }

    fn parse_percentile(&mut self) -> Result<FilterRule, ParseError> {
        self.skip_whitespace();
        let op_pos = self.pos;
        let side = if self.consume_exact("<=") {
            PercentileSide::Head
        } else if self.consume_exact(">=") {
            PercentileSide::Tail
        } else {
            return Err(ParseError {
                message: format!(
                    "percentile rules take '<=' or '>=', found '{}'",
                    self.peek_word()
                ),
                position: op_pos,
            });
        };
        self.skip_whitespace();
        let threshold_pos = self.pos;
        let threshold = self.parse_number()?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ParseError {
                message: format!("percentile threshold must be within [0, 1], got {}", threshold),
                position: threshold_pos,
            });
        }
        Ok(FilterRule::Percentile { side, threshold })
    }

    fn parse_absolute(&mut self) -> Result<FilterRule, ParseError> {
        let op = self.parse_compare_op()?;
        let threshold = self.parse_number()?;
        Ok(FilterRule::Absolute { op, threshold })
    }

    fn parse_category(&mut self) -> Result<FilterRule, ParseError> {
        self.skip_whitespace();
        if !self.consume_exact("exclude") {
            return Err(ParseError {
                message: format!("expected 'exclude', found '{}'", self.peek_word()),
                position: self.pos,
            });
        }
        self.expect_char('(')?;

        let mut labels = BTreeSet::new();
        labels.insert(self.parse_label("category label")?);
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            labels.insert(self.parse_label("category label")?);
        }
        Ok(FilterRule::CategoryExclude(labels))
    }

    fn parse_rule(&mut self) -> Result<FilterRule, ParseError> {
        self.skip_whitespace();
        if self.consume_exact("pct:") {
            self.parse_percentile()
        } else if self.consume_exact("val:") {
            self.parse_absolute()
        } else if self.consume_exact("cat:") {
            self.parse_category()
        } else {
            Err(ParseError {
                message: format!(
                    "expected rule kind (pct:, val:, cat:), found '{}'",
                    self.peek_word()
                ),
                position: self.pos,
            })
        }
    }

    fn expect_end(&mut self, what: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.end {
            return Err(ParseError {
                message: format!("unexpected input after {}: '{}'", what, self.remaining()),
                position: self.pos,
            });
        }
        Ok(())
    }

    fn parse_filter(&mut self) -> Result<RawFilter, ParseError> {
        let target = self.parse_label("filter target")?;
        self.expect_char('|')?;
        self.skip_whitespace();

        let weighting_hint = if self.remaining().contains('|') {
            let hint_pos = self.pos;
            let word = self.parse_label("weighting hint")?;
            let hint = word.parse::<Direction>().map_err(|e| ParseError {
                message: e.message,
                position: hint_pos,
            })?;
            self.expect_char('|')?;
            Some(hint)
        } else {
            None
        };

        let rule = self.parse_rule()?;
        self.expect_end("filter")?;
        Ok(RawFilter {
            target,
            weighting_hint,
            rule,
        })
    }
}

/// Parse a bare rule expression such as `pct:<=0.3`.
pub fn parse_rule(input: &str) -> Result<FilterRule, ParseError> {
    let mut parser = Parser::new(input);
    let rule = parser.parse_rule()?;
    parser.expect_end("rule")?;
    Ok(rule)
}

/// Parse one `target|[hint|]rule` filter.
pub fn parse_filter(input: &str) -> Result<RawFilter, ParseError> {
    Parser::new(input).parse_filter()
}

/// Parse a `;`-separated filter list. Empty entries are skipped.
pub fn parse_filter_list(input: &str) -> Result<Vec<RawFilter>, ParseError> {
    let mut filters = Vec::new();
    let mut start = 0;
    for segment in input.split(';') {
        let end = start + segment.len();
        if !segment.trim().is_empty() {
            filters.push(Parser::segment(input, start, end).parse_filter()?);
        }
        start = end + 1;
    }
    Ok(filters)
}
