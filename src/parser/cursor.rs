// src/parser/cursor.rs
use std::iter::Peekable;

/// Forward-only cursor over log lines with one line of lookahead
pub struct LineCursor<I: Iterator> {
    lines: Peekable<I>,
    line_number: usize,
}

impl<I, S> LineCursor<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines: lines.peekable(),
            line_number: 0,
        }
    }

    /// Line under the cursor, None at end of input
    pub fn peek<'a>(&'a mut self) -> Option<&'a str>
    where
        S: 'a,
    {
        self.lines.peek().map(|line| line.as_ref())
    }

    /// Move past the line under the cursor
    pub fn advance(&mut self) {
        if self.lines.next().is_some() {
            self.line_number += 1;
        }
    }

    pub fn at_end(&mut self) -> bool {
        self.lines.peek().is_none()
    }

    /// 1-based number of the line under the cursor
    pub fn line_number(&self) -> usize {
        self.line_number + 1
    }
}
