use crate::escape::{is_escapable_char, skip_html_entity};

/// Cursor over the range `[start, end)` of a borrowed buffer.
///
/// Positions are byte offsets into the whole buffer so that callers can save
/// and restore them freely. Every read outside the range yields `'\0'` and
/// every skip stops at the range boundary instead of failing.
#[derive(Clone, Debug)]
pub(crate) struct Scanner<'a> {
    input: &'a str,
    start: usize,
    end: usize,
    pos: usize,
    mark: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self::with_range(input, 0, input.len())
    }

    pub(crate) fn with_range(input: &'a str, start: usize, end: usize) -> Self {
        let end = floor_char_boundary(input, end.min(input.len()));
        let start = floor_char_boundary(input, start.min(end));
        Self {
            input,
            start,
            end,
            pos: start,
            mark: start,
        }
    }

    pub(crate) fn input(&self) -> &'a str {
        self.input
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn set_position(&mut self, pos: usize) {
        self.pos = pos.clamp(self.start, self.end);
    }

    pub(crate) fn current(&self) -> char {
        if self.pos < self.start || self.pos >= self.end {
            return '\0';
        }
        self.input[self.pos..self.end].chars().next().unwrap_or('\0')
    }

    /// Character `offset` characters away from the cursor; negative offsets
    /// look behind.
    pub(crate) fn char_at_offset(&self, offset: isize) -> char {
        if offset >= 0 {
            match self.input.get(self.pos..self.end) {
                Some(rest) => rest.chars().nth(offset.unsigned_abs()).unwrap_or('\0'),
                None => '\0',
            }
        } else {
            match self.input.get(self.start..self.pos.min(self.end)) {
                Some(before) => before
                    .chars()
                    .rev()
                    .nth(offset.unsigned_abs() - 1)
                    .unwrap_or('\0'),
                None => '\0',
            }
        }
    }

    pub(crate) fn eof(&self) -> bool {
        self.pos >= self.end
    }

    pub(crate) fn eol(&self) -> bool {
        is_line_end(self.current())
    }

    pub(crate) fn bof(&self) -> bool {
        self.pos == self.start
    }

    pub(crate) fn remainder(&self) -> &'a str {
        self.input.get(self.pos..self.end).unwrap_or("")
    }

    pub(crate) fn skip_forward(&mut self, count: usize) {
        for _ in 0..count {
            if self.pos >= self.end {
                break;
            }
            self.pos += self.current().len_utf8();
        }
    }

    pub(crate) fn skip_back(&mut self, count: usize) {
        for _ in 0..count {
            if self.pos <= self.start {
                break;
            }
            let step = self.input[self.start..self.pos]
                .chars()
                .next_back()
                .map_or(1, char::len_utf8);
            self.pos -= step;
        }
    }

    pub(crate) fn skip_to_eol(&mut self) {
        while self.pos < self.end {
            let ch = self.current();
            if ch == '\r' || ch == '\n' {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    /// Consumes one line terminator: `\r\n`, `\n\r`, `\r` or `\n`.
    pub(crate) fn skip_eol(&mut self) -> bool {
        match self.current() {
            '\r' if self.pos < self.end => {
                self.pos += 1;
                if self.current() == '\n' {
                    self.pos += 1;
                }
                true
            }
            '\n' if self.pos < self.end => {
                self.pos += 1;
                if self.current() == '\r' {
                    self.pos += 1;
                }
                true
            }
            _ => false,
        }
    }

    pub(crate) fn skip_to_next_line(&mut self) {
        self.skip_to_eol();
        self.skip_eol();
    }

    pub(crate) fn skip_char(&mut self, ch: char) -> bool {
        if self.pos < self.end && self.current() == ch {
            self.pos += ch.len_utf8();
            return true;
        }
        false
    }

    pub(crate) fn skip_str(&mut self, text: &str) -> bool {
        if self.does_match_str(text) {
            self.pos += text.len();
            return true;
        }
        false
    }

    pub(crate) fn skip_whitespace(&mut self) -> bool {
        let before = self.pos;
        while self.pos < self.end && self.current().is_whitespace() {
            self.pos += self.current().len_utf8();
        }
        self.pos > before
    }

    pub(crate) fn skip_linespace(&mut self) -> bool {
        let before = self.pos;
        while self.pos < self.end && is_line_space(self.current()) {
            self.pos += 1;
        }
        self.pos > before
    }

    pub(crate) fn does_match(&self, ch: char) -> bool {
        self.pos < self.end && self.current() == ch
    }

    pub(crate) fn does_match_str(&self, text: &str) -> bool {
        self.remainder().starts_with(text)
    }

    pub(crate) fn find_char(&mut self, ch: char) -> bool {
        match self.remainder().find(ch) {
            Some(offset) => {
                self.pos += offset;
                true
            }
            None => false,
        }
    }

    pub(crate) fn find_str(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        match self.remainder().find(text) {
            Some(offset) => {
                self.pos += offset;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark(&mut self) {
        self.mark = self.pos;
    }

    pub(crate) fn extract(&self) -> &'a str {
        if self.mark >= self.pos {
            return "";
        }
        self.input.get(self.mark..self.pos).unwrap_or("")
    }

    pub(crate) fn substring(&self, start: usize, end: usize) -> &'a str {
        self.input.get(start..end.min(self.end)).unwrap_or("")
    }

    /// Skips a tag or attribute name: a letter or `_`, then letters, digits,
    /// `_` or `-`. Fails when the name runs into the end of the range.
    pub(crate) fn skip_identifier(&mut self) -> Option<&'a str> {
        let first = self.current();
        if self.eof() || !(first.is_alphabetic() || first == '_') {
            return None;
        }
        let start = self.pos;
        self.pos += first.len_utf8();
        while self.pos < self.end {
            let ch = self.current();
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        if self.pos >= self.end {
            self.pos = start;
            return None;
        }
        self.input.get(start..self.pos)
    }

    /// Skips a footnote id (letters, digits, `-_:.` and spaces) and returns it
    /// trimmed. Restores the position when nothing usable was found.
    pub(crate) fn skip_footnote_id(&mut self) -> Option<String> {
        let saved = self.pos;
        self.skip_linespace();
        self.mark();
        while self.pos < self.end {
            let ch = self.current();
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.' | ' ') {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
        let id = self.extract().trim();
        if !id.is_empty() {
            let id = id.to_string();
            self.skip_linespace();
            return Some(id);
        }
        self.pos = saved;
        None
    }

    pub(crate) fn skip_html_entity(&mut self) -> bool {
        match skip_html_entity(self.input, self.pos) {
            Some(next) if next <= self.end => {
                self.pos = next;
                true
            }
            _ => false,
        }
    }

    /// Steps over one character, or over a backslash escape pair as a unit.
    pub(crate) fn skip_escapable_char(&mut self, extra_mode: bool) {
        if self.current() == '\\' && is_escapable_char(self.char_at_offset(1), extra_mode) {
            self.skip_forward(2);
        } else {
            self.skip_forward(1);
        }
    }
}

pub(crate) fn is_line_space(ch: char) -> bool {
    ch == ' ' || ch == '\t'
}

pub(crate) fn is_line_end(ch: char) -> bool {
    ch == '\r' || ch == '\n' || ch == '\0'
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
