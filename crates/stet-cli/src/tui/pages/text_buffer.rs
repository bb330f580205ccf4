/// Multi-line text with a cursor, addressed in characters rather than bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TextBuffer {
    lines: Vec<String>,
    row: usize,
    col: usize,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
        }
    }
}

impl TextBuffer {
    pub(crate) fn value(&self) -> String {
        self.lines.join("\n")
    }

    /// Replaces the content and parks the cursor at the end.
    pub(crate) fn set_value(&mut self, value: &str) {
        self.lines = value.split('\n').map(str::to_string).collect();
        self.row = self.lines.len() - 1;
        self.col = self.line_len(self.row);
    }

    pub(crate) fn lines(&self) -> &[String] {
        &self.lines
    }

    pub(crate) fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    fn line_len(&self, row: usize) -> usize {
        self.lines.get(row).map_or(0, |line| line.chars().count())
    }

    fn byte_index(line: &str, col: usize) -> usize {
        line.char_indices()
            .nth(col)
            .map_or(line.len(), |(index, _)| index)
    }

    fn char_at(&self, row: usize, col: usize) -> Option<char> {
        self.lines.get(row).and_then(|line| line.chars().nth(col))
    }

    pub(crate) fn insert_char(&mut self, ch: char) {
        let line = &mut self.lines[self.row];
        let index = Self::byte_index(line, self.col);
        line.insert(index, ch);
        self.col += 1;
    }

    pub(crate) fn insert_newline(&mut self) {
        let line = &mut self.lines[self.row];
        let index = Self::byte_index(line, self.col);
        let rest = line.split_off(index);
        self.lines.insert(self.row + 1, rest);
        self.row += 1;
        self.col = 0;
    }

    pub(crate) fn backspace(&mut self) {
        if self.col > 0 {
            let line = &mut self.lines[self.row];
            let index = Self::byte_index(line, self.col - 1);
            line.remove(index);
            self.col -= 1;
        } else if self.row > 0 {
            let current = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_len(self.row);
            self.lines[self.row].push_str(&current);
        }
    }

    /// Deletes under the cursor; at the end of a line joins the next one.
    pub(crate) fn delete_forward(&mut self) {
        if self.col < self.line_len(self.row) {
            let line = &mut self.lines[self.row];
            let index = Self::byte_index(line, self.col);
            line.remove(index);
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
        }
    }

    pub(crate) fn delete_line(&mut self) {
        if self.lines.len() == 1 {
            self.lines[0].clear();
        } else {
            self.lines.remove(self.row);
            self.row = self.row.min(self.lines.len() - 1);
        }
        self.col = 0;
    }

    pub(crate) fn move_left(&mut self) {
        self.col = self.col.saturating_sub(1);
    }

    pub(crate) fn move_right(&mut self) {
        self.col = (self.col + 1).min(self.line_len(self.row));
    }

    pub(crate) fn move_up(&mut self) {
        if self.row > 0 {
            self.row -= 1;
            self.col = self.col.min(self.line_len(self.row));
        }
    }

    pub(crate) fn move_down(&mut self) {
        if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = self.col.min(self.line_len(self.row));
        }
    }

    pub(crate) fn line_start(&mut self) {
        self.col = 0;
    }

    pub(crate) fn line_end(&mut self) {
        self.col = self.line_len(self.row);
    }

    pub(crate) fn text_start(&mut self) {
        self.row = 0;
        self.col = 0;
    }

    pub(crate) fn text_end(&mut self) {
        self.row = self.lines.len() - 1;
        self.col = self.line_len(self.row);
    }

    /// Start of the next word, continuing onto following lines.
    pub(crate) fn word_forward(&mut self) {
        while self
            .char_at(self.row, self.col)
            .is_some_and(|ch| !ch.is_whitespace())
        {
            self.col += 1;
        }
        loop {
            match self.char_at(self.row, self.col) {
                Some(ch) if ch.is_whitespace() => self.col += 1,
                Some(_) => return,
                None if self.row + 1 < self.lines.len() => {
                    self.row += 1;
                    self.col = 0;
                }
                None => return,
            }
        }
    }

    /// Start of the current or previous word.
    pub(crate) fn word_backward(&mut self) {
        loop {
            if self.col == 0 {
                if self.row == 0 {
                    return;
                }
                self.row -= 1;
                self.col = self.line_len(self.row);
                continue;
            }
            if self
                .char_at(self.row, self.col - 1)
                .is_some_and(char::is_whitespace)
            {
                self.col -= 1;
            } else {
                break;
            }
        }
        while self.col > 0
            && self
                .char_at(self.row, self.col - 1)
                .is_some_and(|ch| !ch.is_whitespace())
        {
            self.col -= 1;
        }
    }

    /// Opens an empty line below the cursor's line.
    pub(crate) fn open_below(&mut self) {
        self.line_end();
        self.insert_newline();
    }

    /// Opens an empty line above the cursor's line.
    pub(crate) fn open_above(&mut self) {
        self.lines.insert(self.row, String::new());
        self.col = 0;
    }
}
