//! Editor accessor
//!
//! Synchronous view of the single active document. Positions are character
//! offsets; line and column are 1-based.

use std::cell::RefCell;
use std::rc::Rc;

/// The active document buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorBuffer {
    content: String,
    /// Selection as char offsets, `start <= end`; collapsed when equal
    selection: (usize, usize),
    language: String,
    path: Option<String>,
}

/// Shared handle to the active buffer
#[derive(Debug, Clone, Default)]
pub struct EditorAccessor {
    buffer: Rc<RefCell<EditorBuffer>>,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

impl EditorAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buffer with a freshly opened document, cursor at the start
    pub fn open_document(&self, path: Option<&str>, content: &str, language: &str) {
        let mut buf = self.buffer.borrow_mut();
        buf.content = content.to_string();
        buf.selection = (0, 0);
        buf.language = language.to_string();
        buf.path = path.map(str::to_string);
    }

    pub fn content(&self) -> String {
        self.buffer.borrow().content.clone()
    }

    /// Replaces the whole content; the selection is clamped to the new length
    pub fn set_content(&self, content: &str) {
        let mut buf = self.buffer.borrow_mut();
        buf.content = content.to_string();
        let len = char_len(&buf.content);
        buf.selection = (buf.selection.0.min(len), buf.selection.1.min(len));
    }

    pub fn language(&self) -> String {
        let buf = self.buffer.borrow();
        if buf.language.is_empty() {
            "text".to_string()
        } else {
            buf.language.clone()
        }
    }

    pub fn set_language(&self, language: &str) {
        self.buffer.borrow_mut().language = language.to_string();
    }

    pub fn path(&self) -> Option<String> {
        self.buffer.borrow().path.clone()
    }

    /// Cursor offset (end of the selection)
    pub fn cursor(&self) -> usize {
        self.buffer.borrow().selection.1
    }

    pub fn set_cursor(&self, offset: usize) {
        self.select(offset, offset);
    }

    /// Selects `[start, end)`; arguments may come in either order
    pub fn select(&self, start: usize, end: usize) {
        let mut buf = self.buffer.borrow_mut();
        let len = char_len(&buf.content);
        let (a, b) = (start.min(len), end.min(len));
        buf.selection = (a.min(b), a.max(b));
    }

    pub fn selection_range(&self) -> (usize, usize) {
        self.buffer.borrow().selection
    }

    pub fn selected_text(&self) -> String {
        let buf = self.buffer.borrow();
        let (start, end) = buf.selection;
        buf.content.chars().skip(start).take(end - start).collect()
    }

    /// Replaces the selection and leaves the cursor after the inserted text
    pub fn replace_selection(&self, text: &str) {
        let mut buf = self.buffer.borrow_mut();
        let (start, end) = buf.selection;
        let from = byte_offset(&buf.content, start);
        let to = byte_offset(&buf.content, end);
        buf.content.replace_range(from..to, text);
        let cursor = start + char_len(text);
        buf.selection = (cursor, cursor);
    }

    /// Inserts at the cursor, replacing any selection
    pub fn insert_at_cursor(&self, text: &str) {
        self.replace_selection(text);
    }

    /// Replaces the `count` characters right before the cursor
    pub fn replace_before_cursor(&self, count: usize, text: &str) {
        let cursor = self.cursor();
        self.select(cursor.saturating_sub(count), cursor);
        self.replace_selection(text);
    }

    pub fn text_before_cursor(&self) -> String {
        let buf = self.buffer.borrow();
        buf.content.chars().take(buf.selection.1).collect()
    }

    /// 1-based (line, column) of the cursor
    pub fn cursor_line_col(&self) -> (usize, usize) {
        let before = self.text_before_cursor();
        let line = before.matches('\n').count() + 1;
        let col = match before.rfind('\n') {
            Some(idx) => char_len(&before[idx + 1..]) + 1,
            None => char_len(&before) + 1,
        };
        (line, col)
    }
}
