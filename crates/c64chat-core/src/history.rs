//! Bounded, pre-wrapped chat history for the device screen.
//!
//! Messages are word-wrapped into at most [`MAX_LINES_PER_MESSAGE`] lines when
//! they are appended. The buffer keeps a fixed number of lines; appending N
//! lines drops the N oldest.

use crate::palette::C64Color;
use crate::screen::{TextScreen, HISTORY_LEFT_COLUMN, HISTORY_ROWS, HISTORY_TOP_ROW, HISTORY_WIDTH};

pub const MAX_LINES_PER_MESSAGE: usize = 10;
pub const CONTINUATION_INDENT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Ai,
    System,
    Reasoning,
}

/// Leading glyph of a message's first line. Only `glyph` takes up columns;
/// the colour is a display attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    pub glyph: &'static str,
    pub color: C64Color,
}

impl Speaker {
    pub fn prefix(self) -> Prefix {
        match self {
            Speaker::User => Prefix {
                glyph: "> ",
                color: C64Color::LightGreen,
            },
            Speaker::Ai => Prefix {
                glyph: "* ",
                color: C64Color::Yellow,
            },
            Speaker::System => Prefix {
                glyph: "! ",
                color: C64Color::LightRed,
            },
            Speaker::Reasoning => Prefix {
                glyph: "~ ",
                color: C64Color::Grey,
            },
        }
    }

    pub fn text_color(self) -> C64Color {
        match self {
            Speaker::Reasoning => C64Color::Grey,
            Speaker::User => C64Color::White,
            Speaker::Ai | Speaker::System => C64Color::LightBlue,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLine {
    /// Prefix glyph on a first line, indent on a continuation line.
    pub lead: String,
    pub lead_color: Option<C64Color>,
    pub text: String,
    pub text_color: Option<C64Color>,
}

impl HistoryLine {
    pub fn is_empty(&self) -> bool {
        self.lead.is_empty() && self.text.is_empty()
    }

    /// What the line looks like on screen.
    pub fn visible(&self) -> String {
        format!("{}{}", self.lead, self.text)
    }

    pub fn visible_len(&self) -> usize {
        self.lead.chars().count() + self.text.chars().count()
    }
}

/// Word-wrap `text` into lines of at most `first_width` columns for the first
/// line and `rest_width` for the others, keeping at most `max_lines`.
///
/// Lines break after the last space within reach; a run with no space is cut
/// exactly at the width. Spaces at a break are dropped.
pub fn wrap_text(text: &str, first_width: usize, rest_width: usize, max_lines: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut width = first_width.max(1);

    while lines.len() < max_lines {
        while start < chars.len() && chars[start] == ' ' {
            start += 1;
        }
        if start >= chars.len() {
            break;
        }

        let remaining = chars.len() - start;
        if remaining <= width {
            lines.push(chars[start..].iter().collect());
            break;
        }

        // The character just past the width counts: a space there means the
        // first `width` characters fill the line exactly.
        let window = &chars[start..=start + width];
        let end = match window.iter().rposition(|&c| c == ' ') {
            Some(i) if i > 0 => start + i,
            _ => start + width,
        };
        lines.push(chars[start..end].iter().collect());
        start = end;
        width = rest_width.max(1);
    }

    lines
}

pub struct HistoryRenderer {
    lines: Vec<HistoryLine>,
    capacity: usize,
    width: usize,
}

impl HistoryRenderer {
    pub fn new(capacity: usize, width: usize) -> Self {
        Self {
            lines: vec![HistoryLine::default(); capacity],
            capacity,
            width,
        }
    }

    /// Sized for the device screen's history area.
    pub fn for_screen() -> Self {
        Self::new(HISTORY_ROWS, HISTORY_WIDTH)
    }

    pub fn lines(&self) -> &[HistoryLine] {
        &self.lines
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append_message(&mut self, speaker: Speaker, text: &str) -> usize {
        self.append_with_prefix(speaker.prefix(), speaker.text_color(), text)
    }

    /// Wrap and append one message; returns the number of lines added.
    pub fn append_with_prefix(&mut self, prefix: Prefix, text_color: C64Color, text: &str) -> usize {
        let text = text.trim();
        if text.is_empty() {
            return 0;
        }

        let glyph_width = prefix.glyph.chars().count();
        let first_width = self.width.saturating_sub(glyph_width);
        let rest_width = self.width.saturating_sub(CONTINUATION_INDENT);
        let wrapped = wrap_text(text, first_width, rest_width, MAX_LINES_PER_MESSAGE);

        let new_lines: Vec<HistoryLine> = wrapped
            .into_iter()
            .enumerate()
            .map(|(i, segment)| HistoryLine {
                lead: if i == 0 {
                    prefix.glyph.to_string()
                } else {
                    " ".repeat(CONTINUATION_INDENT)
                },
                lead_color: (i == 0).then_some(prefix.color),
                text: segment,
                text_color: Some(text_color),
            })
            .collect();

        let added = new_lines.len();
        self.push_lines(new_lines);
        added
    }

    /// Shift out as many old lines as are added, keeping the buffer full.
    pub fn push_lines(&mut self, new_lines: Vec<HistoryLine>) {
        let evict = new_lines.len().min(self.lines.len());
        self.lines.drain(..evict);
        self.lines.extend(new_lines);
        if self.lines.len() > self.capacity {
            let excess = self.lines.len() - self.capacity;
            self.lines.drain(..excess);
        }
        while self.lines.len() < self.capacity {
            self.lines.insert(0, HistoryLine::default());
        }
    }

    pub fn clear(&mut self) {
        self.lines = vec![HistoryLine::default(); self.capacity];
    }

    /// Clear the history area, redraw the frame and print every line at its row.
    pub fn redraw(&self, screen: &mut TextScreen) {
        screen.clear_rows(HISTORY_TOP_ROW, HISTORY_ROWS);
        screen.draw_frame();

        for (offset, line) in self.lines.iter().take(HISTORY_ROWS).enumerate() {
            if line.is_empty() {
                continue;
            }
            let row = HISTORY_TOP_ROW + offset;
            let lead_color = line.lead_color.unwrap_or(screen.text);
            let text_color = line.text_color.unwrap_or(screen.text);
            let column = screen.put_str(row, HISTORY_LEFT_COLUMN, &line.lead, lead_color);
            screen.put_str(row, column, &line.text, text_color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(renderer: &HistoryRenderer) -> Vec<String> {
        renderer
            .lines()
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| l.visible())
            .collect()
    }

    #[test]
    fn test_wrap_breaks_at_last_space() {
        let lines = wrap_text("hello big world", 10, 10, 10);
        assert_eq!(lines, vec!["hello big", "world"]);
    }

    #[test]
    fn test_wrap_forces_break_without_space() {
        let lines = wrap_text("abcdefghijkl", 5, 5, 10);
        assert_eq!(lines, vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn test_wrap_exact_fit_has_no_continuation() {
        assert_eq!(wrap_text("abcde", 5, 5, 10), vec!["abcde"]);
        assert_eq!(wrap_text("abcde fg", 5, 5, 10), vec!["abcde", "fg"]);
    }

    #[test]
    fn test_wrap_caps_line_count() {
        let text = "word ".repeat(100);
        assert_eq!(wrap_text(&text, 10, 10, 10).len(), 10);
    }

    #[test]
    fn test_empty_message_is_noop() {
        let mut history = HistoryRenderer::new(16, 36);
        let before = history.lines().to_vec();
        assert_eq!(history.append_message(Speaker::Ai, ""), 0);
        assert_eq!(history.append_message(Speaker::Ai, "   "), 0);
        assert_eq!(history.lines(), before.as_slice());
    }

    #[test]
    fn test_first_line_carries_prefix_and_rest_are_indented() {
        let mut history = HistoryRenderer::new(16, 20);
        let added = history.append_message(Speaker::Ai, "THE C64 HAS SIXTY FOUR KILOBYTES OF RAM");
        assert_eq!(added, 3);
        assert_eq!(
            texts(&history),
            vec!["* THE C64 HAS SIXTY", "  FOUR KILOBYTES OF", "  RAM"]
        );
        let first = &history.lines()[13];
        assert_eq!(first.lead_color, Some(C64Color::Yellow));
        assert_eq!(history.lines()[14].lead_color, None);
    }

    #[test]
    fn test_text_exactly_filling_width_is_one_line() {
        let mut history = HistoryRenderer::new(16, 12);
        assert_eq!(history.append_message(Speaker::User, "ABCDEFGHIJ"), 1);
        assert_eq!(texts(&history), vec!["> ABCDEFGHIJ"]);
    }

    #[test]
    fn test_long_message_is_cut_at_ten_lines() {
        let mut history = HistoryRenderer::new(16, 12);
        let added = history.append_message(Speaker::Ai, &"LOREM IPSUM ".repeat(40));
        assert_eq!(added, MAX_LINES_PER_MESSAGE);
    }

    #[test]
    fn test_appending_evicts_oldest_in_order() {
        let mut history = HistoryRenderer::new(4, 36);
        for word in ["ONE", "TWO", "THREE", "FOUR"] {
            history.append_message(Speaker::User, word);
        }
        history.append_message(Speaker::Ai, &format!("{} {}", "A".repeat(30), "B".repeat(10)));
        assert_eq!(history.lines().len(), 4);
        assert_eq!(
            texts(&history),
            vec![
                "> THREE".to_string(),
                "> FOUR".to_string(),
                format!("* {}", "A".repeat(30)),
                format!("  {}", "B".repeat(10)),
            ]
        );
    }

    #[test]
    fn test_startup_buffer_is_padded() {
        let mut history = HistoryRenderer::new(16, 36);
        assert_eq!(history.lines().len(), 16);
        history.append_message(Speaker::System, "READY.");
        assert_eq!(history.lines().len(), 16);
        assert!(history.lines()[..15].iter().all(HistoryLine::is_empty));
    }

    #[test]
    fn test_redraw_places_lines_at_fixed_rows() {
        let mut history = HistoryRenderer::for_screen();
        let mut screen = TextScreen::new();
        history.append_message(Speaker::User, "HELLO");
        history.redraw(&mut screen);

        let last_row = HISTORY_TOP_ROW + HISTORY_ROWS - 1;
        assert!(screen.row_text(last_row).starts_with("| > HELLO"));
        assert_eq!(screen.cell(last_row, HISTORY_LEFT_COLUMN).color, C64Color::LightGreen);
        assert_eq!(screen.cell(HISTORY_TOP_ROW, 0).ch, '|');
        assert_eq!(screen.row_text(HISTORY_TOP_ROW).trim_matches('|').trim(), "");
    }

    fn words() -> impl Strategy<Value = String> {
        prop::collection::vec("[A-Z]{1,12}|[A-Z]{30,50}", 1..40).prop_map(|w| w.join(" "))
    }

    proptest! {
        #[test]
        fn prop_lines_fit_and_break_at_spaces(text in words(), width in 8usize..40) {
            let mut history = HistoryRenderer::new(16, width);
            history.append_message(Speaker::Ai, &text);

            let chars: Vec<char> = text.chars().collect();
            let mut pos = 0;
            let new_lines: Vec<&HistoryLine> = history.lines().iter().filter(|l| !l.is_empty()).collect();
            for line in &new_lines {
                prop_assert!(line.visible_len() <= width);

                let segment: Vec<char> = line.text.chars().collect();
                prop_assert_eq!(&chars[pos..pos + segment.len()], segment.as_slice());
                pos += segment.len();

                if pos < chars.len() {
                    let available = width - line.lead.chars().count();
                    prop_assert!(chars[pos] == ' ' || segment.len() == available);
                }
                while pos < chars.len() && chars[pos] == ' ' {
                    pos += 1;
                }
            }
        }

        #[test]
        fn prop_buffer_keeps_capacity_and_order(counts in prop::collection::vec(1usize..6, 1..12)) {
            let mut history = HistoryRenderer::new(16, 36);
            let mut expected: Vec<String> = Vec::new();
            for (msg, count) in counts.iter().enumerate() {
                let lines: Vec<HistoryLine> = (0..*count)
                    .map(|i| HistoryLine { text: format!("{}-{}", msg, i), ..Default::default() })
                    .collect();
                expected.extend(lines.iter().map(|l| l.text.clone()));
                history.push_lines(lines);
                prop_assert_eq!(history.lines().len(), 16);
            }
            let keep = expected.len().min(16);
            let tail = &expected[expected.len() - keep..];
            let actual: Vec<String> = history.lines().iter().filter(|l| !l.is_empty()).map(|l| l.text.clone()).collect();
            prop_assert_eq!(actual.as_slice(), tail);
        }
    }
}
