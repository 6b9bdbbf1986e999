//! Bounded text lines for the character display.
//!
//! A [`DisplayLine`] owns a fixed-capacity buffer. Every `format_*` call
//! replaces the previous content, and content longer than the capacity is
//! cut at the capacity (never an error, never an overrun). Channel lines are
//! padded to a fixed field width so a shorter value fully covers a longer
//! one drawn earlier at the same position.

use crate::reading::{Channel, LABEL_ALS, LABEL_IR, LABEL_PS};
use core::fmt::{self, Write};
use heapless::String;
use static_assertions::const_assert;

/// Characters per line buffer.
pub const LINE_CAPACITY: usize = 20;

/// Width reserved for a channel value: enough for `u16::MAX`.
pub const FIELD_WIDTH: usize = 5;

/// Cells per row at the large text size.
pub const LARGE_ROW_CELLS: usize = 16;

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

const MAX_LABEL_LEN: usize = max(LABEL_IR.len(), max(LABEL_ALS.len(), LABEL_PS.len()));

/// Longest channel line: `" " label ": " value " "`.
pub const MAX_CHANNEL_LINE_LEN: usize = 1 + MAX_LABEL_LEN + 2 + FIELD_WIDTH + 1;

const_assert!(u16::MAX as usize <= 99_999);
const_assert!(MAX_CHANNEL_LINE_LEN <= LINE_CAPACITY);
const_assert!(MAX_CHANNEL_LINE_LEN <= LARGE_ROW_CELLS);

/// Appends characters while they fit and drops the rest.
struct Truncating<'a, const N: usize> {
    buf: &'a mut String<N>,
    truncated: bool,
}

impl<const N: usize> Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.buf.push(ch).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine<const N: usize = LINE_CAPACITY> {
    text: String<N>,
    column: u8,
    row: u8,
    truncated: bool,
}

impl<const N: usize> DisplayLine<N> {
    pub fn new(column: u8, row: u8) -> Self {
        Self {
            text: String::new(),
            column,
            row,
            truncated: false,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn column(&self) -> u8 {
        self.column
    }

    pub fn row(&self) -> u8 {
        self.row
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the last format dropped characters.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Replace the content with `args`, cut at the capacity.
    pub fn format(&mut self, args: fmt::Arguments<'_>) -> &str {
        self.text.clear();
        let mut out = Truncating {
            buf: &mut self.text,
            truncated: false,
        };
        // `Truncating` never reports an error, only user `Display` impls can.
        let _ = out.write_fmt(args);
        self.truncated = out.truncated;
        &self.text
    }

    /// `" {label}: {value:<5} "`, left justified and space padded.
    pub fn format_value(&mut self, label: &str, value: u32) -> &str {
        self.format(format_args!(" {}: {:<width$} ", label, value, width = FIELD_WIDTH))
    }

    pub fn format_channel(&mut self, channel: Channel, value: u16) -> &str {
        self.format_value(channel.label(), u32::from(value))
    }

    pub fn set_text(&mut self, text: &str) -> &str {
        self.format(format_args!("{text}"))
    }
}

impl<const N: usize> fmt::Display for DisplayLine<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
