use crate::ProtocolError;
use core::str;

/// A single letter and number from a G-code line, like `G1` or `X-1.5`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Word {
    /// Always upper case.
    pub letter: u8,
    pub value: f32,
}

impl Word {
    /// The value as a command number, e.g. 21 for `G21`. Returns `None` for negative or fractional
    /// values such as `G38.2`.
    pub fn code(&self) -> Option<u16> {
        if self.value >= 0.0 && self.value < 1000.0 && self.value == (self.value as u16) as f32 {
            Some(self.value as u16)
        } else {
            None
        }
    }

    pub fn letter_char(&self) -> char {
        self.letter as char
    }
}

/// An iterator over the words of a line.
///
/// Whitespace between or inside words is skipped, `(...)` comments are removed and `;` starts a
/// comment running to the end of the line. After the first error the iterator is exhausted.
pub struct Words<'a> {
    line: &'a [u8],
    position: usize,
}

impl<'a> Words<'a> {
    pub fn new(line: &'a [u8]) -> Self {
        Self { line, position: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.line.get(self.position).copied()
    }

    /// Move past whitespace and comments.
    fn skip_ignored(&mut self) {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => self.position += 1,
                b'(' => {
                    while let Some(byte) = self.peek() {
                        self.position += 1;
                        if byte == b')' {
                            break;
                        }
                    }
                }
                b';' => self.position = self.line.len(),
                _ => break,
            }
        }
    }

    fn skip_spaces(&mut self) {
        while let Some(b' ') | Some(b'\t') = self.peek() {
            self.position += 1;
        }
    }

    fn number(&mut self, letter: u8) -> Result<f32, ProtocolError> {
        self.skip_spaces();
        let start = self.position;
        if let Some(b'+') | Some(b'-') = self.peek() {
            self.position += 1;
        }
        let mut digits = 0;
        let mut seen_point = false;
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => digits += 1,
                b'.' if !seen_point => seen_point = true,
                _ => break,
            }
            self.position += 1;
        }
        if digits == 0 {
            return Err(ProtocolError::BadNumberFormat(letter as char));
        }

        // Only ASCII sign, digit and point bytes were accepted above.
        let text = str::from_utf8(&self.line[start..self.position])
            .map_err(|_| ProtocolError::BadNumberFormat(letter as char))?;
        let value: f32 = text
            .parse()
            .map_err(|_| ProtocolError::BadNumberFormat(letter as char))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ProtocolError::NumberOverflow)
        }
    }

    fn next_word(&mut self) -> Option<Result<Word, ProtocolError>> {
        self.skip_ignored();
        let byte = self.peek()?;
        self.position += 1;
        if !byte.is_ascii_alphabetic() {
            return Some(Err(ProtocolError::ExpectedCommandLetter(byte as char)));
        }
        let letter = byte.to_ascii_uppercase();
        Some(self.number(letter).map(|value| Word { letter, value }))
    }
}

impl Iterator for Words<'_> {
    type Item = Result<Word, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        let word = self.next_word();
        if let Some(Err(_)) = word {
            self.position = self.line.len();
        }
        word
    }
}
