/// Half-open byte range into a shared buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns the covered text, or `""` when the range does not fall on
    /// character boundaries of `text`.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::Span;

    #[test]
    fn new_never_inverts() {
        let span = Span::new(5, 2);
        assert_eq!(span.start, 5);
        assert_eq!(span.end, 5);
        assert!(span.is_empty());
    }

    #[test]
    fn slice_respects_char_boundaries() {
        let text = "héllo";
        assert_eq!(Span::new(0, 1).slice(text), "h");
        assert_eq!(Span::new(1, 2).slice(text), "");
        assert_eq!(Span::new(1, 3).slice(text), "é");
    }
}
