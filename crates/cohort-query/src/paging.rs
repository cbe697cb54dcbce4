//! Page tokens and the paged generator.
//!
//! A page token is the decimal string of an index into a stable, finite
//! sequence. A generator built over the same sequence resumes exactly at that
//! index. The token that would point at the end of the sequence is never
//! issued; the last record carries no token instead.

use crate::error::{QueryError, Result};

/// Parses an inbound token. Absent or empty tokens start at 0.
pub fn parse_token(token: Option<&str>) -> Result<usize> {
    match token.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| QueryError::BadRequest(format!("invalid page token '{raw}'"))),
    }
}

/// Token for resuming at `next`, or `None` when `next` is the end.
pub fn next_token(next: usize, len: usize) -> Option<String> {
    (next < len).then(|| next.to_string())
}

/// Yields `(record, nextPageToken)` pairs from a slice, starting at a token.
///
/// Starting past the end yields nothing.
#[derive(Debug, Clone)]
pub struct Paged<'a, T> {
    source: &'a [T],
    index: usize,
}

impl<'a, T> Paged<'a, T> {
    pub fn new(source: &'a [T], token: Option<&str>) -> Result<Self> {
        Ok(Self::starting_at(source, parse_token(token)?))
    }

    pub fn starting_at(source: &'a [T], index: usize) -> Self {
        Self { source, index }
    }

    /// Index of the next record to be yielded.
    pub fn position(&self) -> usize {
        self.index
    }
}

impl<'a, T> Iterator for Paged<'a, T> {
    type Item = (&'a T, Option<String>);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.source.get(self.index)?;
        self.index += 1;
        Some((item, next_token(self.index, self.source.len())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Paged<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tokens_point_at_next_index() {
        let rows = [10, 20, 30];
        let pairs: Vec<_> = Paged::new(&rows, None).unwrap().collect();
        assert_eq!(
            pairs,
            vec![
                (&10, Some("1".to_string())),
                (&20, Some("2".to_string())),
                (&30, None),
            ]
        );
    }

    #[test]
    fn test_resume_from_token() {
        let rows = [10, 20, 30];
        let rest: Vec<_> = Paged::new(&rows, Some("2")).unwrap().map(|(r, _)| *r).collect();
        assert_eq!(rest, vec![30]);
    }

    #[test]
    fn test_stale_token_past_end_is_empty() {
        let rows = [1, 2];
        assert_eq!(Paged::new(&rows, Some("99")).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_token_starts_at_zero() {
        assert_eq!(parse_token(Some("")).unwrap(), 0);
        assert_eq!(parse_token(None).unwrap(), 0);
        assert_eq!(parse_token(Some("-1")).unwrap_err().code(), "BadRequest");
        assert_eq!(parse_token(Some("abc")).unwrap_err().code(), "BadRequest");
    }

    proptest! {
        #[test]
        fn prop_chained_pages_cover_source_once(len in 0usize..300, page in 1usize..50) {
            let source: Vec<usize> = (0..len).collect();
            let mut seen = Vec::new();
            let mut token: Option<String> = None;
            loop {
                let mut next = None;
                for (n, (row, t)) in Paged::new(&source, token.as_deref()).unwrap().enumerate() {
                    seen.push(*row);
                    if n + 1 == page {
                        next = t;
                        break;
                    }
                }
                match next {
                    Some(t) => token = Some(t),
                    None => break,
                }
            }
            prop_assert_eq!(seen, source);
        }
    }
}
