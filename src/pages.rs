//! Page selection.
//!
//! Users number pages from 1; documents index them from 0. The conversion
//! happens in exactly one place, [`page_index`].

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Unable to parse page numbers: invalid token {0:?}")]
    Malformed(String),

    #[error("Page {page} does not exist (document has {count} pages)")]
    OutOfRange { page: usize, count: usize },
}

/// Which pages to process, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// Every page in document order.
    #[default]
    All,
    /// 1-based page ranges exactly as given, duplicates and order preserved.
    Pages(Vec<PageRange>),
}

/// An inclusive range of 1-based page numbers; a single page has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        PageRange { start, end }
    }

    pub fn single(page: usize) -> Self {
        PageRange::new(page, page)
    }
}

impl PageSelection {
    /// Parse a comma-separated list of pages and inclusive ranges, e.g. `1,3-5,9`.
    pub fn parse(spec: &str) -> Result<Self, SelectionError> {
        let ranges = spec
            .split(',')
            .map(|token| match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page_number(start, token)?;
                    let end = parse_page_number(end, token)?;
                    if start > end {
                        return Err(SelectionError::Malformed(token.to_string()));
                    }
                    Ok(PageRange::new(start, end))
                }
                None => parse_page_number(token, token).map(PageRange::single),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageSelection::Pages(ranges))
    }

    /// Resolve to 0-based page indices for a document with `page_count` pages.
    ///
    /// Ranges are bounds-checked before they are expanded, so the result never
    /// holds more than `page_count` entries per range.
    pub fn resolve(&self, page_count: usize) -> Result<Vec<usize>, SelectionError> {
        match self {
            PageSelection::All => Ok((0..page_count).collect()),
            PageSelection::Pages(ranges) => {
                let mut indices = Vec::new();
                for range in ranges {
                    let start = page_index(range.start, page_count)?;
                    let end = page_index(range.end, page_count)?;
                    indices.extend(start..=end);
                }
                Ok(indices)
            }
        }
    }
}

impl FromStr for PageSelection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PageSelection::parse(s)
    }
}

/// Convert a 1-based page number to a 0-based index, checking it exists.
pub fn page_index(page: usize, page_count: usize) -> Result<usize, SelectionError> {
    if page == 0 || page > page_count {
        return Err(SelectionError::OutOfRange {
            page,
            count: page_count,
        });
    }
    Ok(page - 1)
}

fn parse_page_number(text: &str, token: &str) -> Result<usize, SelectionError> {
    match text.trim().parse::<usize>() {
        Ok(page) if page > 0 => Ok(page),
        _ => Err(SelectionError::Malformed(token.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(spec: &str) -> Vec<usize> {
        let selection = PageSelection::parse(spec).unwrap();
        assert_ne!(selection, PageSelection::All);
        selection
            .resolve(100)
            .unwrap()
            .into_iter()
            .map(|index| index + 1)
            .collect()
    }

    #[test]
    fn test_parse_singles_and_ranges() {
        assert_eq!(pages("1,3-5,9"), vec![1, 3, 4, 5, 9]);
    }

    #[test]
    fn test_parse_preserves_order_and_duplicates() {
        assert_eq!(pages("2,4-6,4"), vec![2, 4, 5, 6, 4]);
        assert_eq!(pages("7,1"), vec![7, 1]);
    }

    #[test]
    fn test_parse_multiple_ranges() {
        assert_eq!(pages("1-2,4-6"), vec![1, 2, 4, 5, 6]);
        assert_eq!(pages("3-3"), vec![3]);
    }

    #[test]
    fn test_parse_tolerates_spaces() {
        assert_eq!(pages(" 1 , 2 - 3"), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        for spec in ["", "1,", "a", "1-x", "1-2-3", "-3", "0", "5-3", "1;2"] {
            assert!(
                matches!(PageSelection::parse(spec), Err(SelectionError::Malformed(_))),
                "{:?} should be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_page_index_boundaries() {
        assert_eq!(page_index(1, 3), Ok(0));
        assert_eq!(page_index(3, 3), Ok(2));
        assert_eq!(
            page_index(4, 3),
            Err(SelectionError::OutOfRange { page: 4, count: 3 })
        );
        assert!(page_index(0, 3).is_err());
    }

    #[test]
    fn test_resolve() {
        assert_eq!(PageSelection::All.resolve(3), Ok(vec![0, 1, 2]));
        assert_eq!(PageSelection::All.resolve(0), Ok(vec![]));
        let singles = |pages: &[usize]| {
            PageSelection::Pages(pages.iter().copied().map(PageRange::single).collect())
        };
        assert_eq!(singles(&[3, 1, 3]).resolve(3), Ok(vec![2, 0, 2]));
        assert!(singles(&[1, 5]).resolve(3).is_err());
        assert_eq!(singles(&[]).resolve(3), Ok(vec![]));
    }

    #[test]
    fn test_huge_range_fails_at_resolution() {
        let selection = PageSelection::parse("1-18446744073709551615").unwrap();
        assert_eq!(
            selection,
            PageSelection::Pages(vec![PageRange::new(1, usize::MAX)])
        );
        assert_eq!(
            selection.resolve(3),
            Err(SelectionError::OutOfRange {
                page: usize::MAX,
                count: 3
            })
        );

        let selection = PageSelection::parse("2,1-4000000000").unwrap();
        assert_eq!(
            selection.resolve(3),
            Err(SelectionError::OutOfRange {
                page: 4_000_000_000,
                count: 3
            })
        );
    }

    #[test]
    fn test_range_ending_on_last_page() {
        let selection = PageSelection::parse("2-3").unwrap();
        assert_eq!(selection.resolve(3), Ok(vec![1, 2]));
        assert!(selection.resolve(2).is_err());
    }

    #[test]
    fn test_from_str() {
        let selection: PageSelection = "2-3".parse().unwrap();
        assert_eq!(selection, PageSelection::Pages(vec![PageRange::new(2, 3)]));
    }
}
