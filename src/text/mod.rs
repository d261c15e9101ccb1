//! Positioned text: the DjVu hidden-text zone tree and its `djvused` rendering.

mod hocr;

use std::fmt;
use std::io::{self, Read, Write};

use thiserror::Error;

use crate::djvu::Rotation;

pub use hocr::HocrExtractor;

/// Errors from turning recognition markup into text zones.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Invalid selector {0}")]
    Selector(String),

    #[error("Malformed recognition markup: {0}")]
    Markup(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// How a page's markup should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Rotation of the page the markup was recognized from.
    pub rotation: Rotation,
    /// Whether the engine emits per-character boxes worth splitting words from.
    pub charboxes: bool,
}

/// Converts recognition markup into one text zone per recognized page.
pub trait TextExtractor {
    fn extract(
        &self,
        markup: &mut dyn Read,
        options: &ExtractOptions,
    ) -> Result<Vec<TextZone>, ExtractionError>;
}

/// DjVu text zone types, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Page,
    Line,
    Word,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Page => "page",
            ZoneKind::Line => "line",
            ZoneKind::Word => "word",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounding box in DjVu coordinates (origin at the bottom left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BBox {
    /// Build a box from two corners in any order.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneContent {
    Text(String),
    Children(Vec<TextZone>),
}

/// One node of a page's hidden text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextZone {
    pub kind: ZoneKind,
    pub bbox: BBox,
    pub content: ZoneContent,
}

impl TextZone {
    pub fn with_text(kind: ZoneKind, bbox: BBox, text: impl Into<String>) -> Self {
        Self {
            kind,
            bbox,
            content: ZoneContent::Text(text.into()),
        }
    }

    pub fn with_children(kind: ZoneKind, bbox: BBox, children: Vec<TextZone>) -> Self {
        Self {
            kind,
            bbox,
            content: ZoneContent::Children(children),
        }
    }

    pub fn children(&self) -> &[TextZone] {
        match &self.content {
            ZoneContent::Children(children) => children,
            ZoneContent::Text(_) => &[],
        }
    }

    /// Plain text of the zone: words joined by spaces, lines by newlines.
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        match &self.content {
            ZoneContent::Text(text) => text.clone(),
            ZoneContent::Children(children) => {
                let separator = match self.kind {
                    ZoneKind::Word => "",
                    ZoneKind::Line => " ",
                    ZoneKind::Page => "\n",
                };
                children
                    .iter()
                    .map(TextZone::plain_text)
                    .collect::<Vec<_>>()
                    .join(separator)
            }
        }
    }

    /// Write the zone as a `djvused` `set-txt` s-expression.
    pub fn write_sexpr<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        self.write_sexpr_at(out, 0)
    }

    fn write_sexpr_at<W: Write + ?Sized>(&self, out: &mut W, depth: usize) -> io::Result<()> {
        let b = &self.bbox;
        write!(out, "({} {} {} {} {}", self.kind, b.x0, b.y0, b.x1, b.y1)?;
        match &self.content {
            ZoneContent::Text(text) => write!(out, " {}", quote(text))?,
            ZoneContent::Children(children) if children.is_empty() => write!(out, " \"\"")?,
            ZoneContent::Children(children) => {
                for child in children {
                    write!(out, "\n{:indent$}", "", indent = depth + 1)?;
                    child.write_sexpr_at(out, depth + 1)?;
                }
            }
        }
        write!(out, ")")
    }

    #[cfg(test)]
    pub fn to_sexpr(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_sexpr(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Quote a string for a `djvused` s-expression.
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                quoted.push_str(&format!("\\{:03o}", c as u32));
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> TextZone {
        TextZone::with_children(
            ZoneKind::Page,
            BBox::new(0, 0, 100, 50),
            vec![TextZone::with_children(
                ZoneKind::Line,
                BBox::new(10, 20, 90, 30),
                vec![
                    TextZone::with_text(ZoneKind::Word, BBox::new(10, 20, 40, 30), "Hello"),
                    TextZone::with_text(ZoneKind::Word, BBox::new(50, 20, 90, 30), "world"),
                ],
            )],
        )
    }

    #[test]
    fn test_sexpr_nesting() {
        assert_eq!(
            sample_page().to_sexpr(),
            "(page 0 0 100 50\n (line 10 20 90 30\n  (word 10 20 40 30 \"Hello\")\n  (word 50 20 90 30 \"world\")))"
        );
    }

    #[test]
    fn test_sexpr_empty_page() {
        let page = TextZone::with_children(ZoneKind::Page, BBox::new(0, 0, 5, 5), Vec::new());
        assert_eq!(page.to_sexpr(), "(page 0 0 5 5 \"\")");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(quote("tab\there"), "\"tab\\011here\"");
        assert_eq!(quote("żółw"), "\"żółw\"");
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(sample_page().plain_text(), "Hello world");
    }

    #[test]
    fn test_bbox_normalizes_corners() {
        let b = BBox::new(10, 40, 2, 5);
        assert_eq!(b, BBox { x0: 2, y0: 5, x1: 10, y1: 40 });
    }
}
