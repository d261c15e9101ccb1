//! hOCR to DjVu text zones.
//!
//! Only the structure needed for a hidden text layer is read: pages, lines
//! (including captions, headers and floating text), and words. Everything
//! else in the markup is ignored.

use std::io::Read;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{BBox, ExtractOptions, ExtractionError, TextExtractor, TextZone, ZoneKind};
use crate::djvu::Rotation;

const PAGE_SELECTOR: &str = ".ocr_page";
const LINE_SELECTOR: &str = ".ocr_line, .ocr_caption, .ocr_header, .ocr_textfloat";
const WORD_SELECTOR: &str = ".ocrx_word";

/// Extracts text zones from hOCR markup.
#[derive(Debug, Clone, Copy, Default)]
pub struct HocrExtractor;

impl HocrExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector(format!("{}: {}", css, e)))
}

impl TextExtractor for HocrExtractor {
    fn extract(
        &self,
        markup: &mut dyn Read,
        options: &ExtractOptions,
    ) -> Result<Vec<TextZone>, ExtractionError> {
        let mut raw = Vec::new();
        markup.read_to_end(&mut raw)?;
        let html = Html::parse_document(&String::from_utf8_lossy(&raw));

        let page_sel = selector(PAGE_SELECTOR)?;
        let line_sel = selector(LINE_SELECTOR)?;
        let word_sel = selector(WORD_SELECTOR)?;

        html.select(&page_sel)
            .map(|page| extract_page(page, &line_sel, &word_sel, options))
            .collect()
    }
}

fn extract_page(
    page: ElementRef<'_>,
    line_sel: &Selector,
    word_sel: &Selector,
    options: &ExtractOptions,
) -> Result<TextZone, ExtractionError> {
    let title = page.value().attr("title").unwrap_or_default();
    let [_, _, width, height] = parse_bbox(title)
        .ok_or_else(|| ExtractionError::Markup("page without bbox".to_string()))?;
    let geometry = PageGeometry {
        width,
        height,
        rotation: options.rotation,
    };

    let mut lines = Vec::new();
    for line in page.select(line_sel) {
        let title = line.value().attr("title").unwrap_or_default();
        let Some(line_box) = parse_bbox(title) else {
            debug!("Skipping line without bbox");
            continue;
        };
        let bbox = geometry.to_djvu(line_box);

        if options.charboxes {
            if let Some(boxes) = title_property(title, "x_bboxes").and_then(parse_numbers) {
                let text: String = line.text().collect();
                if let Some(words) = words_from_char_boxes(&text, &boxes, &geometry) {
                    if !words.is_empty() {
                        lines.push(TextZone::with_children(ZoneKind::Line, bbox, words));
                    }
                    continue;
                }
                debug!("Character box count does not match line text, using line text");
            }
        }

        let words: Vec<TextZone> = line
            .select(word_sel)
            .filter_map(|word| {
                let text = normalize_text(word.text());
                let raw = parse_bbox(word.value().attr("title").unwrap_or_default())?;
                (!text.is_empty()).then(|| TextZone::with_text(ZoneKind::Word, geometry.to_djvu(raw), text))
            })
            .collect();

        if !words.is_empty() {
            lines.push(TextZone::with_children(ZoneKind::Line, bbox, words));
        } else {
            let text = normalize_text(line.text());
            if !text.is_empty() {
                lines.push(TextZone::with_text(ZoneKind::Line, bbox, text));
            }
        }
    }

    Ok(TextZone::with_children(
        ZoneKind::Page,
        geometry.page_box(),
        lines,
    ))
}

/// Rendered page size and the rotation to undo.
struct PageGeometry {
    width: i32,
    height: i32,
    rotation: Rotation,
}

impl PageGeometry {
    /// Convert a top-left-origin box on the rendered image to a
    /// bottom-left-origin box on the unrotated page.
    /// Out-of-range engine coordinates saturate.
    fn to_djvu(&self, [x0, y0, x1, y1]: [i32; 4]) -> BBox {
        let (ax, ay) = self.unrotate(x0, self.height.saturating_sub(y0));
        let (bx, by) = self.unrotate(x1, self.height.saturating_sub(y1));
        BBox::new(ax, ay, bx, by)
    }

    fn unrotate(&self, x: i32, y: i32) -> (i32, i32) {
        match self.rotation {
            Rotation::Deg0 => (x, y),
            Rotation::Deg90 => (y, self.width.saturating_sub(x)),
            Rotation::Deg180 => (self.width.saturating_sub(x), self.height.saturating_sub(y)),
            Rotation::Deg270 => (self.height.saturating_sub(y), x),
        }
    }

    fn page_box(&self) -> BBox {
        if self.rotation.swaps_axes() {
            BBox::new(0, 0, self.height, self.width)
        } else {
            BBox::new(0, 0, self.width, self.height)
        }
    }
}

/// Find a property in an hOCR `title` attribute, e.g. `bbox 0 0 10 10; x_wconf 93`.
fn title_property<'a>(title: &'a str, name: &str) -> Option<&'a str> {
    title.split(';').map(str::trim).find_map(|property| {
        let (key, value) = property
            .split_once(char::is_whitespace)
            .unwrap_or((property, ""));
        (key == name).then(|| value.trim())
    })
}

fn parse_numbers(value: &str) -> Option<Vec<[i32; 4]>> {
    let numbers = value
        .split_whitespace()
        .map(|n| n.parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()?;
    if numbers.is_empty() || numbers.len() % 4 != 0 {
        return None;
    }
    Some(
        numbers
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect(),
    )
}

fn parse_bbox(title: &str) -> Option<[i32; 4]> {
    match parse_numbers(title_property(title, "bbox")?)?.as_slice() {
        [bbox] => Some(*bbox),
        _ => None,
    }
}

fn normalize_text<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    pieces
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a line into words using one box per character.
/// Returns `None` when the boxes do not line up with the text.
fn words_from_char_boxes(
    text: &str,
    boxes: &[[i32; 4]],
    geometry: &PageGeometry,
) -> Option<Vec<TextZone>> {
    let chars: Vec<char> = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    if chars.len() != boxes.len() {
        return None;
    }

    let mut words = Vec::new();
    let mut current: Option<(String, BBox)> = None;
    for (c, raw) in chars.iter().zip(boxes) {
        if c.is_whitespace() {
            if let Some((word, bbox)) = current.take() {
                words.push(TextZone::with_text(ZoneKind::Word, bbox, word));
            }
            continue;
        }
        let bbox = geometry.to_djvu(*raw);
        match current.as_mut() {
            Some((word, word_box)) => {
                word.push(*c);
                *word_box = word_box.union(&bbox);
            }
            None => current = Some((c.to_string(), bbox)),
        }
    }
    if let Some((word, bbox)) = current {
        words.push(TextZone::with_text(ZoneKind::Word, bbox, word));
    }
    Some(words)
}
