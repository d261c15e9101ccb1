//! DjVuLibre command-line backend.
//!
//! Uses `djvused` to enumerate pages and read their size and rotation,
//! `ddjvu` to render masks, and `djvm`/`djvmcvt` to write bundled and
//! indirect copies.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{Bitmap, CodecError, Document, DocumentCodec, PageInfo, PageJob, Rotation};
use crate::config::ToolPaths;
use crate::ipc::{self, ProcessError};

/// Name of the bundled intermediate used when writing indirect documents.
const INDIRECT_BUNDLE_NAME: &str = "indirect-source.djvu";

/// Codec backed by the DjVuLibre tools.
#[derive(Debug, Clone)]
pub struct DjVuLibre {
    tools: ToolPaths,
}

impl DjVuLibre {
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }
}

impl DocumentCodec for DjVuLibre {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, CodecError> {
        let document = DjVuLibreDocument::open(path, self.tools.clone())?;
        Ok(Box::new(document))
    }
}

/// A document opened through `djvused`.
#[derive(Debug)]
pub struct DjVuLibreDocument {
    path: PathBuf,
    tools: ToolPaths,
    pages: Vec<PageInfo>,
    sizes: Vec<PageSize>,
}

/// Unrotated page size and rotation as reported by `djvused size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageSize {
    width: u32,
    height: u32,
    rotation: Rotation,
}

impl DjVuLibreDocument {
    pub fn open(path: &Path, tools: ToolPaths) -> Result<Self, CodecError> {
        let listing = djvused_query(&tools, path, "ls")?;
        let ids = parse_listing(&listing);
        if ids.is_empty() {
            return Err(CodecError::Decode {
                path: path.to_path_buf(),
                message: "document has no pages".to_string(),
            });
        }

        let mut script = String::new();
        for n in 1..=ids.len() {
            let _ = write!(script, "select {}; size; ", n);
        }
        let sizes = parse_sizes(&djvused_query(&tools, path, &script)?).map_err(|message| {
            CodecError::Decode {
                path: path.to_path_buf(),
                message,
            }
        })?;
        if sizes.len() != ids.len() {
            return Err(CodecError::Decode {
                path: path.to_path_buf(),
                message: format!("{} pages listed but {} sizes reported", ids.len(), sizes.len()),
            });
        }

        let pages = ids
            .into_iter()
            .zip(&sizes)
            .enumerate()
            .map(|(index, (file_id, size))| PageInfo {
                index,
                file_id,
                rotation: size.rotation,
            })
            .collect();

        debug!("Opened {} ({} pages)", path.display(), sizes.len());
        Ok(Self {
            path: path.to_path_buf(),
            tools,
            pages,
            sizes,
        })
    }

    /// Bundle the document to `dest` and drop pages not listed in `keep`.
    fn bundle_to(&self, dest: &Path, keep: Option<&[usize]>) -> Result<(), CodecError> {
        let mut cmd = ipc::command(&self.tools.djvmcvt)?;
        cmd.arg("-b").arg(&self.path).arg(dest);
        ipc::run_checked(cmd)?;

        for n in pages_to_delete(self.pages.len(), keep) {
            let mut cmd = ipc::command(&self.tools.djvm)?;
            cmd.arg("-d").arg(dest).arg((n + 1).to_string());
            ipc::run_checked(cmd)?;
        }
        Ok(())
    }
}

impl Document for DjVuLibreDocument {
    fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    fn decode(&self, page: &PageInfo) -> Result<PageJob, CodecError> {
        let size = self.sizes.get(page.index).ok_or_else(|| CodecError::Decode {
            path: self.path.clone(),
            message: format!("no page with index {}", page.index),
        })?;
        let (width, height) = if size.rotation.swaps_axes() {
            (size.height, size.width)
        } else {
            (size.width, size.height)
        };
        Ok(PageJob {
            index: page.index,
            width,
            height,
            rotation: size.rotation,
        })
    }

    fn render_mask(&self, job: &PageJob) -> Result<Bitmap, CodecError> {
        let mut cmd = ipc::command(&self.tools.ddjvu)?;
        cmd.arg("-format=pbm")
            .arg("-mode=mask")
            .arg(format!("-page={}", job.index + 1))
            .arg(format!("-size={}x{}", job.width, job.height))
            .arg(&self.path);

        let output = match ipc::run_checked(cmd) {
            Ok(output) => output,
            Err(ProcessError::Failed { stderr, .. }) if is_unavailable_message(&stderr) => {
                return Err(CodecError::NotAvailable);
            }
            Err(e) => return Err(e.into()),
        };
        if output.stdout.is_empty() {
            return Err(CodecError::NotAvailable);
        }
        let bitmap = parse_pbm(&output.stdout)?;
        if bitmap.width() != job.width || bitmap.height() != job.height {
            warn!(
                "Page {} rendered at {}x{}, expected {}x{}",
                job.index + 1,
                bitmap.width(),
                bitmap.height(),
                job.width,
                job.height
            );
        }
        Ok(bitmap)
    }

    fn save_bundled(&self, dest: &Path, keep: Option<&[usize]>) -> Result<(), CodecError> {
        self.bundle_to(dest, keep)
    }

    fn save_indirect(
        &self,
        index: &Path,
        keep: Option<&[usize]>,
        scratch: &Path,
    ) -> Result<(), CodecError> {
        let bundle = scratch.join(INDIRECT_BUNDLE_NAME);
        self.bundle_to(&bundle, keep)?;

        let directory = index
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = index.file_name().ok_or_else(|| CodecError::Decode {
            path: index.to_path_buf(),
            message: "indirect index path has no file name".to_string(),
        })?;
        fs::create_dir_all(directory)?;

        let mut cmd = ipc::command(&self.tools.djvmcvt)?;
        cmd.arg("-i").arg(&bundle).arg(directory).arg(name);
        ipc::run_checked(cmd)?;
        fs::remove_file(&bundle)?;
        Ok(())
    }
}

fn djvused_query(tools: &ToolPaths, path: &Path, script: &str) -> Result<String, CodecError> {
    let mut cmd = ipc::command(&tools.djvused)?;
    cmd.arg(path).arg("-e").arg(script);
    let output = ipc::run_checked(cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `djvused ls` output into page component ids, in page order.
///
/// Page rows look like `   3 P    12345 p0003.djvu`, optionally followed by
/// ` T=<title>`; rows for shared dictionaries and thumbnails have no leading
/// page number. The id is everything after the size column, whitespace
/// included, so that a hostile id reaches `validate_file_id` intact.
fn parse_listing(listing: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for line in listing.lines() {
        let Some((number, rest)) = next_field(line) else {
            continue;
        };
        let Ok(number) = number.parse::<usize>() else {
            continue;
        };
        let Some(("P", rest)) = next_field(rest) else {
            continue;
        };
        let id = match next_field(rest) {
            Some((_size, rest)) => strip_title(rest.trim_start()),
            None => "",
        };
        if id.is_empty() {
            ids.push(number.to_string());
        } else {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Split off the first whitespace-delimited field.
fn next_field(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    Some(text.split_once(char::is_whitespace).unwrap_or((text, "")))
}

fn strip_title(id: &str) -> &str {
    match id.rsplit_once(" T=") {
        Some((id, _title)) => id,
        None => id,
    }
}

/// Parse one `width=W height=H [rotate=R]` line per page.
fn parse_sizes(output: &str) -> Result<Vec<PageSize>, String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_size_line)
        .collect()
}

fn parse_size_line(line: &str) -> Result<PageSize, String> {
    let mut width = None;
    let mut height = None;
    let mut rotation = Rotation::Deg0;
    for field in line.split_whitespace() {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse().ok(),
            "height" => height = value.parse().ok(),
            "rotate" => {
                rotation = value
                    .parse()
                    .ok()
                    .and_then(Rotation::from_degrees)
                    .ok_or_else(|| format!("unsupported rotation {:?}", value))?;
            }
            _ => {}
        }
    }
    match (width, height) {
        (Some(width), Some(height)) => Ok(PageSize {
            width,
            height,
            rotation,
        }),
        _ => Err(format!("unexpected size line {:?}", line)),
    }
}

/// 0-based pages to delete, highest first so earlier numbers stay valid.
fn pages_to_delete(page_count: usize, keep: Option<&[usize]>) -> Vec<usize> {
    let Some(keep) = keep else {
        return Vec::new();
    };
    let keep: HashSet<usize> = keep.iter().copied().collect();
    (0..page_count).rev().filter(|n| !keep.contains(n)).collect()
}

fn is_unavailable_message(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("cannot render") || stderr.contains("not available")
}

/// Split a binary PBM (`P4`) image into its dimensions and packed samples.
fn parse_pbm(data: &[u8]) -> Result<Bitmap, CodecError> {
    let mut pos = 0;
    let mut fields = Vec::with_capacity(3);
    while fields.len() < 3 {
        while pos < data.len() && data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < data.len() && data[pos] == b'#' {
            while pos < data.len() && data[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        let start = pos;
        while pos < data.len() && !data[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if start == pos {
            return Err(CodecError::Bitmap("truncated PBM header".to_string()));
        }
        fields.push(&data[start..pos]);
    }
    // Exactly one whitespace byte separates the header from the samples.
    pos += 1;

    if fields[0] != b"P4" {
        return Err(CodecError::Bitmap("not a binary PBM image".to_string()));
    }
    let dimension = |field: &[u8]| -> Result<u32, CodecError> {
        std::str::from_utf8(field)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CodecError::Bitmap("invalid PBM dimensions".to_string()))
    };
    let width = dimension(fields[1])?;
    let height = dimension(fields[2])?;
    let samples = data.get(pos..).unwrap_or_default().to_vec();
    Bitmap::new(width, height, samples)
}
