//! Format-specific document loaders (TXT, PDF, DOCX, XLSX).
//!
//! Each loader turns one file into a sequence of [`SourceDocument`]s
//! tagged with the file name and, where the format supports it, a page
//! number (PDF) or worksheet name (XLSX). Loaders never panic; every
//! failure is a [`LoadError`] value so the ingestion pipeline can skip
//! the file and keep going.

use std::io::Read;
use std::path::Path;

use crate::models::{Locus, SourceDocument};

/// File extensions the ingestion pipeline accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "docx", "doc", "xlsx", "xls"];

/// Maximum worksheets to process per workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per worksheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Per-file loader error. The pipeline logs it and counts the file as
/// failed; it never aborts the run.
#[derive(Debug)]
pub enum LoadError {
    Unsupported(String),
    Io(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Unsupported(ext) => write!(f, "unsupported file type: .{}", ext),
            LoadError::Io(e) => write!(f, "read failed: {}", e),
            LoadError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            LoadError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Whether the pipeline has a loader for this (lowercase) extension.
pub fn is_supported(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension)
}

/// Load one file into source documents, dispatching on its extension.
pub fn load_file(path: &Path) -> Result<Vec<SourceDocument>, LoadError> {
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => load_txt(path, &source_name),
        "pdf" => load_pdf(path, &source_name),
        "docx" | "doc" => load_docx(path, &source_name),
        "xlsx" | "xls" => load_xlsx(path, &source_name),
        other => Err(LoadError::Unsupported(other.to_string())),
    }
}

fn load_txt(path: &Path, source_name: &str) -> Result<Vec<SourceDocument>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io(e.to_string()))?;
    Ok(vec![SourceDocument {
        text,
        source_name: source_name.to_string(),
        locus: Locus::Whole,
    }])
}

/// One SourceDocument per page; blank pages are dropped.
fn load_pdf(path: &Path, source_name: &str) -> Result<Vec<SourceDocument>, LoadError> {
    let pages =
        pdf_extract::extract_text_by_pages(path).map_err(|e| LoadError::Pdf(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| SourceDocument {
            text,
            source_name: source_name.to_string(),
            locus: Locus::Page(i as u32 + 1),
        })
        .collect())
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<std::fs::File>, LoadError> {
    let file = std::fs::File::open(path).map_err(|e| LoadError::Io(e.to_string()))?;
    zip::ZipArchive::new(file).map_err(|e| LoadError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::fs::File>,
    name: &str,
) -> Result<Vec<u8>, LoadError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| LoadError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| LoadError::Io(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(LoadError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Word documents: concatenate `w:t` text runs, with a line break at the
/// end of every paragraph.
fn load_docx(path: &Path, source_name: &str) -> Result<Vec<SourceDocument>, LoadError> {
    let mut archive = open_archive(path)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;

    let mut text = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                text.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(vec![SourceDocument {
        text,
        source_name: source_name.to_string(),
        locus: Locus::Whole,
    }])
}

/// Spreadsheets: one SourceDocument per worksheet, rows flattened to
/// `" | "`-joined cell text, one row per line.
fn load_xlsx(path: &Path, source_name: &str) -> Result<Vec<SourceDocument>, LoadError> {
    let mut archive = open_archive(path)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = read_sheet_names(&mut archive)?;
    let sheet_files = list_worksheet_files(&mut archive);

    let mut documents = Vec::new();
    for (idx, file_name) in sheet_files.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, &file_name)?;
        let text = extract_sheet_rows(&xml, &shared_strings)?;
        if text.trim().is_empty() {
            continue;
        }
        let sheet_name = sheet_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        documents.push(SourceDocument {
            text,
            source_name: source_name.to_string(),
            locus: Locus::Sheet(sheet_name),
        });
    }
    Ok(documents)
}

/// Worksheet display names from `xl/workbook.xml`, in workbook order.
fn read_sheet_names(archive: &mut zip::ZipArchive<std::fs::File>) -> Result<Vec<String>, LoadError> {
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml")?;
    let mut names = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            names.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

fn list_worksheet_files(archive: &mut zip::ZipArchive<std::fs::File>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::fs::File>,
) -> Result<Vec<String>, LoadError> {
    // A workbook with no string cells has no sharedStrings part at all.
    if !archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    strings.push(String::new());
                }
                // Rich-text entries split one string across several runs.
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if let Some(last) = strings.last_mut() {
                    last.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"si" => in_si = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Walk one worksheet's XML and emit a line per non-empty row, cells
/// joined with `" | "`. Shared-string cells are resolved through the
/// string table; other cell values are kept verbatim.
fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<String, LoadError> {
    let mut lines: Vec<String> = Vec::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared = false;
    let mut cell_count = 0usize;
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_v = true,
                b"row" => row_cells.clear(),
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if !value.is_empty() {
                    let resolved = if cell_is_shared {
                        value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i).cloned())
                    } else {
                        Some(value.to_string())
                    };
                    if let Some(v) = resolved {
                        row_cells.push(v);
                        cell_count += 1;
                    }
                }
                in_v = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"c" => cell_is_shared = false,
                b"row" => {
                    if !row_cells.is_empty() {
                        lines.push(row_cells.join(" | "));
                        row_cells.clear();
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(LoadError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row_cells.is_empty() {
        lines.push(row_cells.join(" | "));
    }
    Ok(lines.join("\n"))
}
