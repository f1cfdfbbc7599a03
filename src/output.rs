//! Terminal formatting for search hits, listings and previews

use crate::hashdb::DatabaseStats;
use crate::search::{ListedEntry, SearchHit, SearchReport, SearchStatus, Thumbnail};
use std::io::{self, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Stdout writer honoring `color` (auto-detected when enabled)
pub fn color_stdout(color: bool) -> StandardStream {
    let choice = if color { ColorChoice::Auto } else { ColorChoice::Never };
    StandardStream::stdout(choice)
}

fn write_hash(out: &mut impl WriteColor, hash: u32) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
    write!(out, "{hash:08x}")?;
    out.reset()
}

fn write_size(out: &mut impl WriteColor, size: Option<u64>) -> io::Result<()> {
    match size {
        Some(size) => {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
            write!(out, "{size:>12}")?;
            out.reset()
        }
        None => write!(out, "{:>12}", "-"),
    }
}

fn write_name(out: &mut impl WriteColor, name: &str, folder: bool) -> io::Result<()> {
    if folder {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Blue)).set_bold(true))?;
        write!(out, "{name}/")?;
    } else {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(out, "{name}")?;
    }
    out.reset()
}

/// Print one hit as `hash  size  path`
pub fn print_hit(out: &mut impl WriteColor, hit: &SearchHit) -> io::Result<()> {
    write_hash(out, hit.hash)?;
    write!(out, " ")?;
    write_size(out, hit.size)?;
    write!(out, "  ")?;
    write_name(out, &hit.path, hit.is_folder())?;
    writeln!(out)
}

/// Print the closing line of a search. Partial result sets are flagged.
pub fn print_summary(out: &mut impl WriteColor, report: &SearchReport) -> io::Result<()> {
    let stats = &report.stats;
    let elapsed_ms = report.elapsed.as_secs_f64() * 1000.0;

    match report.status {
        SearchStatus::Complete => {
            out.set_color(ColorSpec::new().set_dimmed(true))?;
        }
        SearchStatus::TimedOut | SearchStatus::Cancelled => {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
            let reason = match &report.error {
                Some(e) => e.to_string(),
                None => format!("{:?}", report.status).to_lowercase(),
            };
            writeln!(out, "incomplete results: {reason}")?;
            out.reset()?;
            out.set_color(ColorSpec::new().set_dimmed(true))?;
        }
    }

    write!(
        out,
        "{} matched, {} evaluated in {} folders ({:.1}ms)",
        stats.matched, stats.evaluated, stats.folders_visited, elapsed_ms
    )?;
    if stats.failed > 0 {
        write!(out, ", {} unreadable", stats.failed)?;
    }
    writeln!(out)?;
    out.reset()
}

/// Print a folder listing
pub fn print_listing(entries: &[ListedEntry], color: bool) -> io::Result<()> {
    let mut out = color_stdout(color);
    for entry in entries {
        write_hash(&mut out, entry.hash)?;
        write!(out, " ")?;
        write_size(&mut out, entry.size)?;
        write!(out, "  ")?;
        write_name(&mut out, &entry.name, entry.is_folder())?;
        writeln!(out)?;
    }
    Ok(())
}

/// Print how a path resolves: one line per segment with its cumulative hash
pub fn print_resolution(chain: &[(String, u32)], size: Option<u64>, color: bool) -> io::Result<()> {
    let mut out = color_stdout(color);
    let last = chain.len().saturating_sub(1);
    for (depth, (segment, hash)) in chain.iter().enumerate() {
        write_hash(&mut out, *hash)?;
        write!(out, "  {:indent$}", "", indent = depth * 2)?;
        write_name(&mut out, segment, depth < last || size.is_none())?;
        writeln!(out)?;
    }
    if let Some(size) = size {
        writeln!(out, "size: {size} bytes")?;
    }
    Ok(())
}

/// Print a content preview
pub fn print_thumbnail(thumbnail: &Thumbnail, color: bool) -> io::Result<()> {
    let mut out = color_stdout(color);
    match thumbnail {
        Thumbnail::Text { lines } => {
            for (n, line) in lines.iter().enumerate() {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                write!(out, "{:>4}", n + 1)?;
                out.reset()?;
                writeln!(out, " {line}")?;
            }
        }
        Thumbnail::Hex { bytes, total } => {
            for (row, chunk) in bytes.chunks(16).enumerate() {
                out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
                write!(out, "{:08x}", row * 16)?;
                out.reset()?;
                for byte in chunk {
                    write!(out, " {byte:02x}")?;
                }
                writeln!(out)?;
            }
            if *total > bytes.len() as u64 {
                out.set_color(ColorSpec::new().set_dimmed(true))?;
                writeln!(out, "... {} of {total} bytes shown", bytes.len())?;
                out.reset()?;
            }
        }
    }
    Ok(())
}

/// Print hash database statistics
pub fn print_stats(path: &Path, stats: &DatabaseStats) -> io::Result<()> {
    let mut out = color_stdout(true);
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "{}", path.display())?;
    out.reset()?;
    writeln!(out, "  Records:    {}", stats.records)?;
    writeln!(out, "  Folders:    {}", stats.folders)?;
    writeln!(out, "  Files:      {}", stats.files)?;
    writeln!(out, "  Total size: {:.1} MB", stats.total_size as f64 / 1024.0 / 1024.0)?;
    writeln!(out, "  Name table: {} bytes", stats.names_bytes)?;
    Ok(())
}
