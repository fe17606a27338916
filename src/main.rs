//! Main entry point for the rad CLI application.
//!
//! Opens a file through the selected backend and prints a byte range of it,
//! either raw, as a hex dump, or just its size.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

use rad::cli::Backend;
use rad::{Cli, RandomAccessData};

/// Bytes per hex dump line.
const HEX_WIDTH: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let started = Instant::now();
    let data = open(&cli).with_context(|| format!("cannot open {}", cli.file))?;
    log::debug!("opened {:?} through {:?}", cli.file, cli.backend);

    let result = process(&data, &cli).await;
    data.close()?;
    let written = result?;

    if !cli.is_quiet() && !cli.stat {
        eprintln!(
            "\n{} in {:.2?} via {:?} backend",
            format_size(written),
            started.elapsed(),
            cli.backend
        );
    }
    Ok(())
}

/// Create the data source for the requested backend and range.
fn open(cli: &Cli) -> rad::Result<RandomAccessData> {
    let (offset, length) = (cli.offset, cli.length);
    match cli.backend {
        Backend::Array => rad::from_bytes(std::fs::read(&cli.file)?, offset, length),
        Backend::Mmap => rad::from_mmap(std::fs::File::open(&cli.file)?, offset, length),
        Backend::File => rad::open_file(&cli.file, offset, length),
        Backend::Seekable => rad::open_seekable(&cli.file, offset, length),
        Backend::AsyncFile => rad::open_async_file(&cli.file, offset, length),
        Backend::Stream => rad::open_stream_factory(&cli.file, offset, length, cli.pool_size),
    }
}

/// Write the selected range to stdout and return the number of bytes covered.
async fn process(data: &RandomAccessData, cli: &Cli) -> Result<u64> {
    if cli.stat {
        println!("{}", data.size());
        return Ok(data.size());
    }

    let mut stdout = tokio::io::stdout();
    if !cli.hex {
        return Ok(data.transfer_to_async(&mut stdout, cli.buffer_size).await?);
    }

    let chunk = cli.buffer_size.max(HEX_WIDTH) / HEX_WIDTH * HEX_WIDTH;
    let mut position = 0u64;
    while position < data.size() {
        let bytes = data.read_from_async(position, chunk).await?;
        let mut out = String::new();
        for (i, line) in bytes.chunks(HEX_WIDTH).enumerate() {
            out.push_str(&hex_line(cli.offset + position + (i * HEX_WIDTH) as u64, line));
        }
        stdout.write_all(out.as_bytes()).await?;
        position += bytes.len() as u64;
    }
    stdout.flush().await?;
    Ok(position)
}

/// Format one hex dump line: address, hex bytes and printable characters.
fn hex_line(address: u64, bytes: &[u8]) -> String {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let text: String = bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();
    format!("{address:08x}  {:<width$}  |{text}|\n", hex.join(" "), width = HEX_WIDTH * 3 - 1)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_line_pads_short_lines() {
        let line = hex_line(0x20, b"AB\x00");
        assert_eq!(line, format!("00000020  41 42 00{}  |AB.|\n", " ".repeat(39)));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }
}
