use clap::{Parser, ValueEnum};

use crate::io::DEFAULT_MAX_POOL_SIZE;

#[derive(Parser, Debug)]
#[command(name = "rad")]
#[command(version)]
#[command(about = "Read byte ranges of a file through a random-access backend", long_about = None)]
#[command(after_help = "Examples:\n  \
  rad data.bin -o 128 -n 64 -x          hex dump 64 bytes starting at 128\n  \
  rad data.bin -b stream -s             show size through the stream pool\n  \
  rad data.bin -b mmap -o 4096 > tail   copy everything after 4096 to a file")]
pub struct Cli {
    /// File to read
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Backend used to access the file
    #[arg(short = 'b', long, value_enum, default_value_t = Backend::File)]
    pub backend: Backend,

    /// Start of the range
    #[arg(short = 'o', long, default_value_t = 0)]
    pub offset: u64,

    /// Length of the range (default: to the end)
    #[arg(short = 'n', long)]
    pub length: Option<u64>,

    /// Maximum number of pooled streams for the stream backend
    #[arg(long, default_value_t = DEFAULT_MAX_POOL_SIZE)]
    pub pool_size: usize,

    /// Transfer buffer size in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    pub buffer_size: usize,

    /// Print a hex dump instead of raw bytes
    #[arg(short = 'x', long)]
    pub hex: bool,

    /// Only print the size of the range
    #[arg(short = 's', long)]
    pub stat: bool,

    /// Quiet mode, no messages on stderr
    #[arg(short = 'q')]
    pub quiet: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Whole file loaded into memory
    Array,
    /// Memory-mapped file
    Mmap,
    /// Positional reads on a file handle
    File,
    /// Seek-then-read on a single cursor
    Seekable,
    /// Positional reads on tokio's blocking pool
    AsyncFile,
    /// Pool of sequential streams
    Stream,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
