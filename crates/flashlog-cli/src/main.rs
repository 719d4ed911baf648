use std::fs;
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use flashlog_core::{DecodedRecord, LogFileReader, Lz4RecordCodec, MetadataTable};

#[derive(Parser)]
#[command(
    name = "flashlog-decode",
    version,
    about = "Decodes flashlog binary log files into a human readable format"
)]
struct Cli {
    /// Compressed log file produced by the flashlog runtime.
    log_file: PathBuf,

    /// Maximum number of messages to print (0 or omitted prints all).
    ///
    /// Taken as a raw string so invalid and negative counts reach the manual
    /// parser below instead of clap's own error path.
    #[arg(allow_hyphen_values = true)]
    max_messages: Option<String>,

    /// Metadata table (JSON) generated alongside the logging program.
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// Instead of decoding, list metadata entries whose format string
    /// contains this substring.
    #[arg(long)]
    search: Option<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error)
            if matches!(
                error.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            error.exit();
        }
        Err(error) => {
            // Usage problems exit 1, matching the decoder's contract rather
            // than clap's default.
            let _ = error.print();
            exit(1);
        }
    };

    let limit = match cli.max_messages.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<i64>() {
            Ok(count) if count < 0 => {
                eprintln!("# of messages to print must be positive: {raw}");
                exit(-1);
            }
            Ok(0) => None,
            Ok(count) => Some(count as usize),
            Err(_) => {
                eprintln!("Invalid # of messages to print, please enter a number: {raw}");
                exit(-1);
            }
        },
    };

    let metadata = cli.metadata.as_ref().map(|path| {
        let bytes = fs::read(path).unwrap_or_else(|error| {
            eprintln!("Unable to open metadata file {}: {error}", path.display());
            exit(1);
        });
        MetadataTable::from_json_slice(&bytes).unwrap_or_else(|error| {
            eprintln!("Unable to parse metadata file {}: {error}", path.display());
            exit(1);
        })
    });

    if let Some(needle) = cli.search.as_deref() {
        let Some(table) = metadata.as_ref() else {
            eprintln!("--search requires --metadata");
            exit(1);
        };
        print_metadata_matches(table, needle);
        return;
    }

    let data = fs::read(&cli.log_file).unwrap_or_else(|error| {
        eprintln!("Unable to open file {}: {error}", cli.log_file.display());
        exit(1);
    });

    let records = LogFileReader::new(&data)
        .decode(&Lz4RecordCodec, limit)
        .unwrap_or_else(|error| {
            eprintln!("Unable to decode {}: {error}", cli.log_file.display());
            exit(1);
        });

    for record in &records {
        print_record(record, metadata.as_ref());
    }
    println!("{} messages", records.len());
}

/// Prints the `id | filename | line | format string` listing for every
/// call site whose format string contains `needle`.
fn print_metadata_matches(table: &MetadataTable, needle: &str) {
    println!("{:>4} | {:<20} | {:<4} | format string", "id", "filename", "line");
    for (id, entry) in table.matching(needle) {
        println!(
            "{:>4} | {:<20} | {:<4} | {}",
            id, entry.file, entry.line, entry.format
        );
    }
}

fn print_record(record: &DecodedRecord, metadata: Option<&MetadataTable>) {
    let payload = String::from_utf8_lossy(&record.payload);
    match metadata.and_then(|table| table.get(record.log_id)) {
        Some(entry) => println!(
            "{}:{} | {} | {}",
            entry.file, entry.line, entry.format, payload
        ),
        None => println!(
            "id={} ts={} buf={} | {}",
            record.log_id, record.timestamp, record.buffer_id, payload
        ),
    }
}
