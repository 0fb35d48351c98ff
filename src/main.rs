use clap::{Parser, Subcommand};
use apack::archive::Archive;
use apack::options::WriterOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apack", version = "1.0.0", about = "The APACK container format CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack one or more files into an APACK archive
    Pack {
        #[arg(short, long)]
        output: PathBuf,
        /// Compression: zstd (default), lz4, none
        #[arg(short, long, default_value = "zstd")]
        compression: String,
        #[arg(short, long, default_value = "3")]
        level: i32,
        /// Chunk size in KiB (default 4096 = 4 MiB)
        #[arg(long, default_value = "4096")]
        chunk_size: u32,
        /// Encrypt with the given AEAD (aes-256-gcm or chacha20poly1305)
        #[arg(short, long)]
        encrypt: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Single-entry, no TOC — for non-seekable pipelines
        #[arg(long)]
        stream: bool,
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    /// Unpack an APACK archive
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// List archive contents
    List {
        input: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
    /// Read every entry end-to-end and report the first integrity failure
    /// per entry without aborting the scan
    Verify {
        input: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::Pack { output, input, compression, level, chunk_size, encrypt, password, stream, .. } => {
            let opts = WriterOptions {
                chunk_size: chunk_size * 1024,
                compression_algo: compression,
                compression_level: level,
                encryption_algo: encrypt,
                password,
                stream_mode: stream,
                random_access: !stream,
                ..WriterOptions::default()
            };
            let mut ar = Archive::create(&output, opts)?;
            for path in &input {
                let data = std::fs::read(path)?;
                let name = path.file_name().unwrap().to_string_lossy();
                ar.add_entry(&name, "", Vec::new(), &data)?;
                println!("  packed  {} ({} B)", path.display(), data.len());
            }
            ar.finalize()?;
            let size = std::fs::metadata(&output)?.len();
            println!("Created: {}  ({} B on disk)", output.display(), size);
        }

        Commands::Unpack { input, output_dir, password } => {
            let mut ar = open_archive(&input, &password)?;
            ar.extract_all(&output_dir)?;
            println!("Unpacked to: {}", output_dir.display());
        }

        Commands::List { input, password } => {
            let ar = open_archive(&input, &password)?;
            println!("Archive: {}", input.display());
            println!("{:<28} {:>12} {:>12} {:>7}  flags", "Name", "Size", "Stored", "Chunks");
            for info in ar.list() {
                let flags = format!(
                    "{}{}",
                    if info.is_compressed { "C" } else { "-" },
                    if info.is_encrypted { "E" } else { "-" },
                );
                println!(
                    "{:<28} {:>12} {:>12} {:>7}  {}",
                    info.name, info.original_size, info.stored_size, info.chunk_count, flags
                );
            }
        }

        Commands::Info { input } => {
            let ar = open_archive(&input, &None)?;
            let file_size = std::fs::metadata(&input)?.len();
            let entries = ar.list();
            let total_original: u64 = entries.iter().map(|e| e.original_size).sum();
            let total_stored: u64 = entries.iter().map(|e| e.stored_size).sum();

            println!("── APACK Archive ───────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  File size       {} B ({:.2} MiB)", file_size, file_size as f64 / 1_048_576.0);
            println!("  Entries         {}", entries.len());
            println!("  Total original  {} B", total_original);
            println!("  Total stored    {} B", total_stored);
        }

        Commands::Verify { input, password } => {
            let mut ar = open_archive(&input, &password)?;
            let results = ar.verify_all()?;
            let mut failures = 0;
            for (id, err) in &results {
                match err {
                    None => println!("  ok      entry #{id}"),
                    Some(e) => {
                        failures += 1;
                        println!("  FAILED  entry #{id}: {e}");
                    }
                }
            }
            println!("{} entries checked, {} failed", results.len(), failures);
            if failures > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn open_archive(path: &PathBuf, password: &Option<String>) -> Result<Archive, Box<dyn std::error::Error>> {
    Ok(match password {
        Some(pwd) => Archive::open_encrypted(path, pwd)?,
        None => Archive::open(path)?,
    })
}
