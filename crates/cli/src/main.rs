//! # CLI - QuillKV Interactive Shell
//!
//! A REPL-style command-line interface over a WAL-backed memtable. Reads
//! commands from stdin, executes them, and prints results to stdout. Works
//! both interactively and scripted (pipe commands via stdin). Logs go to
//! stderr and are filtered with `RUST_LOG` (default: `info`).
//!
//! ## Commands
//!
//! ```text
//! PUT key value                 Insert or update a key-value pair
//! GET key                       Look up a key (prints value or "(nil)")
//! DEL key                       Delete a key
//! SCAN [start] [end]            Range scan (inclusive start, exclusive end)
//! BATCH PUT k v | DEL k ...     Apply several writes with one WAL append
//! RESET                         Discard the WAL and all entries
//! STATS                         Print memtable debug info
//! EXIT / QUIT                   Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! ```text
//! QUILL_WAL_PATH   WAL file path           (default: "wal.log")
//! QUILL_WAL_SYNC   fsync every WAL append  (default: "true")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! QuillKV started (wal=wal.log, sync=true, entries=0, recovered=0 records, clean)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > SCAN
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::Config;
use memtable::{Memtable, RecoveryReport, RecoveryStop};
use std::io::{self, BufRead, Write};
use wal::WalRecord;

fn describe_recovery(report: &RecoveryReport) -> String {
    match &report.stop {
        RecoveryStop::Clean => "clean".to_string(),
        RecoveryStop::TornTail { offset } => format!(
            "torn tail at offset {}, {} bytes discarded",
            offset, report.bytes_discarded
        ),
        RecoveryStop::Corrupt { offset, reason } => match &report.quarantined {
            Some(side) => format!(
                "CORRUPT at offset {} ({}), {} bytes moved to {}",
                offset,
                reason,
                report.bytes_discarded,
                side.display()
            ),
            None => format!("CORRUPT at offset {} ({})", offset, reason),
        },
    }
}

/// Parses the operands of `BATCH` into WAL records.
///
/// Accepts a sequence of `PUT key value` and `DEL key` groups.
fn parse_batch<'a, I>(tokens: I) -> Result<Vec<WalRecord>, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tokens = tokens.into_iter();
    let mut records = Vec::new();
    while let Some(op) = tokens.next() {
        match op.to_uppercase().as_str() {
            "PUT" => {
                let key = tokens.next().ok_or("PUT needs a key and a value")?;
                let value = tokens.next().ok_or("PUT needs a key and a value")?;
                records.push(WalRecord::put(key.as_bytes(), value.as_bytes()));
            }
            "DEL" => {
                let key = tokens.next().ok_or("DEL needs a key")?;
                records.push(WalRecord::del(key.as_bytes()));
            }
            other => return Err(format!("unexpected token in batch: {}", other)),
        }
    }
    if records.is_empty() {
        return Err("empty batch".to_string());
    }
    Ok(records)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::from_env();
    let mut mem = Memtable::open_with(&cfg)
        .with_context(|| format!("failed to open wal {}", cfg.wal_path.display()))?;

    println!(
        "QuillKV started (wal={}, sync={}, entries={}, recovered={} records, {})",
        cfg.wal_path.display(),
        cfg.wal_sync,
        mem.len(),
        mem.recovery().records_applied,
        describe_recovery(mem.recovery())
    );
    println!("Commands: PUT key value | GET key | DEL key | SCAN [start] [end]");
    println!("          BATCH PUT k v DEL k ... | RESET | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" | "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: PUT key value");
                        } else {
                            match mem.put(k.as_bytes().to_vec(), v.into_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: PUT key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match mem.get(k.as_bytes()) {
                            Some(v) => println!("{}", String::from_utf8_lossy(v)),
                            None => println!("(nil)"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match mem.delete(k.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let start = parts.next().unwrap_or("").as_bytes();
                    let end = parts.next().map(str::as_bytes);
                    let results = mem.scan(start, end);
                    if results.is_empty() {
                        println!("(empty)");
                    } else {
                        for (k, v) in &results {
                            println!(
                                "{} -> {}",
                                String::from_utf8_lossy(k),
                                String::from_utf8_lossy(v)
                            );
                        }
                        println!("({} entries)", results.len());
                    }
                }
                "BATCH" => match parse_batch(parts) {
                    Ok(records) => {
                        let n = records.len();
                        match mem.write_batch(records) {
                            Ok(()) => println!("OK ({} records)", n),
                            Err(e) => println!("ERR batch failed: {}", e),
                        }
                    }
                    Err(msg) => println!("ERR {}", msg),
                },
                "RESET" => match mem.reset() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR reset failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", mem);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    mem.close().context("failed to close wal")?;
    Ok(())
}
