//! # CLI - EddyKV interactive shell
//!
//! A REPL-style command-line interface for the EddyKV storage engine.
//! Reads commands from stdin, executes them against an open database, and
//! prints results to stdout. Works interactively and scripted (pipe
//! commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value      Insert or update a key
//! GET key            Look up a key (prints the value or "(nil)")
//! FLUSH              Flush the memtable to a segment and wait
//! MERGE              Merge the two oldest segments and wait
//! STATS              Print engine counters
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings come from environment variables:
//!
//! ```text
//! EDDY_DIR            Database directory        (default: "data")
//! EDDY_MEMTABLE_KB    Flush threshold in KiB    (default: 4096 = 4 MiB)
//! EDDY_MERGE_TRIGGER  Segment count that wakes  (default: 4, 0 = disabled)
//!                     the merge worker
//! ```

use anyhow::Result;
use engine::{Db, DbError, Options};
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let dir = env_or("EDDY_DIR", "data");
    let memtable_kb: usize = env_or("EDDY_MEMTABLE_KB", "4096").parse().unwrap_or(4096);
    let merge_trigger: usize = env_or("EDDY_MERGE_TRIGGER", "4").parse().unwrap_or(4);

    let db = Db::open(
        &dir,
        Options::new()
            .max_memtable_size(memtable_kb * 1024)
            .merge_trigger(merge_trigger),
    )?;

    println!(
        "EddyKV started (dir={}, segments={}, memtable={}KiB, merge_trigger={})",
        dir,
        db.segment_count(),
        memtable_kb,
        merge_trigger
    );
    println!("Commands: SET key value | GET key | FLUSH | MERGE | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => match parts.next() {
                    Some(key) => {
                        let value: String = parts.collect::<Vec<&str>>().join(" ");
                        if value.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match db.set(key, value.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR {}", e),
                            }
                        }
                    }
                    None => println!("ERR usage: SET key value"),
                },
                "GET" => match parts.next() {
                    Some(key) => match db.get(key) {
                        Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
                        Err(DbError::KeyNotFound) => println!("(nil)"),
                        Err(e) => println!("ERR {}", e),
                    },
                    None => println!("ERR usage: GET key"),
                },
                "FLUSH" => match db.flush() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR {}", e),
                },
                "MERGE" => match db.merge() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR {}", e),
                },
                "STATS" => {
                    println!(
                        "segments={} memtable_bytes={}",
                        db.segment_count(),
                        db.memtable_size()
                    );
                }
                "EXIT" | "QUIT" => {
                    db.close()?;
                    println!("bye");
                    return Ok(());
                }
                other => println!("ERR unknown command {:?}", other),
            }
        }
        print!("> ");
        io::stdout().flush().ok();
    }

    db.close()?;
    Ok(())
}
