//! Live channel inspector.
//!
//! Opens a channel file read-only and redraws its counters once per
//! second until interrupted. Exits 0 on interrupt, 1 when the file
//! cannot be opened.

use clap::Parser;
use mmchan::ReadonlyChannel;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chan-inspect", about = "Render live counters of a channel file")]
struct Args {
    /// Path to the channel file
    path: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let ch = match ReadonlyChannel::open(&args.path) {
        Ok(ch) => ch,
        Err(err) => {
            eprintln!("chan-inspect: {}: {err}", args.path.display());
            return ExitCode::FAILURE;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(err) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            eprintln!("chan-inspect: failed to install signal handler: {err}");
            return ExitCode::FAILURE;
        }
    }

    let mut first = true;
    while running.load(Ordering::SeqCst) {
        if !first {
            // Move the cursor back over the previous frame
            print!("\x1b[6A");
        }
        first = false;

        println!("Capacity:     {:<20}", ch.capacity());
        println!("Item size:    {:<20}", ch.item_size());
        println!("Start index:  {:<20}", ch.start_index());
        println!("Length:       {:<20}", ch.len());
        println!("Unread:       {:<20}", ch.unread());
        println!("Awaiting ack: {:<20}", ch.awaiting_ack());

        thread::sleep(Duration::from_secs(1));
    }

    ExitCode::SUCCESS
}
