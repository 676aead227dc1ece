//! `fairrw` drives a [`ReentrantRwLock`] through the reentrancy and
//! mixed reader/writer scenarios and prints every queue change.

use std::fmt;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{value_t, App, Arg};
use fairrw_core::{
    EntryKind, Error, HolderId, LockConfig, QueueSnapshot, ReentrantRwLock, WaitStrategy,
};
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
struct Options {
    workers: usize,
    depth: usize,
    writer_hold: Duration,
    reader_hold: Duration,
    seed: Option<u64>,
}

#[derive(Debug)]
enum HarnessError {
    Lock(Error),
    WorkerPanicked,
    NotIdle,
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarnessError::Lock(e) => write!(f, "lock error: {e}"),
            HarnessError::WorkerPanicked => f.write_str("a worker thread panicked"),
            HarnessError::NotIdle => f.write_str("lock still held after every worker finished"),
        }
    }
}

impl From<Error> for HarnessError {
    fn from(e: Error) -> Self {
        HarnessError::Lock(e)
    }
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    let cause = snapshot.cause.map(|c| c.to_string()).unwrap_or_default();
    print!("#{} {}\n{}", snapshot.seq, cause, snapshot);
}

fn reentrant_writer(lock: &ReentrantRwLock, depth: usize) -> Result<(), Error> {
    let me = HolderId::current();
    for _ in 0..depth {
        lock.acquire_write(me)?;
    }
    for _ in 0..depth {
        lock.release_write(me)?;
    }
    Ok(())
}

fn reentrant_reader(lock: &ReentrantRwLock, depth: usize) -> Result<(), Error> {
    let me = HolderId::current();
    for _ in 0..depth {
        lock.acquire_read(me)?;
    }
    for _ in 0..depth {
        lock.release_read(me)?;
    }
    Ok(())
}

fn worker(lock: &ReentrantRwLock, kind: EntryKind, hold: Duration) -> Result<(), Error> {
    let me = HolderId::current();
    match kind {
        EntryKind::Writer => {
            lock.acquire_write(me)?;
            thread::sleep(hold);
            lock.release_write(me)
        }
        EntryKind::Reader => {
            lock.acquire_read(me)?;
            thread::sleep(hold);
            lock.release_read(me)
        }
    }
}

fn mixed(lock: &Arc<ReentrantRwLock>, opts: &Options) -> Result<(), HarnessError> {
    let mut rng = match opts.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };

    let handles: Vec<_> = (0..opts.workers)
        .map(|_| {
            let (kind, hold) = if rng.random_range(1..10) % 2 == 0 {
                (EntryKind::Writer, opts.writer_hold)
            } else {
                (EntryKind::Reader, opts.reader_hold)
            };
            let lock = Arc::clone(lock);
            thread::spawn(move || worker(&lock, kind, hold))
        })
        .collect();

    let mut result = Ok(());
    for h in handles {
        match h.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => result = Err(HarnessError::Lock(e)),
            Err(_) => result = Err(HarnessError::WorkerPanicked),
        }
    }
    result?;

    if !lock.is_idle()? {
        error!("[MIXED] lock not idle after all workers finished");
        return Err(HarnessError::NotIdle);
    }
    Ok(())
}

fn run(scenario: &str, opts: &Options) -> Result<(), HarnessError> {
    let config = LockConfig::default()
        .wait_strategy(WaitStrategy::spin_then_yield())
        .sink(Arc::new(print_snapshot));
    let lock = Arc::new(ReentrantRwLock::with_config(config));
    println!("------------------ lock created ------------------");

    if matches!(scenario, "writer" | "all") {
        println!("---------- reentrant writer ----------");
        reentrant_writer(&lock, opts.depth)?;
        println!();
    }
    if matches!(scenario, "reader" | "all") {
        println!("---------- reentrant reader ----------");
        reentrant_reader(&lock, opts.depth)?;
        println!();
    }
    if matches!(scenario, "mixed" | "all") {
        println!("---------- mixed readers and writers ----------");
        mixed(&lock, opts)?;
        println!();
    }
    Ok(())
}

fn main() -> ExitCode {
    let _ = env_logger::builder().format_timestamp(None).try_init();

    let matches = App::new("fairrw")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Exercise the reentrant FIFO-biased read-write lock")
        .arg(
            Arg::with_name("scenario")
                .index(1)
                .possible_values(&["writer", "reader", "mixed", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::with_name("workers")
                .long("workers")
                .short("w")
                .takes_value(true)
                .default_value("10")
                .help("threads spawned by the mixed scenario"),
        )
        .arg(
            Arg::with_name("depth")
                .long("depth")
                .short("d")
                .takes_value(true)
                .default_value("3")
                .help("reentrant acquisitions in the writer/reader scenarios"),
        )
        .arg(
            Arg::with_name("writer-hold-ms")
                .long("writer-hold-ms")
                .takes_value(true)
                .default_value("600"),
        )
        .arg(
            Arg::with_name("reader-hold-ms")
                .long("reader-hold-ms")
                .takes_value(true)
                .default_value("300"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .help("seed for the reader/writer draw of the mixed scenario"),
        )
        .get_matches();

    let opts = Options {
        workers: value_t!(matches, "workers", usize).unwrap_or_else(|e| e.exit()),
        depth: value_t!(matches, "depth", usize).unwrap_or_else(|e| e.exit()),
        writer_hold: Duration::from_millis(
            value_t!(matches, "writer-hold-ms", u64).unwrap_or_else(|e| e.exit()),
        ),
        reader_hold: Duration::from_millis(
            value_t!(matches, "reader-hold-ms", u64).unwrap_or_else(|e| e.exit()),
        ),
        seed: if matches.is_present("seed") {
            Some(value_t!(matches, "seed", u64).unwrap_or_else(|e| e.exit()))
        } else {
            None
        },
    };
    let scenario = matches.value_of("scenario").unwrap_or("all");
    info!("[MAIN] scenario={} {:?}", scenario, opts);

    match run(scenario, &opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[MAIN] {}", e);
            eprintln!("fairrw: {e}");
            ExitCode::FAILURE
        }
    }
}
