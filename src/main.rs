//! sync4d CLI - Replay captured schedule-service responses through the
//! import session and inspect the resulting timelines.
//!
//! Fixtures are JSON response documents in a directory, one file per
//! route (see [`DirTransport`]). Useful for inspecting what a schedule
//! will animate without talking to the live service.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use sync4d::prelude::*;
use sync4d::resolve::Document;
use sync4d::timeline::TimelineKey;

/// Verbosity level (thread-safe)
const LOG_QUIET: u8 = 0;
const LOG_INFO: u8 = 1;
const LOG_DEBUG: u8 = 2;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LOG_INFO);

#[inline]
fn log_level() -> u8 {
    LOG_LEVEL.load(Ordering::Relaxed)
}

#[inline]
fn set_log_level(level: u8) {
    LOG_LEVEL.store(level, Ordering::Relaxed);
}

macro_rules! info {
    ($($arg:tt)*) => {
        if log_level() >= LOG_INFO {
            println!("[INFO] {}", format!($($arg)*));
        }
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        if log_level() >= LOG_DEBUG {
            println!("[DEBUG] {}", format!($($arg)*));
        }
    };
}

/// Transport reading one JSON fixture file per route.
///
/// The route path maps to a file name by replacing every
/// non-alphanumeric character with `_`; a page token is appended the
/// same way. `/schedules/S1/tasks/T1` becomes `schedules_S1_tasks_T1.json`.
struct DirTransport {
    dir: PathBuf,
}

impl DirTransport {
    fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn fixture_path(&self, request: &Request) -> PathBuf {
        let sanitize = |s: &str| -> String {
            s.trim_matches('/')
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect()
        };
        let mut name = sanitize(&request.path);
        if let Some(token) = &request.page_token {
            name.push('_');
            name.push_str(&sanitize(token));
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl Transport for DirTransport {
    fn fetch(&self, request: &Request) -> sync4d::Result<Document> {
        let path = self.fixture_path(request);
        let text = std::fs::read_to_string(&path)
            .map_err(|_| Error::PropertyNotFound(path.display().to_string()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn main() {
    // Library-side diagnostics go through tracing; RUST_LOG controls them.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => set_log_level(LOG_DEBUG),
            "-q" | "--quiet" => set_log_level(LOG_QUIET),
            _ => filtered_args.push(arg),
        }
    }

    if filtered_args.is_empty() {
        print_usage(&args[0]);
        return;
    }

    match filtered_args[0] {
        "i" | "import" => {
            if filtered_args.len() < 4 {
                eprintln!("Usage: {} import <fixtures-dir> <itwin-id> <model-id> [changeset]", args[0]);
                std::process::exit(1);
            }
            let changeset = filtered_args.get(4).copied().unwrap_or("");
            cmd_import(filtered_args[1], filtered_args[2], filtered_args[3], changeset, false);
        }
        "t" | "timelines" => {
            if filtered_args.len() < 4 {
                eprintln!("Usage: {} timelines <fixtures-dir> <itwin-id> <model-id> [changeset]", args[0]);
                std::process::exit(1);
            }
            let changeset = filtered_args.get(4).copied().unwrap_or("");
            cmd_import(filtered_args[1], filtered_args[2], filtered_args[3], changeset, true);
        }
        "h" | "help" | "-h" | "--help" => print_usage(&args[0]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    println!(
        "sync4d {} ({}) - Replay 4D schedule fixtures",
        env!("CARGO_PKG_VERSION"),
        env!("SYNC4D_BUILD_DATE")
    );
    println!();
    println!("Usage: {} [options] <command> <fixtures-dir> <itwin-id> <model-id> [changeset]", prog);
    println!();
    println!("Commands:");
    println!("  i, import     Run a full import and print statistics");
    println!("  t, timelines  Run a full import and list the built timelines");
    println!("  h, help       Show this help");
    println!();
    println!("Options:");
    println!("  -v, --verbose  Debug output");
    println!("  -q, --quiet    Errors only");
}

fn cmd_import(dir: &str, itwin: &str, model: &str, changeset: &str, list_timelines: bool) {
    if !Path::new(dir).is_dir() {
        eprintln!("Not a directory: {}", dir);
        std::process::exit(1);
    }
    info!("Replaying fixtures from {}", dir);

    let client = Arc::new(QueuedClient::new(Arc::new(DirTransport::new(dir))));
    let session = ImportSession::new(client.clone());
    session.reset_connection(itwin, model, changeset);

    session.set_observers(
        Some(Box::new(|notice: &BindingNotice| {
            if log_level() >= LOG_DEBUG {
                println!(
                    "[DEBUG] binding resolved in {}: {:?}",
                    notice.schedule_id, notice.timeline
                );
            }
        })),
        None,
    );

    session.query_entire_schedule(
        None,
        None,
        Box::new(|ok| {
            if ok {
                println!("[INFO] import complete");
            } else {
                eprintln!("[WARN] import finished with failures");
            }
        }),
    );
    let requests = client.run_until_idle();
    debug!("{} requests replayed", requests);

    println!("{}", session.summary());

    if list_timelines {
        session.with_timelines(|timelines| {
            let mut keys: Vec<String> = timelines
                .iter()
                .map(|(key, tl)| {
                    let name = match key {
                        TimelineKey::Element(e) => format!("element {}", e),
                        TimelineKey::Group(g) => format!("group {}", g),
                    };
                    let extent = tl
                        .extent()
                        .map(|r| format!("{} .. {}", r.start, r.end))
                        .unwrap_or_else(|| "empty".to_string());
                    format!(
                        "  {name}: vis={} color={} xform={} clip={} [{extent}]",
                        tl.visibility.len(),
                        tl.color.len(),
                        tl.transform.len(),
                        tl.clipping.len()
                    )
                })
                .collect();
            keys.sort();
            println!("Timelines:");
            for line in keys {
                println!("{}", line);
            }
        });
    }
}
