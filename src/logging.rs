use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::sync::Mutex;
use std::time::Instant;

/// Time of the previous log line, for the delta column
static LAST_LOG: Mutex<Option<Instant>> = Mutex::new(None);

fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialize the logger with delta timestamps; `RUST_LOG` overrides the level.
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let mut builder = Builder::new();
    builder
        .target(Target::Stderr)
        .format(|buf, record| {
            use std::io::Write;

            let now = Instant::now();
            let delta = {
                let mut last = match LAST_LOG.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let delta = last.map(|t| now.duration_since(t).as_millis()).unwrap_or(0);
                *last = Some(now);
                delta
            };

            writeln!(
                buf,
                "{} [+{} ms] [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                delta,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter_level(default_level())
        .parse_env(Env::default().filter("RUST_LOG"));

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
