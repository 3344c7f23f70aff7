use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

static INITIALIZED: OnceLock<()> = OnceLock::new();

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "Tibia - headless client";

/// Installs the global subscriber: `RUST_LOG` (or `level`) filtered console
/// output, plus `log/game.log` and `log/error.log` under `root` when given.
/// Later calls are no-ops.
pub fn init(level: &str, root: Option<&Path>) -> Result<(), String> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|err| format!("invalid log filter '{level}': {err}"))?;
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (game_layer, error_layer) = match root {
        Some(root) => {
            let log_dir = root.join("log");
            std::fs::create_dir_all(&log_dir)
                .map_err(|err| format!("log directory create failed: {err}"))?;
            let game = open_log_file(&log_dir, "game.log")?;
            let error = open_log_file(&log_dir, "error.log")?;
            (
                Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(game))),
                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(error))
                        .with_filter(LevelFilter::ERROR),
                ),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(game_layer)
        .with(error_layer)
        .try_init()
        .map_err(|err| format!("log system init failed: {err}"))?;
    let _ = INITIALIZED.set(());
    Ok(())
}

/// Opens `name` for appending; a new file starts with the banner.
fn open_log_file(dir: &Path, name: &str) -> Result<File, String> {
    let path = dir.join(name);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("open log {name} failed: {err}"))?;
    if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
        write_header(&mut file, name).map_err(|err| format!("header write failed: {err}"))?;
    }
    Ok(file)
}

fn write_header(file: &mut File, name: &str) -> std::io::Result<()> {
    writeln!(file, "{HEADER_LINE}")?;
    writeln!(file, "{HEADER_TITLE}")?;
    writeln!(file, "{name} - started {}", format_utc(unix_timestamp()))
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `dd.mm.yyyy hh:mm:ss` in UTC.
fn format_utc(ts: i64) -> String {
    let secs = ts.max(0);
    let days = secs / 86_400;
    let seconds_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{day:02}.{month:02}.{year} {:02}:{:02}:{:02}",
        seconds_of_day / 3_600,
        (seconds_of_day % 3_600) / 60,
        seconds_of_day % 60
    )
}

fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_formatting() {
        assert_eq!(format_utc(0), "01.01.1970 00:00:00");
        assert_eq!(format_utc(951_782_400), "29.02.2000 00:00:00");
        assert_eq!(format_utc(1_700_000_000), "14.11.2023 22:13:20");
        assert_eq!(format_utc(-5), "01.01.1970 00:00:00");
    }

    #[test]
    fn banner_written_once() {
        let dir = std::env::temp_dir().join(format!("tibia-client-log-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        let path = dir.join("game.log");
        let _ = std::fs::remove_file(&path);

        drop(open_log_file(&dir, "game.log").expect("open"));
        let mut file = open_log_file(&dir, "game.log").expect("reopen");
        writeln!(file, "line").expect("write");
        drop(file);

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.matches(HEADER_TITLE).count(), 1);
        assert!(text.lines().nth(2).map(|line| line.starts_with("game.log - started ")).unwrap_or(false));
        assert!(text.ends_with("line\n"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
