//! Log setup for the CLI: `env_logger` behind the `log` facade, with
//! timestamps in the `[%Y-%m-%d %H:%M:%S]` form.

use std::io::Write;

use chrono::Local;

pub const LOG_ENV: &str = "COMPO_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Turn a user-facing log setting into an `env_logger` filter. `quiet`
/// keeps errors only; anything else is passed through as a filter spec.
pub fn filter_spec(setting: Option<&str>) -> String {
    match setting.map(str::trim) {
        None | Some("") => DEFAULT_FILTER.to_string(),
        Some(s) if s.eq_ignore_ascii_case("quiet") => "error".to_string(),
        Some(s) => s.to_string(),
    }
}

/// Install the global logger. `COMPO_LOG` wins over `configured`.
/// Calling this twice is harmless; the first logger stays.
pub fn init(configured: Option<&str>) {
    let from_env = std::env::var(LOG_ENV).ok();
    let spec = filter_spec(from_env.as_deref().or(configured));
    let _ = env_logger::Builder::new()
        .parse_filters(&spec)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
