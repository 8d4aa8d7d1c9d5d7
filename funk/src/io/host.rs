//! Facts about the machine and moment a run happens on.

use std::process::Command;

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::debug;

/// Current local time truncated to whole seconds, the resolution of run dates.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Host name of this machine, or `unknown`.
pub fn hostname() -> String {
    if let Ok(output) = Command::new("hostname").output()
        && output.status.success()
    {
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !name.is_empty() {
            return name;
        }
    }
    match std::env::var("HOSTNAME") {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            debug!("hostname unavailable");
            "unknown".to_string()
        }
    }
}
