//! Implementation of the `cachelock inspect` command.

use crate::cli::InspectArgs;
use cachelock::error::Result;
use cachelock::locks::{LockStatus, inspect_lock};

/// Print the state of the lock file guarding a target.
pub fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let status = inspect_lock(&args.target)?;

    if args.json {
        let json = serde_json::to_string_pretty(&status).map_err(std::io::Error::from)?;
        println!("{}", json);
    } else {
        print!("{}", render(&status));
    }

    Ok(())
}

fn render(status: &LockStatus) -> String {
    let mut out = format!("Lock file:  {}\n", status.lock_file.display());
    if !status.exists {
        out.push_str("Status:     not created\n");
        return out;
    }

    let held = status.held.map_or("free", |mode| mode.as_str());
    out.push_str(&format!("Held:       {}\n", held));
    let clean = match status.clean {
        Some(true) => "yes",
        Some(false) => "no",
        None => "never written",
    };
    out.push_str(&format!("Clean:      {}\n", clean));

    if let Some(owner) = &status.owner {
        out.push_str(&format!("Owner PID:  {}\n", owner.pid));
        out.push_str(&format!("Operation:  {}\n", owner.operation));
        if let Some(port) = owner.port {
            out.push_str(&format!("Port:       {}\n", port));
        }
    }
    out
}
