//! `araliya-ctl` — thin management CLI for the daemon.
//!
//! Reads the daemon's pid file and sends it a signal; carries no core
//! logic of its own (no config parsing, no IPC protocol). Mirrors the
//! `start|stop|status` surface of `cli.py` in the original implementation,
//! not its socket transport.
//!
//! ```text
//! araliya-ctl [--pid-file <path>] <status|stop|restart>
//! ```

use std::path::PathBuf;
use std::process;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

fn main() {
    let mut pid_file_override = None;
    let mut command = None;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--pid-file" | "-p" => pid_file_override = args.next(),
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            other if command.is_none() => command = Some(other.to_string()),
            other => {
                eprintln!("error: unexpected argument '{other}'");
                process::exit(1);
            }
        }
    }

    let Some(command) = command else {
        eprintln!("error: no command given");
        print_help();
        process::exit(1);
    };

    let pid_file = resolve_pid_file(pid_file_override);

    let result = match command.as_str() {
        "status" => status(&pid_file),
        "stop" => send_signal(&pid_file, Signal::SIGTERM),
        "restart" => send_signal(&pid_file, Signal::SIGHUP),
        other => Err(format!("unknown command: {other}")),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn print_help() {
    eprintln!("usage: araliya-ctl [--pid-file <path>] <status|stop|restart>");
}

fn resolve_pid_file(override_path: Option<String>) -> PathBuf {
    if let Some(p) = override_path {
        return PathBuf::from(p);
    }
    if let Ok(dir) = std::env::var("ARALIYA_DATA_DIR") {
        return PathBuf::from(dir).join("araliya.pid");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".araliya").join("araliya.pid")
}

fn read_pid(pid_file: &PathBuf) -> Result<i32, String> {
    let content = std::fs::read_to_string(pid_file)
        .map_err(|e| format!("cannot read {}: {e}\n  is the daemon running?", pid_file.display()))?;
    content.trim().parse::<i32>().map_err(|e| format!("invalid pid in {}: {e}", pid_file.display()))
}

fn status(pid_file: &PathBuf) -> Result<(), String> {
    let pid = read_pid(pid_file)?;
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) => println!("ok  running, pid {pid}"),
        Err(_) => println!("stopped  (stale pid file: {})", pid_file.display()),
    }
    Ok(())
}

fn send_signal(pid_file: &PathBuf, sig: Signal) -> Result<(), String> {
    let pid = read_pid(pid_file)?;
    signal::kill(Pid::from_raw(pid), sig).map_err(|e| format!("failed to signal pid {pid}: {e}"))?;
    println!("ok  sent {sig} to pid {pid}");
    Ok(())
}
