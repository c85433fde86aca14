//! User-facing CLI helpers shared with the interactive daemon loop.

use std::io::{self, BufRead};
use std::path::Path;

use nexus_xlink::abi::MAX_DEVICE_NAME_SIZE;
use nexus_xlink::XlinkConfig;

use crate::{default_config, Result, ServiceError, Session};

/// Returns the CLI usage string.
pub fn help() -> &'static str {
    "xlinkd drives xlink devices. Usage: xlinkd [--config <path>] [command]\n\
     commands:\n  \
       list [pid]              list devices (pid 0 = all)\n  \
       name <sw-id> [size]     device name for a software id\n  \
       status <name>           device state\n  \
       boot <name> <firmware>  boot a device from a firmware image\n  \
       stop <name>             halt a device\n  \
       reset <name> <freq>     reset a booted device\n  \
       selftest                loopback round trip on the first device\n\
     without a command, commands are read line by line from stdin"
}

/// Executes one command against a fresh session.
pub fn execute(args: &[&str]) -> String {
    let (config, rest) = match split_config(args) {
        Ok(split) => split,
        Err(err) => return render_error(&err),
    };
    if rest.is_empty() {
        return help().to_string();
    }
    match Session::new(config) {
        Ok(session) => execute_in(&session, rest),
        Err(err) => render_error(&err),
    }
}

/// Executes one command against an existing session.
pub fn execute_in(session: &Session, args: &[&str]) -> String {
    match dispatch(session, args) {
        Ok(output) => output,
        Err(err) => render_error(&err),
    }
}

/// Parses `std::env::args`; runs one command, or a stdin command loop when none is given.
pub fn run() -> Result<()> {
    let owned: Vec<String> = std::env::args().skip(1).collect();
    let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
    let (config, rest) = split_config(&refs)?;
    if !rest.is_empty() {
        println!("{}", execute(&refs));
        return Ok(());
    }
    let session = Session::new(config)?;
    log::info!("xlinkd: ready");
    for line in io::stdin().lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            _ => println!("{}", execute_in(&session, &words)),
        }
    }
    Ok(())
}

fn dispatch(session: &Session, args: &[&str]) -> Result<String> {
    match args {
        [] | ["help"] | ["--help"] => Ok(help().to_string()),
        ["list"] => session.list(0),
        ["list", pid] => session.list(parse_u32(pid)?),
        ["name", id] => session.name(parse_u32(id)?, MAX_DEVICE_NAME_SIZE),
        ["name", id, size] => session.name(parse_u32(id)?, parse_u32(size)? as usize),
        ["status", name] => session.status(name),
        ["boot", name, firmware] => session.boot(name, Path::new(firmware)),
        ["stop", name] => session.stop(name),
        ["reset", name, freq] => session.reset(name, parse_u32(freq)?),
        ["selftest"] => session.selftest(),
        [command, ..] => Err(ServiceError::Usage(format!("unknown command `{command}` (see help)"))),
    }
}

fn split_config<'a>(args: &'a [&'a str]) -> Result<(XlinkConfig, &'a [&'a str])> {
    match args {
        ["--config", path, rest @ ..] => Ok((XlinkConfig::load(Path::new(path))?, rest)),
        ["--config"] => Err(ServiceError::Usage("--config needs a path".into())),
        rest => Ok((default_config(), rest)),
    }
}

fn parse_u32(text: &str) -> Result<u32> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| ServiceError::Usage(format!("`{text}` is not a number")))
}

fn render_error(err: &ServiceError) -> String {
    format!("error: {err} (status {})", err.status())
}
