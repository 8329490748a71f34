//! Command line parsing.

use std::num::NonZeroU32;

use trixel_client::Coordinate;

/// A station command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Write a fresh configuration file.
    Init {
        location: Coordinate,
        k: NonZeroU32,
        discovery_host: String,
        use_tls: bool,
    },
    /// Start the client and keep it running until interrupted.
    Run,
    SetLocation(Coordinate),
    SetK(NonZeroU32),
    /// Delete the station at its authority.
    Delete,
    /// Print the stored configuration.
    Show,
}

pub fn print_usage() {
    eprintln!("trixel-station - Privacy preserving measurement station");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  trixel-station init <lat> <lon> <k> <discovery-host> [--no-tls]");
    eprintln!("                                        Write a new configuration");
    eprintln!("  trixel-station run                    Register or resync, then keep running");
    eprintln!("  trixel-station set-location <lat> <lon>");
    eprintln!("                                        Move the station");
    eprintln!("  trixel-station set-k <k>              Change the anonymity requirement");
    eprintln!("  trixel-station delete                 Remove the station from its authority");
    eprintln!("  trixel-station show                   Print the configuration");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TRIXEL_STATION_CONFIG  Configuration file (default: ./station.json)");
    eprintln!("  RUST_LOG               Log filter (default: trixel_station=info,trixel_client=info)");
}

fn arg<'a>(args: &'a [String], index: usize, command: &str, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("{command} requires a {name} argument"))
}

fn parse_location(lat: &str, lon: &str) -> Result<Coordinate, String> {
    let latitude: f64 = lat
        .parse()
        .map_err(|_| format!("invalid latitude: {lat}"))?;
    let longitude: f64 = lon
        .parse()
        .map_err(|_| format!("invalid longitude: {lon}"))?;
    Coordinate::new(latitude, longitude).map_err(|e| e.to_string())
}

fn parse_k(value: &str) -> Result<NonZeroU32, String> {
    value
        .parse()
        .map_err(|_| format!("k must be a positive integer, got {value}"))
}

/// Parse `args` as passed to the binary, program name included.
pub fn parse(args: &[String]) -> Result<Command, String> {
    let Some(command) = args.get(1) else {
        return Err("missing command".into());
    };

    match command.as_str() {
        "init" => {
            let location = parse_location(
                arg(args, 2, "init", "latitude")?,
                arg(args, 3, "init", "longitude")?,
            )?;
            let k = parse_k(arg(args, 4, "init", "k")?)?;
            let discovery_host = arg(args, 5, "init", "discovery host")?.to_string();
            let use_tls = match args.get(6).map(String::as_str) {
                None => true,
                Some("--no-tls") => false,
                Some(other) => return Err(format!("unexpected argument: {other}")),
            };
            Ok(Command::Init {
                location,
                k,
                discovery_host,
                use_tls,
            })
        }
        "run" => Ok(Command::Run),
        "set-location" => Ok(Command::SetLocation(parse_location(
            arg(args, 2, "set-location", "latitude")?,
            arg(args, 3, "set-location", "longitude")?,
        )?)),
        "set-k" => Ok(Command::SetK(parse_k(arg(args, 2, "set-k", "k")?)?)),
        "delete" => Ok(Command::Delete),
        "show" => Ok(Command::Show),
        other => Err(format!("unknown command: {other}")),
    }
}
