use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use guncon_core::memory::RamImage;
use guncon_core::recoil::rules::{Anchor, ShotEdge, TitleProbeRule};
use guncon_core::recoil::{RecoilEvent, RuleTable};
use guncon_core::settings::{self, SettingsFile};
use guncon_core::signal::{ChannelSide, NamedChannelOpener, SignalChannel};
use log::info;

#[derive(Parser)]
#[command(name = "guncon", about = "GunCon recoil channel and rule tool")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one recoil token to a channel
    Send {
        /// Channel side (a or b)
        side: ChannelSide,

        /// Token to send (gunshot, auto_on, auto_off, tripleshot, machinegun_on, machinegun_off)
        token: RecoilEvent,

        /// Directory holding the channel sockets
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Act as a recoil driver and print every line received on a channel
    #[cfg(unix)]
    Listen {
        /// Channel side (a or b)
        side: ChannelSide,

        /// Directory holding the channel sockets
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// List the built-in per-title recoil rules
    Rules,

    /// Evaluate a title's recoil probes against a RAM dump
    Probe {
        /// Disc serial, e.g. SLUS-00119
        #[arg(long)]
        title: String,

        /// Controller port (1-based)
        #[arg(long, default_value_t = 1)]
        port: u32,

        /// Raw dump of main RAM
        #[arg(long)]
        ram: PathBuf,
    },

    /// Show the settings file, optionally writing a default one first
    Config {
        /// Settings file to use instead of the per-user default
        #[arg(long)]
        path: Option<PathBuf>,

        /// Write default settings if the file does not exist
        #[arg(long)]
        init: bool,
    },
}

#[cfg(unix)]
fn opener(dir: Option<PathBuf>) -> NamedChannelOpener {
    dir.map(NamedChannelOpener::in_dir).unwrap_or_default()
}

#[cfg(not(unix))]
fn opener(_dir: Option<PathBuf>) -> NamedChannelOpener {
    NamedChannelOpener::default()
}

fn send(side: ChannelSide, token: RecoilEvent, dir: Option<PathBuf>) -> Result<(), String> {
    let mut channel = SignalChannel::new(Arc::new(opener(dir)));
    if channel.send_line(side, token.token()) {
        info!("Sent {token} to {}", side.name());
        Ok(())
    } else {
        Err(format!("nobody is listening on {}", side.name()))
    }
}

#[cfg(unix)]
fn listen(side: ChannelSide, dir: Option<PathBuf>) -> Result<(), String> {
    use std::io::{BufRead, BufReader};
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::UnixListener;

    let path = opener(dir).path(side);
    if let Ok(meta) = std::fs::symlink_metadata(&path) {
        if !meta.file_type().is_socket() {
            return Err(format!("{} exists and is not a socket", path.display()));
        }
        std::fs::remove_file(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    }

    let listener = UnixListener::bind(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    println!("Listening on {}", path.display());

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Accept failed: {e}");
                continue;
            }
        };
        info!("Sender connected to {}", side.name());

        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => println!("{} {line}", side.name()),
                Err(e) => {
                    log::debug!("Read failed: {e}");
                    break;
                }
            }
        }
        info!("Sender disconnected from {}", side.name());
    }
    Ok(())
}

fn describe(rule: &TitleProbeRule) -> String {
    let mut traits = Vec::new();
    match rule.anchor {
        Anchor::Press => {}
        Anchor::Release => traits.push("charge".to_string()),
        Anchor::Either => traits.push("tap or charge".to_string()),
    }
    if let ShotEdge::Leaves(idle) = rule.shot {
        traits.push(format!("reload from {idle:#X}"));
    }
    if rule.slow_animation {
        traits.push("slow animation".to_string());
    }
    if rule.weapon_mode.is_some() {
        traits.push("weapon mode".to_string());
    }
    if rule.fight_active.is_some() {
        traits.push("fight gate".to_string());
    }
    if let Some(side) = rule.force_side {
        traits.push(format!("forced {}", side.name()));
    }
    traits.join(", ")
}

fn list_rules() {
    for rule in RuleTable::builtin().rules() {
        let ammo: Vec<String> = rule
            .ammo
            .iter()
            .map(|p| format!("{:#010X}/{:?}", p.addr, p.width))
            .collect();
        println!(
            "{:<11} port {}  {}  ammo {}  {}",
            rule.title,
            rule.port + 1,
            rule.side().name(),
            ammo.join(" "),
            describe(rule)
        );
    }
}

fn probe(title: &str, port: u32, ram: PathBuf) -> Result<(), String> {
    if port == 0 {
        return Err("ports are numbered from 1".to_string());
    }
    let table = RuleTable::builtin();
    let Some(rule) = table.lookup(title, port - 1) else {
        return Err(format!("no recoil rule for {title} on port {port}"));
    };

    let data = std::fs::read(&ram).map_err(|e| format!("{}: {e}", ram.display()))?;
    let image = RamImage::new(data);

    println!("{} port {} -> {}", rule.title, port, rule.side().name());
    for p in rule.ammo {
        println!("  ammo  {:#010X} {:?} = {}", p.addr, p.width, p.read(&image));
    }
    if let Some(mode) = rule.weapon_mode {
        let value = mode.probe.read(&image);
        println!(
            "  mode  {:#010X} {:?} = {value} ({:?})",
            mode.probe.addr,
            mode.probe.width,
            mode.classify(value)
        );
    }
    if let Some(gate) = rule.fight_active {
        let value = gate.read(&image);
        let state = if value == 0 { "closed" } else { "open" };
        println!("  fight {:#010X} {:?} = {value} ({state})", gate.addr, gate.width);
    }
    Ok(())
}

fn config(path: Option<PathBuf>, init: bool) -> Result<(), String> {
    let path = path.unwrap_or_else(settings::default_settings_path);
    if init && !path.exists() {
        settings::save_to_file(&path, &SettingsFile::default()).map_err(|e| e.to_string())?;
        println!("Wrote default settings to {}", path.display());
    }

    let cfg = settings::load_from_file(&path);
    println!("{}", path.display());
    println!("{cfg:#?}");
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Command::Send { side, token, dir } => send(side, token, dir),
        #[cfg(unix)]
        Command::Listen { side, dir } => listen(side, dir),
        Command::Rules => {
            list_rules();
            Ok(())
        }
        Command::Probe { title, port, ram } => probe(&title, port, ram),
        Command::Config { path, init } => config(path, init),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
