use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use pilot_fc::mav::FcLink;
use pilot_fc::{px4, resolve_connection, run_fc_autodetect, FcConfig};
use pilot_mission::link::ConnectionGate;
use pilot_mission::{Clock, Mission, MissionConfig, StopSignal, SystemClock, Telemetry, Ticker};

#[derive(Debug, Parser)]
#[command(name = "pilot", version, about = "Offboard pilot - scripted PX4 offboard takeoff and oscillation")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the config for values the FC or the mission would choke on.
    Doctor,
    /// Wait for link, prime setpoints, go offboard and arm, climb, then oscillate until ctrl-c.
    Run,
    Fc { #[command(subcommand)] cmd: FcCmd },
}

#[derive(Debug, Subcommand)]
enum FcCmd {
    /// Probe serial ports/bauds for MAVLink heartbeats.
    Autodetect,
    /// Wait for the FC link, then print vehicle state and altitude.
    Status,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct Config {
    fc: FcConfig,
    mission: MissionConfig,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    let stop = StopSignal::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c: stopping at next tick");
                stop.stop();
            }
        });
    }

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg, stop).await?,
        Command::Fc { cmd } => fc_cmd(&cfg, cmd, stop).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    check_config(cfg)?;
    info!("doctor: OK");
    Ok(())
}

const MAX_TICK_HZ: f32 = 1000.0;
const MAX_RETRY_INTERVAL_S: f32 = 3600.0;

fn check_config(cfg: &Config) -> Result<()> {
    let m = &cfg.mission;
    // Range checks are written so NaN fails them too.
    anyhow::ensure!(
        m.tick_hz > 2.0 && m.tick_hz <= MAX_TICK_HZ,
        "mission.tick_hz must be above 2 Hz (or the FC rejects offboard) and at most {} Hz",
        MAX_TICK_HZ
    );
    anyhow::ensure!(
        m.retry_interval_s > 0.0 && m.retry_interval_s <= MAX_RETRY_INTERVAL_S,
        "mission.retry_interval_s must be in (0, {}] seconds",
        MAX_RETRY_INTERVAL_S
    );
    anyhow::ensure!(
        m.altitude_tolerance_m > 0.0 && m.altitude_tolerance_m.is_finite(),
        "mission.altitude_tolerance_m must be positive and finite"
    );
    anyhow::ensure!(m.dwell_ticks > 0, "mission.dwell_ticks must be > 0");
    anyhow::ensure!(
        px4::mode_params(&m.offboard_mode).is_some(),
        "mission.offboard_mode {:?} is not a PX4 mode",
        m.offboard_mode
    );
    if m.priming_ticks == 0 {
        warn!("doctor: mission.priming_ticks=0, the FC will likely reject the first mode switch");
    }

    let fc = &cfg.fc;
    if fc.autodetect {
        info!("doctor: fc autodetect enabled (OK)");
    } else {
        anyhow::ensure!(!fc.connection.is_empty(), "fc.connection missing");
    }
    anyhow::ensure!(fc.command_timeout_ms > 0, "fc.command_timeout_ms must be > 0");
    anyhow::ensure!(fc.link_timeout_ms >= 1000, "fc.link_timeout_ms below 1000 drops the link between heartbeats");
    Ok(())
}

async fn fc_cmd(cfg: &Config, cmd: FcCmd, stop: StopSignal) -> Result<()> {
    match cmd {
        FcCmd::Autodetect => {
            let res = run_fc_autodetect(&cfg.fc)?;
            if let Some(addr) = res.chosen {
                println!("CHOSEN: {}", addr);
            } else {
                println!("CHOSEN: none");
            }
            for p in res.probes {
                println!("probe {} hb={} {}ms note={}", p.address, p.hb_seen, p.elapsed_ms, p.note);
            }
            Ok(())
        }
        FcCmd::Status => {
            check_config(cfg)?;
            let telemetry = Telemetry::new();
            let addr = resolve_connection(&cfg.fc)?;
            let link = FcLink::open(&addr, &cfg.fc).context("FC open")?;
            let _commander = link.start(telemetry.clone(), stop.clone())?;

            let hz = cfg.mission.tick_hz;
            let vehicle = telemetry.vehicle.clone();
            let up = tokio::task::spawn_blocking(move || {
                ConnectionGate.wait_for_link(&vehicle, &mut Ticker::from_hz(hz), &stop)
            })
            .await
            .context("link wait task")?;

            if !up {
                println!("connected=false (stopped)");
                return Ok(());
            }
            let st = telemetry.vehicle.read();
            let alt = telemetry.altitude.read();
            println!("connected={}", st.connected);
            println!("armed={} mode={}", st.armed, st.mode);
            println!("clearance={:.2} at {}", alt.clearance, alt.timestamp);
            Ok(())
        }
    }
}

async fn run(cfg: &Config, stop: StopSignal) -> Result<()> {
    check_config(cfg)?;
    info!("run: starting");

    let telemetry = Telemetry::new();
    let addr = resolve_connection(&cfg.fc)?;
    let link = FcLink::open(&addr, &cfg.fc).context("FC open")?;
    let commander = link.start(telemetry.clone(), stop.clone())?;

    let mission_cfg = cfg.mission.clone();
    // Tick loop blocks on FC acks, so it lives on a blocking thread.
    tokio::task::spawn_blocking(move || {
        let clock = SystemClock;
        let mut ticker = Ticker::new(mission_cfg.tick_period());
        let mut mission = Mission::new(mission_cfg, telemetry, commander, clock.now());
        mission.run(&mut ticker, &clock, &stop);
    })
    .await
    .context("mission task")?;

    info!("run: done");
    Ok(())
}
