// DeskDup command line front end
//
// `deskdup list` prints the attached displays, `deskdup capture` pulls frames from one of
// them through a capture session and reports the session statistics as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};

use deskdup_capture::{
    get_available_displays, CaptureError, CaptureOutcome, CaptureSession, CapturedFrame,
    GraphicsBackend, SessionStats,
};

mod app_bootstrap;
mod logging;
mod settings;
mod settings_io;

use settings::Settings;

/// Attempts allowed per requested frame before giving up on an idle desktop
const ATTEMPTS_PER_FRAME: u64 = 50;
const REINIT_RETRIES: u32 = 5;
const REINIT_BACKOFF: Duration = Duration::from_millis(200);

fn cli() -> Command {
    Command::new("deskdup")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List displays available for duplication"))
        .subcommand(
            Command::new("capture")
                .about("Capture frames from one display")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("INDEX")
                        .help("Output index on the primary adapter (defaults to settings)")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("frames")
                        .short('n')
                        .long("frames")
                        .value_name("COUNT")
                        .help("Number of frames to capture")
                        .value_parser(value_parser!(u64).range(1..))
                        .default_value("10"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .short('t')
                        .long("timeout-ms")
                        .value_name("MS")
                        .help("Wait per capture attempt (defaults to settings)")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("save")
                        .long("save")
                        .value_name("DIR")
                        .help("Write each frame as packed BGRA to DIR")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

/// What `capture` should do, resolved from arguments and settings
#[derive(Debug, Clone)]
struct CapturePlan {
    output_index: u32,
    frames: u64,
    timeout_ms: u32,
    save_dir: Option<PathBuf>,
}

impl CapturePlan {
    fn from_matches(matches: &ArgMatches, settings: &Settings) -> Self {
        Self {
            output_index: matches
                .get_one::<u32>("output")
                .copied()
                .unwrap_or(settings.output_index),
            frames: matches.get_one::<u64>("frames").copied().unwrap_or(10),
            timeout_ms: matches
                .get_one::<u32>("timeout-ms")
                .copied()
                .unwrap_or(settings.timeout_ms),
            save_dir: matches.get_one::<PathBuf>("save").cloned(),
        }
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    let settings = app_bootstrap::load_initial_settings();
    app_bootstrap::init_logging_and_banner(&settings);
    app_bootstrap::install_panic_hook();
    app_bootstrap::log_active_settings(&settings);

    let result = match matches.subcommand() {
        Some(("list", _)) => {
            list_displays();
            Ok(())
        }
        Some(("capture", sub)) => capture(&settings, &CapturePlan::from_matches(sub, &settings)),
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_displays() {
    let displays = get_available_displays();
    if displays.is_empty() {
        println!("No displays found");
    }
    for line in displays {
        println!("{}", line);
    }
}

#[cfg(target_os = "windows")]
fn capture(settings: &Settings, plan: &CapturePlan) -> Result<()> {
    use deskdup_capture::D3D11Backend;

    let mut session = CaptureSession::with_config(D3D11Backend, settings.session_config());
    let stats = run_capture(&mut session, plan)?;
    report(&stats)
}

#[cfg(not(target_os = "windows"))]
fn capture(_settings: &Settings, _plan: &CapturePlan) -> Result<()> {
    anyhow::bail!("Desktop duplication requires Windows (DXGI 1.2 or later)")
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn run_capture<B: GraphicsBackend>(
    session: &mut CaptureSession<B>,
    plan: &CapturePlan,
) -> Result<SessionStats> {
    session
        .initialize(plan.output_index)
        .with_context(|| format!("Failed to start capture on output {}", plan.output_index))?;

    if let Some(dir) = &plan.save_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let max_attempts = plan.frames.saturating_mul(ATTEMPTS_PER_FRAME);
    let mut captured = 0u64;
    let mut attempts = 0u64;

    while captured < plan.frames && attempts < max_attempts {
        attempts += 1;
        match session.capture_frame(plan.timeout_ms) {
            Ok(CaptureOutcome::Frame(frame)) => {
                captured += 1;
                if let Some(dir) = &plan.save_dir {
                    save_frame(dir, captured, &frame)?;
                }
            }
            Ok(CaptureOutcome::NoNewFrame) => {
                tracing::trace!(attempts, "No new frame");
            }
            Err(CaptureError::AccessLost) => recover(session)?,
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "Capture attempt failed, retrying");
            }
            Err(e) => return Err(e).context("Capture failed"),
        }
    }

    if captured < plan.frames {
        tracing::warn!(
            captured,
            requested = plan.frames,
            "Desktop stayed idle, stopping early"
        );
    }

    let stats = session.stats();
    session.teardown();
    Ok(stats)
}

/// Reinitialize after access loss; a mode switch may take a moment to settle
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn recover<B: GraphicsBackend>(session: &mut CaptureSession<B>) -> Result<()> {
    let mut last_error = None;
    for attempt in 1..=REINIT_RETRIES {
        match session.reinitialize() {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Reinitialize failed");
                last_error = Some(e);
                if let Some(delay) = reinit_backoff(attempt) {
                    std::thread::sleep(delay);
                }
            }
        }
    }
    match last_error {
        Some(e) => Err(e).context("Could not recover from access loss"),
        None => Ok(()),
    }
}

/// Pause before the next reinitialize; none after the last one
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn reinit_backoff(attempt: u32) -> Option<Duration> {
    (attempt < REINIT_RETRIES).then_some(REINIT_BACKOFF)
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn save_frame(dir: &Path, index: u64, frame: &CapturedFrame) -> Result<()> {
    let path = dir.join(format!(
        "frame_{:04}_{}x{}.bgra",
        index, frame.width, frame.height
    ));
    std::fs::write(&path, frame.to_packed())
        .with_context(|| format!("Failed to write {:?}", path))
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn report(stats: &SessionStats) -> Result<()> {
    let json = serde_json::to_string_pretty(stats).context("Failed to serialize stats")?;
    tracing::info!(
        frames = stats.frames_captured,
        errors = stats.errors,
        attempts = stats.attempts,
        "Capture finished"
    );
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_arguments_override_settings() {
        let matches = cli()
            .try_get_matches_from(["deskdup", "capture", "-o", "2", "-n", "5", "-t", "33"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let plan = CapturePlan::from_matches(sub, &Settings::default());

        assert_eq!(plan.output_index, 2);
        assert_eq!(plan.frames, 5);
        assert_eq!(plan.timeout_ms, 33);
        assert!(plan.save_dir.is_none());
    }

    #[test]
    fn capture_defaults_come_from_settings() {
        let settings = Settings {
            output_index: 1,
            timeout_ms: 250,
            ..Settings::default()
        };
        let matches = cli().try_get_matches_from(["deskdup", "capture"]).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let plan = CapturePlan::from_matches(sub, &settings);

        assert_eq!(plan.output_index, 1);
        assert_eq!(plan.timeout_ms, 250);
        assert_eq!(plan.frames, 10);
    }

    #[test]
    fn zero_frames_is_rejected() {
        assert!(cli()
            .try_get_matches_from(["deskdup", "capture", "--frames", "0"])
            .is_err());
    }

    #[test]
    fn no_backoff_after_final_reinitialize() {
        assert_eq!(reinit_backoff(1), Some(REINIT_BACKOFF));
        assert_eq!(reinit_backoff(REINIT_RETRIES - 1), Some(REINIT_BACKOFF));
        assert_eq!(reinit_backoff(REINIT_RETRIES), None);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(cli().try_get_matches_from(["deskdup"]).is_err());
        cli().debug_assert();
    }
}
