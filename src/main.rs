//! Play the bundled chime once and exit.
//!
//! ```text
//! [AssetStream] -> [dec] -> [i2s] -> speaker (or a paced null sink)
//! ```
//!
//! Run: `cargo run` or `cargo run --features cpal-output`

use flashplay::board::HostBoard;
use flashplay::config::{AssetKind, PlayerConfig};
use flashplay::driver::Player;
use flashplay::error::Result;
use flashplay::io::AssetStream;
use flashplay::output::{AudioOutput, NullOutput};
use std::process::ExitCode;

static CHIME: &[u8] = include_bytes!("../assets/chime.wav");

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    match app_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("playback failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn app_main() -> Result<()> {
    tracing::info!("[ 1 ] Start audio codec chip");
    let board = HostBoard::init()?;

    let config = PlayerConfig::default().with_asset_kind(AssetKind::Wav);
    let mut player = Player::new(config, board)?;

    tracing::info!("[ 2 ] Create audio pipeline for playback");
    let source = AssetStream::from_static(CHIME).with_name("chime.wav");
    let output = open_output();
    tracing::info!("[ 3 ] Start playback on {}", output.name());

    let report = player.play(source, output)?;

    tracing::info!(
        "[ 4 ] Stopped ({:?}), {} format change(s), final clock {} Hz/{} bit/{} ch",
        report.exit,
        report.format_changes.len(),
        report.final_clock.sample_rate,
        report.final_clock.bits,
        report.final_clock.channels,
    );
    Ok(())
}

#[cfg(feature = "cpal-output")]
fn open_output() -> Box<dyn AudioOutput> {
    match flashplay::output::CpalOutput::new() {
        Ok(output) => Box::new(output),
        Err(e) => {
            tracing::warn!("no audio device ({}), playing into a paced null sink", e);
            Box::new(NullOutput::paced())
        }
    }
}

#[cfg(not(feature = "cpal-output"))]
fn open_output() -> Box<dyn AudioOutput> {
    Box::new(NullOutput::paced())
}
