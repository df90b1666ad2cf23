// src/session.rs

//! One complete run: local checks, device setup, upload, clock sync, then
//! playback until the player quits or the process is interrupted.

use log::{error, info};
use std::path::{Path, PathBuf};
use crate::cli::Cli;
use crate::config::Config;
use crate::error::{HandyError, Result};
use crate::funscript::script::{read_script_bytes, Script};
use crate::funscript::transform::{transform, TransformMode};
use crate::handy::api::{ensure_hssp_mode, DeviceApi, HandyClient};
use crate::handy::clock_sync::{resolve_offset, SystemClock};
use crate::handy::upload::{upload_script, CacheClient, ScriptCache};
use crate::player::controller::{run_until_quit, PlaybackController};
use crate::player::mpv::MpvPlayer;
use crate::video_finder::find_video;

/// Verifies the script exists and finds its video, before any network traffic.
pub fn locate_media(script_path: &Path) -> Result<PathBuf> {
    if !script_path.is_file() {
        return Err(HandyError::ScriptNotFound(script_path.to_path_buf()));
    }
    let video = find_video(script_path).ok_or_else(|| HandyError::VideoNotFound(script_path.to_path_buf()))?;
    info!("Video found: {}", video.display());
    Ok(video)
}

/// The bytes to upload: the file as-is, or re-encoded after a transform.
pub async fn prepare_payload(script_path: &Path, mode: Option<TransformMode>) -> Result<Vec<u8>> {
    let raw = read_script_bytes(script_path).await?;
    match mode {
        None => Ok(raw),
        Some(mode) => {
            info!("Applying {:?} to {}", mode, script_path.display());
            let script = Script::from_slice(&raw)?;
            transform(&script, mode).to_bytes()
        }
    }
}

/// Puts the device in HSSP mode, then uploads and registers the script.
/// Nothing is uploaded unless the mode switch succeeded.
pub async fn prepare_device<D, C>(
    device: &D,
    cache: &C,
    endpoints: &[String],
    filename: &str,
    payload: &[u8],
) -> Result<String>
where
    D: DeviceApi,
    C: ScriptCache,
{
    info!("Getting Handy status...");
    ensure_hssp_mode(device).await?;
    info!("Handy connected!");
    upload_script(endpoints, filename, payload, cache, device).await
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Couldn't listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let video = locate_media(&cli.script_path)?;
    let payload = prepare_payload(&cli.script_path, cli.transform_mode()).await?;
    let filename = cli
        .script_path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "script.funscript".to_string());

    let device = HandyClient::new(&config)?;
    let cache = CacheClient::new()?;
    prepare_device(&device, &cache, &config.cache_urls, &filename, &payload).await?;

    let offset = resolve_offset(
        &config.time_sync_file,
        &device,
        &SystemClock,
        config.sync_samples,
        cli.resync,
    )
    .await?;

    let controller = PlaybackController::new(&device, SystemClock, offset);
    let mut player = match MpvPlayer::launch(&config.mpv_path, &video).await {
        Ok(p) => p,
        Err(e) => {
            controller.shutdown().await;
            return Err(e);
        }
    };

    let result = run_until_quit(controller, &mut player, interrupted()).await;
    player.close().await;
    result
}
