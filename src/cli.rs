// src/cli.rs

use clap::Parser;
use std::path::PathBuf;
use crate::funscript::transform::TransformMode;

/// Plays a video in mpv with a Handy kept in sync over HSSP.
#[derive(Debug, Parser)]
#[command(name = "handy-sync", version, about = "Handy MPV sync utility")]
pub struct Cli {
    /// The script file to play
    pub script_path: PathBuf,

    /// Enable FunDoubler
    #[arg(long, conflicts_with = "half")]
    pub double: bool,

    /// Enable FunHalver
    #[arg(long)]
    pub half: bool,

    /// Re-measure the clock offset even if the saved one is recent
    #[arg(long)]
    pub resync: bool,
}

impl Cli {
    pub fn transform_mode(&self) -> Option<TransformMode> {
        if self.double {
            Some(TransformMode::Double)
        } else if self.half {
            Some(TransformMode::Halve)
        } else {
            None
        }
    }
}
