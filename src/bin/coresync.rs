// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use serde::Serialize;

use coresync::core::config::Config;
use coresync::core::error::{CoreError, Result};
use coresync::core::session::{CoreSession, SessionSettings};
use coresync::core::snapshot::{SnapshotService, StateHash};
use coresync::core::virtual_core::VirtualCore;
use coresync::core::Driver;

/// Save-state consistency check for a core session
#[derive(Parser)]
#[command(name = "coresync")]
#[command(about = "Drive a core session and verify save/load round trips", long_about = None)]
struct Args {
    /// ROM file, relative to the configured games directory unless absolute
    rom: String,

    /// Configuration file (defaults to $CORESYNC_CONFIG or built-in defaults)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// System whose metadata to use
    #[arg(short = 's', long, default_value = "nes")]
    system: String,

    /// Session id (determines the save file name)
    #[arg(long, default_value = "coresync")]
    session: String,

    /// Frames to advance before saving
    #[arg(long, default_value = "100")]
    save_at: u64,

    /// Frames to advance after saving, before loading
    #[arg(short = 'n', long, default_value = "1000")]
    frames: u64,

    /// Frame rate (0 = unthrottled); defaults to the configured rate
    #[arg(long)]
    fps: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report {
    session: String,
    system: String,
    saved_at: u64,
    frames_after_save: u64,
    saved: StateHash,
    restored: StateHash,
    consistent: bool,
}

fn main() -> Result<()> {
    // .env is optional; only complain if it exists but can't be read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize logger with default level INFO
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("coresync v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    let meta = config.emulator(&args.system)?.clone();
    let settings = SessionSettings::from_config(&config, &args.system, &args.session)?;
    let fps = args.fps.unwrap_or(config.session.fps);

    let session = Arc::new(CoreSession::new(
        args.session.clone(),
        VirtualCore::new(meta.width, meta.height),
        settings,
    )?);

    session.load_core(&config.paths.core_path(&meta.core), meta.flags())?;
    let rom = {
        let path = PathBuf::from(&args.rom);
        if path.is_absolute() || path.exists() {
            path
        } else {
            config.paths.game_path(&args.rom)
        }
    };
    session.load_rom(&rom)?;

    let video = session.handle_video(|_frame| {})?;
    let audio = session.handle_audio(|_batch| {})?;
    let input = session.route_input()?;

    let snapshots = SnapshotService::new(Arc::clone(&session));

    Driver::new(Arc::clone(&session), fps)
        .with_max_frames(args.save_at)
        .with_close_on_exit(false)
        .run()?;

    snapshots.save()?;
    let saved = snapshots.current_state_hash()?;
    info!("Saved at frame {}: {}", session.frame_count(), saved);

    Driver::new(Arc::clone(&session), fps)
        .with_max_frames(args.frames)
        .with_close_on_exit(false)
        .run()?;

    snapshots.load()?;
    let restored = snapshots.current_state_hash()?;
    info!("Restored: {}", restored);

    session.close();
    for consumer in [video, audio, input] {
        if consumer.join().is_err() {
            error!("Consumer thread panicked");
        }
    }

    let report = Report {
        session: args.session,
        system: args.system,
        saved_at: args.save_at,
        frames_after_save: args.frames,
        consistent: saved == restored,
        saved,
        restored,
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode report: {}", e),
        }
    } else {
        println!("saved:    {}", report.saved);
        println!("restored: {}", report.restored);
        println!("{}", if report.consistent { "OK" } else { "MISMATCH" });
    }

    if !report.consistent {
        error!("State restore was inconsistent");
        return Err(CoreError::Deserialize(format!(
            "restored state {} differs from saved state {}",
            report.restored, report.saved
        )));
    }

    Ok(())
}
