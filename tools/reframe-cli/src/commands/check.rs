//! Check system capabilities.

use reframe_common::config::{config_file_path, AppConfig};
use reframe_render_engine::ffmpeg::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("Reframe System Check");
    println!("{}", "=".repeat(50));

    let mut all_required_ok = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found in PATH");
        } else {
            println!("[MISSING] {binary} not found in PATH (install ffmpeg)");
            all_required_ok = false;
        }
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] No config at {}, using defaults", config_path.display());
    }

    let config = AppConfig::load();
    if config.playback.enabled {
        if command_exists(&config.playback.command) {
            println!("[OK] Player: {}", config.playback.command);
        } else {
            println!(
                "[WARN] Player '{}' not found; exports will not open automatically",
                config.playback.command
            );
        }
    }
    if config.library.enabled {
        println!("[OK] Library: {}", config.library.dir.display());
    }

    println!();
    if all_required_ok {
        println!("All required tools are available. Reframe is ready.");
    } else {
        println!("Some required tools are missing. See above for fixes.");
    }

    Ok(())
}
