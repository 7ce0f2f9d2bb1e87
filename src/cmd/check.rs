use anyhow::{bail, Result};

use repcast::{CommandSpeech, Settings};

pub async fn cmd_check(settings: &Settings) -> Result<()> {
    let encoder = &settings.encoder;
    let ffmpeg_ok = encoder.check_available().await;
    if ffmpeg_ok {
        println!("✅ encoder: {}", encoder.program.display());
    } else {
        println!("❌ encoder: {} not runnable", encoder.program.display());
    }

    let speech = settings
        .feedback
        .speech_program
        .clone()
        .or_else(|| CommandSpeech::detect().map(|s| s.program().to_path_buf()));
    match speech {
        Some(program) => println!("✅ speech: {}", program.display()),
        None => println!("⚠️  speech: none found, feedback will only be logged"),
    }

    if encoder.audio.enabled {
        println!("🎙  audio: {} {}", encoder.audio.format, encoder.audio.device);
    } else {
        println!("🔇 audio: disabled");
    }

    if !ffmpeg_ok {
        bail!("ffmpeg is required for streaming");
    }
    Ok(())
}
