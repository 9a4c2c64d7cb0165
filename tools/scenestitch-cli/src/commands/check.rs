//! Check system capabilities.

use scenestitch_common::config::config_file_path;
use scenestitch_common::AppConfig;
use scenestitch_render_engine::command_exists;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("SceneStitch System Check");
    println!("{}", "=".repeat(50));

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[OK] Config: defaults ({} not found)", config_path.display());
    }

    let encoder = &config.export.ffmpeg_binary;
    let encoder_ok = command_exists(encoder);
    if encoder_ok {
        println!("[OK] Encoder: {encoder}");
    } else {
        println!("[WARN] Encoder: {encoder} not found in PATH (use `export --frames`)");
    }

    let root = &config.prerender.frame_root;
    let root_ok = std::fs::create_dir_all(root).is_ok();
    if root_ok {
        println!("[OK] Frame store root: {}", root.display());
    } else {
        println!("[FAIL] Frame store root not writable: {}", root.display());
    }
    println!(
        "     concurrency {}, cache {} analyses, default duration {} frames",
        config.prerender.concurrency,
        config.analysis.max_cache_size,
        config.analysis.default_duration_frames
    );

    println!();
    if encoder_ok && root_ok {
        println!("All capabilities are available. SceneStitch is ready.");
    } else {
        println!("Some capabilities are missing. See above for fixes.");
    }

    Ok(())
}
