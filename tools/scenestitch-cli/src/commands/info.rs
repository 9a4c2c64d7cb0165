//! Show timeline information.

use std::path::PathBuf;

use super::load_document;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let doc = load_document(&path)?;
    let s = &doc.settings;

    println!("Timeline: {}", doc.name);
    println!("  Version: {}", doc.version);
    println!("  Created: {}", doc.created_at);
    println!("  Modified: {}", doc.modified_at);
    println!("  Duration: {:.2}s", doc.timeline.duration());
    println!();

    println!("Export settings:");
    println!("  Format: {:?} (.{})", s.format, s.format.extension());
    println!("  Output: {}x{} @ {}fps", s.width, s.height, s.fps);
    println!("  Bitrate: {} kbps", s.video_bitrate_kbps);
    println!("  Background: {}", s.background);
    println!();

    println!("Tracks ({}):", doc.timeline.tracks.len());
    for track in &doc.timeline.tracks {
        println!("  {} ({} elements)", track.name, track.elements.len());
        for el in &track.elements {
            let module = el
                .module_id
                .as_deref()
                .map(|m| format!(" module={m}"))
                .unwrap_or_default();
            println!(
                "    {:<16} {:<7} {:>7.2}s .. {:<7.2}s blend={} opacity={:.2}{}{}",
                el.id,
                format!("{:?}", el.kind).to_lowercase(),
                el.visible_start(),
                el.visible_end(),
                el.blend_mode.name(),
                el.opacity,
                module,
                if el.hidden { " (hidden)" } else { "" }
            );
        }
    }

    let problems = doc.timeline.validate();
    if !problems.is_empty() {
        println!();
        println!("Problems ({}):", problems.len());
        for problem in &problems {
            println!("  [WARN] {problem}");
        }
    }

    Ok(())
}
