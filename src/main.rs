// Example runner for the `verdant_vision` library: analyzes one image from
// the command line and writes every generated map next to the input file.
//
// Usage: verdant_vision <image-path> [strictness 0-100] [zones 2-6]

use std::path::Path;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use verdant_vision::{AnalysisConfig, AnalysisPipeline};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_timer(fmt::time::uptime());
    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("usage: verdant_vision <image-path> [strictness 0-100] [zones 2-6]");
        std::process::exit(2);
    };
    let strictness: u8 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(50);
    let zone_count: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(4);

    let bytes = std::fs::read(&input)?;
    let pipeline = AnalysisPipeline::new(AnalysisConfig {
        strictness,
        zone_count,
        ..AnalysisConfig::default()
    });

    let result = pipeline.analyze_with_progress(&bytes, &mut |stage| {
        println!("… {stage}");
    })?;

    println!(
        "{}x{} | analyzed {} px (skipped {}) | dominant {} | agreement {:.1}% | vegetation {:.1}%",
        result.width,
        result.height,
        result.analyzed_pixels,
        result.skipped_pixels,
        result.combined.dominant.label(),
        result.agreement_pct,
        result.vegetation_pct,
    );
    for hotspot in &result.hotspots {
        println!(
            "hotspot r{} c{} ({}) severe {:.0}%",
            hotspot.row,
            hotspot.col,
            hotspot.compass_label(),
            hotspot.severe_ratio * 100.0,
        );
    }
    for zone in &result.zones {
        println!(
            "zone {} [{}] area {:.1}% severe {:.1}% healthy {:.1}%",
            zone.id,
            zone.label,
            zone.area_pct,
            zone.breakdown.severe_pct,
            zone.breakdown.healthy_pct,
        );
    }

    let stem = Path::new(&input)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("analysis")
        .to_string();
    let parent = Path::new(&input).parent().unwrap_or(Path::new(".")).to_path_buf();

    let outputs = [
        ("original", &result.original_png),
        ("heatmap_gli", &result.gli.heatmap_png),
        ("heatmap_vari", &result.vari.heatmap_png),
        ("heatmap_tgi", &result.tgi.heatmap_png),
        ("heatmap_combined", &result.combined.heatmap_png),
        ("overlay_gli", &result.gli.overlay_png),
        ("overlay_vari", &result.vari.overlay_png),
        ("overlay_tgi", &result.tgi.overlay_png),
        ("overlay_combined", &result.combined.overlay_png),
        ("zones", &result.zone_overlay_png),
    ];
    for (suffix, png) in outputs {
        let path = parent.join(format!("{stem}_{suffix}.png"));
        std::fs::write(&path, png)?;
        println!("wrote {}", path.display());
    }

    Ok(())
}
