//! Example: Inspect a camera USDA file and decode its track.
//!
//! Run with: cargo run --example inspect_usda -- shot010_cam.usda

use std::env;

use camlink_core::usd::read_layer;
use camlink_core::{read_camera_track, DebugReport};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: inspect_usda <path-to-usda-file>");
        println!("\nExample:");
        println!("  cargo run --example inspect_usda -- shot010_cam.usda");
        return;
    }

    let path = &args[1];
    println!("Loading USDA file: {}", path);

    let layer = match read_layer(path) {
        Ok(layer) => layer,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", DebugReport::from_layer(path, &layer));

    match read_camera_track(path) {
        Ok(track) => {
            println!("\n--- Track: {} ---", track.prim_path);
            for frame in track.frames.iter().take(10) {
                let pos = frame.world.w_axis.truncate();
                println!(
                    "  [{}] pos ({:.3}, {:.3}, {:.3})  focal {:.2}mm  aperture {:.2}x{:.2}mm",
                    frame.frame,
                    pos.x,
                    pos.y,
                    pos.z,
                    frame.optics.focal_length,
                    frame.optics.horizontal_aperture,
                    frame.optics.vertical_aperture
                );
            }
            if track.frames.len() > 10 {
                println!("  ... and {} more", track.frames.len() - 10);
            }
        }
        Err(e) => eprintln!("No camera track: {}", e),
    }
}
