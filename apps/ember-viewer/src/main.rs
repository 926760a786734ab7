//! Ember Demo Viewer
//!
//! Opens a window, clears the swapchain every frame and orbits the camera
//! around the origin. Resize or minimize the window to exercise swapchain
//! recreation.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--vsync`: Present with FIFO instead of mailbox
//! - `--width <N>`: Initial window width (default: 1280)
//! - `--height <N>`: Initial window height (default: 720)
//! - `--fps <N>`: Frame rate cap (default: uncapped)
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use ember_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Command line options.
#[derive(Debug, Clone)]
struct ViewerArgs {
    vsync: bool,
    width: u32,
    height: u32,
    fps: Option<u32>,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            vsync: false,
            width: WIDTH,
            height: HEIGHT,
            fps: None,
        }
    }
}

impl ViewerArgs {
    /// Parse arguments, ignoring unknown flags and malformed values.
    fn parse(args: &[String]) -> Self {
        let mut parsed = Self::default();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).and_then(|v| v.parse::<u32>().ok());
            match (args[i].as_str(), value) {
                ("--vsync", _) => parsed.vsync = true,
                ("--width", Some(v)) if v > 0 => {
                    parsed.width = v;
                    i += 1;
                }
                ("--height", Some(v)) if v > 0 => {
                    parsed.height = v;
                    i += 1;
                }
                ("--fps", Some(v)) => {
                    parsed.fps = Some(v);
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }

        parsed
    }

    fn config(&self) -> AppConfig {
        let config = AppConfig::new("Ember - Frame Lifecycle Demo")
            .with_size(self.width, self.height)
            .with_vsync(self.vsync);
        match self.fps {
            Some(fps) => config.with_target_fps(fps),
            None => config,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(ViewerArgs::parse(&args).config())
}

fn print_help() {
    eprintln!(
        "Ember Demo Viewer

USAGE:
    cargo run -p ember-viewer -- [OPTIONS]

OPTIONS:
    --vsync                 Present with FIFO (default: mailbox when available)
    --width <N>             Initial window width (default: {WIDTH})
    --height <N>            Initial window height (default: {HEIGHT})
    --fps <N>               Frame rate cap (default: uncapped)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("ember-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let parsed = ViewerArgs::parse(&args(&[]));
        assert!(!parsed.vsync);
        assert_eq!((parsed.width, parsed.height), (WIDTH, HEIGHT));
        assert_eq!(parsed.fps, None);
    }

    #[test]
    fn parses_size_and_vsync() {
        let parsed = ViewerArgs::parse(&args(&["--width", "800", "--vsync", "--height", "600"]));
        assert!(parsed.vsync);
        assert_eq!((parsed.width, parsed.height), (800, 600));
    }

    #[test]
    fn ignores_zero_and_malformed_sizes() {
        let parsed = ViewerArgs::parse(&args(&["--width", "0", "--height", "tall", "--fps", "60"]));
        assert_eq!((parsed.width, parsed.height), (WIDTH, HEIGHT));
        assert_eq!(parsed.fps, Some(60));
    }
}
