// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Compare the ESM and inverse compositional trackers on an image sequence.
//!
//! A centered template is cropped in the first frame,
//! then both trackers follow it through the sequence.
//! One line per frame is printed with the final error,
//! the number of iterations and the processing time of each tracker.

use nalgebra::DMatrix;
use std::{env, error::Error, path::PathBuf, time::Instant};

use template_alignment_rs::core::track::{Aligner, Config, EsmTracker, IcTracker};
use template_alignment_rs::core::warp::Similarity;
use template_alignment_rs::math::optimizer::IterationPolicy;
use template_alignment_rs::misc::{interop, view};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = my_run(&args) {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: ./tars_compare image_pattern nb_frames [output_dir]

image_pattern: printf-like path of the frames, such as seq/im%03d.pgm
               (placeholder %d with optional flags 0 or - and a width)
nb_frames:     number of frames to process, starting at index 0
output_dir:    if given, sampling images are saved there as PNG";

/// Side of the square template, reduced if the frames are smaller.
const TEMPLATE_SIZE: usize = 150;

/// Standard deviation of the Gaussian pre-blur, 0 to disable.
const GAUSSIAN_SIGMA: f32 = 1.1;

/// Statistics accumulated over the sequence for one tracker.
struct Stats {
    name: &'static str,
    nb_iterations: usize,
    error: f64,
    nb_failures: usize,
}

fn my_run(args: &[String]) -> Result<(), Box<dyn Error>> {
    let valid_args = check_args(args)?;

    // Crop a centered template in the first frame.
    let first_frame = read_frame(&valid_args.image_pattern, 0)?;
    let (height, width) = first_frame.shape();
    let size = TEMPLATE_SIZE.min(width.saturating_sub(2)).min(height.saturating_sub(2));
    let start_x = (width - size) / 2;
    let start_y = (height - size) / 2;
    let template = interop::crop(&first_frame, start_x, start_y, size, size)
        .ok_or("Frames are too small for a template")?;
    let seed = Similarity::translation(start_x as f64, start_y as f64).to_matrix();

    // Initialize both trackers with the same template and seed.
    let config = Config::new(size, size);
    let esm: EsmTracker = config.clone().init()?;
    let ic: IcTracker = config.init()?;
    let mut trackers: Vec<(Box<dyn Aligner>, Stats)> = vec![
        (Box::new(esm), Stats::new("ESM")),
        (Box::new(ic), Stats::new("IC")),
    ];
    for (tracker, _) in trackers.iter_mut() {
        tracker.attach_template(&template)?;
        tracker.initialize()?;
        tracker.set_initial_homography(seed)?;
    }

    // Track every frame of the sequence.
    let policy = IterationPolicy::default();
    for k in 0..valid_args.nb_frames {
        let frame = read_frame(&valid_args.image_pattern, k)?;
        let mut line = Vec::with_capacity(trackers.len());
        for (tracker, stats) in trackers.iter_mut() {
            let start = Instant::now();
            let result = policy.converge(tracker.as_mut(), &frame);
            let elapsed_ms = 1000.0 * start.elapsed().as_secs_f64();
            match result {
                Ok(convergence) => {
                    stats.nb_iterations += convergence.nb_iterations;
                    stats.error += convergence.update.mean_error;
                    line.push(format!(
                        "{} (error : {:.2}, {} iter, {:.2} ms)",
                        stats.name,
                        convergence.update.mean_error,
                        convergence.nb_iterations,
                        elapsed_ms
                    ));
                }
                Err(err) => {
                    // Keep the current homography and try again on the next frame.
                    log::warn!("{} failed on frame {}: {}", stats.name, k, err);
                    stats.nb_failures += 1;
                    line.push(format!("{} (failed: {})", stats.name, err));
                }
            }
            if let Some(corners) = view::template_corners(&tracker.homography(), size, size) {
                log::info!("{} corners: {}", stats.name, view::corners_to_string(&corners));
            }
            if let Some(dir) = &valid_args.output_dir {
                let file_name = format!("sampling_{}_{:03}.png", stats.name.to_lowercase(), k);
                interop::image_from_matrix(tracker.sampling_image()).save(dir.join(file_name))?;
            }
        }
        println!("{}", line.join(", "));
    }

    // Print averages over the sequence.
    for (_, stats) in trackers.iter() {
        println!("{}", stats.summary(valid_args.nb_frames));
    }
    Ok(())
}

impl Stats {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            nb_iterations: 0,
            error: 0.0,
            nb_failures: 0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn summary(&self, nb_frames: usize) -> String {
        let n = nb_frames.max(1) as f64;
        format!(
            "{} iter : {:.2} error : {:.2} failures : {}",
            self.name,
            self.nb_iterations as f64 / n,
            self.error / n,
            self.nb_failures
        )
    }
}

struct Args {
    image_pattern: String,
    nb_frames: usize,
    output_dir: Option<PathBuf>,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    match args {
        [_, image_pattern, nb_frames_str] => Ok(Args {
            image_pattern: image_pattern.clone(),
            nb_frames: parse_nb_frames(nb_frames_str)?,
            output_dir: None,
        }),
        [_, image_pattern, nb_frames_str, output_dir_str] => {
            let output_dir = PathBuf::from(output_dir_str);
            if !output_dir.is_dir() {
                eprintln!("{}", USAGE);
                return Err(format!("Not a directory: {}", output_dir_str));
            }
            Ok(Args {
                image_pattern: image_pattern.clone(),
                nb_frames: parse_nb_frames(nb_frames_str)?,
                output_dir: Some(output_dir),
            })
        }
        _ => {
            eprintln!("{}", USAGE);
            Err("Wrong number of arguments".to_string())
        }
    }
}

fn parse_nb_frames(nb_frames_str: &str) -> Result<usize, String> {
    nb_frames_str.parse().map_err(|_| {
        eprintln!("{}", USAGE);
        format!("Invalid number of frames: {}", nb_frames_str)
    })
}

/// Load, blur and convert one frame of the sequence.
fn read_frame(pattern: &str, index: usize) -> Result<DMatrix<u8>, Box<dyn Error>> {
    let path = frame_path(pattern, index)?;
    let img = image::open(&path)?;
    let img = if GAUSSIAN_SIGMA > 0.0 {
        img.blur(GAUSSIAN_SIGMA)
    } else {
        img
    };
    Ok(interop::gray_matrix_from_dynamic(&img)?)
}

/// Replace the printf-like `%[flags][width]d` placeholder of a pattern by an index.
/// Flags `0` (zero padding) and `-` (left alignment) are supported,
/// otherwise the number is padded with spaces on the left.
fn frame_path(pattern: &str, index: usize) -> Result<String, String> {
    let start = pattern
        .find('%')
        .ok_or_else(|| format!("No % placeholder in pattern: {}", pattern))?;
    let rest = &pattern[start + 1..];
    let end = rest
        .find('d')
        .ok_or_else(|| format!("Placeholder must end with d: {}", pattern))?;
    let placeholder = &rest[..end];
    let digits = placeholder.trim_start_matches(|c| c == '0' || c == '-');
    let flags = &placeholder[..placeholder.len() - digits.len()];
    let width: usize = if digits.is_empty() {
        0
    } else {
        digits
            .parse()
            .map_err(|_| format!("Invalid placeholder %{}d", placeholder))?
    };
    let number = if flags.contains('-') {
        format!("{:<width$}", index, width = width)
    } else if flags.contains('0') {
        format!("{:0width$}", index, width = width)
    } else {
        format!("{:>width$}", index, width = width)
    };
    Ok(format!("{}{}{}", &pattern[..start], number, &rest[end + 1..]))
}

// TESTS #############################################################
