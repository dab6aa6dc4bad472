use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::properties::Properties;
use crate::renderer::FEATURE_FLOATS;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Reference image only.
    #[value(name = "ref", alias = "0")]
    Reference,
    /// Features only.
    #[value(name = "feat", alias = "1")]
    Feature,
    /// Reference image and features.
    #[value(name = "all", alias = "2")]
    All,
}

impl Mode {
    pub fn wants_features(self) -> bool {
        matches!(self, Mode::Feature | Mode::All)
    }

    pub fn wants_reference(self) -> bool {
        matches!(self, Mode::Reference | Mode::All)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Mode::Reference => "reference-only",
            Mode::Feature => "feature-only",
            Mode::All => "reference-and-feature",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "patchgen",
    version,
    about = "Renders randomized training patches for a path tracer"
)]
pub struct Cli {
    /// Rendering mode
    #[arg(short = 'M', long, value_enum, default_value_t = Mode::Reference)]
    pub mode: Mode,

    /// Scene file for rendering
    #[arg(short, long)]
    pub scene: Option<PathBuf>,

    /// Base filename for input features (.npy)
    #[arg(short, long = "in")]
    pub input: Option<PathBuf>,

    /// Base filename for the output reference image (.npy)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Number of patches to generate
    #[arg(short, long, default_value_t = 1)]
    pub num: u32,

    /// Samples per pixel for the features
    #[arg(short = 'p', long, default_value_t = 4)]
    pub spp: u32,

    /// Samples per pixel for the reference image
    #[arg(short, long, default_value_t = 1024)]
    pub mspp: u32,

    /// Square film size, overriding the scene
    #[arg(short, long)]
    pub width: Option<u32>,

    /// Seed for the random stream (defaults to the clock)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Add sphere lights on the corners of the scene bounds
    #[arg(long)]
    pub debug_lights: bool,

    /// Convert a reference .npy to a tone-mapped .png and exit
    #[arg(long, num_args = 2, value_names = ["NPY", "PNG"])]
    pub preview: Option<Vec<PathBuf>>,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("option '--scene' is required")]
    MissingScene,

    #[error("option '--in' is required in the {0} mode")]
    MissingInput(&'static str),

    #[error("option '--out' is required in the {0} mode")]
    MissingOutput(&'static str),

    #[error("option '--{0}' should be a positive integer value")]
    NotPositive(&'static str),

    #[error("option '--mspp' should not be smaller than '--spp' (mspp {mspp}, spp {spp})")]
    ReferenceBelowFeatureFrames { spp: u32, mspp: u32 },

    #[error("{spp} frames do not divide the {floats} floats of a feature element")]
    FramesDoNotDivideFeatures { spp: u32, floats: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub mode: Mode,
    pub scene: PathBuf,
    pub feature_path: Option<PathBuf>,
    pub reference_path: Option<PathBuf>,
    pub patches: u32,
    pub feature_frames: u32,
    pub reference_frames: u32,
    pub film_width: Option<u32>,
    pub seed: Option<u64>,
    pub debug_lights: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Preview { npy: PathBuf, png: PathBuf },
    Run(RunConfig),
}

fn npy_path(path: &Path) -> PathBuf {
    path.with_extension("npy")
}

impl Cli {
    pub fn into_command(self) -> Result<Command, ConfigError> {
        if let Some(paths) = &self.preview {
            if let [npy, png] = &paths[..] {
                return Ok(Command::Preview {
                    npy: npy.clone(),
                    png: png.clone(),
                });
            }
        }
        RunConfig::try_from(self).map(Command::Run)
    }
}

impl TryFrom<Cli> for RunConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<RunConfig, ConfigError> {
        if cli.num < 1 {
            return Err(ConfigError::NotPositive("num"));
        }
        if cli.spp < 1 {
            return Err(ConfigError::NotPositive("spp"));
        }
        if cli.mspp < 1 {
            return Err(ConfigError::NotPositive("mspp"));
        }
        if cli.width == Some(0) {
            return Err(ConfigError::NotPositive("width"));
        }
        if cli.mspp < cli.spp {
            return Err(ConfigError::ReferenceBelowFeatureFrames {
                spp: cli.spp,
                mspp: cli.mspp,
            });
        }
        let scene = cli.scene.ok_or(ConfigError::MissingScene)?;
        let mode = cli.mode;
        if mode.wants_features() && cli.input.is_none() {
            return Err(ConfigError::MissingInput(mode.describe()));
        }
        if mode.wants_reference() && cli.out.is_none() {
            return Err(ConfigError::MissingOutput(mode.describe()));
        }
        if mode.wants_features() && FEATURE_FLOATS % cli.spp as usize != 0 {
            return Err(ConfigError::FramesDoNotDivideFeatures {
                spp: cli.spp,
                floats: FEATURE_FLOATS,
            });
        }
        Ok(RunConfig {
            mode,
            scene,
            feature_path: cli.input.as_deref().map(npy_path).filter(|_| mode.wants_features()),
            reference_path: cli.out.as_deref().map(npy_path).filter(|_| mode.wants_reference()),
            patches: cli.num,
            feature_frames: cli.spp,
            reference_frames: cli.mspp,
            film_width: cli.width,
            seed: cli.seed,
            debug_lights: cli.debug_lights,
        })
    }
}

impl RunConfig {
    /// Applies the square film override on top of the scene's film size.
    pub fn apply_film(&self, properties: &mut Properties) {
        if let Some(width) = self.film_width {
            properties.width = width;
            properties.height = width;
        }
    }

    pub fn is_multi_patch(&self) -> bool {
        self.patches > 1
    }
}
