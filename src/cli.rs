use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "voicebox", about = "Mel-spectrogram vocoder toolbox (Griffin-Lim)")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Vocoded output WAV file
    #[arg(short, long, default_value = "vocoded.wav")]
    pub output: PathBuf,

    /// Config file (defaults to ./voicebox.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write the Griffin-Lim comparison of the source here
    #[arg(long)]
    pub gl_output: Option<PathBuf>,

    /// Write the source mel spectrogram as JSON, (time, mel) order
    #[arg(long)]
    pub spec_out: Option<PathBuf>,

    /// Griffin-Lim iterations
    #[arg(long)]
    pub iters: Option<usize>,

    /// Magnitude exponent applied before Griffin-Lim
    #[arg(long)]
    pub power: Option<f32>,

    /// Seed for the initial Griffin-Lim phase
    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep raw dB instead of normalizing the spectrogram
    #[arg(long)]
    pub no_normalize: bool,

    /// Disable clipping during normalization
    #[arg(long)]
    pub no_clip: bool,

    /// Fail when normalized values leave the configured range
    #[arg(long)]
    pub strict: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}
