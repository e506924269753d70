// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands `prepare`, `train` and
// `caption` and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    caption_use_case::CaptionConfig,
    prepare_use_case::PrepareConfig,
    train_use_case::TrainConfig,
};
use crate::domain::caption::DecodeStrategy;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract and cache image feature vectors
    Prepare(PrepareArgs),

    /// Train the caption model on cached features
    Train(TrainArgs),

    /// Caption an image using a trained checkpoint
    Caption(CaptionArgs),
}

/// Arguments for the `prepare` command
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// CSV file with `image,caption` rows
    #[arg(long, default_value = "data/captions.txt")]
    pub captions_file: String,

    /// Directory the image names in the CSV are relative to
    #[arg(long, default_value = "data/Images")]
    pub images_dir: String,

    /// Where the .npy feature files and the backbone are written
    #[arg(long, default_value = "feature_vectors")]
    pub features_dir: String,

    /// Images are resized to this many pixels per side
    #[arg(long, default_value_t = 299)]
    pub image_size: usize,

    /// Channels per feature location
    #[arg(long, default_value_t = 2048)]
    pub feature_dim: usize,

    /// Side of the feature grid (locations = grid * grid)
    #[arg(long, default_value_t = 8)]
    pub grid: usize,

    /// Images run through the backbone together
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Rebuild the backbone and re-extract every image
    #[arg(long)]
    pub overwrite: bool,

    /// Burn record with backbone weights (path without .mpk.gz)
    #[arg(long)]
    pub backbone_weights: Option<String>,
}

impl From<PrepareArgs> for PrepareConfig {
    fn from(a: PrepareArgs) -> Self {
        PrepareConfig {
            captions_file:    a.captions_file,
            images_dir:       a.images_dir,
            features_dir:     a.features_dir,
            image_size:       a.image_size,
            feature_dim:      a.feature_dim,
            grid:             a.grid,
            batch_size:       a.batch_size,
            overwrite:        a.overwrite,
            backbone_weights: a.backbone_weights,
        }
    }
}

/// Arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// CSV file with `image,caption` rows
    #[arg(long, default_value = "data/captions.txt")]
    pub captions_file: String,

    /// Directory the image names in the CSV are relative to
    #[arg(long, default_value = "data/Images")]
    pub images_dir: String,

    /// Directory filled by `prepare`
    #[arg(long, default_value = "feature_vectors")]
    pub features_dir: String,

    /// Directory to save model checkpoints and tokenizer
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Tokens per caption, markers and padding included
    #[arg(long, default_value_t = 40)]
    pub max_length: usize,

    /// Upper bound on vocabulary entries
    #[arg(long, default_value_t = 5000)]
    pub vocab_size: usize,

    /// Captions processed together in one forward pass
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Size of the word embeddings and the encoded features
    #[arg(long, default_value_t = 256)]
    pub embedding_dim: usize,

    /// GRU hidden size
    #[arg(long, default_value_t = 512)]
    pub units: usize,

    /// Share of images used for training; the rest validate
    #[arg(long, default_value_t = 0.8)]
    pub train_fraction: f64,

    /// Data-loader threads reading feature files
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Seed for the split and shuffling; random when absent
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            captions_file:  a.captions_file,
            images_dir:     a.images_dir,
            features_dir:   a.features_dir,
            checkpoint_dir: a.checkpoint_dir,
            max_length:     a.max_length,
            vocab_size:     a.vocab_size,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            embedding_dim:  a.embedding_dim,
            units:          a.units,
            train_fraction: a.train_fraction,
            num_workers:    a.num_workers,
            seed:           a.seed,
            feature_shape:  None,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StrategyArg {
    Greedy,
    Sample,
}

impl From<StrategyArg> for DecodeStrategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Greedy => DecodeStrategy::Greedy,
            StrategyArg::Sample => DecodeStrategy::Sample,
        }
    }
}

/// Arguments for the `caption` command
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image to caption; picks a random one from the captions file if omitted
    #[arg(long)]
    pub image: Option<String>,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Directory holding the backbone written by `prepare`
    #[arg(long, default_value = "feature_vectors")]
    pub features_dir: String,

    #[arg(long, default_value = "data/captions.txt")]
    pub captions_file: String,

    #[arg(long, default_value = "data/Images")]
    pub images_dir: String,

    /// How the next word is chosen
    #[arg(long, value_enum, default_value_t = StrategyArg::Greedy)]
    pub strategy: StrategyArg,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the words and attention weights to this JSON file
    #[arg(long)]
    pub attention_out: Option<String>,
}

impl From<CaptionArgs> for CaptionConfig {
    fn from(a: CaptionArgs) -> Self {
        CaptionConfig {
            checkpoint_dir: a.checkpoint_dir,
            features_dir:   a.features_dir,
            captions_file:  a.captions_file,
            images_dir:     a.images_dir,
            image:          a.image,
            strategy:       a.strategy.into(),
            seed:           a.seed,
            attention_out:  a.attention_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::parse_from(["image-caption-rnn", "train", "--epochs", "2"]);
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.epochs, 2);
        assert_eq!(cfg.max_length, 40);
        assert_eq!(cfg.vocab_size, 5000);
        assert!(cfg.feature_shape.is_none());
    }

    #[test]
    fn test_caption_strategy_flag() {
        let cli = Cli::parse_from(["image-caption-rnn", "caption", "--strategy", "sample", "--image", "dog.jpg"]);
        let Commands::Caption(args) = cli.command else { panic!("expected caption") };
        let cfg: CaptionConfig = args.into();
        assert_eq!(cfg.strategy, DecodeStrategy::Sample);
        assert_eq!(cfg.image.as_deref(), Some("dog.jpg"));
    }

    #[test]
    fn test_prepare_overwrite_flag() {
        let cli = Cli::parse_from(["image-caption-rnn", "prepare", "--overwrite", "--grid", "4"]);
        let Commands::Prepare(args) = cli.command else { panic!("expected prepare") };
        let cfg: PrepareConfig = args.into();
        assert!(cfg.overwrite);
        assert_eq!(cfg.grid, 4);
        assert_eq!(cfg.batch_size, 16);
    }
}
