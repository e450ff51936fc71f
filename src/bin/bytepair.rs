use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use bytepair::{
    artifact_paths, load_vocab_and_merges, save_vocab_and_merges, train_bpe_from_file, TokenId,
    Tokenizer, TrainerConfig,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::info;

const DEFAULT_SPECIAL_TOKEN: &str = "<|endoftext|>";

#[derive(Parser, Debug)]
#[command(author, version, about = "Byte-level BPE toolkit", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a tokenizer on a text file and save vocab/merges
    Train(TrainArgs),
    /// Encode a text file to token ids
    Encode(EncodeArgs),
    /// Decode token ids back to text
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Training text file
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Target vocabulary size, including bytes and special tokens
    #[arg(long, value_name = "SIZE")]
    vocab_size: usize,

    /// Special token kept atomic (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN", default_values_t = [DEFAULT_SPECIAL_TOKEN.to_owned()])]
    special_tokens: Vec<String>,

    /// Directory for the artifact files
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Prefix for `{name}.vocab.json` and `{name}.merges.json`
    #[arg(long, value_name = "NAME")]
    name: String,

    /// Disable the merge progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Vocab JSON file
    #[arg(long, value_name = "PATH")]
    vocab: PathBuf,

    /// Merges JSON file
    #[arg(long, value_name = "PATH")]
    merges: PathBuf,

    /// Special token kept atomic (repeat flag)
    #[arg(long = "special-token", value_name = "TOKEN")]
    special_tokens: Vec<String>,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Text file to encode
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Token ids to decode
    #[arg(required = true)]
    ids: Vec<TokenId>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Encode(args) => run_encode(args),
        Commands::Decode(args) => run_decode(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config =
        TrainerConfig::new(args.vocab_size, args.special_tokens).with_progress(!args.no_progress);
    let (vocab_path, merges_path) = artifact_paths(&args.output_dir, &args.name);

    info!("training BPE tokenizer on {}", args.input.display());
    let start = Instant::now();
    let out = train_bpe_from_file(&args.input, &config)
        .with_context(|| format!("training on {} failed", args.input.display()))?;
    info!(
        "training finished in {:.2}s ({:?})",
        start.elapsed().as_secs_f64(),
        out.stop_reason
    );

    save_vocab_and_merges(&out.vocab, &out.merges, &vocab_path, &merges_path)
        .context("failed to save tokenizer files")?;

    let (vocab, merges) = load_vocab_and_merges(&vocab_path, &merges_path)
        .context("failed to reload tokenizer files")?;
    if vocab != out.vocab {
        bail!("vocab mismatch after save/load");
    }
    if merges != out.merges {
        bail!("merges mismatch after save/load");
    }

    println!("Vocab file : {}", vocab_path.display());
    println!("Merges file: {}", merges_path.display());
    println!("Vocab size : {}", vocab.len());
    println!("# merges   : {}", merges.len());
    Ok(())
}

fn load_tokenizer(model: &ModelArgs) -> Result<Tokenizer> {
    Tokenizer::from_files(&model.vocab, &model.merges, &model.special_tokens).with_context(|| {
        format!(
            "failed to load tokenizer from {} and {}",
            model.vocab.display(),
            model.merges.display()
        )
    })
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    let tokenizer = load_tokenizer(&args.model)?;
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let ids = tokenizer.encode(&text).context("encoding failed")?;
    info!("encoded {} bytes into {} tokens", text.len(), ids.len());

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let line = ids
        .iter()
        .map(TokenId::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(writer, "{line}")?;
    writer.flush()?;
    Ok(())
}

fn run_decode(args: DecodeArgs) -> Result<()> {
    let tokenizer = load_tokenizer(&args.model)?;
    let text = tokenizer.decode(&args.ids).context("decoding failed")?;
    print!("{text}");
    io::stdout().flush()?;
    Ok(())
}
