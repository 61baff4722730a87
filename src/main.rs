//! 命令行入口
//!
//! 读取 HTML，按词典改写文本并写出结果

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use live_rewrite::env::{core::LogLevel, EnvVar};
use live_rewrite::rewrite::config::ConfigManager;
use live_rewrite::rewrite::error::{RewriteError, RewriteResult};
use live_rewrite::{rewrite_html, Dictionary, DEFAULT_ENCODING};

#[derive(Parser, Debug)]
#[command(
    name = "live-rewrite",
    version,
    about = "Rewrite dictionary matches inside an HTML document into inspectable marker elements"
)]
struct Cli {
    /// Input HTML file, or "-" to read from stdin
    input: String,

    /// Replacement dictionary (TOML with an [entries] table)
    #[arg(short, long)]
    dictionary: PathBuf,

    /// Configuration file (defaults to the standard search paths)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file, or "-" for stdout
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Document encoding label
    #[arg(short, long, default_value = DEFAULT_ENCODING)]
    encoding: String,

    /// Override the number of nodes handled per traversal chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Override the time budget of one traversal chunk
    #[arg(long)]
    time_slice_ms: Option<u64>,

    /// Print statistics as JSON to stderr
    #[arg(long)]
    stats: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        LogLevel::get().unwrap_or_else(|e| {
            eprintln!("{}", e);
            "warn".to_string()
        })
    };
    let level = level.parse().unwrap_or(tracing::Level::WARN);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn read_input(input: &str) -> RewriteResult<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    fs::read(input).map_err(|e| RewriteError::IoError(format!("读取输入文件 {} 失败: {}", input, e)))
}

fn write_output(output: &str, data: &[u8]) -> RewriteResult<()> {
    if output == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data)?;
        stdout.flush()?;
        return Ok(());
    }
    fs::write(output, data).map_err(|e| RewriteError::IoError(format!("写入输出文件 {} 失败: {}", output, e)))
}

fn run(cli: Cli) -> RewriteResult<()> {
    let manager = ConfigManager::load(cli.config.as_deref())?;
    let mut config = manager.get_config().clone();
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(time_slice_ms) = cli.time_slice_ms {
        config.time_slice_ms = time_slice_ms;
    }
    config.validate()?;

    let dictionary_source = fs::read_to_string(&cli.dictionary).map_err(|e| {
        RewriteError::IoError(format!("读取词典 {} 失败: {}", cli.dictionary.display(), e))
    })?;
    let dictionary = Dictionary::from_toml_str(&dictionary_source)?;
    tracing::info!("已加载 {} 个词条", dictionary.len());

    let input = read_input(&cli.input)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let output = runtime.block_on(rewrite_html(&input, &cli.encoding, &config, dictionary))?;

    write_output(&cli.output, &output.html)?;

    if cli.stats {
        eprintln!("{}", serde_json::to_string(&output)?);
    } else {
        eprintln!("{} replacement(s)", output.replacements);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
