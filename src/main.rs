use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use genotype_risk::parsers::{read_input, sample_name_from_path};
use genotype_risk::{
    AnalysisResult, Engine, EngineConfig, FileAnalysis, FileDiscovery, KnowledgeBase,
    ProtocolPriority, ReportFormat, ReportGenerator,
};

/// Genotype risk classification against a curated variant knowledge base
#[derive(Parser, Debug)]
#[command(
    name = "genotype-risk",
    version,
    about = "Classify 23andMe and VCF genotypes against a variant knowledge base",
    long_about = r#"
Detects 23andMe raw data and VCF inputs (optionally gzip/bzip2/xz compressed),
resolves each sample's genotype at every knowledge base variant, classifies it
by genotype table or risk-allele count, and reports per-category risk scores,
recommendations and cross-sample shared risk variants.
"#
)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Enable verbose logging (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze genetic data files or directories
    Analyze(AnalyzeArgs),
    /// Print the detected format of each input
    Detect {
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        inputs: Vec<PathBuf>,
    },
    /// Check a knowledge base for missing or inconsistent fields
    ValidateKb {
        #[arg(value_hint = ValueHint::FilePath)]
        knowledge_base: PathBuf,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Input files or directories
    #[arg(required = true, num_args = 1.., value_hint = ValueHint::AnyPath)]
    inputs: Vec<PathBuf>,

    /// Knowledge base (JSON, or CSV by extension)
    #[arg(short, long, env = "GENOTYPE_RISK_KB", value_hint = ValueHint::FilePath)]
    knowledge_base: PathBuf,

    /// Engine settings in TOML
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Sample name for single-sample 23andMe input (default: the file name)
    #[arg(long)]
    sample_name: Option<String>,

    /// Recursively search directories
    #[arg(short, long)]
    recursive: bool,

    /// Compare risk variants across every analyzed sample
    #[arg(short, long)]
    compare: bool,

    /// Number of threads (0 = auto)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Output directory for reports
    #[arg(short, long, default_value = "./reports")]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Csv,
    Tsv,
    All,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> ReportFormat {
        match format {
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Csv => ReportFormat::Csv,
            OutputFormat::Tsv => ReportFormat::Tsv,
            OutputFormat::All => ReportFormat::All,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
        Commands::Detect { inputs } => detect_formats(&inputs),
        Commands::ValidateKb { knowledge_base } => validate_knowledge_base(&knowledge_base),
        Commands::Analyze(args) => {
            init_thread_pool(args.threads)?;
            info!("Using {} threads", rayon::current_num_threads());
            run_analysis(args)
        }
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("genotype_risk={}", level))
        .with_writer(io::stderr)
        .init();
}

fn init_thread_pool(threads: usize) -> Result<()> {
    let num_threads = if threads == 0 {
        num_cpus::get()
    } else {
        threads
    };

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| anyhow::anyhow!("Failed to initialize thread pool: {}", e))?;

    Ok(())
}

fn detect_formats(inputs: &[PathBuf]) -> Result<()> {
    let config = EngineConfig::default();
    for path in inputs {
        match read_input(path) {
            Ok(content) => {
                let format = genotype_risk::parsers::detect_format_with_limit(
                    &content,
                    config.detection_scan_lines,
                );
                println!("{}\t{}", path.display(), style(format).green());
            }
            Err(e) => println!("{}\t{}", path.display(), style(e).red()),
        }
    }
    Ok(())
}

fn validate_knowledge_base(path: &Path) -> Result<()> {
    let knowledge_base = KnowledgeBase::from_path(path)
        .with_context(|| format!("Failed to load knowledge base {}", path.display()))?;
    let issues = knowledge_base.validate();

    println!(
        "{} {} entries, version {}",
        style("Knowledge base:").bold().cyan(),
        knowledge_base.len(),
        knowledge_base.version().unwrap_or("unversioned")
    );

    if issues.is_empty() {
        println!("{} No issues found", style("✓").green().bold());
        return Ok(());
    }

    for issue in &issues {
        match &issue.rsid {
            Some(rsid) => println!("  {} {}: {}", style("✗").red(), style(rsid).yellow(), issue.message),
            None => println!("  {} {}", style("✗").red(), issue.message),
        }
    }
    anyhow::bail!("{} issue(s) found", issues.len())
}

fn run_analysis(args: AnalyzeArgs) -> Result<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );

    // Step 1: Load knowledge base and engine settings
    pb.set_message("Loading knowledge base...");
    let knowledge_base = KnowledgeBase::from_path(&args.knowledge_base).with_context(|| {
        format!("Failed to load knowledge base {}", args.knowledge_base.display())
    })?;
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(name) = &args.sample_name {
        config = config.with_default_sample_name(name.clone());
    }
    let engine = Engine::new(Arc::new(knowledge_base), config);
    pb.set_position(10);

    // Step 2: Discover files
    pb.set_message("Discovering genetic data files...");
    let discovery =
        FileDiscovery::new(args.recursive).with_scan_lines(engine.config().detection_scan_lines);
    let files_to_process = discovery.discover(&args.inputs)?;
    if files_to_process.is_empty() {
        pb.abandon_with_message("No input files found");
        anyhow::bail!("No 23andMe or VCF files found in the given inputs");
    }
    info!("Found {} files to analyze", files_to_process.len());
    pb.set_position(20);

    // Step 3: Parse and analyze files in parallel
    pb.set_message(format!("Analyzing {} file(s)...", files_to_process.len()));
    let batch: Vec<FileAnalysis> = files_to_process
        .par_iter()
        .filter_map(|path| match analyze_file(&engine, path, args.sample_name.is_none()) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!("Failed to analyze {}: {:#}", path.display(), e);
                None
            }
        })
        .collect();
    pb.set_position(80);

    if batch.is_empty() {
        pb.abandon_with_message("No input could be analyzed");
        anyhow::bail!("None of the {} input file(s) could be analyzed", files_to_process.len());
    }

    // Step 4: Compare across samples
    let comparison = if args.compare {
        pb.set_message("Comparing samples...");
        let analyses: Vec<AnalysisResult> = batch
            .iter()
            .flat_map(|file| file.analyses.iter().cloned())
            .collect();
        Some(engine.compare(&analyses))
    } else {
        None
    };
    pb.set_position(90);

    // Step 5: Generate reports
    pb.set_message("Generating reports...");
    let generator = ReportGenerator::new(&args.output)?;
    let written = generator.generate(&batch, comparison.as_ref(), args.format.into())?;
    pb.set_position(100);
    pb.finish_with_message("Analysis complete!");

    print_summary(&batch);
    if let Some(comparison) = &comparison {
        println!(
            "\n{} {} shared risk variant(s) across {} sample(s)",
            style("Comparison:").bold().cyan(),
            comparison.shared_risk_rsids.len(),
            comparison.sample_ids.len()
        );
    }

    println!(
        "\n{} {} report file(s) saved to: {}",
        style("✓").green().bold(),
        written.len(),
        style(args.output.display()).cyan()
    );

    Ok(())
}

fn analyze_file(engine: &Engine, path: &Path, name_by_file: bool) -> Result<FileAnalysis> {
    let content = read_input(path)?;
    let analysis = match sample_name_from_path(path) {
        Some(name) if name_by_file => engine.analyze_text_as(&content, &name),
        _ => engine.analyze_text(&content),
    }
    .with_context(|| format!("Failed to analyze {}", path.display()))?;
    Ok(analysis.with_source(path.display().to_string()))
}

fn print_summary(batch: &[FileAnalysis]) {
    println!();
    for file in batch {
        println!(
            "{} ({})",
            style(file.source.as_deref().unwrap_or("-")).bold(),
            style(file.format).yellow()
        );
        for analysis in &file.analyses {
            let top = analysis
                .top_category()
                .map(|(category, score)| format!("{} ({})", category, score))
                .unwrap_or_else(|| "none".to_string());
            println!(
                "  {} evaluated {}/{}, risk variants {}, top category {}",
                style(&analysis.sample_id).green(),
                analysis.evaluated_variants.len(),
                analysis.total_variants_seen,
                analysis.risk_rsids().len(),
                top
            );
            let high_priority: Vec<String> = file
                .protocols
                .get(&analysis.sample_id)
                .into_iter()
                .flatten()
                .filter(|protocol| protocol.priority == ProtocolPriority::High)
                .map(|protocol| protocol.category.to_string())
                .collect();
            if !high_priority.is_empty() {
                println!(
                    "    {} {}",
                    style("high priority:").red().bold(),
                    high_priority.join(", ")
                );
            }
        }
    }
}
