mod logic;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use nexus_game::EngineConfig;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use logic::{GameplayStrategy, RunReport, Simulator};

#[derive(Debug, Parser)]
#[command(name = "nexus-tester", version = "0.1.0")]
#[command(about = "Headless autopilot runs and invariant checks for Nexus Chronicles")]
struct Args {
    /// List the autopilot strategies and exit
    #[arg(long)]
    list_strategies: bool,

    /// Seeds to run (comma-separated)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Autopilot actions per run
    #[arg(long, default_value_t = 200)]
    turns: u32,

    /// Strategy to fly
    #[arg(long, default_value = "all")]
    #[arg(value_parser = ["trader", "explorer", "fighter", "all"])]
    strategy: String,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Engine tunables as JSON; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print every notification and jump as runs progress
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_strategies {
        let mut output_target = OutputTarget::new(args.output.clone())?;
        writeln!(output_target.writer(), "Available strategies:")?;
        for strategy in GameplayStrategy::ALL {
            writeln!(
                output_target.writer(),
                "  {:10} - {}",
                strategy.key(),
                strategy.description()
            )?;
        }
        output_target.flush_inner()?;
        return Ok(());
    }

    announce_banner();

    let config = load_config(args.config.as_ref())?;
    let seeds = parse_seeds(&args.seeds)?;
    let strategies = GameplayStrategy::parse_list(&args.strategy);
    let simulator = Simulator::new(config, args.verbose);
    let start_time = Instant::now();

    let mut results = Vec::new();
    for &seed in &seeds {
        for &strategy in &strategies {
            if args.verbose {
                println!("{} {strategy} seed {seed}", "▶".bright_blue());
            }
            results.push(simulator.run(seed, strategy, args.turns)?);
        }
    }

    write_reports(&args, &results, start_time)?;

    if results.iter().any(|result| !result.passed()) {
        eprintln!("{}", "Invariant violations detected".red().bold());
        std::process::exit(1);
    }
    Ok(())
}

fn announce_banner() {
    println!("{}", "🚀 Nexus Chronicles Autopilot".bright_cyan().bold());
    println!("{}", "=============================".cyan());
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

fn parse_seeds(raw: &str) -> Result<Vec<u64>> {
    let seeds = split_csv(raw)
        .iter()
        .map(|token| {
            token
                .parse::<u64>()
                .with_context(|| format!("invalid seed '{token}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    if seeds.is_empty() {
        bail!("no seeds given");
    }
    Ok(seeds)
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    EngineConfig::from_json(&json).with_context(|| format!("invalid config {}", path.display()))
}

fn write_reports(args: &Args, results: &[RunReport], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => logic::reports::generate_markdown_report(&mut output_target, results)?,
        _ => logic::reports::generate_console_report(
            &mut output_target,
            results,
            start_time.elapsed(),
        )?,
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_parse_from_csv() {
        assert_eq!(parse_seeds(" 1, ,42,7 ").unwrap(), vec![1, 42, 7]);
        assert!(parse_seeds("").is_err());
        assert!(parse_seeds("1,abc").is_err());
    }

    #[test]
    fn missing_config_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn config_file_overrides_fields() {
        let path = std::env::temp_dir().join("nexus-tester-config.json");
        std::fs::write(&path, r#"{ "event_chance": 0.5 }"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!((config.event_chance - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.autosave_slot, "auto");
    }

    #[test]
    fn args_parse_defaults() {
        let args = Args::parse_from(["nexus-tester"]);
        assert_eq!(args.strategy, "all");
        assert_eq!(args.report, "console");
        assert_eq!(args.turns, 200);
        assert!(Args::try_parse_from(["nexus-tester", "--strategy", "pirate"]).is_err());
    }
}
