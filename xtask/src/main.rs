use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "x")]
#[command(about = "Development automation for coresync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all CI checks (fmt, clippy, test, soak)
    Ci {
        #[arg(long)]
        verbose: bool,
    },
    /// Quick checks before commit (fmt, clippy)
    Check {
        #[arg(long)]
        verbose: bool,
    },
    /// Format code
    Fmt {
        #[arg(long)]
        check: bool,
    },
    /// Run clippy with warnings denied
    Clippy {
        #[arg(long)]
        fix: bool,
    },
    /// Run tests, optionally limited to library modules or a test suite
    Test {
        /// Library modules to test (repeatable)
        #[arg(short, long, value_enum)]
        module: Vec<Module>,
        /// Integration test suite to run (savestates, concurrency, channels)
        #[arg(long, conflicts_with = "module")]
        suite: Option<String>,
        /// Run doc tests only
        #[arg(long, conflicts_with_all = ["module", "suite"])]
        doc: bool,
    },
    /// Run criterion benchmarks
    Bench {
        /// Only run benchmarks whose name contains this string
        filter: Option<String>,
    },
    /// Run repeated save/load round trips through the coresync binary
    Soak {
        /// Number of runs, each saving at a different frame
        #[arg(short = 'r', long, default_value = "10")]
        rounds: u32,
        /// Frames to advance between save and load in each run
        #[arg(short = 'n', long, default_value = "1000")]
        frames: u64,
        /// System whose metadata to use
        #[arg(short = 's', long, default_value = "nes")]
        system: String,
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Module {
    Session,
    Snapshot,
    Sink,
    Driver,
    Config,
    VirtualCore,
}

impl Module {
    fn path(self) -> &'static str {
        match self {
            Module::Session => "core::session",
            Module::Snapshot => "core::snapshot",
            Module::Sink => "core::sink",
            Module::Driver => "core::driver",
            Module::Config => "core::config",
            Module::VirtualCore => "core::virtual_core",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { verbose } => run_ci(verbose),
        Commands::Check { verbose } => run_check(verbose),
        Commands::Fmt { check } => run_fmt(check),
        Commands::Clippy { fix } => run_clippy(fix),
        Commands::Test { module, suite, doc } => run_test(&module, suite.as_deref(), doc),
        Commands::Bench { filter } => run_bench(filter.as_deref()),
        Commands::Soak {
            rounds,
            frames,
            system,
            release,
        } => run_soak(rounds, frames, &system, release),
    }
}

fn run_ci(verbose: bool) -> Result<()> {
    println!("{}", "=== Running CI Pipeline ===".bold().blue());

    let start = Instant::now();

    run_task("Format Check", || run_fmt(true), verbose)?;
    run_task("Clippy", || run_clippy(false), verbose)?;
    run_task("Test", || run_test(&[], None, false), verbose)?;
    run_task("Soak", || run_soak(3, 300, "nes", false), verbose)?;

    print_elapsed("✓ CI passed in", start);
    Ok(())
}

fn run_check(verbose: bool) -> Result<()> {
    println!("{}", "=== Running Quick Checks ===".bold().blue());

    let start = Instant::now();

    run_task("Format Check", || run_fmt(true), verbose)?;
    run_task("Clippy", || run_clippy(false), verbose)?;

    print_elapsed("✓ Checks passed in", start);
    Ok(())
}

fn run_fmt(check: bool) -> Result<()> {
    let mut cmd = cargo("fmt");
    cmd.arg("--all");

    if check {
        cmd.arg("--").arg("--check");
    }

    execute_command(&mut cmd)
}

fn run_clippy(fix: bool) -> Result<()> {
    let mut cmd = cargo("clippy");
    cmd.arg("--workspace").arg("--all-targets");

    if fix {
        cmd.arg("--fix");
    } else {
        cmd.arg("--").arg("-D").arg("warnings");
    }

    execute_command(&mut cmd)
}

fn run_test(modules: &[Module], suite: Option<&str>, doc: bool) -> Result<()> {
    if doc {
        let mut cmd = cargo("test");
        cmd.arg("--doc");
        return execute_command(&mut cmd);
    }

    if let Some(suite) = suite {
        println!("{} Running {} suite...", "→".blue(), suite.bold());
        let mut cmd = cargo("test");
        cmd.arg("--test").arg(suite);
        return execute_command(&mut cmd);
    }

    if modules.is_empty() {
        let mut cmd = cargo("test");
        cmd.arg("--workspace");
        return execute_command(&mut cmd);
    }

    // One cargo invocation per module, so failures are reported per module
    let mut failed = Vec::new();
    for module in modules {
        println!("{} Running {} tests...", "→".blue(), module.path().bold());

        let mut cmd = cargo("test");
        cmd.arg("--lib").arg(module.path());

        match execute_command(&mut cmd) {
            Ok(()) => println!("{} {} passed\n", "✓".green(), module.path()),
            Err(_) => {
                println!("{} {} failed\n", "✗".red(), module.path());
                failed.push(module.path());
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Module tests failed: {}", failed.join(", "));
    }
    Ok(())
}

fn run_bench(filter: Option<&str>) -> Result<()> {
    let mut cmd = cargo("bench");
    cmd.arg("--bench").arg("session_bench");

    if let Some(filter) = filter {
        cmd.arg("--").arg(filter);
    }

    execute_command(&mut cmd)
}

fn run_soak(rounds: u32, frames: u64, system: &str, release: bool) -> Result<()> {
    println!("{}", "=== Save State Soak ===".bold().blue());

    if rounds == 0 {
        anyhow::bail!("At least one round is required");
    }

    let rom_path = write_soak_rom()?;

    println!("{} ROM: {}", "✓".green(), rom_path.display().to_string().cyan());
    println!("{} System: {}", "→".blue(), system.bold());
    println!(
        "{} Rounds: {}, frames per round: {}",
        "→".blue(),
        rounds.to_string().bold(),
        frames.to_string().bold()
    );
    println!(
        "{} Build mode: {}",
        "→".blue(),
        if release {
            "release".green().bold()
        } else {
            "debug".yellow().bold()
        }
    );
    println!();

    let start = Instant::now();
    let mut failures = 0;

    for round in 0..rounds {
        let save_at = 1 + u64::from(round) * 37;

        let mut cmd = cargo("run");
        cmd.arg("--quiet").arg("--bin").arg("coresync");

        if release {
            cmd.arg("--release");
        }

        cmd.arg("--")
            .arg(&rom_path)
            .arg("--system")
            .arg(system)
            .arg("--session")
            .arg(format!("soak-{}", round))
            .arg("--save-at")
            .arg(save_at.to_string())
            .arg("-n")
            .arg(frames.to_string())
            .arg("--fps")
            .arg("0");

        if execute_command(&mut cmd).is_ok() {
            println!("{} Round {} (save at frame {})", "✓".green(), round, save_at);
        } else {
            println!("{} Round {} (save at frame {})", "✗".red().bold(), round, save_at);
            failures += 1;
        }
    }

    if failures > 0 {
        println!("\n{} {} of {} rounds failed", "✗".red().bold(), failures, rounds);
        anyhow::bail!("Soak test failed");
    }

    print_elapsed("✓ Soak completed in", start);
    Ok(())
}

/// Deterministic ROM image so soak runs are reproducible
fn write_soak_rom() -> Result<PathBuf> {
    let dir = Path::new("target").join("xtask");
    fs::create_dir_all(&dir)?;

    let path = dir.join("soak.rom");
    let rom: Vec<u8> = (0..64 * 1024u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
        .collect();
    fs::write(&path, rom)?;
    Ok(path)
}

fn run_task<F>(name: &str, task: F, verbose: bool) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    print!("{} {} ... ", "→".blue(), name);

    let start = Instant::now();

    match task() {
        Ok(()) => {
            let elapsed = start.elapsed();
            println!(
                "{} {}",
                "✓".green().bold(),
                if verbose {
                    format!("({:.2}s)", elapsed.as_secs_f64())
                } else {
                    String::new()
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", "✗".red().bold());
            Err(e)
        }
    }
}

fn print_elapsed(label: &str, start: Instant) {
    println!(
        "\n{} {}",
        label.green().bold(),
        format!("{:.2}s", start.elapsed().as_secs_f64()).bold()
    );
}

fn cargo(subcommand: &str) -> Command {
    let mut cmd = Command::new("cargo");
    cmd.arg(subcommand);
    cmd
}

fn execute_command(cmd: &mut Command) -> Result<()> {
    let status = cmd
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()?;

    if !status.success() {
        anyhow::bail!("Command failed with exit code: {}", status);
    }

    Ok(())
}
