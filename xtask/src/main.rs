use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Resource files the sample apps look for, relative to the resource root.
const RESOURCES: &[(&str, &str)] = &[
    ("quarto-viewer", "teapot/teapot_normal.png"),
    ("quarto-viewer", "teapot/teapot_disp.png"),
    ("both", "light/light.obj"),
    ("twinstick", "models/map.obj"),
    ("twinstick", "models/shed.obj"),
    ("twinstick", "models/silo.obj"),
    ("twinstick", "models/tree.obj"),
    ("twinstick", "models/streetlamp.obj"),
    ("twinstick", "skybox/posx.png"),
    ("twinstick", "skybox/negx.png"),
    ("twinstick", "skybox/posy.png"),
    ("twinstick", "skybox/negy.png"),
    ("twinstick", "skybox/posz.png"),
    ("twinstick", "skybox/negz.png"),
];

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for scenegraph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
    /// Report which resource files the sample apps will find
    Assets {
        #[arg(long, default_value = "res")]
        root: PathBuf,
    },
    /// Run a sample app in release mode
    Run {
        #[arg(value_enum)]
        app: SampleApp,
        /// Extra arguments passed to the app
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SampleApp {
    Quarto,
    Twinstick,
}

impl SampleApp {
    fn package(self) -> &'static str {
        match self {
            SampleApp::Quarto => "quarto-viewer",
            SampleApp::Twinstick => "twinstick",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            cargo("fmt --check", &["fmt", "--all", "--", "--check"])?;
            run_clippy()?;
            cargo("test", &["test", "--workspace"])?;
            cargo("doc", &["doc", "--workspace", "--no-deps"])?;
        }
        Commands::Fmt => cargo("fmt --check", &["fmt", "--all", "--", "--check"])?,
        Commands::Clippy => run_clippy()?,
        Commands::Test => cargo("test", &["test", "--workspace"])?,
        Commands::Doc => cargo("doc", &["doc", "--workspace", "--no-deps"])?,
        Commands::Build => cargo("build", &["build", "--workspace"])?,
        Commands::Assets { root } => report_assets(&root),
        Commands::Run { app, args } => {
            let mut full = vec!["run", "--release", "-p", app.package(), "--"];
            full.extend(args.iter().map(String::as_str));
            cargo("run", &full)?;
        }
    }

    Ok(())
}

fn cargo(label: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {label}");
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {label} failed");
    }
    Ok(())
}

fn run_clippy() -> Result<()> {
    cargo(
        "clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
    )
}

/// Missing files are not errors: the apps fall back to placeholders.
fn report_assets(root: &Path) {
    println!("==> Resources under {}", root.display());
    let mut missing = 0;
    for (app, file) in RESOURCES {
        let found = root.join(file).is_file();
        if !found {
            missing += 1;
        }
        println!("  [{}] {file} ({app})", if found { "ok" } else { "--" });
    }
    if missing > 0 {
        println!("{missing} missing; those apps will use placeholder geometry or skip textures");
    }
}
