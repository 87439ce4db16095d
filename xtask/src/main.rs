use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const CRATE_DIR: &str = "extension";
const PACKAGE: &str = "f1f12-key-blocker";
const DIST_DIR: &str = "dist";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "F1-F12 Key Blocker task runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the wasm packages (core for background/content, popup with Dioxus)
    Build {
        /// Optimised release build
        #[arg(short, long)]
        release: bool,
    },

    /// Assemble an unpacked extension in dist/
    Package {
        /// Skip the wasm build
        #[arg(long)]
        no_build: bool,
    },

    /// Run the native test suite
    Test,

    /// Run clippy linter
    Clippy,

    /// Remove build outputs
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { release } => build(release),
        Commands::Package { no_build } => package(no_build),
        Commands::Test => test(),
        Commands::Clippy => clippy(),
        Commands::Clean => clean(),
    }
}

fn build(release: bool) -> Result<()> {
    let profile = if release { "--release" } else { "--dev" };

    println!("🔨 Building core package (background + content script)...");
    run_cmd(
        "wasm-pack",
        &[
            "build",
            CRATE_DIR,
            profile,
            "--target",
            "no-modules",
            "--out-dir",
            "static/pkg/core",
            "--",
            "--no-default-features",
        ],
    )?;

    println!("🔨 Building popup package (Dioxus)...");
    run_cmd(
        "wasm-pack",
        &[
            "build",
            CRATE_DIR,
            profile,
            "--target",
            "no-modules",
            "--out-dir",
            "static/pkg/popup",
        ],
    )?;

    println!("✅ wasm packages written to {}/static/pkg", CRATE_DIR);
    Ok(())
}

fn package(no_build: bool) -> Result<()> {
    if !no_build {
        build(true)?;
    }

    let static_dir = Path::new(CRATE_DIR).join("static");
    let dist = PathBuf::from(DIST_DIR);

    let _ = fs::remove_dir_all(&dist);
    copy_dir(&static_dir, &dist)?;

    // wasm-pack drops a .gitignore and package.json into each pkg dir
    for pkg in ["core", "popup"] {
        for extra in [".gitignore", "package.json"] {
            let _ = fs::remove_file(dist.join("pkg").join(pkg).join(extra));
        }
    }

    if !dist.join("pkg/core").exists() {
        anyhow::bail!("dist/pkg/core is missing, run `cargo xtask build` first");
    }

    println!("📦 Unpacked extension ready in {}/", DIST_DIR);
    println!();
    println!("Next steps:");
    println!("  chrome://extensions -> Developer mode -> Load unpacked -> {}", DIST_DIR);
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("Failed to create {}", to.display()))?;
    for entry in fs::read_dir(from).with_context(|| format!("Failed to read {}", from.display()))? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn test() -> Result<()> {
    println!("🧪 Running native tests...");
    run_cmd("cargo", &["test", "--package", PACKAGE, "--no-default-features"])?;
    Ok(())
}

fn clippy() -> Result<()> {
    println!("🔍 Running clippy on workspace (warnings as errors)...");
    run_cmd(
        "cargo",
        &[
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ],
    )?;
    Ok(())
}

fn clean() -> Result<()> {
    println!("🧹 Removing build outputs...");
    let _ = fs::remove_dir_all(DIST_DIR);
    let _ = fs::remove_dir_all(Path::new(CRATE_DIR).join("static/pkg"));
    run_cmd("cargo", &["clean"])?;
    Ok(())
}

fn run_cmd(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to run: {} {}", program, args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("Command failed: {} {}", program, args.join(" "));
    }

    Ok(())
}
