use clap::Parser;
use flowsim_rs::profile::{build_profile, compile, ProfileSpec};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "profile-compile",
    about = "Compile a traffic profile spec (JSON) into the engine program database"
)]
struct Args {
    /// Path to the profile spec JSON
    #[arg(long)]
    profile: PathBuf,

    /// Output file; stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    /// Pretty-print the compiled JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();

    let raw = match fs::read_to_string(&args.profile) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("error: read {}: {e}", args.profile.display());
            return ExitCode::from(2);
        }
    };
    let spec: ProfileSpec = match serde_json::from_str(&raw) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("error: parse {}: {e}", args.profile.display());
            return ExitCode::from(2);
        }
    };
    let profile = match build_profile(&spec) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let compiled = compile(&profile);
    let json = if args.pretty {
        compiled.to_json_pretty()
    } else {
        compiled.to_json()
    };

    match &args.out {
        Some(path) => {
            if let Err(e) = fs::write(path, json) {
                eprintln!("error: write {}: {e}", path.display());
                return ExitCode::from(2);
            }
            eprintln!("wrote compiled profile to {}", path.display());
        }
        None => println!("{json}"),
    }
    ExitCode::SUCCESS
}
