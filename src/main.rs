use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use macchiato::jvm::read_class_file;
use macchiato::loader::ClassRegistry;
use macchiato::runtime::Runtime;

/// Explicit run configuration; there is no ambient process state.
struct VmConfig {
    class_path: PathBuf,
    main_class: String,
}

impl VmConfig {
    fn from_args() -> Option<VmConfig> {
        let mut args = env::args().skip(1);
        let class_path = PathBuf::from(args.next()?);
        let main_class = args.next()?;
        Some(VmConfig {
            class_path,
            main_class,
        })
    }
}

/// Collect every `.class` file under `dir`, keyed by file stem.
fn collect_class_files(
    dir: &Path,
    sources: &mut Vec<(String, Vec<u8>)>,
) -> Result<(), Box<dyn Error>> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_class_files(&path, sources)?;
        } else if path.extension().is_some_and(|ext| ext == "class") {
            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| format!("unreadable file name {}", path.display()))?
                .to_owned();
            sources.push((name, read_class_file(&path)?));
        }
    }
    Ok(())
}

fn run(config: &VmConfig) -> Result<(), Box<dyn Error>> {
    let mut sources = Vec::new();
    collect_class_files(&config.class_path, &mut sources)?;
    let registry = ClassRegistry::load(sources)?;
    let mut runtime = Runtime::new(registry);
    runtime.run_main(&config.main_class)?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(config) = VmConfig::from_args() else {
        eprintln!("usage: macchiato <class-path> <main-class>");
        return ExitCode::FAILURE;
    };
    if let Err(err) = run(&config) {
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
