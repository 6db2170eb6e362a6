use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use jvm_remap::{
    CancelToken, ClassInput, RemapConfig, RemapRun,
    hierarchy::{ClassPath, ClassPathChain, classpath},
    parse_mappings,
};

#[derive(Parser)]
#[command(name = "jvm-remap")]
#[command(about = "Rename classes and members in compiled JVM class files")]
#[command(version)]
struct Cli {
    /// Mapping file with `class`, `field` and `method` entries
    #[arg(short, long, value_name = "FILE")]
    mappings: PathBuf,

    /// Directories, jars or jmods to resolve the class hierarchy against
    #[arg(short, long = "classpath", value_name = "PATH")]
    classpath: Vec<PathBuf>,

    /// JSON run configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory, classes are written to <DIR>/<internal name>.class
    #[arg(short, long, value_name = "DIR", default_value = "out")]
    out: PathBuf,

    /// Class files or jars to remap
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RemapConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => RemapConfig::default(),
    };
    let text = fs::read_to_string(&cli.mappings)
        .with_context(|| format!("reading mappings {}", cli.mappings.display()))?;
    let symbols = parse_mappings(&text)?;

    let mut chain = ClassPathChain::default();
    for entry in &cli.classpath {
        chain.push(
            classpath::open(entry)
                .with_context(|| format!("opening classpath entry {}", entry.display()))?,
        );
    }
    let classpath: Arc<dyn ClassPath> = Arc::new(chain);

    let mut inputs = Vec::new();
    for input in &cli.inputs {
        collect_inputs(input, &mut inputs)?;
    }

    let run = RemapRun::new(config, Arc::new(symbols), classpath);
    let report = run.run(inputs, &CancelToken::new())?;
    for (class_name, bytes) in report.written() {
        let path = cli.out.join(format!("{class_name}.class"));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    for diagnostic in &report.diagnostics {
        eprintln!("warning: {diagnostic}");
    }
    println!("{report}");

    if !report.is_success() {
        bail!("some classes could not be remapped");
    }
    Ok(())
}

fn collect_inputs(path: &Path, inputs: &mut Vec<ClassInput>) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("class") => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            inputs.push(ClassInput::new(path.display().to_string(), bytes));
        }
        Some("jar") => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let mut archive = zip::ZipArchive::new(file)?;
            for index in 0..archive.len() {
                let mut entry = archive.by_index(index)?;
                if !entry.is_file() || !entry.name().ends_with(".class") {
                    continue;
                }
                let id = format!("{}!{}", path.display(), entry.name());
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                inputs.push(ClassInput::new(id, bytes));
            }
        }
        _ => bail!("{} is neither a .class nor a .jar file", path.display()),
    }
    Ok(())
}
