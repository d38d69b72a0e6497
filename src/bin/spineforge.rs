use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use spineforge::{
    AssetRepository, CharacterSpec, PipelineDriver, PipelineOptions, PresetCatalog, ServiceOutcome,
    Services, StageStatus,
    services::{self, IllustrationRequest, IllustrationService as _, StableDiffusionClient},
};

#[derive(Parser, Debug)]
#[command(name = "spineforge", version)]
struct Cli {
    /// Log at debug level instead of info.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline over a batch of character specs.
    Batch(BatchArgs),
    /// Generate a single illustration from a config file or a raw prompt.
    Illustrate(IllustrateArgs),
    /// Split an illustration into named part images.
    Segment(SegmentArgs),
    /// Build a skeleton document from segmented parts.
    Rig(RigArgs),
    /// Add preset (or explicitly named) animations to a skeleton document.
    Animate(AnimateArgs),
    /// Write the manifest and copy spine assets to an export directory.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// Character list (CSV or JSON).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output root; one directory per character is created below it.
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Preset store JSON.
    #[arg(long, default_value = "config/presets.json")]
    presets: PathBuf,

    /// Skip characters that are already rigged.
    #[arg(long)]
    skip_existing: bool,

    /// Call the illustration API instead of failing the stage offline.
    #[arg(long)]
    use_api: bool,

    /// Illustration API base URL (default: $SD_API_URL or localhost).
    #[arg(long)]
    api_url: Option<String>,

    /// Per-service-call timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[derive(Parser, Debug)]
struct IllustrateArgs {
    /// Character config JSON (as written into each character directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Raw prompt, bypassing config-based prompt construction.
    #[arg(long)]
    prompt: Option<String>,

    /// Output root; the image lands in `{out}/{character_id}/illustration.png`.
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Illustration API base URL (default: $SD_API_URL or localhost).
    #[arg(long)]
    api_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    /// Input illustration PNG.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Parts output directory.
    #[arg(long, default_value = "parts")]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RigArgs {
    /// Parts directory (containing metadata.json).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Spine output directory.
    #[arg(long)]
    out: PathBuf,

    /// Bone preset name.
    #[arg(long, default_value = "humanoid")]
    preset: String,

    /// Preset store JSON.
    #[arg(long, default_value = "config/presets.json")]
    presets: PathBuf,
}

#[derive(Parser, Debug)]
struct AnimateArgs {
    /// Spine directory (containing skeleton.json).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Animation preset name.
    #[arg(long, default_value = "combat")]
    preset: String,

    /// Explicit animation names, overriding the preset.
    #[arg(long, num_args = 1..)]
    animations: Option<Vec<String>>,

    /// Preset store JSON.
    #[arg(long, default_value = "config/presets.json")]
    presets: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Character directory (containing spine/).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Export target (default: `{character}/export`).
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Batch(args) => cmd_batch(args),
        Command::Illustrate(args) => cmd_illustrate(args),
        Command::Segment(args) => cmd_segment(args),
        Command::Rig(args) => cmd_rig(args),
        Command::Animate(args) => cmd_animate(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn load_catalog(path: &Path) -> PresetCatalog {
    match PresetCatalog::load(path) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("warning: {e}; using built-in preset defaults");
            PresetCatalog::default()
        }
    }
}

fn api_url(flag: Option<String>) -> String {
    flag.unwrap_or_else(services::default_api_url)
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let roster = spineforge::load_roster(&args.in_path)?;
    eprintln!("{} characters to process", roster.len());

    let catalog = load_catalog(&args.presets);
    let repo = AssetRepository::new(&args.out);
    let timeout = Duration::from_secs(args.timeout);
    let services = if args.use_api {
        Services::with_illustration_api(api_url(args.api_url), timeout)?
    } else {
        Services::offline()
    };

    let driver = PipelineDriver::new(
        &repo,
        &catalog,
        &services,
        PipelineOptions {
            skip_existing: args.skip_existing,
        },
    );
    let report = driver.run_batch(&roster);

    for outcome in &report.outcomes {
        if outcome.skipped {
            eprintln!("  {}: skipped (already rigged)", outcome.character_id);
            continue;
        }
        let completed = outcome
            .stages
            .iter()
            .filter(|(_, s)| *s == StageStatus::Completed)
            .count();
        eprintln!(
            "  {}: {completed}/{} stages completed, animations: [{}]",
            outcome.character_id,
            outcome.stages.len(),
            outcome.animations_added.join(", ")
        );
    }
    eprintln!("done: {}/{} succeeded", report.succeeded, report.attempted);
    Ok(())
}

fn cmd_illustrate(args: IllustrateArgs) -> anyhow::Result<()> {
    let (character_id, request) = match (&args.config, &args.prompt) {
        (Some(config), _) => {
            let spec = read_spec(config)?;
            let request = IllustrationRequest::from_spec(&spec);
            (spec.character_id, request)
        }
        (None, Some(prompt)) => {
            let spec = CharacterSpec {
                character_id: "char_manual".to_string(),
                ..serde_json::from_str("{}")?
            };
            let mut request = IllustrationRequest::from_spec(&spec);
            request.prompt = prompt.clone();
            ("char_manual".to_string(), request)
        }
        (None, None) => anyhow::bail!("pass --config or --prompt"),
    };

    eprintln!("character: {character_id}");
    eprintln!("prompt: {}", request.prompt);

    let client = StableDiffusionClient::new(
        api_url(args.api_url),
        Duration::from_secs(args.timeout),
    )?;
    match client.generate(&request) {
        ServiceOutcome::Success(png_bytes) => {
            let repo = AssetRepository::new(&args.out);
            std::fs::create_dir_all(repo.character_dir(&character_id))
                .with_context(|| "create character dir")?;
            repo.write_illustration(&character_id, &png_bytes)?;
            eprintln!("wrote {}", repo.illustration_path(&character_id).display());
            Ok(())
        }
        ServiceOutcome::Failure(msg) => anyhow::bail!("generation failed: {msg}"),
        ServiceOutcome::TimedOut => anyhow::bail!("generation timed out"),
    }
}

fn cmd_segment(args: SegmentArgs) -> anyhow::Result<()> {
    let metadata = spineforge::parts::split_template(&args.in_path, &args.out)?;
    write_json(&args.out.join("metadata.json"), &metadata)?;
    eprintln!("wrote {} parts to {}", metadata.parts.len(), args.out.display());
    Ok(())
}

fn cmd_rig(args: RigArgs) -> anyhow::Result<()> {
    let metadata_path = args.in_path.join("metadata.json");
    let metadata: spineforge::PartsMetadata = if metadata_path.exists() {
        let file = File::open(&metadata_path)
            .with_context(|| format!("open '{}'", metadata_path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse '{}'", metadata_path.display()))?
    } else {
        spineforge::PartsMetadata::default()
    };

    let catalog = load_catalog(&args.presets);
    let doc = spineforge::synthesize_skeleton(&metadata, &catalog.bone_preset(&args.preset));

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create '{}'", args.out.display()))?;
    write_json(&args.out.join("skeleton.json"), &doc)?;
    eprintln!(
        "rig complete: {} bones, {} slots -> {}",
        doc.bones.len(),
        doc.slots.len(),
        args.out.join("skeleton.json").display()
    );
    Ok(())
}

fn cmd_animate(args: AnimateArgs) -> anyhow::Result<()> {
    let skeleton_path = args.in_path.join("skeleton.json");
    let file = File::open(&skeleton_path)
        .with_context(|| format!("open '{}'", skeleton_path.display()))?;
    let mut doc: serde_json::Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse '{}'", skeleton_path.display()))?;

    let names = match args.animations {
        Some(names) => names,
        None => load_catalog(&args.presets).animation_preset(&args.preset),
    };

    let (clips, added) = spineforge::animation::synthesize_all(&names);
    spineforge::skeleton::merge_animations_into(&mut doc, &clips)?;
    write_json(&skeleton_path, &doc)?;
    eprintln!("animations added: [{}]", added.join(", "));
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let character_id = args
        .in_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("'{}' has no directory name", args.in_path.display()))?
        .to_string();
    let root = args.in_path.parent().unwrap_or_else(|| Path::new("."));
    let repo = AssetRepository::new(root);

    let manifest = repo.write_manifest(&character_id)?;
    let copied = repo.export(&character_id, args.out.as_deref())?;
    eprintln!(
        "exported {} files, {} animations",
        copied.len(),
        manifest.animations.len()
    );
    Ok(())
}

fn read_spec(path: &Path) -> anyhow::Result<CharacterSpec> {
    let file = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let spec = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parse config '{}'", path.display()))?;
    Ok(spec)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("write '{}'", path.display()))?;
    Ok(())
}
