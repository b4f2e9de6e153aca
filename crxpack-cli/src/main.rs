use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crxpack_core::manifest::{MissingFilePolicy, PackManifest};
use crxpack_core::pack::{KeySource, PackConfig, Packer};
use crxpack_core::path_safety::PathPolicy;
use crxpack_core::verify::verify_container;

#[derive(Parser)]
#[command(name = "crxpack", version, about = "Build signed CRX extension packages")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Package an extension directory into a signed container
    Pack {
        source_dir: PathBuf,
        /// Container path (default: <source_dir>/../<dir name>.crx)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON file listing the files to package: {"files": [...]}
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Fail instead of skipping manifest files that do not exist
        #[arg(long, default_value_t = false)]
        strict: bool,
        /// Sign with an existing PKCS#8 PEM key instead of a fresh one
        #[arg(long)]
        key: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        follow_symlinks: bool,
        /// Print the pack report as JSON on stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check signature and archive layout of a container
    Verify { container: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Pack { source_dir, output, manifest, strict, key, follow_symlinks, json } => {
            pack(&source_dir, output, manifest, strict, key, follow_symlinks, json)?
        }
        Cmd::Verify { container } => {
            if !verify(&container)? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn default_output(source_dir: &Path) -> Result<PathBuf> {
    let abs = std::fs::canonicalize(source_dir)
        .with_context(|| format!("resolve {}", source_dir.display()))?;
    let name = abs
        .file_name()
        .ok_or_else(|| anyhow!("cannot derive a package name from {}", abs.display()))?;
    let parent = abs.parent().unwrap_or(&abs);
    Ok(parent.join(format!("{}.crx", name.to_string_lossy())))
}

fn pack(
    source_dir: &Path,
    output: Option<PathBuf>,
    manifest: Option<PathBuf>,
    strict: bool,
    key: Option<PathBuf>,
    follow_symlinks: bool,
    json: bool,
) -> Result<()> {
    let output = match output {
        Some(p) => p,
        None => default_output(source_dir)?,
    };
    let manifest = match manifest {
        Some(p) => PackManifest::load(&p)?,
        None => PackManifest::default(),
    };
    let cfg = PackConfig {
        manifest,
        missing: if strict { MissingFilePolicy::Fail } else { MissingFilePolicy::Skip },
        paths: PathPolicy { follow_symlinks },
        key: key.map(KeySource::Pem).unwrap_or_default(),
    };

    let report = Packer::pack(source_dir, &output, &cfg)
        .with_context(|| format!("packing {}", source_dir.display()))?;

    for name in &report.skipped {
        eprintln!("Skipping missing file: {}", name);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    eprintln!(
        "Packed {} file(s), {} bytes",
        report.entries.len(),
        report.container_len
    );
    eprintln!("CRX file created: {}", report.container_path.display());
    eprintln!("Private key saved: {}", report.key_path.display());
    eprintln!("Extension ID: {}", report.extension_id);
    Ok(())
}

fn verify(path: &Path) -> Result<bool> {
    let r = verify_container(path).with_context(|| format!("verifying {}", path.display()))?;
    eprintln!(
        "Header length {} (key {} + signature {}), archive {} bytes",
        r.header_length, r.public_key_len, r.signature_len, r.archive_len
    );
    for e in &r.entries {
        eprintln!(
            "  {:32} {:>8} -> {:>8}  crc {:08x}  @{}",
            e.name, e.uncompressed_size, e.compressed_size, e.crc32, e.offset
        );
    }
    eprintln!("Extension ID: {}", r.extension_id);
    eprintln!(
        "Signature={}; Structure={}",
        if r.signature_ok { "OK" } else { "MISMATCH" },
        r.structure_error.as_deref().unwrap_or("OK")
    );
    let ok = r.is_ok();
    if ok { println!("OK"); } else { println!("BAD"); }
    Ok(ok)
}
