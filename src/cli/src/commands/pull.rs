//! `eci pull` command.

use std::fmt;
use std::path::PathBuf;

use clap::Args;

use eci_core::{Descriptor, EciError, PullConfig};
use eci_registry::{Artifact, Disk, Puller, RegistryAuth, RegistryFetch, StatusTracker, Target};

#[derive(Args)]
pub struct PullArgs {
    /// Image reference (e.g., "lfedge/eve-vm:1.0", "ghcr.io/org/vm:tag")
    pub image: String,

    /// Directory where to install the ECI (default: current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// File where to install only the ECI root disk
    #[arg(long, conflicts_with = "dir")]
    pub root: Option<PathBuf>,

    /// Pull configuration file (YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print each unit as it is downloaded
    #[arg(long)]
    pub verbose: bool,

    /// Talk to the registry over plain HTTP
    #[arg(long)]
    pub plain_http: bool,
}

pub async fn execute(args: PullArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => PullConfig::from_file(path)?,
        None => PullConfig::default(),
    };

    let target = match &args.root {
        Some(root) => Target::root_file(root),
        None => {
            let dir = match &args.dir {
                Some(dir) => dir.clone(),
                None => std::env::current_dir()?,
            };
            Target::Directory(dir)
        }
    };

    let auth = RegistryAuth::from_env();
    let fetcher = if args.plain_http {
        RegistryFetch::insecure(auth, config.copy_buffer_size)
    } else {
        RegistryFetch::new(auth, config.copy_buffer_size)
    };

    let puller = Puller::new(args.image.clone()).with_config(config);
    let cancel = puller.cancellation();
    let progress = StatusTracker::stdout();
    tracing::debug!(image = %args.image, target = ?target, "Pulling ECI");

    let (desc, artifact) = tokio::select! {
        pulled = puller.pull(&target, args.verbose, &progress, &fetcher) => pulled?,
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            return Err(EciError::Cancelled.into());
        }
    };

    print!("{}", render(&args.image, &desc, &target, &artifact)?);
    Ok(())
}

/// Summary printed after a successful pull.
fn render(
    image: &str,
    desc: &Descriptor,
    target: &Target,
    artifact: &Artifact,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_summary(&mut out, image, desc, target, artifact)?;
    Ok(out)
}

fn write_summary(
    out: &mut impl fmt::Write,
    image: &str,
    desc: &Descriptor,
    target: &Target,
    artifact: &Artifact,
) -> fmt::Result {
    match target {
        Target::Directory(dir) => {
            writeln!(
                out,
                "Pulled image {} with digest {} to directory {}",
                image,
                desc.digest,
                dir.display()
            )?;
            writeln!(out, "file locations and types:")?;
            writeln!(out, "\tkernel: {}", display_path(&artifact.kernel))?;
            writeln!(out, "\tinitrd: {}", display_path(&artifact.initrd))?;
            write_root(out, artifact)?;
            for (i, disk) in artifact.disks.iter().enumerate() {
                writeln!(out, "\tadditional disk {}: {}", i, disk_line(disk))?;
            }
        }
        Target::Files { root, .. } => {
            writeln!(
                out,
                "Pulled image root of {} with digest {} to file {}",
                image,
                desc.digest,
                display_path(root)
            )?;
            writeln!(out, "file locations and types:")?;
            write_root(out, artifact)?;
        }
    }
    Ok(())
}

fn write_root(out: &mut impl fmt::Write, artifact: &Artifact) -> fmt::Result {
    match &artifact.root {
        Some(disk) => writeln!(out, "\troot: {}", disk_line(disk)),
        None => writeln!(out, "\troot: "),
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn disk_line(disk: &Disk) -> String {
    format!("{} {}", disk.path.display(), disk.disk_type)
}
