//! Pulled artifact: where each part of an ECI landed.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use eci_core::error::EciError;
use eci_core::media_type::{
    ECI_DISK_ISO, ECI_DISK_OVA, ECI_DISK_QCOW, ECI_DISK_QCOW2, ECI_DISK_RAW, ECI_DISK_VHD,
    ECI_DISK_VHDX, ECI_DISK_VMDK,
};
use eci_core::Descriptor;

use crate::target::Target;

/// Role annotation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Kernel,
    Initrd,
    RootDisk,
    AdditionalDisk,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Kernel => "kernel",
            Role::Initrd => "initrd",
            Role::RootDisk => "disk-root",
            Role::AdditionalDisk => "disk-additional",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kernel" => Ok(Role::Kernel),
            "initrd" => Ok(Role::Initrd),
            "disk-root" => Ok(Role::RootDisk),
            "disk-additional" => Ok(Role::AdditionalDisk),
            other => Err(EciError::Other(format!("unknown role '{}'", other))),
        }
    }
}

/// Disk image format, taken from the layer's real media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskType {
    Raw,
    Vhd,
    Vmdk,
    Iso,
    Qcow,
    Qcow2,
    Ova,
    Vhdx,
    Unknown,
}

impl DiskType {
    pub fn from_media_type(media_type: Option<&str>) -> Self {
        match media_type {
            Some(ECI_DISK_RAW) => DiskType::Raw,
            Some(ECI_DISK_VHD) => DiskType::Vhd,
            Some(ECI_DISK_VMDK) => DiskType::Vmdk,
            Some(ECI_DISK_ISO) => DiskType::Iso,
            Some(ECI_DISK_QCOW) => DiskType::Qcow,
            Some(ECI_DISK_QCOW2) => DiskType::Qcow2,
            Some(ECI_DISK_OVA) => DiskType::Ova,
            Some(ECI_DISK_VHDX) => DiskType::Vhdx,
            _ => DiskType::Unknown,
        }
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiskType::Raw => "raw",
            DiskType::Vhd => "vhd",
            DiskType::Vmdk => "vmdk",
            DiskType::Iso => "iso",
            DiskType::Qcow => "qcow",
            DiskType::Qcow2 => "qcow2",
            DiskType::Ova => "ova",
            DiskType::Vhdx => "vhdx",
            DiskType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub path: PathBuf,
    pub disk_type: DiskType,
}

/// The boot pieces of a pulled ECI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub kernel: Option<PathBuf>,
    pub initrd: Option<PathBuf>,
    pub root: Option<Disk>,
    pub disks: Vec<Disk>,
}

impl Artifact {
    /// Map pulled layers onto artifact slots by their role annotation.
    ///
    /// Layers without a title or role, or that the target did not write,
    /// are skipped.
    pub fn from_layers(layers: &[Descriptor], target: &Target) -> Self {
        let mut artifact = Artifact::default();

        for layer in layers {
            let Some(title) = layer.title() else {
                continue;
            };
            let Some(role) = layer.role().and_then(|r| r.parse::<Role>().ok()) else {
                tracing::debug!(title, digest = %layer.digest, "Layer has no known role");
                continue;
            };
            let Some(path) = target.location(role, title) else {
                continue;
            };
            let disk = || Disk {
                path: path.clone(),
                disk_type: DiskType::from_media_type(layer.real_media_type()),
            };

            match role {
                Role::Kernel => artifact.kernel = Some(path.clone()),
                Role::Initrd => artifact.initrd = Some(path.clone()),
                Role::RootDisk => artifact.root = Some(disk()),
                Role::AdditionalDisk => artifact.disks.push(disk()),
            }
        }

        artifact
    }
}
