//! Media types and the suffix convention that drives decompression.
//!
//! A layer media type may carry `.tar` and `+gzip` suffixes, in that order:
//! `<base>.tar+gzip`, `<base>.tar`, `<base>+gzip` or `<base>`.

/// OCI image manifest.
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index.
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Docker schema 2 manifest.
pub const DOCKER_IMAGE_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Media types stored verbatim, never decoded.
pub const BYPASS_MEDIA_TYPES: &[&str] = &[
    OCI_IMAGE_MANIFEST,
    OCI_IMAGE_INDEX,
    DOCKER_IMAGE_MANIFEST,
];

/// ECI config blob.
pub const ECI_CONFIG: &str = "application/vnd.lfedge.eci.config.v1+json";
/// ECI kernel layer.
pub const ECI_KERNEL: &str = "application/vnd.lfedge.eci.kernel.layer.v1+kernel";
/// ECI initrd layer.
pub const ECI_INITRD: &str = "application/vnd.lfedge.eci.initrd.layer.v1+cpio";
/// Disk layers, one per image format.
pub const ECI_DISK_RAW: &str = "application/vnd.lfedge.disk.layer.v1+raw";
pub const ECI_DISK_VHD: &str = "application/vnd.lfedge.disk.layer.v1+vhd";
pub const ECI_DISK_VMDK: &str = "application/vnd.lfedge.disk.layer.v1+vmdk";
pub const ECI_DISK_ISO: &str = "application/vnd.lfedge.disk.layer.v1+iso";
pub const ECI_DISK_QCOW: &str = "application/vnd.lfedge.disk.layer.v1+qcow";
pub const ECI_DISK_QCOW2: &str = "application/vnd.lfedge.disk.layer.v1+qcow2";
pub const ECI_DISK_OVA: &str = "application/vnd.lfedge.disk.layer.v1+ova";
pub const ECI_DISK_VHDX: &str = "application/vnd.lfedge.disk.layer.v1+vhdx";
/// Anything else carried in an ECI.
pub const ECI_OTHER: &str = "application/vnd.lfedge.eci.other.layer.v1";
/// Standard OCI tar+gzip layer.
pub const OCI_LAYER_TAR_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

const GZIP_SUFFIX: &str = "+gzip";
const TAR_SUFFIX: &str = ".tar";

/// Encodings indicated by a media-type suffix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compression {
    pub gzip: bool,
    pub tar: bool,
}

impl Compression {
    /// Parse the suffixes of a media type. Total: every string parses.
    pub fn from_media_type(media_type: &str) -> Self {
        let (base, gzip) = match media_type.strip_suffix(GZIP_SUFFIX) {
            Some(base) => (base, true),
            None => (media_type, false),
        };
        Self {
            gzip,
            tar: base.ends_with(TAR_SUFFIX),
        }
    }

    /// True when the bytes are stored exactly as they arrive.
    pub fn is_identity(&self) -> bool {
        !self.gzip && !self.tar
    }

    /// Wrap a base media type with these suffixes.
    pub fn apply(&self, base: &str) -> String {
        let mut media_type = base.to_string();
        if self.tar {
            media_type.push_str(TAR_SUFFIX);
        }
        if self.gzip {
            media_type.push_str(GZIP_SUFFIX);
        }
        media_type
    }
}

/// Whether a media type must skip decompression entirely.
pub fn is_bypass(media_type: &str) -> bool {
    BYPASS_MEDIA_TYPES.contains(&media_type)
}

/// All media types an ECI pull accepts, each base in every suffix form.
pub fn all_eci_media_types() -> Vec<String> {
    let bases = [
        ECI_CONFIG,
        ECI_KERNEL,
        ECI_INITRD,
        ECI_DISK_RAW,
        ECI_DISK_VHD,
        ECI_DISK_VMDK,
        ECI_DISK_ISO,
        ECI_DISK_QCOW,
        ECI_DISK_QCOW2,
        ECI_DISK_OVA,
        ECI_DISK_VHDX,
        ECI_OTHER,
    ];
    let forms = [
        Compression { gzip: false, tar: false },
        Compression { gzip: false, tar: true },
        Compression { gzip: true, tar: false },
        Compression { gzip: true, tar: true },
    ];

    let mut types: Vec<String> = BYPASS_MEDIA_TYPES.iter().map(|s| s.to_string()).collect();
    for base in bases {
        types.extend(forms.iter().map(|c| c.apply(base)));
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_table() {
        let cases = [
            ("x.tar+gzip", true, true),
            ("x.tar", true, false),
            ("x+gzip", false, true),
            ("x", false, false),
        ];
        for (media_type, tar, gzip) in cases {
            assert_eq!(
                Compression::from_media_type(media_type),
                Compression { gzip, tar },
                "{}",
                media_type
            );
        }
    }

    #[test]
    fn test_gzip_must_be_outermost_suffix() {
        // "+gzip.tar" is a tar of something named +gzip, not gzip-compressed
        let c = Compression::from_media_type("x+gzip.tar");
        assert!(c.tar);
        assert!(!c.gzip);
    }

    #[test]
    fn test_oci_layer_type() {
        let c = Compression::from_media_type(OCI_LAYER_TAR_GZIP);
        assert!(c.gzip && c.tar);
    }

    #[test]
    fn test_empty_string_is_identity() {
        assert!(Compression::from_media_type("").is_identity());
    }

    #[test]
    fn test_apply_inverts_parse() {
        let c = Compression { gzip: true, tar: true };
        assert_eq!(c.apply(ECI_DISK_RAW), "application/vnd.lfedge.disk.layer.v1+raw.tar+gzip");
        assert_eq!(Compression::from_media_type(&c.apply(ECI_DISK_RAW)), c);
    }

    #[test]
    fn test_bypass_types() {
        assert!(is_bypass(OCI_IMAGE_MANIFEST));
        assert!(is_bypass(OCI_IMAGE_INDEX));
        assert!(is_bypass(DOCKER_IMAGE_MANIFEST));
        assert!(!is_bypass(OCI_LAYER_TAR_GZIP));
        assert!(!is_bypass(ECI_KERNEL));
    }

    #[test]
    fn test_all_eci_media_types_cover_suffix_forms() {
        let types = all_eci_media_types();
        assert!(types.contains(&OCI_IMAGE_MANIFEST.to_string()));
        assert!(types.contains(&ECI_KERNEL.to_string()));
        assert!(types.contains(&format!("{}.tar+gzip", ECI_DISK_QCOW2)));
        assert!(types.contains(&format!("{}+gzip", ECI_INITRD)));
    }
}
