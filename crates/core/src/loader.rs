//! Guest ELF loader.
//!
//! Parses ELF32/ELF64 RISC-V executables into a loadable image: the
//! loadable segments, the entry point, the register width, and the
//! extension set decoded from the `.riscv.attributes` arch string (e.g.
//! `rv32i2p0_m2p0_a2p0_c2p0`).

use std::path::Path;

use object::{Architecture, Object, ObjectSection, ObjectSegment};
use tracing::{debug, warn};

use crate::common::{Error, Result};
use crate::core::{
    ARCH_OPT_RV_A, ARCH_OPT_RV_C, ARCH_OPT_RV_D, ARCH_OPT_RV_F, ARCH_OPT_RV_M, ARCH_OPT_RV_ZICSR,
    Arch, CoreMode,
};

/// One loadable segment.
#[derive(Debug)]
pub struct Segment {
    /// Guest load address.
    pub addr: u64,
    /// File-backed bytes; trailing zero bytes of the memory size are
    /// implicit in the zero-filled region.
    pub data: Vec<u8>,
}

/// A parsed guest executable.
#[derive(Debug)]
pub struct LoadedImage {
    /// Guest architecture.
    pub arch: Arch,
    /// Register width the image was built for.
    pub mode: CoreMode,
    /// `ARCH_OPT_*` extension bits decoded from the attributes.
    pub arch_options: u32,
    /// Entry point, zero if the file declares none.
    pub entry: u64,
    /// Loadable segments.
    pub segments: Vec<Segment>,
}

/// Parses an ELF image from raw file bytes.
pub fn load_elf_bytes(data: &[u8]) -> Result<LoadedImage> {
    let file = object::File::parse(data).map_err(|e| {
        warn!(%e, "elf parse failed");
        Error::Arg
    })?;

    let mode = match file.architecture() {
        Architecture::Riscv32 => CoreMode::Mode32,
        Architecture::Riscv64 => CoreMode::Mode64,
        _ => return Err(Error::Unsupported),
    };

    let mut segments = Vec::new();
    for seg in file.segments() {
        let data = seg.data().map_err(|_| Error::Arg)?;
        if data.is_empty() {
            continue;
        }
        segments.push(Segment {
            addr: seg.address(),
            data: data.to_vec(),
        });
    }

    let arch_options = match file.section_by_name(".riscv.attributes") {
        Some(section) => {
            let data = section.data().map_err(|_| Error::Arg)?;
            decode_attributes_blob(data, mode)?
        }
        None => 0,
    };

    Ok(LoadedImage {
        arch: Arch::Riscv,
        mode,
        arch_options,
        entry: file.entry(),
        segments,
    })
}

/// Parses an ELF image from a file on disk.
pub fn load_elf_path(path: &Path) -> Result<LoadedImage> {
    let data = std::fs::read(path).map_err(|e| {
        warn!(path = %path.display(), %e, "cannot read image");
        Error::Arg
    })?;
    load_elf_bytes(&data)
}

/// Locates the NUL-terminated arch string inside the raw attributes
/// section and decodes it.
fn decode_attributes_blob(data: &[u8], mode: CoreMode) -> Result<u32> {
    let needle: &[u8] = match mode {
        CoreMode::Mode32 => b"rv32i",
        CoreMode::Mode64 => b"rv64i",
    };
    let start = data
        .windows(needle.len())
        .position(|w| w == needle)
        .ok_or(Error::Arg)?;
    let tail = &data[start..];
    let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
    let arch_str = std::str::from_utf8(&tail[..end]).map_err(|_| Error::Arg)?;
    decode_arch_string(arch_str)
}

/// Splits one `<name><major>p<minor>` attribute segment.
fn parse_attribute(token: &str) -> Result<(&str, u32, u32)> {
    let p = token.rfind('p').ok_or(Error::Arg)?;
    if p == 0 {
        return Err(Error::Arg);
    }
    let patch: u32 = token[p + 1..].parse().map_err(|_| Error::Arg)?;
    let head = &token[..p];
    let ver_start = head
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    if ver_start == head.len() {
        return Err(Error::Arg);
    }
    let version: u32 = head[ver_start..].parse().map_err(|_| Error::Arg)?;
    Ok((&head[..ver_start], version, patch))
}

/// Decodes a RISC-V arch string (`rv32i2p0_m2p0_...`) into `ARCH_OPT_*`
/// bits.
pub fn decode_arch_string(arch: &str) -> Result<u32> {
    const EXT_MAP: [(&str, u32); 6] = [
        ("m", ARCH_OPT_RV_M),
        ("a", ARCH_OPT_RV_A),
        ("f", ARCH_OPT_RV_F | ARCH_OPT_RV_ZICSR),
        ("d", ARCH_OPT_RV_D | ARCH_OPT_RV_F | ARCH_OPT_RV_ZICSR),
        ("c", ARCH_OPT_RV_C),
        ("zicsr", ARCH_OPT_RV_ZICSR),
    ];

    let mut tokens = arch.split('_').filter(|t| !t.is_empty());
    let base = tokens.next().ok_or(Error::Arg)?;
    let (name, _, _) = parse_attribute(base)?;
    if name != "rv32i" && name != "rv64i" {
        warn!(name, "unexpected arch mode");
        return Err(Error::Arg);
    }

    let mut options = 0;
    for token in tokens {
        let (name, version, patch) = parse_attribute(token)?;
        match EXT_MAP.iter().find(|(n, _)| *n == name) {
            Some((_, bits)) => {
                debug!(ext = name, version, patch, "attribute");
                options |= bits;
            }
            None => {
                warn!(ext = name, "unhandled extension");
                return Err(Error::Unsupported);
            }
        }
    }
    Ok(options)
}
