//! Loader attribute decoding and error paths.

use std::io::Write;

use pretty_assertions::assert_eq;

use rvmach_core::Error;
use rvmach_core::core::{
    ARCH_OPT_RV_A, ARCH_OPT_RV_C, ARCH_OPT_RV_D, ARCH_OPT_RV_F, ARCH_OPT_RV_M, ARCH_OPT_RV_ZICSR,
};
use rvmach_core::loader::{decode_arch_string, load_elf_bytes, load_elf_path};

#[test]
fn decodes_the_standard_extension_letters() {
    let opts = decode_arch_string("rv32i2p0_m2p0_a2p0_c2p0").unwrap();
    assert_eq!(opts, ARCH_OPT_RV_M | ARCH_OPT_RV_A | ARCH_OPT_RV_C);
}

#[test]
fn f_and_d_imply_zicsr() {
    let opts = decode_arch_string("rv64i2p1_f2p2_d2p2").unwrap();
    assert_eq!(
        opts,
        ARCH_OPT_RV_F | ARCH_OPT_RV_D | ARCH_OPT_RV_ZICSR
    );
}

#[test]
fn named_extensions_parse() {
    let opts = decode_arch_string("rv32i2p1_zicsr2p0").unwrap();
    assert_eq!(opts, ARCH_OPT_RV_ZICSR);
}

#[test]
fn bare_base_has_no_extensions() {
    assert_eq!(decode_arch_string("rv32i2p0").unwrap(), 0);
}

#[test]
fn unknown_extension_is_unsupported() {
    assert_eq!(
        decode_arch_string("rv32i2p0_v1p0"),
        Err(Error::Unsupported)
    );
}

#[test]
fn malformed_version_suffix_is_rejected() {
    assert_eq!(decode_arch_string("rv32i"), Err(Error::Arg));
    assert_eq!(decode_arch_string("rv32i2p"), Err(Error::Arg));
}

#[test]
fn non_riscv_base_is_rejected() {
    assert_eq!(decode_arch_string("x86lol1p0"), Err(Error::Arg));
}

#[test]
fn garbage_bytes_are_not_an_elf() {
    assert_eq!(load_elf_bytes(b"not an elf").unwrap_err(), Error::Arg);
}

#[test]
fn unreadable_path_is_an_error() {
    let err = load_elf_path(std::path::Path::new("/does/not/exist.elf")).unwrap_err();
    assert_eq!(err, Error::Arg);
}

#[test]
fn non_elf_file_on_disk_is_rejected() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"\x7fNOT-ELF").unwrap();
    let err = load_elf_path(f.path()).unwrap_err();
    assert_eq!(err, Error::Arg);
}
