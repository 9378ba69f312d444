//! Argument parsing for `download` and `checksum`.

use super::{parse, parse_download};
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use std::path::Path;

#[test]
fn cli_parse_download_ids() {
    let args = parse_download(&["parcel", "download", "a1", "b2"]);
    assert_eq!(args.ids, vec!["a1", "b2"]);
    assert!(args.manifest.is_none());
    assert!(args.n_processes.is_none());
    assert!(!args.debug);
    assert!(!args.no_related_files);
}

#[test]
fn cli_parse_download_short_flags() {
    let args = parse_download(&[
        "parcel",
        "download",
        "-m",
        "manifest.txt",
        "-d",
        "/tmp/out",
        "-n",
        "4",
        "-s",
        "http://localhost:5000",
        "-T",
        "secret",
    ]);
    assert!(args.ids.is_empty());
    assert_eq!(args.manifest.as_deref(), Some(Path::new("manifest.txt")));
    assert_eq!(args.dir.as_deref(), Some(Path::new("/tmp/out")));
    assert_eq!(args.n_processes, Some(4));
    assert_eq!(args.server.as_deref(), Some("http://localhost:5000"));
    assert_eq!(args.token.as_deref(), Some("secret"));
}

#[test]
fn cli_parse_download_long_flags() {
    let args = parse_download(&[
        "parcel",
        "download",
        "x",
        "--http-chunk-size",
        "4096",
        "--save-interval",
        "1048576",
        "--no-segment-md5sums",
        "--no-file-md5sum",
        "--no-related-files",
        "--no-verify",
        "--retry-amount",
        "3",
        "--wait-time",
        "0.5",
        "--no-auto-retry",
        "--debug",
    ]);
    assert_eq!(args.http_chunk_size, Some(4096));
    assert_eq!(args.save_interval, Some(1_048_576));
    assert!(args.no_segment_md5sums);
    assert!(args.no_file_md5sum);
    assert!(args.no_related_files);
    assert!(args.no_verify);
    assert_eq!(args.retry_amount, Some(3));
    assert_eq!(args.wait_time, Some(0.5));
    assert!(args.no_auto_retry);
    assert!(args.debug);
}

#[test]
fn cli_token_and_token_file_conflict() {
    let res = Cli::try_parse_from(["parcel", "download", "x", "-t", "tok.txt", "-T", "abc"]);
    assert!(res.is_err());
}

#[test]
fn cli_verbose_follows_debug_flag() {
    let cli = Cli::try_parse_from(["parcel", "download", "x", "--debug"]).unwrap();
    assert!(cli.verbose());
    let cli = Cli::try_parse_from(["parcel", "checksum", "f"]).unwrap();
    assert!(!cli.verbose());
}

#[test]
fn cli_parse_checksum() {
    match parse(&["parcel", "checksum", "/path/to/file.bin"]) {
        CliCommand::Checksum { path } => assert_eq!(path, "/path/to/file.bin"),
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["parcel", "status"]).is_err());
}
