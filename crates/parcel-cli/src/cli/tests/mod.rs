//! CLI parse tests.

use super::{Cli, CliCommand, DownloadArgs, UploadArgs};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

pub(super) fn parse_download(args: &[&str]) -> DownloadArgs {
    match parse(args) {
        CliCommand::Download(args) => args,
        other => panic!("expected Download, got {:?}", other),
    }
}

pub(super) fn parse_upload(args: &[&str]) -> UploadArgs {
    match parse(args) {
        CliCommand::Upload(args) => args,
        other => panic!("expected Upload, got {:?}", other),
    }
}

mod download;
