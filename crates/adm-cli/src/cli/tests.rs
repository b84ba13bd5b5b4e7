use super::*;
use clap::Parser;

#[test]
fn parses_download_with_flags() {
    let cli = Cli::parse_from([
        "adm",
        "download",
        "@music",
        "--limit",
        "50",
        "--output",
        "/tmp/lib",
        "--parallel",
        "4",
    ]);
    match cli.command {
        CliCommand::Download {
            group,
            limit,
            output,
            parallel,
        } => {
            assert_eq!(group, "@music");
            assert_eq!(limit, 50);
            assert_eq!(output.unwrap(), PathBuf::from("/tmp/lib"));
            assert_eq!(parallel, Some(4));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn download_limit_defaults_to_1000() {
    let cli = Cli::parse_from(["adm", "download", "12345"]);
    match cli.command {
        CliCommand::Download { limit, parallel, .. } => {
            assert_eq!(limit, 1000);
            assert_eq!(parallel, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parses_inspection_commands() {
    assert!(matches!(
        Cli::parse_from(["adm", "stats"]).command,
        CliCommand::Stats
    ));
    assert!(matches!(
        Cli::parse_from(["adm", "groups"]).command,
        CliCommand::Groups
    ));
    assert!(matches!(
        Cli::parse_from(["adm", "performance"]).command,
        CliCommand::Performance
    ));
    match Cli::parse_from(["adm", "search", "coltrane"]).command {
        CliCommand::Search { query } => assert_eq!(query, "coltrane"),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["adm"]).is_err());
}
