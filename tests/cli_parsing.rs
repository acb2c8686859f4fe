use clap::Parser;
use seaworthy::cli::commands::queue::QueueCommands;
use seaworthy::cli::{Cli, Commands};
use std::path::PathBuf;

#[test]
fn test_parse_policy_with_global_flags() {
    let cli = Cli::try_parse_from(["seaworthy", "policy", "--json", "--config", "ops/seaworthy.yaml"]).unwrap();

    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("ops/seaworthy.yaml")));
    assert!(matches!(cli.command, Commands::Policy(ref args) if !args.yaml));
}

#[test]
fn test_parse_policy_yaml() {
    let cli = Cli::try_parse_from(["seaworthy", "policy", "--yaml"]).unwrap();
    assert!(!cli.json);
    assert!(matches!(cli.command, Commands::Policy(ref args) if args.yaml));
}

#[test]
fn test_parse_classify_signals() {
    let cli = Cli::try_parse_from([
        "seaworthy",
        "classify",
        "--effective-type",
        "3g",
        "--downlink",
        "2.5",
        "--rtt",
        "420",
        "--save-data",
    ])
    .unwrap();

    match cli.command {
        Commands::Classify(args) => {
            assert!(!args.offline);
            assert_eq!(args.effective_type.as_deref(), Some("3g"));
            assert_eq!(args.downlink, Some(2.5));
            assert_eq!(args.rtt, Some(420));
            assert!(args.save_data);
        }
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_queue_drain_with_base_url() {
    let cli = Cli::try_parse_from(["seaworthy", "queue", "drain", "--base-url", "https://api.example.com"]).unwrap();

    match cli.command {
        Commands::Queue(args) => match args.command {
            QueueCommands::Drain { base_url } => {
                assert_eq!(base_url.as_deref(), Some("https://api.example.com"));
            }
            _ => panic!("Wrong queue command"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_queue_list_and_purge() {
    let list = Cli::try_parse_from(["seaworthy", "queue", "list"]).unwrap();
    assert!(matches!(list.command, Commands::Queue(ref q) if matches!(q.command, QueueCommands::List)));

    let purge = Cli::try_parse_from(["seaworthy", "-j", "queue", "purge"]).unwrap();
    assert!(purge.json);
    assert!(matches!(purge.command, Commands::Queue(ref q) if matches!(q.command, QueueCommands::Purge)));
}

#[test]
fn test_rejects_unknown_command_and_bad_numbers() {
    assert!(Cli::try_parse_from(["seaworthy", "teleport"]).is_err());
    assert!(Cli::try_parse_from(["seaworthy", "classify", "--rtt", "fast"]).is_err());
    assert!(Cli::try_parse_from(["seaworthy", "queue"]).is_err());
}
