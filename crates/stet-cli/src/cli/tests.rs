use super::*;

#[test]
fn flags_are_optional() {
    let cli = Cli::try_parse_from(["stet"]).unwrap();
    assert!(cli.data_dir.is_none());
    assert!(cli.log_level.is_none());
}

#[test]
fn parses_data_dir_and_log_level() {
    let cli = Cli::try_parse_from(["stet", "--data-dir", "/tmp/stet", "--log-level", "debug"])
        .unwrap();
    assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/stet")));
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
}

#[test]
fn rejects_subcommands() {
    assert!(Cli::try_parse_from(["stet", "sync"]).is_err());
}

#[test]
fn explicit_log_level_is_validated() {
    assert!(log_filter(Some("stet_cli=debug")).is_ok());
    assert!(log_filter(Some("stet_cli=notalevel")).is_err());
}

#[test]
fn clients_build_without_credentials() {
    let tmp = tempfile::tempdir().unwrap();
    let paths = AppPaths::new(tmp.path());
    let (oura, planta) = build_clients(&paths, Credentials::default()).unwrap();
    drop((oura, planta));
}
