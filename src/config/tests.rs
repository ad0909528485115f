use std::io::Write;

use super::*;

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(
        settings.database.filename,
        PathBuf::from("data/cached_sums.db")
    );
    assert_eq!(settings.sums.max_numbers.get(), 1000);
    assert_eq!(settings.http.max_body_bytes, 10 * 1024 * 1024);
    assert_eq!(settings.rate_limit.window, Duration::from_secs(900));
    assert_eq!(settings.rate_limit.max_requests.get(), 100);
    assert!(settings.cors.allow_any_origin);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_falls_back_to_filename() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    raw.database.filename = Some(PathBuf::from("/tmp/sums.db"));

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.filename, PathBuf::from("/tmp/sums.db"));
}

#[test]
fn zero_limits_are_rejected() {
    let mut raw = RawSettings::default();
    raw.sums.max_numbers = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "sums.max_numbers",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.rate_limit.max_requests = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "rate_limit.max_requests",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.server.port = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "server.port",
            ..
        })
    ));
}

#[test]
fn invalid_log_level_is_reported() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("chatty".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "logging.level",
            ..
        })
    ));
}

#[test]
fn explicit_config_file_is_layered_under_cli() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    writeln!(
        file,
        "[server]\nport = 4100\n\n[sums]\nmax_numbers = 25\n\n[database]\nfilename = \"/tmp/from-file.db\""
    )
    .expect("write config");

    let path = file.path().to_str().expect("utf-8 path").to_string();
    let args = CliArgs::parse_from([
        "sumcache",
        "--config-file",
        path.as_str(),
        "serve",
        "--server-port",
        "4200",
    ]);

    let settings = load(&args).expect("settings load");
    assert_eq!(settings.server.addr.port(), 4200);
    assert_eq!(settings.sums.max_numbers.get(), 25);
    assert_eq!(
        settings.database.filename,
        PathBuf::from("/tmp/from-file.db")
    );
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["sumcache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_sum_arguments_with_negative_numbers() {
    let args = CliArgs::parse_from([
        "sumcache",
        "sum",
        "--database-filename",
        "/tmp/sums.db",
        "-1",
        "2.5",
        "-3",
    ]);

    match args.command.expect("sum command") {
        Command::Sum(sum) => {
            assert_eq!(sum.numbers, vec![-1.0, 2.5, -3.0]);
            assert_eq!(
                sum.database.database_filename.as_deref(),
                Some(std::path::Path::new("/tmp/sums.db"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_cache_subcommands() {
    let args = CliArgs::parse_from([
        "sumcache",
        "cache",
        "clear",
        "--database-url",
        "sqlite://example.db",
    ]);

    match args.command.expect("cache command") {
        Command::Cache(cache) => match cache.command {
            CacheCommand::Clear(target) => {
                assert_eq!(
                    target.database.database_url.as_deref(),
                    Some("sqlite://example.db")
                );
            }
            CacheCommand::List(_) => panic!("wrong cache command parsed"),
        },
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "sumcache",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--rate-limit-max-requests",
        "5",
        "--cors-allow-any-origin",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.rate_limit_max_requests, Some(5));
            assert_eq!(serve.overrides.cors_allow_any_origin, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}
