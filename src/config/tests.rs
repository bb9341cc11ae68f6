use super::*;

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
fn defaults_match_the_blog_conventions() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.pagination.count_on_page.get(), 10);
    assert!(settings.cache.enable_index_cache);
    assert_eq!(settings.cache.index_ttl, Duration::from_secs(20));
    assert_eq!(settings.auth.login_path, "/auth/login/");
    assert_eq!(
        settings.uploads.max_request_bytes.get(),
        DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
    );
    assert!(settings.database.url.is_none());
}

#[test]
fn count_on_page_rejects_zero() {
    let mut raw = RawSettings::default();
    raw.pagination.count_on_page = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero page size must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "pagination.count_on_page",
            ..
        }
    ));
}

#[test]
fn count_on_page_can_be_overridden_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        count_on_page: Some(25),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.pagination.count_on_page.get(), 25);
}

#[test]
fn zero_index_ttl_disables_the_cache() {
    let mut raw = RawSettings::default();
    raw.cache.index_ttl_seconds = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!settings.cache.enable_index_cache);
}

#[test]
fn login_path_must_be_absolute() {
    let mut raw = RawSettings::default();
    raw.auth.login_path = Some("auth/login/".to_string());

    let err = Settings::from_raw(raw).expect_err("relative login path must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "auth.login_path",
            ..
        }
    ));
}

#[test]
fn blank_database_url_is_treated_as_missing() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
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
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["yatube"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_create_user_arguments() {
    let args = CliArgs::parse_from([
        "yatube",
        "create-user",
        "leo",
        "--password",
        "s3cret",
        "--display-name",
        "Leo Tolstoy",
        "--database-url",
        "postgres://example",
    ]);

    match args.command.expect("create-user command") {
        Command::CreateUser(create) => {
            assert_eq!(create.username, "leo");
            assert_eq!(create.password, "s3cret");
            assert_eq!(create.display_name.as_deref(), Some("Leo Tolstoy"));
            assert_eq!(
                create.database.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_create_group_arguments() {
    let args = CliArgs::parse_from(["yatube", "create-group", "Lev Tolstoy", "--slug", "leo"]);

    match args.command.expect("create-group command") {
        Command::CreateGroup(create) => {
            assert_eq!(create.title, "Lev Tolstoy");
            assert_eq!(create.slug.as_deref(), Some("leo"));
            assert_eq!(create.description, "");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
