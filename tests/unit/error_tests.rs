//! Unit tests for `AppError` display format.

use headless_swarm::AppError;

#[test]
fn every_variant_has_a_distinct_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Launch("x".into()), "launch: x"),
        (AppError::Parse("x".into()), "parse: x"),
        (AppError::Process("x".into()), "process: x"),
        (AppError::Cancelled("x".into()), "cancelled: x"),
        (AppError::Io("x".into()), "io: x"),
        (AppError::NotFound("x".into()), "not found: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_errors_become_config_errors() {
    let err: AppError = toml::from_str::<toml::Value>("= broken")
        .expect_err("invalid toml")
        .into();
    match err {
        AppError::Config(msg) => assert!(msg.starts_with("invalid config:"), "{msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn app_error_implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(AppError::Launch("no such binary".into()));
    assert_eq!(err.to_string(), "launch: no such binary");
}

#[test]
fn io_errors_become_io_errors() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "pipe gone").into();
    match err {
        AppError::Io(msg) => assert_eq!(msg, "pipe gone"),
        other => panic!("expected io error, got {other:?}"),
    }
}
