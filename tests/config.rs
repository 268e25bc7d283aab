use anyhow::Result;
use readall::testing::TempDirPath;
use readall::{IngestError, ReadAllConfig, ReadMetrics};

#[test]
fn absent_fields_keep_their_defaults() -> Result<()> {
    let cfg = ReadAllConfig::from_json_str("{}")?;
    assert_eq!(cfg, ReadAllConfig::default());
    assert_eq!(cfg.desired_bundle_size_bytes, 64 * 1024 * 1024);
    assert!(cfg.uses_redistribution);
    assert_eq!(cfg.concurrency_limit, 10);
    assert_eq!(cfg.redistribution_seed, None);
    Ok(())
}

#[test]
fn every_field_can_be_set() -> Result<()> {
    let cfg = ReadAllConfig::from_json_str(
        r#"{
            "desired_bundle_size_bytes": 4096,
            "uses_redistribution": false,
            "redistribution_seed": 5,
            "concurrency_limit": 3,
            "parallelism": 2,
            "channel_capacity": 16
        }"#,
    )?;
    assert_eq!(
        cfg,
        ReadAllConfig::default()
            .with_desired_bundle_size_bytes(4096)
            .with_redistribution(false)
            .with_redistribution_seed(5)
            .with_concurrency_limit(3)
            .with_parallelism(2)
            .with_channel_capacity(16)
    );
    assert_eq!(cfg.effective_parallelism(), 2);
    Ok(())
}

#[test]
fn out_of_range_values_are_rejected() {
    for json in [
        r#"{ "desired_bundle_size_bytes": 0 }"#,
        r#"{ "concurrency_limit": 0 }"#,
        r#"{ "parallelism": 0 }"#,
        r#"{ "channel_capacity": 0 }"#,
        r#"{ "concurrency_limit": "ten" }"#,
        "not json",
    ] {
        let err = ReadAllConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, IngestError::InvalidConfig(_)), "{json}: {err}");
    }
}

#[test]
fn config_round_trips_through_a_file() -> Result<()> {
    let dir = TempDirPath::new()?;
    let cfg = ReadAllConfig::default()
        .with_concurrency_limit(4)
        .with_redistribution_seed(11);
    let path = dir.file_path("readall.json");
    std::fs::write(&path, serde_json::to_string_pretty(&cfg)?)?;

    assert_eq!(ReadAllConfig::from_json_file(&path)?, cfg);

    let err = ReadAllConfig::from_json_file(dir.file_path("missing.json")).unwrap_err();
    assert!(matches!(err, IngestError::InvalidConfig(_)));
    Ok(())
}

#[test]
fn default_parallelism_follows_the_cpu_count() {
    let cfg = ReadAllConfig::default();
    assert!(cfg.effective_parallelism() >= 2);
}

#[test]
fn metrics_snapshot_serialises() -> Result<()> {
    let metrics = ReadMetrics::new();
    let json = metrics.to_json();
    assert_eq!(json["records"], 0);
    assert_eq!(json["peak_open_sources"], 0);

    let dir = TempDirPath::new()?;
    let path = dir.file_path("metrics.json");
    metrics.save_to_file(&path)?;
    let text = std::fs::read_to_string(&path)?;
    assert!(text.contains("\"items_started\": 0"));
    Ok(())
}
